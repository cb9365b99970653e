//! Web login sessions: an opaque random 128-bit id mapping
//! to a user and creation time, with a fixed max age enforced by the admin
//! surface rather than the store itself.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{
	ids::UserId,
	store::{DatabaseKey, Reader, StoreEntity, Writer},
	timestamp::Timestamp,
};

/// `site-b` cookie `Max-Age`, in seconds (90 days).
pub const MAX_AGE_SECS: u64 = 7_776_000;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u128);

impl SessionId {
	pub fn generate() -> Self {
		let mut bytes = [0u8; 16];
		rand::thread_rng().fill_bytes(&mut bytes);
		Self(u128::from_le_bytes(bytes))
	}
}

impl std::fmt::Display for SessionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:032x}", self.0)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserWebSession {
	#[serde(skip)]
	pub db_key: Option<DatabaseKey>,
	pub id: SessionId,
	pub user_id: UserId,
	pub created_time: Timestamp,
}

impl UserWebSession {
	pub fn is_expired(&self, now: Timestamp) -> bool {
		now.0.saturating_sub(self.created_time.0) > MAX_AGE_SECS
	}
}

const SESSION_VERSION: u32 = 1;

impl StoreEntity for UserWebSession {
	const KIND: u32 = crate::store::RecordKind::UserWebSession as u32;
	const VERSION: u32 = SESSION_VERSION;

	fn db_key(&self) -> Option<DatabaseKey> {
		self.db_key
	}

	fn set_db_key(&mut self, key: DatabaseKey) {
		self.db_key = Some(key);
	}

	fn write_fields(&self, w: &mut Writer) {
		w.write_u64(self.id.0 as u64);
		w.write_u64((self.id.0 >> 64) as u64);
		w.write_u32(self.user_id.value());
		w.write_u64(self.created_time.0);
	}

	fn read_fields(version: u32, r: &mut Reader) -> Result<Self, crate::error::StoreError> {
		crate::store::check_version(Self::KIND, version, SESSION_VERSION, r)?;
		let lo = r.read_u64()? as u128;
		let hi = r.read_u64()? as u128;
		let id = SessionId(lo | (hi << 64));
		let user_id = UserId(r.read_u32()?);
		let created_time = Timestamp(r.read_u64()?);
		Ok(UserWebSession {
			db_key: None,
			id,
			user_id,
			created_time,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn not_expired_when_fresh() {
		let s = UserWebSession {
			db_key: None,
			id: SessionId::generate(),
			user_id: UserId(1),
			created_time: Timestamp(1_000_000),
		};
		assert!(!s.is_expired(Timestamp(1_000_000 + MAX_AGE_SECS - 1)));
		assert!(s.is_expired(Timestamp(1_000_000 + MAX_AGE_SECS + 1)));
	}

	#[test]
	fn store_round_trip_preserves_full_128_bits() {
		let s = UserWebSession {
			db_key: None,
			id: SessionId(u128::MAX - 1),
			user_id: UserId(42),
			created_time: Timestamp(5),
		};
		let bytes = Writer::write_versioned_payload(UserWebSession::VERSION, |w| s.write_fields(w));
		let mut r = Reader::new(&bytes);
		let (version, mut fields) = r.read_versioned_payload().unwrap();
		let s2 = UserWebSession::read_fields(version, &mut fields).unwrap();
		assert_eq!(s.id, s2.id);
		assert_eq!(s.user_id, s2.user_id);
	}
}
