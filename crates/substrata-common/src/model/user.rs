//! User accounts: a user is created at signup and never destroyed, only
//! marked. Password reset state is a small embedded struct rather than its
//! own store record, mirroring `server/PasswordReset.{h,cpp}`'s role as a
//! couple of fields on the user, not a standalone persisted entity.
//! Session identity and id allocation are grounded in `shared/UserID.h`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
	ids::UserId,
	store::{DatabaseKey, Reader, StoreEntity, Writer},
	timestamp::Timestamp,
};

pub const MAX_USERNAME_LEN: usize = 100;

/// SHA-256 over `salt || password`. Constant-time comparison is the
/// caller's job (see [`User::check_password`]).
pub fn hash_password(salt: &[u8], password: &str) -> [u8; 32] {
	let mut hasher = Sha256::new();
	hasher.update(salt);
	hasher.update(password.as_bytes());
	hasher.finalize().into()
}

/// A single-use password reset token. Only its hash is ever stored; the
/// raw token is emailed to the user and never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PasswordReset {
	pub token_hash: Option<[u8; 32]>,
	pub created_time: Timestamp,
}

impl PasswordReset {
	/// Reset links expire after this many seconds (24 hours).
	pub const MAX_AGE_SECS: u64 = 24 * 3600;

	pub fn issue(token: &[u8; 32], now: Timestamp) -> Self {
		let hash: [u8; 32] = Sha256::digest(token).into();
		Self {
			token_hash: Some(hash),
			created_time: now,
		}
	}

	/// Consumes the token if it matches and hasn't expired, clearing it
	/// either way once checked (single-use).
	pub fn try_consume(&mut self, candidate: &[u8; 32], now: Timestamp) -> bool {
		let Some(stored) = self.token_hash else {
			return false;
		};
		let candidate_hash: [u8; 32] = Sha256::digest(candidate).into();
		let expired = now.0.saturating_sub(self.created_time.0) > Self::MAX_AGE_SECS;
		self.token_hash = None;
		!expired && stored == candidate_hash
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
	#[serde(skip)]
	pub db_key: Option<DatabaseKey>,
	pub id: UserId,
	pub name: String,
	pub email: String,
	pub created_time: Timestamp,
	pub password_hash: [u8; 32],
	pub salt: [u8; 16],
	pub avatar_settings: Vec<u8>,
	pub password_reset: PasswordReset,
}

impl User {
	pub fn check_password(&self, password: &str) -> bool {
		let candidate = hash_password(&self.salt, password);
		constant_time_eq(&candidate, &self.password_hash)
	}
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
	let mut diff = 0u8;
	for (x, y) in a.iter().zip(b.iter()) {
		diff |= x ^ y;
	}
	diff == 0
}

const USER_VERSION: u32 = 1;

impl StoreEntity for User {
	const KIND: u32 = crate::store::RecordKind::User as u32;
	const VERSION: u32 = USER_VERSION;

	fn db_key(&self) -> Option<DatabaseKey> {
		self.db_key
	}

	fn set_db_key(&mut self, key: DatabaseKey) {
		self.db_key = Some(key);
	}

	fn write_fields(&self, w: &mut Writer) {
		w.write_u32(self.id.value());
		w.write_string(&self.name);
		w.write_string(&self.email);
		w.write_u64(self.created_time.0);
		w.write_bytes(&self.password_hash);
		w.write_bytes(&self.salt);
		w.write_bytes(&self.avatar_settings);
		match self.password_reset.token_hash {
			Some(h) => {
				w.write_bool(true);
				w.write_bytes(&h);
			}
			None => w.write_bool(false),
		}
		w.write_u64(self.password_reset.created_time.0);
	}

	fn read_fields(version: u32, r: &mut Reader) -> Result<Self, crate::error::StoreError> {
		crate::store::check_version(Self::KIND, version, USER_VERSION, r)?;

		let id = UserId(r.read_u32()?);
		let name = r.read_string()?;
		let email = r.read_string()?;
		let created_time = Timestamp(r.read_u64()?);
		let password_hash: [u8; 32] = r
			.read_bytes()?
			.try_into()
			.map_err(|_| crate::error::StoreError::BadString)?;
		let salt: [u8; 16] = r
			.read_bytes()?
			.try_into()
			.map_err(|_| crate::error::StoreError::BadString)?;
		let avatar_settings = r.read_bytes()?;
		let token_hash = if r.read_bool()? {
			Some(
				r.read_bytes()?
					.try_into()
					.map_err(|_| crate::error::StoreError::BadString)?,
			)
		} else {
			None
		};
		let reset_created_time = Timestamp(r.read_u64()?);

		Ok(User {
			db_key: None,
			id,
			name,
			email,
			created_time,
			password_hash,
			salt,
			avatar_settings,
			password_reset: PasswordReset {
				token_hash,
				created_time: reset_created_time,
			},
		})
	}
}
