//! Scheduled social events ("SubEvent"). Grounded in
//! `server/SubEvent.{h,cpp}`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
	ids::{ParcelId, SubEventId, UserId},
	store::{DatabaseKey, Reader, StoreEntity, Writer},
	timestamp::Timestamp,
};

pub const MAX_WORLD_NAME_SIZE: usize = 1000;
pub const MAX_TITLE_SIZE: usize = 1000;
pub const MAX_DESCRIPTION_SIZE: usize = 10000;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventState {
	Draft,
	Published,
	Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubEvent {
	#[serde(skip)]
	pub db_key: Option<DatabaseKey>,
	pub id: SubEventId,
	pub world_name: String,
	pub parcel_id: ParcelId,
	pub creator_id: UserId,
	pub created_time: Timestamp,
	pub last_modified_time: Timestamp,
	pub start_time: Timestamp,
	pub end_time: Timestamp,
	pub title: String,
	pub description: String,
	pub attendee_ids: HashSet<UserId>,
	pub state: EventState,
}

impl SubEvent {
	pub fn is_happening_at(&self, now: Timestamp) -> bool {
		self.state == EventState::Published && now.0 >= self.start_time.0 && now.0 <= self.end_time.0
	}
}

const SUB_EVENT_VERSION: u32 = 1;

impl StoreEntity for SubEvent {
	const KIND: u32 = crate::store::RecordKind::SubEvent as u32;
	const VERSION: u32 = SUB_EVENT_VERSION;

	fn db_key(&self) -> Option<DatabaseKey> {
		self.db_key
	}

	fn set_db_key(&mut self, key: DatabaseKey) {
		self.db_key = Some(key);
	}

	fn write_fields(&self, w: &mut Writer) {
		w.write_u64(self.id.value());
		w.write_string(&self.world_name);
		w.write_u32(self.parcel_id.value());
		w.write_u32(self.creator_id.value());
		w.write_u64(self.created_time.0);
		w.write_u64(self.last_modified_time.0);
		w.write_u64(self.start_time.0);
		w.write_u64(self.end_time.0);
		w.write_string(&self.title);
		w.write_string(&self.description);
		w.write_u32(self.attendee_ids.len() as u32);
		for id in &self.attendee_ids {
			w.write_u32(id.value());
		}
		w.write_u8(match self.state {
			EventState::Draft => 0,
			EventState::Published => 1,
			EventState::Deleted => 2,
		});
	}

	fn read_fields(version: u32, r: &mut Reader) -> Result<Self, crate::error::StoreError> {
		crate::store::check_version(Self::KIND, version, SUB_EVENT_VERSION, r)?;
		let id = SubEventId(r.read_u64()?);
		let world_name = r.read_string()?;
		let parcel_id = ParcelId(r.read_u32()?);
		let creator_id = UserId(r.read_u32()?);
		let created_time = Timestamp(r.read_u64()?);
		let last_modified_time = Timestamp(r.read_u64()?);
		let start_time = Timestamp(r.read_u64()?);
		let end_time = Timestamp(r.read_u64()?);
		let title = r.read_string()?;
		let description = r.read_string()?;
		let n_attendees = r.read_u32()?;
		let mut attendee_ids = HashSet::with_capacity(n_attendees as usize);
		for _ in 0..n_attendees {
			attendee_ids.insert(UserId(r.read_u32()?));
		}
		let state = match r.read_u8()? {
			0 => EventState::Draft,
			1 => EventState::Published,
			_ => EventState::Deleted,
		};
		Ok(SubEvent {
			db_key: None,
			id,
			world_name,
			parcel_id,
			creator_id,
			created_time,
			last_modified_time,
			start_time,
			end_time,
			title,
			description,
			attendee_ids,
			state,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn event() -> SubEvent {
		let mut attendees = HashSet::new();
		attendees.insert(UserId(2));
		attendees.insert(UserId(3));
		SubEvent {
			db_key: None,
			id: SubEventId(1),
			world_name: String::new(),
			parcel_id: ParcelId(1),
			creator_id: UserId(1),
			created_time: Timestamp(0),
			last_modified_time: Timestamp(0),
			start_time: Timestamp(100),
			end_time: Timestamp(200),
			title: "Meetup".into(),
			description: "A gathering".into(),
			attendee_ids: attendees,
			state: EventState::Published,
		}
	}

	#[test]
	fn is_happening_within_window_only_when_published() {
		let mut e = event();
		assert!(e.is_happening_at(Timestamp(150)));
		assert!(!e.is_happening_at(Timestamp(250)));
		e.state = EventState::Draft;
		assert!(!e.is_happening_at(Timestamp(150)));
	}

	#[test]
	fn store_round_trip() {
		let e = event();
		let bytes = Writer::write_versioned_payload(SubEvent::VERSION, |w| e.write_fields(w));
		let mut r = Reader::new(&bytes);
		let (version, mut fields) = r.read_versioned_payload().unwrap();
		let e2 = SubEvent::read_fields(version, &mut fields).unwrap();
		assert_eq!(e.id, e2.id);
		assert_eq!(e.attendee_ids, e2.attendee_ids);
		assert_eq!(e.title, e2.title);
	}
}
