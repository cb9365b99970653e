//! Site news posts. Grounded in `server/NewsPost.{h,cpp}`.

use serde::{Deserialize, Serialize};

use crate::{
	ids::{NewsPostId, UserId},
	store::{DatabaseKey, Reader, StoreEntity, Writer},
	timestamp::Timestamp,
};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum PostState {
	Draft,
	Published,
	Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsPost {
	#[serde(skip)]
	pub db_key: Option<DatabaseKey>,
	pub id: NewsPostId,
	pub creator_id: UserId,
	pub created_time: Timestamp,
	pub last_modified_time: Timestamp,
	pub title: String,
	pub content: String,
	pub thumbnail_url: String,
	pub state: PostState,
}

impl NewsPost {
	pub fn is_visible_to_public(&self) -> bool {
		self.state == PostState::Published
	}
}

const NEWS_POST_VERSION: u32 = 1;

impl StoreEntity for NewsPost {
	const KIND: u32 = crate::store::RecordKind::NewsPost as u32;
	const VERSION: u32 = NEWS_POST_VERSION;

	fn db_key(&self) -> Option<DatabaseKey> {
		self.db_key
	}

	fn set_db_key(&mut self, key: DatabaseKey) {
		self.db_key = Some(key);
	}

	fn write_fields(&self, w: &mut Writer) {
		w.write_u64(self.id.value());
		w.write_u32(self.creator_id.value());
		w.write_u64(self.created_time.0);
		w.write_u64(self.last_modified_time.0);
		w.write_string(&self.title);
		w.write_string(&self.content);
		w.write_string(&self.thumbnail_url);
		w.write_u8(match self.state {
			PostState::Draft => 0,
			PostState::Published => 1,
			PostState::Deleted => 2,
		});
	}

	fn read_fields(version: u32, r: &mut Reader) -> Result<Self, crate::error::StoreError> {
		crate::store::check_version(Self::KIND, version, NEWS_POST_VERSION, r)?;
		Ok(NewsPost {
			db_key: None,
			id: NewsPostId(r.read_u64()?),
			creator_id: UserId(r.read_u32()?),
			created_time: Timestamp(r.read_u64()?),
			last_modified_time: Timestamp(r.read_u64()?),
			title: r.read_string()?,
			content: r.read_string()?,
			thumbnail_url: r.read_string()?,
			state: match r.read_u8()? {
				0 => PostState::Draft,
				1 => PostState::Published,
				_ => PostState::Deleted,
			},
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn post() -> NewsPost {
		NewsPost {
			db_key: None,
			id: NewsPostId(1),
			creator_id: UserId(1),
			created_time: Timestamp(10),
			last_modified_time: Timestamp(10),
			title: "Hello".into(),
			content: "World".into(),
			thumbnail_url: "news1.png".into(),
			state: PostState::Draft,
		}
	}

	#[test]
	fn only_published_is_visible() {
		let mut p = post();
		assert!(!p.is_visible_to_public());
		p.state = PostState::Published;
		assert!(p.is_visible_to_public());
		p.state = PostState::Deleted;
		assert!(!p.is_visible_to_public());
	}

	#[test]
	fn store_round_trip() {
		let p = post();
		let bytes = Writer::write_versioned_payload(NewsPost::VERSION, |w| p.write_fields(w));
		let mut r = Reader::new(&bytes);
		let (version, mut fields) = r.read_versioned_payload().unwrap();
		let p2 = NewsPost::read_fields(version, &mut fields).unwrap();
		assert_eq!(p.id, p2.id);
		assert_eq!(p.title, p2.title);
		assert_eq!(p.state, p2.state);
	}
}
