//! Top-level in-memory state owned by the server process: one root world
//! plus any number of named personal/public worlds, the user table,
//! sessions, the resource registry, and the non-world-scoped entity tables
//! (orders, auctions, news posts, events, photos, screenshots). No single
//! original source file owns this shape; it is assembled here from the
//! per-entity tables the `server/` and `shared/` originals define, the way
//! a container type aggregates its members (see DESIGN.md).

use std::collections::{HashMap, HashSet};

use crate::{
	error::DomainError,
	ids::{NewsPostId, OrderId, ParcelId, SubEventId, UserId},
	model::{
		auction::Auction,
		news_post::NewsPost,
		order::Order,
		photo::Photo,
		resource::Resource,
		screenshot::Screenshot,
		sub_event::SubEvent,
		user::User,
		user_web_session::{SessionId, UserWebSession},
		world_state::{WorldMeta, WorldState, MAX_WORLD_NAME_LEN},
	},
	timestamp::Timestamp,
};

/// The name of the single root world every server always has, matching
/// `ServerAllWorldsState`'s reserved empty-string world name convention.
pub const ROOT_WORLD_NAME: &str = "";

#[derive(Debug, Default)]
pub struct AllWorldsState {
	pub worlds: HashMap<String, WorldState>,
	pub users: HashMap<UserId, User>,
	pub sessions: HashMap<SessionId, UserWebSession>,
	pub resources: HashMap<String, Resource>,
	pub orders: HashMap<OrderId, Order>,
	pub auctions: HashMap<crate::ids::AuctionId, Auction>,
	pub news_posts: HashMap<NewsPostId, NewsPost>,
	pub sub_events: HashMap<SubEventId, SubEvent>,
	pub photos: HashMap<crate::ids::PhotoId, Photo>,
	pub screenshots: HashMap<crate::ids::ScreenshotId, Screenshot>,
	/// Entities outside of a world's own per-kind dirty sets that still need
	/// a DB flush pass: world metadata, news posts, and events.
	pub dirty_worlds: HashSet<String>,
	pub dirty_news_posts: HashSet<NewsPostId>,
	pub dirty_sub_events: HashSet<SubEventId>,
	/// Per-user flash messages set by a mutating web admin endpoint and
	/// drained by the next page that reads for that user, matching
	/// `ServerAllWorldsState::setUserWebMessage`/`getAndClearUserWebMessage`.
	pub flash_messages: HashMap<UserId, String>,
	next_user_id: u32,
}

impl AllWorldsState {
	/// A fresh in-memory state with just the root world, as at first boot
	/// before the store is loaded.
	pub fn new_with_root_world(owner_id: UserId, now: Timestamp) -> Self {
		let mut worlds = HashMap::new();
		worlds.insert(
			ROOT_WORLD_NAME.to_string(),
			WorldState::new(WorldMeta {
				db_key: None,
				name: ROOT_WORLD_NAME.to_string(),
				owner_id,
				created_time: now,
				description: String::new(),
			}),
		);
		Self {
			worlds,
			users: HashMap::new(),
			sessions: HashMap::new(),
			resources: HashMap::new(),
			orders: HashMap::new(),
			auctions: HashMap::new(),
			news_posts: HashMap::new(),
			sub_events: HashMap::new(),
			photos: HashMap::new(),
			screenshots: HashMap::new(),
			dirty_worlds: HashSet::new(),
			dirty_news_posts: HashSet::new(),
			dirty_sub_events: HashSet::new(),
			flash_messages: HashMap::new(),
			next_user_id: 0,
		}
	}

	pub fn get_world(&self, name: &str) -> Option<&WorldState> {
		self.worlds.get(name)
	}

	pub fn get_world_mut(&mut self, name: &str) -> Option<&mut WorldState> {
		self.worlds.get_mut(name)
	}

	pub fn mark_world_dirty(&mut self, name: &str) {
		self.dirty_worlds.insert(name.to_string());
	}

	pub fn mark_news_post_dirty(&mut self, id: NewsPostId) {
		self.dirty_news_posts.insert(id);
	}

	pub fn mark_sub_event_dirty(&mut self, id: SubEventId) {
		self.dirty_sub_events.insert(id);
	}

	pub fn set_user_web_message(&mut self, user_id: UserId, message: impl Into<String>) {
		self.flash_messages.insert(user_id, message.into());
	}

	/// Drains the flash message set for `user_id`, if any, matching
	/// `ServerAllWorldsState::getAndClearUserWebMessage`.
	pub fn take_user_web_message(&mut self, user_id: UserId) -> Option<String> {
		self.flash_messages.remove(&user_id)
	}

	/// Creates a new named world owned by `owner_id`. Fails if the name is
	/// too long, empty (reserved for the root world) or already taken.
	pub fn create_world(&mut self, name: &str, owner_id: UserId, now: Timestamp) -> Result<(), DomainError> {
		if name.is_empty() {
			return Err(DomainError::Validation("world name must not be empty".into()));
		}
		if name.len() > MAX_WORLD_NAME_LEN {
			return Err(DomainError::WorldNameTooLong(name.len()));
		}
		if self.worlds.contains_key(name) {
			return Err(DomainError::WorldAlreadyExists(name.to_string()));
		}
		self.worlds.insert(
			name.to_string(),
			WorldState::new(WorldMeta {
				db_key: None,
				name: name.to_string(),
				owner_id,
				created_time: now,
				description: String::new(),
			}),
		);
		Ok(())
	}

	/// Assigns the next free user id. Ids are never reused even after a user
	/// is (hypothetically) removed: a simple monotonically increasing counter.
	pub fn allocate_user_id(&mut self) -> UserId {
		let id = UserId(self.next_user_id);
		self.next_user_id += 1;
		id
	}

	pub fn find_user_by_name(&self, name: &str) -> Option<&User> {
		self.users.values().find(|u| u.name == name)
	}

	pub fn session_user(&self, session_id: SessionId, now: Timestamp) -> Option<&User> {
		let session = self.sessions.get(&session_id)?;
		if session.is_expired(now) {
			return None;
		}
		self.users.get(&session.user_id)
	}

	/// A user may modify an object at `aabb` in `world` if the world is
	/// their own personal world, or the object's location is fully
	/// contained in a parcel they hold write permission on. A world with no
	/// parcels at all grants no write access to non-owners.
	pub fn user_may_modify_object_at(&self, world_name: &str, user_id: UserId, object_aabb: &crate::geom::Aabb) -> bool {
		let Some(world) = self.worlds.get(world_name) else {
			return false;
		};
		if world.is_personal_world_of(user_id) {
			return true;
		}
		let parcels: Vec<_> = world.parcels.values().cloned().collect();
		crate::permissions::user_may_modify_object_at(user_id, object_aabb, &parcels)
	}

	pub fn parcel_owner(&self, world_name: &str, parcel_id: ParcelId) -> Option<UserId> {
		self.worlds.get(world_name)?.parcels.get(&parcel_id).map(|p| p.owner_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn root_world_exists_from_construction() {
		let state = AllWorldsState::new_with_root_world(UserId(0), Timestamp(0));
		assert!(state.get_world(ROOT_WORLD_NAME).is_some());
	}

	#[test]
	fn create_world_rejects_empty_name_and_duplicates() {
		let mut state = AllWorldsState::new_with_root_world(UserId(0), Timestamp(0));
		assert!(matches!(state.create_world("", UserId(1), Timestamp(0)), Err(DomainError::Validation(_))));
		state.create_world("alice", UserId(1), Timestamp(0)).unwrap();
		assert!(matches!(
			state.create_world("alice", UserId(2), Timestamp(0)),
			Err(DomainError::WorldAlreadyExists(_))
		));
	}

	#[test]
	fn create_world_rejects_name_too_long() {
		let mut state = AllWorldsState::new_with_root_world(UserId(0), Timestamp(0));
		let long_name = "a".repeat(MAX_WORLD_NAME_LEN + 1);
		assert!(matches!(
			state.create_world(&long_name, UserId(1), Timestamp(0)),
			Err(DomainError::WorldNameTooLong(_))
		));
	}

	#[test]
	fn allocate_user_id_is_monotonic_and_unique() {
		let mut state = AllWorldsState::new_with_root_world(UserId(0), Timestamp(0));
		let a = state.allocate_user_id();
		let b = state.allocate_user_id();
		assert_ne!(a, b);
		assert!(b.value() > a.value());
	}

	#[test]
	fn personal_world_allows_unconditional_modification() {
		let mut state = AllWorldsState::new_with_root_world(UserId(0), Timestamp(0));
		state.create_world("alice", UserId(1), Timestamp(0)).unwrap();
		let aabb = crate::geom::Aabb {
			min: crate::geom::Vec3d::default(),
			max: crate::geom::Vec3d::default(),
		};
		// owner's own personal world: always allowed, short-circuiting parcel checks
		assert!(state.user_may_modify_object_at("alice", UserId(1), &aabb));
		// "alice" is user 1's personal world and has no parcels yet: a stranger
		// has no parcel to hold write permission on, so they're rejected.
		assert!(!state.user_may_modify_object_at("alice", UserId(2), &aabb));

		let mut parcel = crate::model::parcel::Parcel {
			db_key: None,
			id: ParcelId(1),
			owner_id: UserId(1),
			created_time: Timestamp(0),
			description: String::new(),
			admin_ids: vec![],
			writer_ids: vec![],
			child_parcel_ids: vec![],
			all_writeable: false,
			verts: [
				crate::geom::Vec2d::new(-10.0, -10.0),
				crate::geom::Vec2d::new(10.0, -10.0),
				crate::geom::Vec2d::new(10.0, 10.0),
				crate::geom::Vec2d::new(-10.0, 10.0),
			],
			zbounds: crate::geom::Vec2d::new(-10.0, 10.0),
			aabb_min: Default::default(),
			aabb_max: Default::default(),
			nft_status: crate::model::parcel::NftStatus::NotNft,
			minting_transaction_ref: String::new(),
			auction_ids: vec![],
			owner_name: String::new(),
			admin_names: vec![],
			writer_names: vec![],
		};
		parcel.rebuild_aabb();
		state.get_world_mut("alice").unwrap().parcels.insert(ParcelId(1), parcel);

		// now "alice" has a private parcel covering the object: a stranger is rejected
		// (the world is only a personal world of user 1, so user 2 falls through to
		// ordinary parcel permission checks).
		assert!(!state.user_may_modify_object_at("alice", UserId(2), &aabb));
	}

	#[test]
	fn session_lookup_respects_expiry() {
		let mut state = AllWorldsState::new_with_root_world(UserId(0), Timestamp(0));
		let uid = state.allocate_user_id();
		state.users.insert(
			uid,
			User {
				db_key: None,
				id: uid,
				name: "bob".into(),
				email: "bob@example.com".into(),
				created_time: Timestamp(0),
				password_hash: [0; 32],
				salt: [0; 16],
				avatar_settings: vec![],
				password_reset: Default::default(),
			},
		);
		let session = UserWebSession {
			db_key: None,
			id: SessionId::generate(),
			user_id: uid,
			created_time: Timestamp(0),
		};
		let sid = session.id;
		state.sessions.insert(sid, session);

		assert!(state.session_user(sid, Timestamp(100)).is_some());
		assert!(state
			.session_user(sid, Timestamp(crate::model::user_web_session::MAX_AGE_SECS + 1))
			.is_none());
	}
}
