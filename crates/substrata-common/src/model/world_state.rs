//! A single world's state. `WorldMeta` is grounded in
//! `shared/WorldDetails.{h,cpp}` (owner, creation time, name, description);
//! the runtime maps of objects/parcels/chat-bots/avatars and their per-kind
//! dirty sets are added here and are not themselves separately persisted
//! records — their owning entities (`WorldObject`, `Parcel`, ...) are.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
	ids::{ChatBotId, ClientAvatarId, ParcelId, UserId, WorldObjectUid},
	model::{avatar::Avatar, chat_bot::ChatBot, parcel::Parcel, world_object::WorldObject},
	store::{DatabaseKey, Reader, StoreEntity, Writer},
	timestamp::Timestamp,
};

/// The persisted subset of a world's state: everything needed to know the
/// world exists and who owns it. Its key is looked up by [`AllWorldsState`]
/// to find the `WorldState` whose maps it gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldMeta {
	#[serde(skip)]
	pub db_key: Option<DatabaseKey>,
	pub name: String,
	pub owner_id: UserId,
	pub created_time: Timestamp,
	pub description: String,
}

/// Maximum length of a world name.
pub const MAX_WORLD_NAME_LEN: usize = 1000;

/// Maximum length of a world description, matching `WorldDetails::MAX_DESCRIPTION_SIZE`.
pub const MAX_WORLD_DESCRIPTION_LEN: usize = 10000;

const WORLD_META_VERSION: u32 = 1;

impl StoreEntity for WorldMeta {
	const KIND: u32 = crate::store::RecordKind::WorldState as u32;
	const VERSION: u32 = WORLD_META_VERSION;

	fn db_key(&self) -> Option<DatabaseKey> {
		self.db_key
	}

	fn set_db_key(&mut self, key: DatabaseKey) {
		self.db_key = Some(key);
	}

	fn write_fields(&self, w: &mut Writer) {
		w.write_string(&self.name);
		w.write_u32(self.owner_id.value());
		w.write_u64(self.created_time.0);
		w.write_string(&self.description);
	}

	fn read_fields(version: u32, r: &mut Reader) -> Result<Self, crate::error::StoreError> {
		crate::store::check_version(Self::KIND, version, WORLD_META_VERSION, r)?;
		Ok(WorldMeta {
			db_key: None,
			name: r.read_string()?,
			owner_id: r.read_u32().map(UserId)?,
			created_time: Timestamp(r.read_u64()?),
			description: r.read_string()?,
		})
	}
}

/// Per-kind dirty sets: entities that must be re-flushed on the next DB
/// flush pass. Populated by whichever operation mutated them; drained by
/// `Store::flush_dirty` (at the server layer, not here).
#[derive(Debug, Default)]
pub struct DirtySets {
	pub objects: HashSet<WorldObjectUid>,
	pub parcels: HashSet<ParcelId>,
}

#[derive(Debug)]
pub struct WorldState {
	pub meta: WorldMeta,
	pub objects: HashMap<WorldObjectUid, WorldObject>,
	pub parcels: HashMap<ParcelId, Parcel>,
	pub chat_bots: HashMap<ChatBotId, ChatBot>,
	pub avatars: HashMap<ClientAvatarId, Avatar>,
	pub dirty: DirtySets,
}

impl WorldState {
	pub fn new(meta: WorldMeta) -> Self {
		Self {
			meta,
			objects: HashMap::new(),
			parcels: HashMap::new(),
			chat_bots: HashMap::new(),
			avatars: HashMap::new(),
			dirty: DirtySets::default(),
		}
	}

	/// Is this world a personal world owned by `user_id`? A personal world
	/// owned by the acting user grants unconditional write access.
	pub fn is_personal_world_of(&self, user_id: UserId) -> bool {
		!self.meta.name.is_empty() && self.meta.owner_id == user_id
	}

	/// Inserts or replaces an object, stamping `last_modified_time` and
	/// marking it dirty. Does not flip `state`; see [`WorldState::mark_object_dead`].
	pub fn upsert_object(&mut self, mut object: WorldObject, now: Timestamp) {
		object.last_modified_time = now;
		object.from_local_dirty = true;
		let uid = object.uid;
		self.objects.insert(uid, object);
		self.dirty.objects.insert(uid);
	}

	pub fn get_object(&self, uid: WorldObjectUid) -> Option<&WorldObject> {
		self.objects.get(&uid)
	}

	/// Only operation allowed to flip `state` to `Dead`.
	pub fn mark_object_dead(&mut self, uid: WorldObjectUid, now: Timestamp) -> bool {
		if let Some(obj) = self.objects.get_mut(&uid) {
			obj.mark_dead();
			obj.last_modified_time = now;
			obj.from_local_dirty = true;
			self.dirty.objects.insert(uid);
			true
		} else {
			false
		}
	}

	/// Removes `Dead` objects from the map and the dirty set, returning
	/// their database keys for tombstoning by the reaper pass.
	pub fn drain_dead_objects(&mut self) -> Vec<DatabaseKey> {
		let dead_uids: Vec<WorldObjectUid> = self
			.objects
			.iter()
			.filter(|(_, o)| o.is_dead())
			.map(|(uid, _)| *uid)
			.collect();
		let mut keys = Vec::with_capacity(dead_uids.len());
		for uid in dead_uids {
			if let Some(obj) = self.objects.remove(&uid) {
				if let Some(key) = obj.db_key {
					keys.push(key);
				}
			}
			self.dirty.objects.remove(&uid);
		}
		keys
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::geom::{Aabb, AxisAngle, Vec3d};

	fn meta(name: &str, owner: UserId) -> WorldMeta {
		WorldMeta {
			db_key: None,
			name: name.into(),
			owner_id: owner,
			created_time: Timestamp(0),
			description: String::new(),
		}
	}

	fn object(uid: u64) -> WorldObject {
		WorldObject {
			db_key: None,
			uid: WorldObjectUid(uid),
			model_url: String::new(),
			mats: vec![],
			pos: Vec3d::default(),
			rot: AxisAngle::default(),
			scale: Vec3d::new(1.0, 1.0, 1.0),
			aabb: Aabb {
				min: Vec3d::default(),
				max: Vec3d::default(),
			},
			voxel_blob: None,
			script_source: None,
			owner_id: UserId(1),
			creator_id: UserId(1),
			created_time: Timestamp(0),
			last_modified_time: Timestamp(0),
			lod_bias: 0.0,
			flags: crate::model::world_object::ObjectFlags::empty(),
			content_hash: [0; 32],
			state: crate::model::world_object::ObjectState::JustCreated,
			from_remote_dirty: false,
			from_local_dirty: false,
		}
	}

	#[test]
	fn is_personal_world_requires_nonempty_name_and_matching_owner() {
		let root = WorldState::new(meta("", UserId(1)));
		assert!(!root.is_personal_world_of(UserId(1)));

		let personal = WorldState::new(meta("alice", UserId(1)));
		assert!(personal.is_personal_world_of(UserId(1)));
		assert!(!personal.is_personal_world_of(UserId(2)));
	}

	#[test]
	fn upsert_marks_dirty_and_stamps_time() {
		let mut w = WorldState::new(meta("", UserId(1)));
		w.upsert_object(object(1), Timestamp(42));
		assert!(w.dirty.objects.contains(&WorldObjectUid(1)));
		assert_eq!(w.get_object(WorldObjectUid(1)).unwrap().last_modified_time, Timestamp(42));
	}

	#[test]
	fn drain_dead_objects_removes_from_map_and_dirty_set() {
		let mut w = WorldState::new(meta("", UserId(1)));
		w.upsert_object(object(1), Timestamp(0));
		w.upsert_object(object(2), Timestamp(0));
		w.mark_object_dead(WorldObjectUid(1), Timestamp(1));

		let keys = w.drain_dead_objects();
		assert!(keys.is_empty()); // object never had a db_key assigned
		assert!(!w.objects.contains_key(&WorldObjectUid(1)));
		assert!(w.objects.contains_key(&WorldObjectUid(2)));
		assert!(!w.dirty.objects.contains(&WorldObjectUid(1)));
	}
}
