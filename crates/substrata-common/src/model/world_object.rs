//! The hot entity: `WorldObject`, a placed model with an owner, pose, and
//! lifecycle state. No standalone original source file for it ships in
//! this pack (see DESIGN.md); its persisted field layout follows the same
//! `{u32 entity_version, fields...}` convention as the other `StoreEntity`
//! implementors here, e.g. `shared/Parcel.{h,cpp}`.

use serde::{Deserialize, Serialize};

use crate::{
	geom::{Aabb, AxisAngle, Vec3d},
	ids::{UserId, WorldObjectUid},
	store::{DatabaseKey, Reader, StoreEntity, Writer},
	timestamp::Timestamp,
};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ObjectState {
	JustCreated,
	Alive,
	Dead,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Material {
	pub albedo_url: String,
	pub emission_url: String,
	pub normal_url: String,
	pub roughness_url: String,
}

bitflags::bitflags! {
	#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
	pub struct ObjectFlags: u32 {
		const COLLIDABLE   = 1 << 0;
		const DYNAMIC      = 1 << 1;
		const SCRIPTED     = 1 << 2;
		const VISIBLE_OUTSIDE_PARCEL = 1 << 3;
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldObject {
	#[serde(skip)]
	pub db_key: Option<DatabaseKey>,

	pub uid: WorldObjectUid,
	pub model_url: String,
	pub mats: Vec<Material>,
	pub pos: Vec3d,
	pub rot: AxisAngle,
	pub scale: Vec3d,
	pub aabb: Aabb,

	/// Compressed voxel blob, if this object is voxel-based.
	pub voxel_blob: Option<Vec<u8>>,
	pub script_source: Option<String>,

	pub owner_id: UserId,
	pub creator_id: UserId,
	pub created_time: Timestamp,
	pub last_modified_time: Timestamp,

	pub lod_bias: f32,
	pub flags: ObjectFlags,
	/// Hash over the voxel payload; empty for non-voxel objects.
	pub content_hash: [u8; 32],

	pub state: ObjectState,
	pub from_remote_dirty: bool,
	pub from_local_dirty: bool,
}

impl WorldObject {
	/// Recomputes `aabb` from `pos`/`scale` as a unit cube transformed by
	/// them; a full implementation would use the model's local bounds, but
	/// those live client-side. Must be called after any transform change.
	pub fn recompute_aabb_from_transform(&mut self) {
		let half = Vec3d::new(self.scale.x / 2.0, self.scale.y / 2.0, self.scale.z / 2.0);
		self.aabb = Aabb {
			min: Vec3d::new(self.pos.x - half.x, self.pos.y - half.y, self.pos.z - half.z),
			max: Vec3d::new(self.pos.x + half.x, self.pos.y + half.y, self.pos.z + half.z),
		};
	}

	/// `state = Dead` is terminal: once set, it must never be set back.
	pub fn mark_dead(&mut self) {
		self.state = ObjectState::Dead;
	}

	pub fn is_dead(&self) -> bool {
		self.state == ObjectState::Dead
	}
}

const WORLD_OBJECT_VERSION: u32 = 1;

impl StoreEntity for WorldObject {
	const KIND: u32 = crate::store::RecordKind::WorldObject as u32;
	const VERSION: u32 = WORLD_OBJECT_VERSION;

	fn db_key(&self) -> Option<DatabaseKey> {
		self.db_key
	}

	fn set_db_key(&mut self, key: DatabaseKey) {
		self.db_key = Some(key);
	}

	fn write_fields(&self, w: &mut Writer) {
		w.write_u64(self.uid.value());
		w.write_string(&self.model_url);

		w.write_u32(self.mats.len() as u32);
		for m in &self.mats {
			w.write_string(&m.albedo_url);
			w.write_string(&m.emission_url);
			w.write_string(&m.normal_url);
			w.write_string(&m.roughness_url);
		}

		for v in [self.pos, self.rot.axis, self.scale] {
			w.write_f64(v.x);
			w.write_f64(v.y);
			w.write_f64(v.z);
		}
		w.write_f64(self.rot.angle);
		for v in [self.aabb.min, self.aabb.max] {
			w.write_f64(v.x);
			w.write_f64(v.y);
			w.write_f64(v.z);
		}

		match &self.voxel_blob {
			Some(b) => {
				w.write_bool(true);
				w.write_bytes(b);
			}
			None => w.write_bool(false),
		}
		match &self.script_source {
			Some(s) => {
				w.write_bool(true);
				w.write_string(s);
			}
			None => w.write_bool(false),
		}

		w.write_u32(self.owner_id.value());
		w.write_u32(self.creator_id.value());
		w.write_u64(self.created_time.0);
		w.write_u64(self.last_modified_time.0);
		w.write_f32(self.lod_bias);
		w.write_u32(self.flags.bits());
		w.write_bytes(&self.content_hash);
		w.write_u8(match self.state {
			ObjectState::JustCreated => 0,
			ObjectState::Alive => 1,
			ObjectState::Dead => 2,
		});
	}

	fn read_fields(version: u32, r: &mut Reader) -> Result<Self, crate::error::StoreError> {
		crate::store::check_version(Self::KIND, version, WORLD_OBJECT_VERSION, r)?;

		let uid = WorldObjectUid(r.read_u64()?);
		let model_url = r.read_string()?;

		let n_mats = r.read_u32()?;
		let mut mats = Vec::with_capacity(n_mats as usize);
		for _ in 0..n_mats {
			mats.push(Material {
				albedo_url: r.read_string()?,
				emission_url: r.read_string()?,
				normal_url: r.read_string()?,
				roughness_url: r.read_string()?,
			});
		}

		let read_vec3 = |r: &mut Reader| -> Result<Vec3d, crate::error::StoreError> {
			Ok(Vec3d::new(r.read_f64()?, r.read_f64()?, r.read_f64()?))
		};
		let pos = read_vec3(r)?;
		let rot_axis = read_vec3(r)?;
		let scale = read_vec3(r)?;
		let rot_angle = r.read_f64()?;
		let aabb_min = read_vec3(r)?;
		let aabb_max = read_vec3(r)?;

		let voxel_blob = if r.read_bool()? { Some(r.read_bytes()?) } else { None };
		let script_source = if r.read_bool()? { Some(r.read_string()?) } else { None };

		let owner_id = UserId(r.read_u32()?);
		let creator_id = UserId(r.read_u32()?);
		let created_time = Timestamp(r.read_u64()?);
		let last_modified_time = Timestamp(r.read_u64()?);
		let lod_bias = r.read_f32()?;
		let flags = ObjectFlags::from_bits_truncate(r.read_u32()?);
		let content_hash: [u8; 32] = r
			.read_bytes()?
			.try_into()
			.map_err(|_| crate::error::StoreError::BadString)?;
		let state = match r.read_u8()? {
			0 => ObjectState::JustCreated,
			1 => ObjectState::Alive,
			_ => ObjectState::Dead,
		};

		Ok(WorldObject {
			db_key: None,
			uid,
			model_url,
			mats,
			pos,
			rot: AxisAngle {
				axis: rot_axis,
				angle: rot_angle,
			},
			scale,
			aabb: Aabb {
				min: aabb_min,
				max: aabb_max,
			},
			voxel_blob,
			script_source,
			owner_id,
			creator_id,
			created_time,
			last_modified_time,
			lod_bias,
			flags,
			content_hash,
			state,
			from_remote_dirty: false,
			from_local_dirty: false,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> WorldObject {
		let mut o = WorldObject {
			db_key: None,
			uid: WorldObjectUid(42),
			model_url: "abc.glb".into(),
			mats: vec![Material {
				albedo_url: "albedo.png".into(),
				..Default::default()
			}],
			pos: Vec3d::new(1.0, 2.0, 3.0),
			rot: AxisAngle {
				axis: Vec3d::new(0.0, 1.0, 0.0),
				angle: 0.5,
			},
			scale: Vec3d::new(2.0, 2.0, 2.0),
			aabb: Aabb {
				min: Vec3d::default(),
				max: Vec3d::default(),
			},
			voxel_blob: Some(vec![1, 2, 3]),
			script_source: None,
			owner_id: UserId(1),
			creator_id: UserId(1),
			created_time: Timestamp(10),
			last_modified_time: Timestamp(10),
			lod_bias: 1.0,
			flags: ObjectFlags::COLLIDABLE | ObjectFlags::SCRIPTED,
			content_hash: [0xAB; 32],
			state: ObjectState::JustCreated,
			from_remote_dirty: false,
			from_local_dirty: true,
		};
		o.recompute_aabb_from_transform();
		o
	}

	#[test]
	fn recompute_aabb_centers_on_pos() {
		let o = sample();
		assert_eq!(o.aabb.min, Vec3d::new(0.0, 1.0, 2.0));
		assert_eq!(o.aabb.max, Vec3d::new(2.0, 3.0, 4.0));
	}

	#[test]
	fn mark_dead_is_terminal() {
		let mut o = sample();
		o.mark_dead();
		assert!(o.is_dead());
	}

	#[test]
	fn store_round_trip() {
		let o = sample();
		let bytes = Writer::write_versioned_payload(WorldObject::VERSION, |w| o.write_fields(w));
		let mut r = Reader::new(&bytes);
		let (version, mut fields) = r.read_versioned_payload().unwrap();
		let o2 = WorldObject::read_fields(version, &mut fields).unwrap();
		assert_eq!(o.uid, o2.uid);
		assert_eq!(o.model_url, o2.model_url);
		assert_eq!(o.mats.len(), o2.mats.len());
		assert_eq!(o.aabb, o2.aabb);
		assert_eq!(o.flags, o2.flags);
		assert_eq!(o.content_hash, o2.content_hash);
		assert_eq!(o.state, o2.state);
	}
}
