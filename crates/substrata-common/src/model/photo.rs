//! A photo captured in the client's photo mode and uploaded to the server
//!. Grounded in `server/Photo.{h,cpp}`.

use serde::{Deserialize, Serialize};

use crate::{
	geom::Vec3d,
	ids::{ParcelId, PhotoId, UserId},
	store::{DatabaseKey, Reader, StoreEntity, Writer},
	timestamp::Timestamp,
};

pub const MAX_CAPTION_SIZE: usize = 10000;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum PhotoState {
	Published,
	Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
	#[serde(skip)]
	pub db_key: Option<DatabaseKey>,
	pub id: PhotoId,
	pub creator_id: UserId,
	pub parcel_id: ParcelId,
	pub created_time: Timestamp,
	pub cam_pos: Vec3d,
	pub cam_angles: Vec3d,
	pub caption: String,
	pub flags: u32,
	pub world_name: String,

	pub local_filename: String,
	pub local_thumbnail_filename: String,
	pub local_midsize_filename: String,

	pub state: PhotoState,
}

const PHOTO_VERSION: u32 = 1;

impl StoreEntity for Photo {
	const KIND: u32 = crate::store::RecordKind::Photo as u32;
	const VERSION: u32 = PHOTO_VERSION;

	fn db_key(&self) -> Option<DatabaseKey> {
		self.db_key
	}

	fn set_db_key(&mut self, key: DatabaseKey) {
		self.db_key = Some(key);
	}

	fn write_fields(&self, w: &mut Writer) {
		w.write_u64(self.id.value());
		w.write_u32(self.creator_id.value());
		w.write_u32(self.parcel_id.value());
		w.write_u64(self.created_time.0);
		for v in [self.cam_pos, self.cam_angles] {
			w.write_f64(v.x);
			w.write_f64(v.y);
			w.write_f64(v.z);
		}
		w.write_string(&self.caption);
		w.write_u32(self.flags);
		w.write_string(&self.world_name);
		w.write_string(&self.local_filename);
		w.write_string(&self.local_thumbnail_filename);
		w.write_string(&self.local_midsize_filename);
		w.write_u8(match self.state {
			PhotoState::Published => 0,
			PhotoState::Deleted => 1,
		});
	}

	fn read_fields(version: u32, r: &mut Reader) -> Result<Self, crate::error::StoreError> {
		crate::store::check_version(Self::KIND, version, PHOTO_VERSION, r)?;
		let id = PhotoId(r.read_u64()?);
		let creator_id = UserId(r.read_u32()?);
		let parcel_id = ParcelId(r.read_u32()?);
		let created_time = Timestamp(r.read_u64()?);
		let cam_pos = Vec3d::new(r.read_f64()?, r.read_f64()?, r.read_f64()?);
		let cam_angles = Vec3d::new(r.read_f64()?, r.read_f64()?, r.read_f64()?);
		let caption = r.read_string()?;
		let flags = r.read_u32()?;
		let world_name = r.read_string()?;
		let local_filename = r.read_string()?;
		let local_thumbnail_filename = r.read_string()?;
		let local_midsize_filename = r.read_string()?;
		let state = match r.read_u8()? {
			0 => PhotoState::Published,
			_ => PhotoState::Deleted,
		};
		Ok(Photo {
			db_key: None,
			id,
			creator_id,
			parcel_id,
			created_time,
			cam_pos,
			cam_angles,
			caption,
			flags,
			world_name,
			local_filename,
			local_thumbnail_filename,
			local_midsize_filename,
			state,
		})
	}
}
