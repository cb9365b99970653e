//! Screenshot-bot captures, including map tiles. Grounded
//! in `server/Screenshot.{h,cpp}`.

use serde::{Deserialize, Serialize};

use crate::{geom::Vec3d, ids::ScreenshotId, store::{DatabaseKey, Reader, StoreEntity, Writer}, timestamp::Timestamp};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ScreenshotState {
	NotDone,
	Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenshot {
	#[serde(skip)]
	pub db_key: Option<DatabaseKey>,
	pub id: ScreenshotId,
	pub cam_pos: Vec3d,
	pub cam_angles: Vec3d,
	pub width_px: i32,
	/// -1 if this screenshot isn't highlighting a particular parcel.
	pub highlight_parcel_id: i32,

	pub is_map_tile: bool,
	pub tile_x: i32,
	pub tile_y: i32,
	pub tile_z: i32,

	pub created_time: Timestamp,
	pub local_path: String,
	/// If this is a map tile, it is also registered in the resource system
	/// under this URL.
	pub url: String,

	pub state: ScreenshotState,
}

impl Screenshot {
	pub fn mark_done(&mut self, local_path: String) {
		self.local_path = local_path;
		self.state = ScreenshotState::Done;
	}
}

const SCREENSHOT_VERSION: u32 = 1;

impl StoreEntity for Screenshot {
	const KIND: u32 = crate::store::RecordKind::Screenshot as u32;
	const VERSION: u32 = SCREENSHOT_VERSION;

	fn db_key(&self) -> Option<DatabaseKey> {
		self.db_key
	}

	fn set_db_key(&mut self, key: DatabaseKey) {
		self.db_key = Some(key);
	}

	fn write_fields(&self, w: &mut Writer) {
		w.write_u64(self.id.value());
		for v in [self.cam_pos, self.cam_angles] {
			w.write_f64(v.x);
			w.write_f64(v.y);
			w.write_f64(v.z);
		}
		w.write_i32(self.width_px);
		w.write_i32(self.highlight_parcel_id);
		w.write_bool(self.is_map_tile);
		w.write_i32(self.tile_x);
		w.write_i32(self.tile_y);
		w.write_i32(self.tile_z);
		w.write_u64(self.created_time.0);
		w.write_string(&self.local_path);
		w.write_string(&self.url);
		w.write_u8(match self.state {
			ScreenshotState::NotDone => 0,
			ScreenshotState::Done => 1,
		});
	}

	fn read_fields(version: u32, r: &mut Reader) -> Result<Self, crate::error::StoreError> {
		crate::store::check_version(Self::KIND, version, SCREENSHOT_VERSION, r)?;
		let id = ScreenshotId(r.read_u64()?);
		let cam_pos = Vec3d::new(r.read_f64()?, r.read_f64()?, r.read_f64()?);
		let cam_angles = Vec3d::new(r.read_f64()?, r.read_f64()?, r.read_f64()?);
		let width_px = r.read_i32()?;
		let highlight_parcel_id = r.read_i32()?;
		let is_map_tile = r.read_bool()?;
		let tile_x = r.read_i32()?;
		let tile_y = r.read_i32()?;
		let tile_z = r.read_i32()?;
		let created_time = Timestamp(r.read_u64()?);
		let local_path = r.read_string()?;
		let url = r.read_string()?;
		let state = match r.read_u8()? {
			0 => ScreenshotState::NotDone,
			_ => ScreenshotState::Done,
		};
		Ok(Screenshot {
			db_key: None,
			id,
			cam_pos,
			cam_angles,
			width_px,
			highlight_parcel_id,
			is_map_tile,
			tile_x,
			tile_y,
			tile_z,
			created_time,
			local_path,
			url,
			state,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn screenshot() -> Screenshot {
		Screenshot {
			db_key: None,
			id: ScreenshotId(1),
			cam_pos: Vec3d::new(0.0, 0.0, 10.0),
			cam_angles: Vec3d::default(),
			width_px: 1024,
			highlight_parcel_id: -1,
			is_map_tile: true,
			tile_x: 3,
			tile_y: 4,
			tile_z: 2,
			created_time: Timestamp(0),
			local_path: String::new(),
			url: "maptile_2_3_4.jpg".into(),
			state: ScreenshotState::NotDone,
		}
	}

	#[test]
	fn mark_done_sets_path_and_state() {
		let mut s = screenshot();
		s.mark_done("maptile_2_3_4.jpg".into());
		assert_eq!(s.state, ScreenshotState::Done);
		assert_eq!(s.local_path, "maptile_2_3_4.jpg");
	}

	#[test]
	fn store_round_trip() {
		let s = screenshot();
		let bytes = Writer::write_versioned_payload(Screenshot::VERSION, |w| s.write_fields(w));
		let mut r = Reader::new(&bytes);
		let (version, mut fields) = r.read_versioned_payload().unwrap();
		let s2 = Screenshot::read_fields(version, &mut fields).unwrap();
		assert_eq!(s.id, s2.id);
		assert_eq!(s.tile_x, s2.tile_x);
		assert_eq!(s.is_map_tile, s2.is_map_tile);
	}
}
