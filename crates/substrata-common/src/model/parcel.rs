//! Parcel: a quadrilateral (or axis-aligned rectangle) region of land in a
//! world, with an owner and permission lists. Grounded in
//! `shared/Parcel.{h,cpp}`.

use serde::{Deserialize, Serialize};

use crate::{
	geom::{Aabb, Vec2d, Vec3d},
	ids::{ParcelId, UserId},
	store::{DatabaseKey, Reader, StoreEntity, Writer},
	timestamp::Timestamp,
};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum NftStatus {
	NotNft,
	MintingNft,
	MintedNft,
}

/// Maximum length of a parcel description, matching the wire-read cap in
/// `Parcel::readFromStream`.
pub const MAX_PARCEL_DESCRIPTION_LEN: usize = 10000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parcel {
	#[serde(skip)]
	pub db_key: Option<DatabaseKey>,
	pub id: ParcelId,
	pub owner_id: UserId,
	pub created_time: Timestamp,
	pub description: String,
	pub admin_ids: Vec<UserId>,
	pub writer_ids: Vec<UserId>,
	pub child_parcel_ids: Vec<ParcelId>,
	pub all_writeable: bool,

	pub verts: [Vec2d; 4],
	pub zbounds: Vec2d,

	/// Cached, derived from `verts`/`zbounds` by [`Parcel::rebuild_aabb`].
	/// Never transmitted; recomputed by whichever side mutates the parcel.
	pub aabb_min: Vec3d,
	pub aabb_max: Vec3d,

	pub nft_status: NftStatus,
	pub minting_transaction_ref: String,
	pub auction_ids: Vec<u64>,

	// Denormalised, wire-only convenience fields.
	pub owner_name: String,
	pub admin_names: Vec<String>,
	pub writer_names: Vec<String>,
}

impl Parcel {
	/// Recomputes `aabb_min`/`aabb_max` as the tight bound of `verts` and
	/// `zbounds`. Must be called after any change to either. Mirrors
	/// `Parcel::build()`.
	pub fn rebuild_aabb(&mut self) {
		let xs = self.verts.map(|v| v.x);
		let ys = self.verts.map(|v| v.y);
		self.aabb_min = Vec3d::new(
			xs.into_iter().fold(f64::INFINITY, f64::min),
			ys.into_iter().fold(f64::INFINITY, f64::min),
			self.zbounds.x,
		);
		self.aabb_max = Vec3d::new(
			xs.into_iter().fold(f64::NEG_INFINITY, f64::max),
			ys.into_iter().fold(f64::NEG_INFINITY, f64::max),
			self.zbounds.y,
		);
	}

	pub fn aabb(&self) -> Aabb {
		Aabb {
			min: self.aabb_min,
			max: self.aabb_max,
		}
	}

	pub fn point_in_parcel(&self, p: Vec3d) -> bool {
		self.aabb().contains_point(p)
	}

	pub fn aabb_in_parcel(&self, aabb: &Aabb) -> bool {
		aabb.contained_in(&self.aabb())
	}

	/// True iff `verts` forms an axis-aligned rectangle matching the cached
	/// AABB exactly (determines whether a cheap cuboid or a full quad mesh
	/// is generated for rendering).
	pub fn is_axis_aligned_box(&self) -> bool {
		self.verts[0].x == self.aabb_min.x
			&& self.verts[0].y == self.aabb_min.y
			&& self.verts[1].x == self.aabb_max.x
			&& self.verts[1].y == self.aabb_min.y
			&& self.verts[2].x == self.aabb_max.x
			&& self.verts[2].y == self.aabb_max.y
			&& self.verts[3].x == self.aabb_min.x
			&& self.verts[3].y == self.aabb_max.y
	}

	pub fn user_is_parcel_admin(&self, user_id: UserId) -> bool {
		self.admin_ids.contains(&user_id)
	}

	pub fn user_is_parcel_writer(&self, user_id: UserId) -> bool {
		self.writer_ids.contains(&user_id)
	}

	/// `u = owner ∨ u ∈ admins ∨ u ∈ writers ∨ (all_writeable ∧ u ≠ invalid)`
	pub fn user_has_write_perms(&self, user_id: UserId) -> bool {
		user_id == self.owner_id
			|| self.user_is_parcel_admin(user_id)
			|| self.user_is_parcel_writer(user_id)
			|| (self.all_writeable && user_id.is_valid())
	}
}

const PARCEL_VERSION: u32 = 1;

impl StoreEntity for Parcel {
	const KIND: u32 = crate::store::RecordKind::Parcel as u32;
	const VERSION: u32 = PARCEL_VERSION;

	fn db_key(&self) -> Option<DatabaseKey> {
		self.db_key
	}

	fn set_db_key(&mut self, key: DatabaseKey) {
		self.db_key = Some(key);
	}

	fn write_fields(&self, w: &mut Writer) {
		w.write_u32(self.id.value());
		w.write_u32(self.owner_id.value());
		w.write_u64(self.created_time.0);
		w.write_string(&self.description);

		w.write_u32(self.admin_ids.len() as u32);
		for id in &self.admin_ids {
			w.write_u32(id.value());
		}
		w.write_u32(self.writer_ids.len() as u32);
		for id in &self.writer_ids {
			w.write_u32(id.value());
		}
		w.write_u32(self.child_parcel_ids.len() as u32);
		for id in &self.child_parcel_ids {
			w.write_u32(id.value());
		}
		w.write_bool(self.all_writeable);

		for v in &self.verts {
			w.write_f64(v.x);
			w.write_f64(v.y);
		}
		w.write_f64(self.zbounds.x);
		w.write_f64(self.zbounds.y);

		w.write_u8(match self.nft_status {
			NftStatus::NotNft => 0,
			NftStatus::MintingNft => 1,
			NftStatus::MintedNft => 2,
		});
		w.write_string(&self.minting_transaction_ref);

		w.write_u32(self.auction_ids.len() as u32);
		for id in &self.auction_ids {
			w.write_u64(*id);
		}

		w.write_string(&self.owner_name);
		w.write_u32(self.admin_names.len() as u32);
		for n in &self.admin_names {
			w.write_string(n);
		}
		w.write_u32(self.writer_names.len() as u32);
		for n in &self.writer_names {
			w.write_string(n);
		}
	}

	fn read_fields(version: u32, r: &mut Reader) -> Result<Self, crate::error::StoreError> {
		crate::store::check_version(Self::KIND, version, PARCEL_VERSION, r)?;

		let id = ParcelId(r.read_u32()?);
		let owner_id = UserId(r.read_u32()?);
		let created_time = Timestamp(r.read_u64()?);
		let description = r.read_string()?;

		let n_admins = r.read_u32()?;
		let admin_ids = (0..n_admins)
			.map(|_| Ok(UserId(r.read_u32()?)))
			.collect::<Result<_, crate::error::StoreError>>()?;
		let n_writers = r.read_u32()?;
		let writer_ids = (0..n_writers)
			.map(|_| Ok(UserId(r.read_u32()?)))
			.collect::<Result<_, crate::error::StoreError>>()?;
		let n_children = r.read_u32()?;
		let child_parcel_ids = (0..n_children)
			.map(|_| Ok(ParcelId(r.read_u32()?)))
			.collect::<Result<_, crate::error::StoreError>>()?;
		let all_writeable = r.read_bool()?;

		let mut verts = [Vec2d::default(); 4];
		for v in &mut verts {
			v.x = r.read_f64()?;
			v.y = r.read_f64()?;
		}
		let zbounds = Vec2d::new(r.read_f64()?, r.read_f64()?);

		let nft_status = match r.read_u8()? {
			0 => NftStatus::NotNft,
			1 => NftStatus::MintingNft,
			_ => NftStatus::MintedNft,
		};
		let minting_transaction_ref = r.read_string()?;

		let n_auctions = r.read_u32()?;
		let auction_ids = (0..n_auctions)
			.map(|_| r.read_u64())
			.collect::<Result<_, crate::error::StoreError>>()?;

		let owner_name = r.read_string()?;
		let n_admin_names = r.read_u32()?;
		let admin_names = (0..n_admin_names)
			.map(|_| r.read_string())
			.collect::<Result<_, crate::error::StoreError>>()?;
		let n_writer_names = r.read_u32()?;
		let writer_names = (0..n_writer_names)
			.map(|_| r.read_string())
			.collect::<Result<_, crate::error::StoreError>>()?;

		let mut parcel = Parcel {
			db_key: None,
			id,
			owner_id,
			created_time,
			description,
			admin_ids,
			writer_ids,
			child_parcel_ids,
			all_writeable,
			verts,
			zbounds,
			aabb_min: Vec3d::default(),
			aabb_max: Vec3d::default(),
			nft_status,
			minting_transaction_ref,
			auction_ids,
			owner_name,
			admin_names,
			writer_names,
		};
		parcel.rebuild_aabb();
		Ok(parcel)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn rect_parcel(all_writeable: bool) -> Parcel {
		let mut p = Parcel {
			db_key: None,
			id: ParcelId(1),
			owner_id: UserId(10),
			created_time: Timestamp(0),
			description: String::new(),
			admin_ids: vec![UserId(11)],
			writer_ids: vec![UserId(12)],
			child_parcel_ids: vec![],
			all_writeable,
			verts: [
				Vec2d::new(0.0, 0.0),
				Vec2d::new(10.0, 0.0),
				Vec2d::new(10.0, 10.0),
				Vec2d::new(0.0, 10.0),
			],
			zbounds: Vec2d::new(-1.0, 5.0),
			aabb_min: Vec3d::default(),
			aabb_max: Vec3d::default(),
			nft_status: NftStatus::NotNft,
			minting_transaction_ref: String::new(),
			auction_ids: vec![],
			owner_name: "owner".into(),
			admin_names: vec![],
			writer_names: vec![],
		};
		p.rebuild_aabb();
		p
	}

	#[test]
	fn aabb_tightly_bounds_verts_and_zbounds() {
		let p = rect_parcel(false);
		assert!(p.aabb().is_valid());
		assert_eq!(p.aabb_min, Vec3d::new(0.0, 0.0, -1.0));
		assert_eq!(p.aabb_max, Vec3d::new(10.0, 10.0, 5.0));
	}

	#[test]
	fn axis_aligned_rect_is_detected() {
		assert!(rect_parcel(false).is_axis_aligned_box());
	}

	#[test]
	fn non_rect_quad_is_not_axis_aligned() {
		let mut p = rect_parcel(false);
		p.verts[2] = Vec2d::new(12.0, 9.0);
		p.rebuild_aabb();
		assert!(!p.is_axis_aligned_box());
	}

	#[test]
	fn write_perms_owner_admin_writer() {
		let p = rect_parcel(false);
		assert!(p.user_has_write_perms(UserId(10)));
		assert!(p.user_has_write_perms(UserId(11)));
		assert!(p.user_has_write_perms(UserId(12)));
		assert!(!p.user_has_write_perms(UserId(99)));
	}

	/// all_writeable grants perms to any valid user, but never to an
	/// anonymous (invalid-id) user.
	#[test]
	fn all_writeable_excludes_anonymous_user() {
		let p = rect_parcel(true);
		assert!(p.user_has_write_perms(UserId(7)));
		assert!(p.point_in_parcel(Vec3d::new(5.0, 5.0, 0.0)));
		assert!(!p.user_has_write_perms(UserId::INVALID));
	}

	#[test]
	fn store_round_trip() {
		let p = rect_parcel(true);
		let bytes = Writer::write_versioned_payload(Parcel::VERSION, |w| p.write_fields(w));
		let mut r = Reader::new(&bytes);
		let (version, mut fields) = r.read_versioned_payload().unwrap();
		let p2 = Parcel::read_fields(version, &mut fields).unwrap();
		assert_eq!(p.id, p2.id);
		assert_eq!(p.owner_id, p2.owner_id);
		assert_eq!(p.admin_ids, p2.admin_ids);
		assert_eq!(p.verts, p2.verts);
		assert_eq!(p.aabb_min, p2.aabb_min);
		assert_eq!(p.aabb_max, p2.aabb_max);
	}
}
