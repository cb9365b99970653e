//! World-level permission evaluation: "may user `u` place or
//! modify an object whose AABB is `aabb` in world `w`?"
//!
//! An object is placeable only if it is fully contained within at least one
//! parcel the user has write permissions on, per `Parcel::user_has_write_perms`
//! in `shared/Parcel.{h,cpp}`. A world with no parcels at all grants no
//! write access to anyone: there is nothing to hold write permission on.

use crate::{geom::Aabb, ids::UserId, model::parcel::Parcel};

/// Returns true iff `user_id` may create or modify an object with bounds
/// `object_aabb` given the set of parcels in the world.
///
/// An object is placeable if it is fully contained within at least one
/// parcel the user has write permissions on.
pub fn user_may_modify_object_at(
	user_id: UserId,
	object_aabb: &Aabb,
	parcels: &[Parcel],
) -> bool {
	parcels
		.iter()
		.any(|p| p.user_has_write_perms(user_id) && p.aabb_in_parcel(object_aabb))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		geom::Vec2d,
		geom::Vec3d,
		ids::ParcelId,
		model::parcel::NftStatus,
		timestamp::Timestamp,
	};

	fn parcel(owner: UserId, all_writeable: bool) -> Parcel {
		let mut p = Parcel {
			db_key: None,
			id: ParcelId(1),
			owner_id: owner,
			created_time: Timestamp(0),
			description: String::new(),
			admin_ids: vec![],
			writer_ids: vec![],
			child_parcel_ids: vec![],
			all_writeable,
			verts: [
				Vec2d::new(0.0, 0.0),
				Vec2d::new(10.0, 0.0),
				Vec2d::new(10.0, 10.0),
				Vec2d::new(0.0, 10.0),
			],
			zbounds: Vec2d::new(0.0, 10.0),
			aabb_min: Default::default(),
			aabb_max: Default::default(),
			nft_status: NftStatus::NotNft,
			minting_transaction_ref: String::new(),
			auction_ids: vec![],
			owner_name: String::new(),
			admin_names: vec![],
			writer_names: vec![],
		};
		p.rebuild_aabb();
		p
	}

	fn aabb(min: Vec3d, max: Vec3d) -> Aabb {
		Aabb { min, max }
	}

	#[test]
	fn empty_world_allows_no_one() {
		assert!(!user_may_modify_object_at(
			UserId(5),
			&aabb(Vec3d::new(0.0, 0.0, 0.0), Vec3d::new(1.0, 1.0, 1.0)),
			&[],
		));
	}

	#[test]
	fn owner_may_build_within_own_parcel() {
		let p = parcel(UserId(1), false);
		assert!(user_may_modify_object_at(
			UserId(1),
			&aabb(Vec3d::new(1.0, 1.0, 0.0), Vec3d::new(2.0, 2.0, 1.0)),
			&[p],
		));
	}

	#[test]
	fn stranger_may_not_build_on_private_parcel() {
		let p = parcel(UserId(1), false);
		assert!(!user_may_modify_object_at(
			UserId(2),
			&aabb(Vec3d::new(1.0, 1.0, 0.0), Vec3d::new(2.0, 2.0, 1.0)),
			&[p],
		));
	}

	#[test]
	fn object_straddling_parcel_boundary_is_rejected() {
		let p = parcel(UserId(1), false);
		assert!(!user_may_modify_object_at(
			UserId(1),
			&aabb(Vec3d::new(9.0, 9.0, 0.0), Vec3d::new(11.0, 11.0, 1.0)),
			&[p],
		));
	}

	#[test]
	fn all_writeable_parcel_allows_any_valid_user() {
		let p = parcel(UserId(1), true);
		assert!(user_may_modify_object_at(
			UserId(99),
			&aabb(Vec3d::new(1.0, 1.0, 0.0), Vec3d::new(2.0, 2.0, 1.0)),
			&[p],
		));
	}
}
