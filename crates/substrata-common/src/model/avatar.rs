//! An authenticated client's representation in a world. Created
//! on connect, destroyed on disconnect; never persisted as a store record —
//! only the owning user's `avatar_settings` blob on [`super::user::User`]
//! survives a disconnect.

use serde::{Deserialize, Serialize};

use crate::{
	geom::{AxisAngle, Vec3d},
	ids::{ClientAvatarId, UserId},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Avatar {
	pub id: ClientAvatarId,
	pub owner_id: UserId,
	pub pos: Vec3d,
	pub rot: AxisAngle,
	pub name: String,
}
