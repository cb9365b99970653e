//! Minimal geometry types needed by the world-state data model: a 3D vector,
//! a quaternion-free rotation-as-Euler representation (matching the wire
//! format the original uses for `WorldObject::rotation`), and an
//! axis-aligned bounding box.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3d {
	pub x: f64,
	pub y: f64,
	pub z: f64,
}

impl Vec3d {
	pub const fn new(x: f64, y: f64, z: f64) -> Self {
		Self { x, y, z }
	}

	pub fn min(self, other: Self) -> Self {
		Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
	}

	pub fn max(self, other: Self) -> Self {
		Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2d {
	pub x: f64,
	pub y: f64,
}

impl Vec2d {
	pub const fn new(x: f64, y: f64) -> Self {
		Self { x, y }
	}
}

/// Axis-angle rotation, as used on the wire for `WorldObject`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisAngle {
	pub axis: Vec3d,
	pub angle: f64,
}

/// Axis-aligned bounding box. `min <= max` component-wise is a maintained
/// invariant whenever [`AABB::from_points`] / [`AABB::union`] are used to
/// (re)build it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
	pub min: Vec3d,
	pub max: Vec3d,
}

impl Aabb {
	pub fn from_points(points: &[Vec3d]) -> Self {
		assert!(!points.is_empty());
		let mut min = points[0];
		let mut max = points[0];
		for &p in &points[1..] {
			min = min.min(p);
			max = max.max(p);
		}
		Self { min, max }
	}

	pub fn is_valid(&self) -> bool {
		self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
	}

	pub fn contains_point(&self, p: Vec3d) -> bool {
		p.x >= self.min.x
			&& p.y >= self.min.y
			&& p.z >= self.min.z
			&& p.x <= self.max.x
			&& p.y <= self.max.y
			&& p.z <= self.max.z
	}

	/// True iff `self` is entirely contained within `other`.
	pub fn contained_in(&self, other: &Aabb) -> bool {
		self.min.x >= other.min.x
			&& self.min.y >= other.min.y
			&& self.min.z >= other.min.z
			&& self.max.x <= other.max.x
			&& self.max.y <= other.max.y
			&& self.max.z <= other.max.z
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn aabb_from_points_is_tight_and_valid() {
		let pts = [
			Vec3d::new(1.0, -2.0, 0.0),
			Vec3d::new(-1.0, 5.0, 3.0),
			Vec3d::new(0.0, 0.0, -4.0),
		];
		let aabb = Aabb::from_points(&pts);
		assert!(aabb.is_valid());
		assert_eq!(aabb.min, Vec3d::new(-1.0, -2.0, -4.0));
		assert_eq!(aabb.max, Vec3d::new(1.0, 5.0, 3.0));
	}

	#[test]
	fn contains_point_boundary_inclusive() {
		let aabb = Aabb {
			min: Vec3d::new(0.0, 0.0, 0.0),
			max: Vec3d::new(1.0, 1.0, 1.0),
		};
		assert!(aabb.contains_point(Vec3d::new(0.0, 0.0, 0.0)));
		assert!(aabb.contains_point(Vec3d::new(1.0, 1.0, 1.0)));
		assert!(!aabb.contains_point(Vec3d::new(1.0001, 0.0, 0.0)));
	}
}
