//! Greedy voxel mesher, grounded in
//! `shared/VoxelMeshBuilding.cpp`'s `makeVoxelMeshForVertPosKeyType`: splat
//! voxels to a dense array, derive a face-needed mask per axis/slice/side,
//! greedily merge same-material rectangles on each mask, and deduplicate
//! vertices across quads via a hash map keyed by local position. When the
//! model fits within 256 voxels on every axis, the key packs each local
//! coordinate into a byte plus an overflow-bit byte (`makeVoxelMeshForVertPosKeyType`'s
//! 4-byte key), rather than the wider key a larger model needs.

use std::collections::HashMap;

use crate::geom::{Aabb, Vec3d};

/// Maximum span (in voxels) allowed along any axis; mirrors the original's
/// 16-bit position encoding limit.
pub const MAX_SPAN: i32 = 1 << 16;

/// No material occupies this index; reserved as "empty" in the dense array.
const NO_VOXEL: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct IVec3 {
	pub x: i32,
	pub y: i32,
	pub z: i32,
}

impl IVec3 {
	pub const fn new(x: i32, y: i32, z: i32) -> Self {
		Self { x, y, z }
	}
}

/// Vertex-dedup key for a model whose local extent fits in 256 voxels per
/// axis. Local coordinates run `0..=256` (one past the last voxel), so a
/// coordinate of exactly 256 wraps to `0` as a `u8`; `overflow_bits` records
/// which axes wrapped so that key doesn't collide with the true origin.
/// Bit 3 (`USED`) is set on every live key, distinguishing it from the
/// all-zero sentinel a fixed-size open-addressed table would use for "empty".
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
struct PackedVertKey {
	x: u8,
	y: u8,
	z: u8,
	overflow_bits: u8,
}

const OVERFLOW_USED: u8 = 0b1000;
const OVERFLOW_X: u8 = 0b0001;
const OVERFLOW_Y: u8 = 0b0010;
const OVERFLOW_Z: u8 = 0b0100;

impl PackedVertKey {
	fn new(x: i64, y: i64, z: i64) -> Self {
		let overflow = |v: i64, bit: u8| if v == 256 { bit } else { 0 };
		PackedVertKey {
			x: x as u8,
			y: y as u8,
			z: z as u8,
			overflow_bits: OVERFLOW_USED | overflow(x, OVERFLOW_X) | overflow(y, OVERFLOW_Y) | overflow(z, OVERFLOW_Z),
		}
	}
}

/// Vertex-dedup key, chosen per mesh by whether its local extent fits in
/// 256 voxels on every axis.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
enum VertKey {
	Packed(PackedVertKey),
	Wide(IVec3),
}

#[derive(Debug, Clone, Copy)]
pub struct Voxel {
	pub pos: IVec3,
	pub mat: u8,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MeshedQuad {
	pub verts: [IVec3; 4],
	pub mat: u8,
}

#[derive(Debug, Clone)]
pub struct Mesh {
	pub vertex_positions: Vec<IVec3>,
	/// Triangle list; each group of 3 indices into `vertex_positions`.
	pub indices: Vec<u32>,
	/// One entry per triangle (`indices.len() / 3`), the material of that
	/// triangle.
	pub triangle_materials: Vec<u8>,
	pub aabb: Aabb,
}

impl Mesh {
	pub fn quad_count(&self) -> usize {
		self.indices.len() / 6
	}

	pub fn triangle_count(&self) -> usize {
		self.indices.len() / 3
	}

	pub fn materials_used(&self) -> Vec<u8> {
		let mut mats: Vec<u8> = self.triangle_materials.clone();
		mats.sort_unstable();
		mats.dedup();
		mats
	}

	pub fn triangle_count_for_material(&self, mat: u8) -> usize {
		self.triangle_materials.iter().filter(|&&m| m == mat).count()
	}
}

#[derive(Debug, Eq, PartialEq)]
pub enum MeshError {
	SpanTooLarge { axis: usize, span: i64 },
	Empty,
}

/// Builds a render mesh from `voxels`. `mat_transparent[i]` says whether
/// material `i` is transparent; materials beyond the slice are treated as
/// opaque.
pub fn build_mesh(voxels: &[Voxel], mat_transparent: &[bool]) -> Result<Mesh, MeshError> {
	if voxels.is_empty() {
		return Err(MeshError::Empty);
	}

	let mut min = voxels[0].pos;
	let mut max = voxels[0].pos;
	for v in voxels {
		min.x = min.x.min(v.pos.x);
		min.y = min.y.min(v.pos.y);
		min.z = min.z.min(v.pos.z);
		max.x = max.x.max(v.pos.x);
		max.y = max.y.max(v.pos.y);
		max.z = max.z.max(v.pos.z);
	}
	let size = [
		(max.x - min.x + 1) as i64,
		(max.y - min.y + 1) as i64,
		(max.z - min.z + 1) as i64,
	];
	for (axis, &span) in size.iter().enumerate() {
		if span > MAX_SPAN as i64 {
			return Err(MeshError::SpanTooLarge { axis, span });
		}
	}
	let (sx, sy, sz) = (size[0] as usize, size[1] as usize, size[2] as usize);

	let mut grid = vec![NO_VOXEL; sx * sy * sz];
	let idx3 = |x: usize, y: usize, z: usize| -> usize { (z * sy + y) * sx + x };
	for v in voxels {
		let x = (v.pos.x - min.x) as usize;
		let y = (v.pos.y - min.y) as usize;
		let z = (v.pos.z - min.z) as usize;
		grid[idx3(x, y, z)] = v.mat;
	}
	let is_transparent = |mat: u8| mat_transparent.get(mat as usize).copied().unwrap_or(false);
	let at = |x: i64, y: i64, z: i64| -> u8 {
		if x < 0 || y < 0 || z < 0 || x >= sx as i64 || y >= sy as i64 || z >= sz as i64 {
			NO_VOXEL
		} else {
			grid[idx3(x as usize, y as usize, z as usize)]
		}
	};

	/// Face needed looking from voxel `v_mat` (solid) towards `n_mat`.
	fn face_needed(v_mat: u8, n_mat: u8, n_transparent: bool) -> bool {
		if v_mat == NO_VOXEL {
			return false;
		}
		if n_mat == NO_VOXEL {
			return true;
		}
		n_transparent && n_mat != v_mat
	}

	let axis_size = [sx as i64, sy as i64, sz as i64];
	// Local coordinates (pre-`min` offset) range `0..=size`, so the packed
	// key is only unambiguous when every axis's voxel count fits in 256.
	let small_model = sx <= 256 && sy <= 256 && sz <= 256;
	let mut vert_index: HashMap<VertKey, u32> = HashMap::new();
	let mut vertex_positions = Vec::new();
	let mut indices = Vec::new();
	let mut triangle_materials = Vec::new();

	let mut emit_quad = |local_at: &dyn Fn(i64, i64) -> (i64, i64, i64), u0: i64, u1: i64, v0: i64, v1: i64, mat: u8| {
		let local_corners = [local_at(u0, v0), local_at(u1, v0), local_at(u1, v1), local_at(u0, v1)];
		let mut ids = [0u32; 4];
		for (i, &(lx, ly, lz)) in local_corners.iter().enumerate() {
			let key = if small_model {
				VertKey::Packed(PackedVertKey::new(lx, ly, lz))
			} else {
				VertKey::Wide(IVec3::new(lx as i32, ly as i32, lz as i32))
			};
			ids[i] = *vert_index.entry(key).or_insert_with(|| {
				let id = vertex_positions.len() as u32;
				vertex_positions.push(IVec3::new(lx as i32 + min.x, ly as i32 + min.y, lz as i32 + min.z));
				id
			});
		}
		indices.extend_from_slice(&[ids[0], ids[1], ids[2], ids[0], ids[2], ids[3]]);
		triangle_materials.push(mat);
		triangle_materials.push(mat);
	};

	for axis in 0..3usize {
		let (u_axis, v_axis) = match axis {
			0 => (1usize, 2usize),
			1 => (0usize, 2usize),
			_ => (0usize, 1usize),
		};
		let du = axis_size[u_axis] as usize;
		let dv = axis_size[v_axis] as usize;

		let local_coord_at = |axis: usize, plane: i64, u_axis: usize, v_axis: usize, u: i64, v: i64| -> (i64, i64, i64) {
			let mut c = [0i64; 3];
			c[axis] = plane;
			c[u_axis] = u;
			c[v_axis] = v;
			(c[0], c[1], c[2])
		};

		for s in 0..axis_size[axis] {
			// lower_mask: face of voxel at layer s facing -axis, vs neighbour s-1.
			// upper_mask: face of voxel at layer s facing +axis, vs neighbour s+1.
			for (mask_is_lower, plane) in [(true, s), (false, s + 1)] {
				let mut mask = vec![NO_VOXEL; du * dv];
				for v in 0..dv as i64 {
					for u in 0..du as i64 {
						let mut c = [0i64; 3];
						c[axis] = s;
						c[u_axis] = u;
						c[v_axis] = v;
						let this_mat = at(c[0], c[1], c[2]);
						if this_mat == NO_VOXEL {
							continue;
						}
						let mut nc = c;
						nc[axis] = if mask_is_lower { s - 1 } else { s + 1 };
						let n_mat = at(nc[0], nc[1], nc[2]);
						if face_needed(this_mat, n_mat, is_transparent(n_mat)) {
							mask[(v as usize) * du + (u as usize)] = this_mat;
						}
					}
				}

				let mut done = vec![false; du * dv];
				for v0 in 0..dv {
					for u0 in 0..du {
						let cell = v0 * du + u0;
						if done[cell] {
							continue;
						}
						let mat = mask[cell];
						if mat == NO_VOXEL {
							done[cell] = true;
							continue;
						}
						let mut end_u = u0 + 1;
						while end_u < du && !done[v0 * du + end_u] && mask[v0 * du + end_u] == mat {
							end_u += 1;
						}
						let mut end_v = v0 + 1;
						'grow_v: while end_v < dv {
							for uu in u0..end_u {
								let c = end_v * du + uu;
								if done[c] || mask[c] != mat {
									break 'grow_v;
								}
							}
							end_v += 1;
						}
						for vv in v0..end_v {
							for uu in u0..end_u {
								done[vv * du + uu] = true;
							}
						}

						let coord_fn = |u: i64, v: i64| local_coord_at(axis, plane, u_axis, v_axis, u, v);
						if mask_is_lower {
							// Winding so the quad faces -axis.
							emit_quad(&coord_fn, end_u as i64, u0 as i64, v0 as i64, end_v as i64, mat);
						} else {
							emit_quad(&coord_fn, u0 as i64, end_u as i64, v0 as i64, end_v as i64, mat);
						}
					}
				}
			}
		}
	}

	let aabb_points: Vec<Vec3d> = vertex_positions
		.iter()
		.map(|p| Vec3d::new(p.x as f64, p.y as f64, p.z as f64))
		.collect();
	let aabb = Aabb::from_points(&aabb_points);

	Ok(Mesh {
		vertex_positions,
		indices,
		triangle_materials,
		aabb,
	})
}
