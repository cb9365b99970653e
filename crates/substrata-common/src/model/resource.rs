//! Content-addressed resource registry entries. Grounded
//! in `shared/Resource.{h,cpp}`'s state machine and path rules; the
//! `external_resource` flag (present in the original but easy to drop when
//! summarizing the invariants) lets a small set of resources point at
//! an absolute/external path, e.g. resources mirrored from a CDN.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ResourceState {
	Absent,
	Transferring,
	Present,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
	pub url: String,
	pub local_path: String,
	pub owner_id: UserId,
	pub state: ResourceState,
	pub file_size: u64,
	/// True for resources intentionally stored outside `base_dir` (e.g.
	/// mirrored external content); relaxes the relative-path invariant.
	pub external_resource: bool,
}

#[derive(Debug, Eq, PartialEq)]
pub enum ResourcePathError {
	AbsolutePathNotAllowed,
}

impl Resource {
	/// (d) paths are relative — absolute paths are rejected unless the
	/// resource is marked external.
	pub fn validate_local_path(&self) -> Result<(), ResourcePathError> {
		let is_absolute = self.local_path.starts_with('/') || self.local_path.contains("..");
		if is_absolute && !self.external_resource {
			return Err(ResourcePathError::AbsolutePathNotAllowed);
		}
		Ok(())
	}

	/// (c) a transition `Present -> Absent` is permitted only by an admin
	/// path; this just checks the transition shape, the caller enforces
	/// the admin check.
	pub fn can_transition_to(&self, new_state: ResourceState, is_admin: bool) -> bool {
		match (self.state, new_state) {
			(ResourceState::Present, ResourceState::Absent) => is_admin,
			_ => true,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn resource(local_path: &str, external: bool) -> Resource {
		Resource {
			url: "abc123.glb".into(),
			local_path: local_path.into(),
			owner_id: UserId(1),
			state: ResourceState::Present,
			file_size: 1024,
			external_resource: external,
		}
	}

	#[test]
	fn relative_path_is_accepted() {
		assert!(resource("models/abc123.glb", false).validate_local_path().is_ok());
	}

	#[test]
	fn absolute_path_is_rejected_unless_external() {
		assert_eq!(
			resource("/etc/passwd", false).validate_local_path(),
			Err(ResourcePathError::AbsolutePathNotAllowed)
		);
		assert!(resource("/mnt/cdn/x.glb", true).validate_local_path().is_ok());
	}

	#[test]
	fn path_traversal_is_rejected() {
		assert!(resource("../../etc/passwd", false).validate_local_path().is_err());
	}

	#[test]
	fn present_to_absent_requires_admin() {
		let r = resource("x.glb", false);
		assert!(!r.can_transition_to(ResourceState::Absent, false));
		assert!(r.can_transition_to(ResourceState::Absent, true));
		assert!(r.can_transition_to(ResourceState::Transferring, false));
	}
}
