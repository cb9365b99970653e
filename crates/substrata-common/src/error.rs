//! Error kinds shared between the store, data model and server.
//!
//! Every fallible operation in the original becomes a typed, recoverable
//! `Result` carrying one of these kinds. Integrity errors are fatal at
//! startup; the rest are recoverable at the layer that owns the affected
//! resource.

use thiserror::Error;

use crate::ids::{ParcelId, WorldObjectUid};

/// Errors raised while validating or applying a client mutation.
#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum DomainError {
	#[error("user does not have write permission at this location")]
	NotAuthorized,

	#[error("object {0} not found")]
	ObjectNotFound(WorldObjectUid),

	#[error("parcel {0} not found")]
	ParcelNotFound(ParcelId),

	#[error("world {0:?} not found")]
	WorldNotFound(String),

	#[error("world {0:?} already exists")]
	WorldAlreadyExists(String),

	#[error("world name too long: {0} chars (max 1000)")]
	WorldNameTooLong(usize),

	#[error("validation failed: {0}")]
	Validation(String),

	#[error("resource not found: {0}")]
	ResourceNotFound(String),
}

/// Errors raised while loading or flushing the persistent object store.
/// Load-time errors of this kind are fatal: the server aborts startup.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("unsupported record payload version {found} for entity kind {kind} at offset {offset} (expected <= {max_supported})")]
	VersionMismatch {
		kind: u32,
		offset: u64,
		found: u32,
		max_supported: u32,
	},

	#[error("record at offset {offset} is truncated (declared length {declared}, but only {available} bytes remain)")]
	Truncated {
		offset: u64,
		declared: u32,
		available: u64,
	},

	#[error("unknown record kind {0} at offset {1}")]
	UnknownKind(u32, u64),

	#[error("bad magic number in store header: found {found:#x}, expected {expected:#x}")]
	BadMagic { found: u32, expected: u32 },

	#[error("unsupported store format version {found} (this build supports up to {max_supported})")]
	UnsupportedFormatVersion { found: u32, max_supported: u32 },

	#[error("malformed string (invalid utf8) while reading entity")]
	BadString,
}
