//! Persistent append-log object store.
//!
//! On-disk layout is a sequence of records:
//! `{u32 kind, u32 length, payload[length]}`. `length` lets a reader that
//! does not understand `kind` skip the record entirely, so the format is
//! forward-compatible at the record level. The payload itself is a
//! versioned, size-prefixed blob (see [`codec`]) so a reader that
//! understands `kind` but not its newest fields can still skip those.
//!
//! A [`DatabaseKey`] is the byte offset of a record's start within the file.
//! Updating an entity appends a fresh record at the end of the file and
//! rewrites its `DatabaseKey`; the old record becomes a tombstone, reclaimed
//! on the next [`Store::compact`].

mod codec;

pub use codec::{Reader, Writer};

use std::{
	fs::{File, OpenOptions},
	io::{BufReader, Read, Seek, SeekFrom, Write as _},
	path::{Path, PathBuf},
};

use tracing::{debug, info, instrument, warn};

use crate::error::StoreError;

/// Byte offset of a record within the store file. Doubles as the stable
/// identity used to reference an entity from elsewhere in the data model
/// (e.g. `WorldObject::owner_id` refers to a `User` by `UserId`, not by
/// `DatabaseKey`; but the store's own indices are keyed by it).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct DatabaseKey(pub u64);

#[repr(u32)]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RecordKind {
	WorldObject = 1,
	Parcel = 2,
	WorldState = 3,
	User = 4,
	UserWebSession = 5,
	Auction = 6,
	Order = 7,
	NewsPost = 8,
	SubEvent = 9,
	Photo = 10,
	Screenshot = 11,
	/// Written over a deleted record's old slot; `payload` is empty.
	Tombstone = 0,
}

impl RecordKind {
	fn from_u32(v: u32) -> Option<Self> {
		Some(match v {
			0 => Self::Tombstone,
			1 => Self::WorldObject,
			2 => Self::Parcel,
			3 => Self::WorldState,
			4 => Self::User,
			5 => Self::UserWebSession,
			6 => Self::Auction,
			7 => Self::Order,
			8 => Self::NewsPost,
			9 => Self::SubEvent,
			10 => Self::Photo,
			11 => Self::Screenshot,
			_ => return None,
		})
	}
}

/// Implemented by every top-level persisted entity (`WorldObject`, `Parcel`,
/// `User`, ...). Each entity owns one `KIND` and writes/reads its own field
/// set inside the versioned payload the store wraps around it.
pub trait StoreEntity: Sized {
	const KIND: u32;
	const VERSION: u32;

	fn db_key(&self) -> Option<DatabaseKey>;
	fn set_db_key(&mut self, key: DatabaseKey);

	fn write_fields(&self, w: &mut Writer);
	fn read_fields(version: u32, r: &mut Reader) -> Result<Self, StoreError>;
}

/// Rejects a payload version newer than what this build understands.
/// Older versions are always accepted: `read_fields` is expected to default
/// any field introduced after `version`.
pub(crate) fn check_version(
	kind: u32,
	found: u32,
	max_supported: u32,
	r: &Reader,
) -> Result<(), StoreError> {
	if found > max_supported {
		return Err(StoreError::VersionMismatch {
			kind,
			offset: r.remaining() as u64,
			found,
			max_supported,
		});
	}
	Ok(())
}

const MAGIC: u32 = 0x5355_4253; // "SUBS" truncated to fit a u32 tag

/// Store file format version. Bumped whenever the header or record framing
/// changes shape; record payload versioning (see [`codec`]) is separate and
/// covers individual entity encodings.
const FORMAT_VERSION: u32 = 1;

/// Size of the file header: `{u32 magic, u32 format_version}`.
const HEADER_LEN: u64 = 8;

/// The append-log file itself, plus the in-memory offset index built by
/// [`Store::load`]. Generic only in the sense that callers pass a `kind`
/// tag per read/write call; the store does not know about the model types.
pub struct Store {
	path: PathBuf,
	file: File,
	/// Offsets of all live (non-tombstoned) records, in file order.
	live_offsets: Vec<u64>,
}

struct RawRecord {
	offset: u64,
	kind: u32,
	payload: Vec<u8>,
}

impl Store {
	#[instrument(skip_all, fields(path = %path.as_ref().display()))]
	pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
		let path = path.as_ref().to_path_buf();
		let is_new = !path.exists();
		// Append-only log: never truncate an existing file.
		#[allow(clippy::suspicious_open_options)]
		let mut file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.open(&path)?;

		if is_new {
			file.write_all(&MAGIC.to_le_bytes())?;
			file.write_all(&FORMAT_VERSION.to_le_bytes())?;
			file.flush()?;
			info!("created new store file");
		} else {
			let mut header = [0u8; HEADER_LEN as usize];
			file.read_exact(&mut header)?;
			let found = u32::from_le_bytes(header[0..4].try_into().unwrap());
			if found != MAGIC {
				return Err(StoreError::BadMagic {
					found,
					expected: MAGIC,
				});
			}
			let format_version = u32::from_le_bytes(header[4..8].try_into().unwrap());
			if format_version > FORMAT_VERSION {
				return Err(StoreError::UnsupportedFormatVersion {
					found: format_version,
					max_supported: FORMAT_VERSION,
				});
			}
		}

		Ok(Self {
			path,
			file,
			live_offsets: Vec::new(),
		})
	}

	/// Scans the whole file from just past the header, building the
	/// in-memory offset index and yielding every live raw record for the
	/// caller to decode into typed entities by `kind`.
	#[instrument(skip(self))]
	fn scan(&mut self) -> Result<Vec<RawRecord>, StoreError> {
		self.file.seek(SeekFrom::Start(HEADER_LEN))?;
		let mut reader = BufReader::new(&self.file);
		let mut offset = HEADER_LEN;
		let mut records = Vec::new();
		self.live_offsets.clear();

		loop {
			let mut header = [0u8; 8];
			match reader.read_exact(&mut header) {
				Ok(()) => {}
				Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
				Err(e) => return Err(e.into()),
			}
			let kind = u32::from_le_bytes(header[0..4].try_into().unwrap());
			let length = u32::from_le_bytes(header[4..8].try_into().unwrap());

			let mut payload = vec![0u8; length as usize];
			if let Err(e) = reader.read_exact(&mut payload) {
				if e.kind() == std::io::ErrorKind::UnexpectedEof {
					warn!(offset, declared = length, "trailing record truncated at EOF, stopping scan");
					break;
				}
				return Err(e.into());
			}

			if kind != RecordKind::Tombstone as u32 {
				if RecordKind::from_u32(kind).is_none() {
					debug!(kind, offset, "skipping unknown record kind");
				} else {
					self.live_offsets.push(offset);
					records.push(RawRecord {
						offset,
						kind,
						payload,
					});
				}
			}

			offset += 8 + length as u64;
		}

		Ok(records)
	}

	/// Loads every live record of `T::KIND` into memory as decoded entities,
	/// with `db_key` set to each record's offset.
	pub fn load<T: StoreEntity>(&mut self) -> Result<Vec<T>, StoreError> {
		let records = self.scan()?;
		let mut out = Vec::new();
		for rec in records {
			if rec.kind != T::KIND {
				continue;
			}
			let mut r = Reader::new(&rec.payload);
			let (version, mut fields) = r.read_versioned_payload()?;
			let mut entity = T::read_fields(version, &mut fields)?;
			entity.set_db_key(DatabaseKey(rec.offset));
			out.push(entity);
		}
		Ok(out)
	}

	/// Appends `entity` as a new record, returning its fresh [`DatabaseKey`].
	/// If `entity` already had a key, the caller is responsible for
	/// tombstoning the old record via [`Store::delete`] — `flush_dirty` on
	/// the world container does this for every entity it re-saves.
	#[instrument(skip(self, entity))]
	pub fn save<T: StoreEntity>(&mut self, entity: &mut T) -> Result<DatabaseKey, StoreError> {
		let payload = Writer::write_versioned_payload(T::VERSION, |w| entity.write_fields(w));
		let offset = self.file.seek(SeekFrom::End(0))?;
		self.file.write_all(&T::KIND.to_le_bytes())?;
		self.file.write_all(&(payload.len() as u32).to_le_bytes())?;
		self.file.write_all(&payload)?;
		self.file.flush()?;
		let key = DatabaseKey(offset);
		entity.set_db_key(key);
		self.live_offsets.push(offset);
		Ok(key)
	}

	/// Overwrites the record at `key` with a tombstone, leaving its slot's
	/// length unchanged (the length field is trusted so subsequent records
	/// stay reachable). Reclaimed by [`Store::compact`].
	#[instrument(skip(self))]
	pub fn delete(&mut self, key: DatabaseKey) -> Result<(), StoreError> {
		self.file.seek(SeekFrom::Start(key.0))?;
		self.file.write_all(&(RecordKind::Tombstone as u32).to_le_bytes())?;
		self.file.flush()?;
		self.live_offsets.retain(|&o| o != key.0);
		Ok(())
	}

	/// Rewrites the store file keeping only live records, reclaiming the
	/// space tombstones and superseded versions occupied. Must not run
	/// concurrently with any `save`/`delete` call; the world container
	/// holds its write lock across the whole operation.
	#[instrument(skip(self))]
	pub fn compact(&mut self) -> Result<(), StoreError> {
		let records = self.scan()?;
		let tmp_path = self.path.with_extension("compact.tmp");
		let mut tmp = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(true)
			.open(&tmp_path)?;
		tmp.write_all(&MAGIC.to_le_bytes())?;
		tmp.write_all(&FORMAT_VERSION.to_le_bytes())?;
		let mut new_offsets = Vec::with_capacity(records.len());
		for rec in &records {
			let offset = tmp.stream_position()?;
			tmp.write_all(&rec.kind.to_le_bytes())?;
			tmp.write_all(&(rec.payload.len() as u32).to_le_bytes())?;
			tmp.write_all(&rec.payload)?;
			new_offsets.push(offset);
		}
        tmp.flush()?;
		drop(tmp);
		std::fs::rename(&tmp_path, &self.path)?;
		self.file = OpenOptions::new().read(true).write(true).open(&self.path)?;
		self.live_offsets = new_offsets;
		info!(records = records.len(), "compacted store");
		Ok(())
	}

	pub fn live_record_count(&self) -> usize {
		self.live_offsets.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		ids::ParcelId,
		model::parcel::Parcel,
	};

	fn sample_parcel(id: u32) -> Parcel {
		use crate::{geom::Vec2d, ids::UserId, model::parcel::NftStatus, timestamp::Timestamp};
		let mut p = Parcel {
			db_key: None,
			id: ParcelId(id),
			owner_id: UserId(1),
			created_time: Timestamp(100),
			description: "a parcel".into(),
			admin_ids: vec![],
			writer_ids: vec![],
			child_parcel_ids: vec![],
			all_writeable: false,
			verts: [
				Vec2d::new(0.0, 0.0),
				Vec2d::new(1.0, 0.0),
				Vec2d::new(1.0, 1.0),
				Vec2d::new(0.0, 1.0),
			],
			zbounds: Vec2d::new(0.0, 1.0),
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

	#[test]
	fn save_load_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.bin");

		let mut store = Store::open(&path).unwrap();
		let mut p1 = sample_parcel(1);
		let mut p2 = sample_parcel(2);
		store.save(&mut p1).unwrap();
		store.save(&mut p2).unwrap();
		assert!(p1.db_key.is_some());

		let mut store2 = Store::open(&path).unwrap();
		let loaded: Vec<Parcel> = store2.load().unwrap();
		assert_eq!(loaded.len(), 2);
		assert_eq!(loaded[0].id, ParcelId(1));
		assert_eq!(loaded[1].id, ParcelId(2));
	}

	#[test]
	fn delete_then_reload_excludes_tombstone() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.bin");

		let mut store = Store::open(&path).unwrap();
		let mut p1 = sample_parcel(1);
		let key = store.save(&mut p1).unwrap();
		store.delete(key).unwrap();

		let mut store2 = Store::open(&path).unwrap();
		let loaded: Vec<Parcel> = store2.load().unwrap();
		assert!(loaded.is_empty());
	}

	#[test]
	fn compact_reclaims_tombstones() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.bin");

		let mut store = Store::open(&path).unwrap();
		let mut p1 = sample_parcel(1);
		let mut p2 = sample_parcel(2);
		let key1 = store.save(&mut p1).unwrap();
		store.save(&mut p2).unwrap();
		store.delete(key1).unwrap();
		store.compact().unwrap();

		let loaded: Vec<Parcel> = store.load().unwrap();
		assert_eq!(loaded.len(), 1);
		assert_eq!(loaded[0].id, ParcelId(2));
	}

	#[test]
	fn bad_magic_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.bin");
		std::fs::write(&path, [0u8; 8]).unwrap();
		assert!(matches!(Store::open(&path), Err(StoreError::BadMagic { .. })));
	}

	#[test]
	fn unsupported_format_version_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.bin");
		let mut header = MAGIC.to_le_bytes().to_vec();
		header.extend_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
		std::fs::write(&path, header).unwrap();
		assert!(matches!(
			Store::open(&path),
			Err(StoreError::UnsupportedFormatVersion { .. })
		));
	}

	#[test]
	fn truncated_trailing_record_is_non_fatal() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.bin");

		let mut store = Store::open(&path).unwrap();
		let mut p1 = sample_parcel(1);
		let mut p2 = sample_parcel(2);
		store.save(&mut p1).unwrap();
		store.save(&mut p2).unwrap();
		drop(store);

		let full_len = std::fs::metadata(&path).unwrap().len();
		let file = OpenOptions::new().write(true).open(&path).unwrap();
		file.set_len(full_len - 4).unwrap();
		drop(file);

		let mut store2 = Store::open(&path).unwrap();
		let loaded: Vec<Parcel> = store2.load().unwrap();
		assert_eq!(loaded.len(), 1);
		assert_eq!(loaded[0].id, ParcelId(1));
	}
}
