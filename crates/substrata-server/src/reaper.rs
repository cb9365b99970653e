//! Dead-object reaper: periodically
//! sweeps every world for objects marked `Dead`, removing them from memory
//! and tombstoning their store records.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::app::SharedApp;

#[instrument(skip(app))]
pub async fn run(app: SharedApp) {
	let mut interval = tokio::time::interval(Duration::from_secs(app.config.reaper_interval_secs));
    interval.tick().await;

	loop {
		interval.tick().await;
		if let Err(err) = reap_once(&app).await {
			warn!(%err, "reaper pass failed");
		}
	}
}

#[instrument(skip(app))]
async fn reap_once(app: &SharedApp) -> Result<(), substrata_common::error::StoreError> {
	let keys = {
		let mut state = app.world_state.lock().await;
		let mut keys = Vec::new();
		for world in state.worlds.values_mut() {
			keys.extend(world.drain_dead_objects());
		}
		keys
	};

	if keys.is_empty() {
		return Ok(());
	}

	let mut store = app.store.lock().await;
	for key in &keys {
		store.delete(*key)?;
	}
	info!(reaped = keys.len(), "reaped dead objects");
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use dashmap::DashMap;
	use substrata_common::{
		ids::{UserId, WorldObjectUid},
		model::{all_worlds_state::AllWorldsState, world_object::ObjectFlags},
		timestamp::Timestamp,
	};
	use tokio::sync::Mutex;

	use super::*;
	use crate::{app::AppState, config::Config, dispatcher::Dispatcher};

	fn test_app(store_path: &std::path::Path) -> SharedApp {
		let config = <Config as clap::Parser>::parse_from(["substrata-server", "--store-path", store_path.to_str().unwrap()]);
		let state = AllWorldsState::new_with_root_world(UserId(0), Timestamp(0));
		Arc::new(AppState {
			config,
			world_state: Mutex::new(state),
			store: Mutex::new(substrata_common::store::Store::open(store_path).unwrap()),
			dispatcher: Dispatcher::new(),
			resources: DashMap::new(),
		})
	}

	fn sample_object(uid: u64) -> substrata_common::model::world_object::WorldObject {
		substrata_common::model::world_object::WorldObject {
			db_key: None,
			uid: WorldObjectUid(uid),
			model_url: String::new(),
			mats: vec![],
			pos: Default::default(),
			rot: Default::default(),
			scale: substrata_common::geom::Vec3d::new(1.0, 1.0, 1.0),
			aabb: substrata_common::geom::Aabb {
				min: Default::default(),
				max: Default::default(),
			},
			voxel_blob: None,
			script_source: None,
			owner_id: UserId(1),
			creator_id: UserId(1),
			created_time: Timestamp(0),
			last_modified_time: Timestamp(0),
			lod_bias: 0.0,
			flags: ObjectFlags::empty(),
			content_hash: [0; 32],
			state: substrata_common::model::world_object::ObjectState::Alive,
			from_remote_dirty: false,
			from_local_dirty: false,
		}
	}

	#[tokio::test]
	async fn reap_removes_dead_objects_and_tombstones_their_records() {
		let dir = tempfile::tempdir().unwrap();
		let app = test_app(&dir.path().join("store.bin"));

		{
			let mut state = app.world_state.lock().await;
			let mut store = app.store.lock().await;
			let world = state.get_world_mut("").unwrap();
			let mut obj = sample_object(1);
			store.save(&mut obj).unwrap();
			world.objects.insert(obj.uid, obj);
			world.mark_object_dead(WorldObjectUid(1), Timestamp(1));
		}

		reap_once(&app).await.unwrap();

		let state = app.world_state.lock().await;
		assert!(state.get_world("").unwrap().objects.is_empty());
	}
}
