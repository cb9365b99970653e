//! Periodic persistence sweep:
//! walks every world's dirty sets and the top-level entity tables, saving
//! each dirty entity and tombstoning its previous record. Runs on its own
//! interval, taking the `world_state` lock and then the `store` lock in
//! turn — never both at once.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::app::SharedApp;

#[instrument(skip(app))]
pub async fn run(app: SharedApp) {
	let mut interval = tokio::time::interval(Duration::from_secs(app.config.db_flush_interval_secs));
    interval.tick().await; // first tick fires immediately; skip it

	loop {
		interval.tick().await;
		if let Err(err) = flush_once(&app).await {
			warn!(%err, "db flush pass failed");
		}
	}
}

#[instrument(skip(app))]
async fn flush_once(app: &SharedApp) -> Result<(), substrata_common::error::StoreError> {
	let mut saved = 0u32;

	// Worlds: users referenced by an object's owner_id must already exist,
	// so users are flushed in their own pass below, before objects/parcels.
	{
		let mut state = app.world_state.lock().await;
		let mut store = app.store.lock().await;

		for user in state.users.values_mut() {
			if user.db_key.is_some() {
				continue; // TODO: track a per-user dirty flag instead of write-once
			}
			store.save(user)?;
			saved += 1;
		}

		for world in state.worlds.values_mut() {
			let dirty_objects: Vec<_> = world.dirty.objects.iter().copied().collect();
			for uid in dirty_objects {
				let Some(obj) = world.objects.get_mut(&uid) else { continue };
				let old_key = obj.db_key;
				store.save(obj)?;
				if let Some(old_key) = old_key {
					if Some(old_key) != obj.db_key {
						store.delete(old_key)?;
					}
				}
				obj.from_local_dirty = false;
				saved += 1;
			}
			world.dirty.objects.clear();

			let dirty_parcels: Vec<_> = world.dirty.parcels.iter().copied().collect();
			for id in dirty_parcels {
				let Some(parcel) = world.parcels.get_mut(&id) else { continue };
				let old_key = parcel.db_key;
				store.save(parcel)?;
				if let Some(old_key) = old_key {
					if Some(old_key) != parcel.db_key {
						store.delete(old_key)?;
					}
				}
				saved += 1;
			}
			world.dirty.parcels.clear();
		}

		let dirty_worlds: Vec<_> = state.dirty_worlds.iter().cloned().collect();
		for name in dirty_worlds {
			let Some(world) = state.worlds.get_mut(&name) else { continue };
			let old_key = world.meta.db_key;
			store.save(&mut world.meta)?;
			if let Some(old_key) = old_key {
				if Some(old_key) != world.meta.db_key {
					store.delete(old_key)?;
				}
			}
			saved += 1;
		}
		state.dirty_worlds.clear();

		let dirty_news_posts: Vec<_> = state.dirty_news_posts.iter().copied().collect();
		for id in dirty_news_posts {
			let Some(post) = state.news_posts.get_mut(&id) else { continue };
			let old_key = post.db_key;
			store.save(post)?;
			if let Some(old_key) = old_key {
				if Some(old_key) != post.db_key {
					store.delete(old_key)?;
				}
			}
			saved += 1;
		}
		state.dirty_news_posts.clear();

		let dirty_sub_events: Vec<_> = state.dirty_sub_events.iter().copied().collect();
		for id in dirty_sub_events {
			let Some(event) = state.sub_events.get_mut(&id) else { continue };
			let old_key = event.db_key;
			store.save(event)?;
			if let Some(old_key) = old_key {
				if Some(old_key) != event.db_key {
					store.delete(old_key)?;
				}
			}
			saved += 1;
		}
		state.dirty_sub_events.clear();
	}

	if saved > 0 {
		info!(saved, "flushed dirty entities to the store");
	}
	Ok(())
}
