//! Shared server state: the single world-state mutex, the
//! store, and the dispatcher, all behind one `Arc` cloned into every task.

use std::sync::Arc;

use dashmap::DashMap;
use substrata_common::model::{all_worlds_state::AllWorldsState, resource::Resource};
use tokio::sync::Mutex;

use crate::{config::Config, dispatcher::Dispatcher};

/// Everything a connection worker, the reaper, the DB flush task and the
/// HTTP surfaces need. `world_state` and `store` are two distinct locks,
/// never held at the same time. The resource registry has its own
/// separate lock (a `DashMap`, sharded).
pub struct AppState {
	pub config: Config,
	pub world_state: Mutex<AllWorldsState>,
	pub store: Mutex<substrata_common::store::Store>,
	pub dispatcher: Arc<Dispatcher>,
	pub resources: DashMap<String, Resource>,
}

pub type SharedApp = Arc<AppState>;
