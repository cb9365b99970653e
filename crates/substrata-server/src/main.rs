//! Server entry point: loads the store, builds the shared
//! app state, and spawns the client TCP accept loop, the DB flush and reaper
//! background tasks, the resource/web-admin HTTP server and the voice relay,
//! all under one `tokio::select!`-driven shutdown on Ctrl-C. Grounded in
//! `identity_server`'s `main.rs` startup sequence: parse config, init
//! tracing, open storage, spawn tasks, wait for a signal.

use std::sync::Arc;

use clap::Parser;
use dashmap::DashMap;
use substrata_common::{
	error::StoreError,
	ids::UserId,
	model::{
		all_worlds_state::{AllWorldsState, ROOT_WORLD_NAME},
		auction::Auction,
		news_post::NewsPost,
		order::Order,
		parcel::Parcel,
		photo::Photo,
		screenshot::Screenshot,
		sub_event::SubEvent,
		user::User,
		user_web_session::UserWebSession,
		world_object::WorldObject,
	},
	store::Store,
	timestamp::Timestamp,
};
use substrata_server::{app::AppState, config::Config, connection, db_flush, reaper, resource_service, voice_relay, web_admin};
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{error, info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

	let config = Config::parse();
	let app = build_app_state(config)?;

	let client_listener = TcpListener::bind(app.config.client_bind_addr).await?;
	info!(addr = %app.config.client_bind_addr, "client protocol listening");

	let http_router = resource_service::router(app.clone()).merge(web_admin::router(app.clone()));
	let http_listener = TcpListener::bind(app.config.http_bind_addr).await?;
	info!(addr = %app.config.http_bind_addr, "resource/web-admin http listening");

	let accept_task = tokio::spawn(accept_loop(app.clone(), client_listener));
	let http_task = tokio::spawn(async move {
		if let Err(err) = axum::serve(http_listener, http_router).await {
			error!(%err, "http server exited");
		}
	});
	let voice_task = tokio::spawn(voice_relay::run(app.clone()));
	let db_flush_task = tokio::spawn(db_flush::run(app.clone()));
	let reaper_task = tokio::spawn(reaper::run(app.clone()));

	tokio::signal::ctrl_c().await?;
	info!("shutdown signal received");

	accept_task.abort();
	http_task.abort();
	voice_task.abort();
	db_flush_task.abort();
	reaper_task.abort();

	Ok(())
}

#[instrument(skip(app, listener))]
async fn accept_loop(app: Arc<AppState>, listener: TcpListener) {
	loop {
		match listener.accept().await {
			Ok((socket, peer_addr)) => {
				let app = app.clone();
				tokio::spawn(connection::handle_connection(app, socket, peer_addr));
			}
			Err(err) => {
				error!(%err, "accept failed");
			}
		}
	}
}

/// Opens the store, loads every persisted entity kind into an in-memory
/// `AllWorldsState`, and assembles the shared `AppState`.
///
/// Persisted `WorldObject`/`Parcel` records carry no world identifier of
/// their own (see DESIGN.md), so on load they are all attributed to the
/// root world; named personal worlds are recreated empty and repopulated
/// going forward as their owners build in them.
fn build_app_state(config: Config) -> Result<Arc<AppState>, StoreError> {
	let mut store = Store::open(&config.store_path)?;

	let users: Vec<User> = store.load()?;
	let sessions: Vec<UserWebSession> = store.load()?;
	let orders: Vec<Order> = store.load()?;
	let auctions: Vec<Auction> = store.load()?;
	let news_posts: Vec<NewsPost> = store.load()?;
	let sub_events: Vec<SubEvent> = store.load()?;
	let photos: Vec<Photo> = store.load()?;
	let screenshots: Vec<Screenshot> = store.load()?;
	let objects: Vec<WorldObject> = store.load()?;
	let parcels: Vec<Parcel> = store.load()?;

	let mut state = AllWorldsState::new_with_root_world(UserId::INVALID, Timestamp::now());

	for user in users {
		state.users.insert(user.id, user);
	}
	for session in sessions {
		state.sessions.insert(session.id, session);
	}
	for order in orders {
		state.orders.insert(order.id, order);
	}
	for auction in auctions {
		state.auctions.insert(auction.id, auction);
	}
	for post in news_posts {
		state.news_posts.insert(post.id, post);
	}
	for event in sub_events {
		state.sub_events.insert(event.id, event);
	}
	for photo in photos {
		state.photos.insert(photo.id, photo);
	}
	for shot in screenshots {
		state.screenshots.insert(shot.id, shot);
	}

	let root = state.get_world_mut(ROOT_WORLD_NAME).expect("root world always exists");
	for object in objects {
		root.objects.insert(object.uid, object);
	}
	for parcel in parcels {
		root.parcels.insert(parcel.id, parcel);
	}

	// Resources are not persisted as store records (see DESIGN.md): the
	// registry starts empty and is rebuilt as clients re-upload content.
	let resource_map = DashMap::new();

	Ok(Arc::new(AppState {
		config,
		world_state: Mutex::new(state),
		store: Mutex::new(store),
		dispatcher: substrata_server::dispatcher::Dispatcher::new(),
		resources: resource_map,
	}))
}
