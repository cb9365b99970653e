//! Web admin surface: account management, JSON
//! views over parcels, worlds, news posts, events, photos and screenshots,
//! the ERC-721 parcel metadata endpoint, and the editing endpoints for
//! parcels/worlds/news posts/events. Grounded in `identity_server`'s axum
//! handler style — typed extractors, a shared `SharedApp` state, JSON
//! responses built from `serde_json::json!` — since this crate carries no
//! HTML templating engine; a browser-facing frontend is expected to sit in
//! front of this JSON API.
//!
//! Mutating endpoints follow the lock/lookup/authz/mutate/dirty pattern of
//! `webserver/ParcelHandlers.cpp`'s `handleEditParcelDescriptionPost` and
//! its siblings: take `world_state`, look the entity up, check the caller
//! is the owner (or, for parcels, a parcel admin), mutate, mark the
//! relevant dirty set, release the lock, set a flash message, then 302
//! redirect to the entity's read page.

use axum::{
	extract::{Path, State},
	http::{header, HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::{get, post},
	Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use substrata_common::{
	ids::{NewsPostId, ParcelId, PhotoId, ScreenshotId, SubEventId, UserId},
	model::{
		all_worlds_state::AllWorldsState,
		news_post::{NewsPost, PostState},
		parcel::{Parcel, MAX_PARCEL_DESCRIPTION_LEN},
		photo::Photo,
		screenshot::Screenshot,
		sub_event::{self, SubEvent},
		user::{hash_password, User},
		user_web_session::{SessionId, UserWebSession, MAX_AGE_SECS},
		world_state::MAX_WORLD_DESCRIPTION_LEN,
	},
	timestamp::Timestamp,
};
use tracing::instrument;

use crate::app::SharedApp;

const SESSION_COOKIE_NAME: &str = "site-b";

pub fn router(app: SharedApp) -> Router {
	Router::new()
		.route("/login", post(login))
		.route("/logout", post(logout))
		.route("/signup", post(signup))
		.route("/change_password", post(change_password))
		.route("/reset_password/request", post(request_password_reset))
		.route("/reset_password/confirm", post(confirm_password_reset))
		.route("/parcel/:id", get(get_parcel))
		.route("/parcel/:id/edit", post(edit_parcel))
		.route("/world/:name", get(get_world))
		.route("/world/:name/edit", post(edit_world))
		.route("/news_post/:id", get(get_news_post))
		.route("/news_post/:id/edit", post(edit_news_post))
		.route("/event/:id", get(get_event))
		.route("/event/:id/edit", post(edit_event))
		.route("/photo/:id", get(get_photo))
		.route("/photo_midsize_image/:id", get(get_photo_midsize_image))
		.route("/photo_thumb_image/:id", get(get_photo_thumb_image))
		.route("/screenshot/:id", get(get_screenshot))
		.route("/p/:parcel_id", get(parcel_erc721_metadata))
		.route("/.well-known/acme-challenge/:filename", get(acme_challenge))
		.with_state(app)
}

fn session_cookie_header(session_id: SessionId, max_age: u64) -> (header::HeaderName, String) {
	(
		header::SET_COOKIE,
		format!("{SESSION_COOKIE_NAME}={session_id}; Path=/; Max-Age={max_age}; HttpOnly"),
	)
}

fn read_session_cookie(headers: &HeaderMap) -> Option<SessionId> {
	let raw = headers.get(header::COOKIE)?.to_str().ok()?;
	for part in raw.split(';') {
		let part = part.trim();
		if let Some(value) = part.strip_prefix(&format!("{SESSION_COOKIE_NAME}=")) {
			let n = u128::from_str_radix(value, 16).ok()?;
			return Some(SessionId(n));
		}
	}
	None
}

fn authenticated_user(state: &AllWorldsState, headers: &HeaderMap, now: Timestamp) -> Option<UserId> {
	let session_id = read_session_cookie(headers)?;
	state.session_user(session_id, now).map(|u| u.id)
}

#[derive(Deserialize)]
struct LoginForm {
	username: String,
	password: String,
}

#[instrument(skip(app, form))]
async fn login(State(app): State<SharedApp>, Form(form): Form<LoginForm>) -> Response {
	let now = Timestamp::now();
	let mut state = app.world_state.lock().await;
	let Some(user) = state.find_user_by_name(&form.username) else {
		return (StatusCode::UNAUTHORIZED, "invalid username or password").into_response();
	};
	if !user.check_password(&form.password) {
		return (StatusCode::UNAUTHORIZED, "invalid username or password").into_response();
	}
	let session = UserWebSession {
		db_key: None,
		id: SessionId::generate(),
		user_id: user.id,
		created_time: now,
	};
	let session_id = session.id;
	state.sessions.insert(session_id, session);

	let mut headers = HeaderMap::new();
	let (name, value) = session_cookie_header(session_id, MAX_AGE_SECS);
	headers.insert(name, value.parse().unwrap());
	(StatusCode::OK, headers, Json(json!({ "ok": true }))).into_response()
}

#[instrument(skip(app))]
async fn logout(State(app): State<SharedApp>, headers: HeaderMap) -> Response {
	if let Some(session_id) = read_session_cookie(&headers) {
		app.world_state.lock().await.sessions.remove(&session_id);
	}
	let mut out_headers = HeaderMap::new();
	let (name, value) = session_cookie_header(SessionId(0), 0);
	out_headers.insert(name, value.parse().unwrap());
	(StatusCode::OK, out_headers, Json(json!({ "ok": true }))).into_response()
}

#[derive(Deserialize)]
struct SignupForm {
	username: String,
	email: String,
	password: String,
}

#[instrument(skip(app, form))]
async fn signup(State(app): State<SharedApp>, Form(form): Form<SignupForm>) -> Response {
	if form.username.len() > substrata_common::model::user::MAX_USERNAME_LEN {
		return (StatusCode::BAD_REQUEST, "username too long").into_response();
	}
	let now = Timestamp::now();
	let mut state = app.world_state.lock().await;
	if state.find_user_by_name(&form.username).is_some() {
		return (StatusCode::CONFLICT, "username already taken").into_response();
	}

	let mut salt = [0u8; 16];
	rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut salt);
	let id = state.allocate_user_id();
	let user = User {
		db_key: None,
		id,
		name: form.username,
		email: form.email,
		created_time: now,
		password_hash: hash_password(&salt, &form.password),
		salt,
		avatar_settings: Vec::new(),
		password_reset: Default::default(),
	};
	state.users.insert(id, user);
	(StatusCode::OK, Json(json!({ "ok": true, "user_id": id.value() }))).into_response()
}

#[derive(Deserialize)]
struct ChangePasswordForm {
	old_password: String,
	new_password: String,
}

#[instrument(skip(app, form))]
async fn change_password(State(app): State<SharedApp>, headers: HeaderMap, Form(form): Form<ChangePasswordForm>) -> Response {
	let Some(session_id) = read_session_cookie(&headers) else {
		return StatusCode::UNAUTHORIZED.into_response();
	};
	let now = Timestamp::now();
	let mut state = app.world_state.lock().await;
	let Some(user) = state.session_user(session_id, now).map(|u| u.id) else {
		return StatusCode::UNAUTHORIZED.into_response();
	};
	let user = state.users.get_mut(&user).expect("session_user resolved this id");
	if !user.check_password(&form.old_password) {
		return (StatusCode::UNAUTHORIZED, "old password incorrect").into_response();
	}
	user.password_hash = hash_password(&user.salt, &form.new_password);
	(StatusCode::OK, Json(json!({ "ok": true }))).into_response()
}

#[derive(Deserialize)]
struct ResetRequestForm {
	username: String,
}

/// Issues a reset token and would normally email it via the configured SMTP
/// relay; actually sending mail is outside this crate's scope (no SMTP
/// client is in the teacher's dependency stack), so the token is returned
/// directly in the response for now.
#[instrument(skip(app, form))]
async fn request_password_reset(State(app): State<SharedApp>, Form(form): Form<ResetRequestForm>) -> Response {
	let now = Timestamp::now();
	let mut state = app.world_state.lock().await;
	let Some(user) = state.users.values_mut().find(|u| u.name == form.username) else {
		// Don't reveal whether the username exists.
		return (StatusCode::OK, Json(json!({ "ok": true }))).into_response();
	};
	let mut token = [0u8; 32];
	rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut token);
	user.password_reset = substrata_common::model::user::PasswordReset::issue(&token, now);
	let token_b64 = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, token);
	(StatusCode::OK, Json(json!({ "ok": true, "token": token_b64 }))).into_response()
}

#[derive(Deserialize)]
struct ResetConfirmForm {
	username: String,
	token: String,
	new_password: String,
}

#[instrument(skip(app, form))]
async fn confirm_password_reset(State(app): State<SharedApp>, Form(form): Form<ResetConfirmForm>) -> Response {
	let Ok(token_bytes) = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, &form.token) else {
		return (StatusCode::BAD_REQUEST, "malformed token").into_response();
	};
	let Ok(token): Result<[u8; 32], _> = token_bytes.try_into() else {
		return (StatusCode::BAD_REQUEST, "malformed token").into_response();
	};
	let now = Timestamp::now();
	let mut state = app.world_state.lock().await;
	let Some(user) = state.users.values_mut().find(|u| u.name == form.username) else {
		return (StatusCode::NOT_FOUND, "no such user").into_response();
	};
	if !user.password_reset.try_consume(&token, now) {
		return (StatusCode::UNAUTHORIZED, "invalid or expired token").into_response();
	}
	user.password_hash = hash_password(&user.salt, &form.new_password);
	(StatusCode::OK, Json(json!({ "ok": true }))).into_response()
}

#[instrument(skip(app, headers))]
async fn get_parcel(State(app): State<SharedApp>, Path(id): Path<u32>, headers: HeaderMap) -> Response {
	let now = Timestamp::now();
	let mut state = app.world_state.lock().await;
	let Some(parcel) = state.worlds.values().find_map(|w| w.parcels.get(&ParcelId(id))) else {
		return StatusCode::NOT_FOUND.into_response();
	};
	let mut body = parcel_json(parcel);
	if let Some(user_id) = authenticated_user(&state, &headers, now) {
		body["flash_message"] = json!(state.take_user_web_message(user_id));
	}
	Json(body).into_response()
}

fn parcel_json(parcel: &Parcel) -> serde_json::Value {
	json!({
		"id": parcel.id.value(),
		"owner_id": parcel.owner_id.value(),
		"owner_name": parcel.owner_name,
		"description": parcel.description,
		"all_writeable": parcel.all_writeable,
		"nft_status": format!("{:?}", parcel.nft_status),
	})
}

#[derive(Deserialize)]
struct EditParcelForm {
	description: String,
}

/// Mirrors `ParcelHandlers.cpp`'s `handleEditParcelDescriptionPost`: only the
/// owner or a parcel admin may edit, the description is length-capped, and
/// the redirect lands back on the parcel's own read page.
#[instrument(skip(app, headers, form))]
async fn edit_parcel(State(app): State<SharedApp>, Path(id): Path<u32>, headers: HeaderMap, Form(form): Form<EditParcelForm>) -> Response {
	let now = Timestamp::now();
	let mut state = app.world_state.lock().await;
	let Some(user_id) = authenticated_user(&state, &headers, now) else {
		return StatusCode::UNAUTHORIZED.into_response();
	};
	if form.description.len() > MAX_PARCEL_DESCRIPTION_LEN {
		return (StatusCode::BAD_REQUEST, "description too long").into_response();
	}
	let parcel_id = ParcelId(id);
	let Some(world) = state.worlds.values_mut().find(|w| w.parcels.contains_key(&parcel_id)) else {
		return StatusCode::NOT_FOUND.into_response();
	};
	let parcel = world.parcels.get_mut(&parcel_id).expect("just checked contains_key");
	if parcel.owner_id != user_id && !parcel.user_is_parcel_admin(user_id) {
		return StatusCode::FORBIDDEN.into_response();
	}
	parcel.description = form.description;
	world.dirty.parcels.insert(parcel_id);
	state.set_user_web_message(user_id, "Parcel updated.");
	(StatusCode::FOUND, [(header::LOCATION, format!("/parcel/{id}"))]).into_response()
}

#[instrument(skip(app, headers))]
async fn get_world(State(app): State<SharedApp>, Path(name): Path<String>, headers: HeaderMap) -> Response {
	let now = Timestamp::now();
	let mut state = app.world_state.lock().await;
	let Some(world) = state.get_world(&name) else {
		return StatusCode::NOT_FOUND.into_response();
	};
	let mut body = json!({
		"name": world.meta.name,
		"owner_id": world.meta.owner_id.value(),
		"created_time": world.meta.created_time.day_and_time_string_utc(),
		"description": world.meta.description,
		"num_objects": world.objects.len(),
		"num_parcels": world.parcels.len(),
	});
	if let Some(user_id) = authenticated_user(&state, &headers, now) {
		body["flash_message"] = json!(state.take_user_web_message(user_id));
	}
	Json(body).into_response()
}

#[derive(Deserialize)]
struct EditWorldForm {
	description: String,
}

/// Mirrors `WorldHandlers.cpp`'s `handleEditWorldPost`: only the world's
/// owner may edit, the description is length-capped against
/// `WorldDetails::MAX_DESCRIPTION_SIZE`.
#[instrument(skip(app, headers, form))]
async fn edit_world(State(app): State<SharedApp>, Path(name): Path<String>, headers: HeaderMap, Form(form): Form<EditWorldForm>) -> Response {
	let now = Timestamp::now();
	let mut state = app.world_state.lock().await;
	let Some(user_id) = authenticated_user(&state, &headers, now) else {
		return StatusCode::UNAUTHORIZED.into_response();
	};
	if form.description.len() > MAX_WORLD_DESCRIPTION_LEN {
		return (StatusCode::BAD_REQUEST, "description too long").into_response();
	}
	let Some(world) = state.get_world_mut(&name) else {
		return StatusCode::NOT_FOUND.into_response();
	};
	if world.meta.owner_id != user_id {
		return StatusCode::FORBIDDEN.into_response();
	}
	world.meta.description = form.description;
	state.mark_world_dirty(&name);
	state.set_user_web_message(user_id, "World updated.");
	(StatusCode::FOUND, [(header::LOCATION, format!("/world/{name}"))]).into_response()
}

#[instrument(skip(app, headers))]
async fn get_news_post(State(app): State<SharedApp>, Path(id): Path<u64>, headers: HeaderMap) -> Response {
	let now = Timestamp::now();
	let mut state = app.world_state.lock().await;
	let user_id = authenticated_user(&state, &headers, now);
	let is_creator = user_id.is_some_and(|u| state.news_posts.get(&NewsPostId(id)).is_some_and(|p| p.creator_id == u));
	let Some(post) = state.news_posts.get(&NewsPostId(id)) else {
		return StatusCode::NOT_FOUND.into_response();
	};
	if !post.is_visible_to_public() && !is_creator {
		return StatusCode::NOT_FOUND.into_response();
	}
	let mut body = news_post_json(post);
	if let Some(user_id) = user_id {
		body["flash_message"] = json!(state.take_user_web_message(user_id));
	}
	Json(body).into_response()
}

fn news_post_json(post: &NewsPost) -> serde_json::Value {
	json!({
		"id": post.id.value(),
		"title": post.title,
		"content": post.content,
		"thumbnail_url": post.thumbnail_url,
		"created_time": post.created_time.day_and_time_string_utc(),
		"published": post.is_visible_to_public(),
	})
}

#[derive(Deserialize)]
struct EditNewsPostForm {
	title: String,
	content: String,
	thumbnail_url: String,
	published: bool,
}

/// Mirrors `NewsPostHandlers.cpp`'s `handleEditNewsPostPost`: only the
/// creator may edit. Attachment re-upload on edit is part of the original
/// form but isn't implemented here, since this crate has no multipart file
/// upload handling elsewhere either.
#[instrument(skip(app, headers, form))]
async fn edit_news_post(State(app): State<SharedApp>, Path(id): Path<u64>, headers: HeaderMap, Form(form): Form<EditNewsPostForm>) -> Response {
	let now = Timestamp::now();
	let mut state = app.world_state.lock().await;
	let Some(user_id) = authenticated_user(&state, &headers, now) else {
		return StatusCode::UNAUTHORIZED.into_response();
	};
	let post_id = NewsPostId(id);
	let Some(post) = state.news_posts.get_mut(&post_id) else {
		return StatusCode::NOT_FOUND.into_response();
	};
	if post.creator_id != user_id {
		return StatusCode::FORBIDDEN.into_response();
	}
	post.title = form.title;
	post.content = form.content;
	post.thumbnail_url = form.thumbnail_url;
	post.state = if form.published { PostState::Published } else { PostState::Draft };
	post.last_modified_time = now;
	state.mark_news_post_dirty(post_id);
	state.set_user_web_message(user_id, "News post updated.");
	(StatusCode::FOUND, [(header::LOCATION, format!("/news_post/{id}"))]).into_response()
}

#[instrument(skip(app, headers))]
async fn get_event(State(app): State<SharedApp>, Path(id): Path<u64>, headers: HeaderMap) -> Response {
	let now = Timestamp::now();
	let mut state = app.world_state.lock().await;
	let Some(event) = state.sub_events.get(&SubEventId(id)) else {
		return StatusCode::NOT_FOUND.into_response();
	};
	let mut body = event_json(event);
	if let Some(user_id) = authenticated_user(&state, &headers, now) {
		body["flash_message"] = json!(state.take_user_web_message(user_id));
	}
	Json(body).into_response()
}

fn event_json(event: &SubEvent) -> serde_json::Value {
	json!({
		"id": event.id.value(),
		"world_name": event.world_name,
		"title": event.title,
		"description": event.description,
		"start_time": event.start_time.day_and_time_string_utc(),
		"end_time": event.end_time.day_and_time_string_utc(),
		"attendee_count": event.attendee_ids.len(),
		"published": event.state == sub_event::EventState::Published,
	})
}

#[derive(Deserialize)]
struct EditEventForm {
	world_name: String,
	parcel_id: u32,
	title: String,
	description: String,
	start_time: u64,
	end_time: u64,
	published: bool,
}

/// Mirrors `SubEventHandlers.cpp`'s `handleEditEventPost`: only the creator
/// may edit; `world_name`/`title`/`description` are capped against the same
/// `MAX_*_SIZE` constants the original validates against.
#[instrument(skip(app, headers, form))]
async fn edit_event(State(app): State<SharedApp>, Path(id): Path<u64>, headers: HeaderMap, Form(form): Form<EditEventForm>) -> Response {
	let now = Timestamp::now();
	let mut state = app.world_state.lock().await;
	let Some(user_id) = authenticated_user(&state, &headers, now) else {
		return StatusCode::UNAUTHORIZED.into_response();
	};
	if form.world_name.len() > sub_event::MAX_WORLD_NAME_SIZE
		|| form.title.len() > sub_event::MAX_TITLE_SIZE
		|| form.description.len() > sub_event::MAX_DESCRIPTION_SIZE
	{
		return (StatusCode::BAD_REQUEST, "field too long").into_response();
	}
	let event_id = SubEventId(id);
	let Some(event) = state.sub_events.get_mut(&event_id) else {
		return StatusCode::NOT_FOUND.into_response();
	};
	if event.creator_id != user_id {
		return StatusCode::FORBIDDEN.into_response();
	}
	event.world_name = form.world_name;
	event.parcel_id = ParcelId(form.parcel_id);
	event.title = form.title;
	event.description = form.description;
	event.start_time = Timestamp(form.start_time);
	event.end_time = Timestamp(form.end_time);
	event.state = if form.published { sub_event::EventState::Published } else { sub_event::EventState::Draft };
	event.last_modified_time = now;
	state.mark_sub_event_dirty(event_id);
	state.set_user_web_message(user_id, "Event updated.");
	(StatusCode::FOUND, [(header::LOCATION, format!("/event/{id}"))]).into_response()
}

#[instrument(skip(app))]
async fn get_photo(State(app): State<SharedApp>, Path(id): Path<u64>) -> Response {
	let state = app.world_state.lock().await;
	let Some(photo) = state.photos.get(&PhotoId(id)) else {
		return StatusCode::NOT_FOUND.into_response();
	};
	Json(json!({
		"id": photo.id.value(),
		"creator_id": photo.creator_id.value(),
		"caption": photo.caption,
		"world_name": photo.world_name,
		"created_time": photo.created_time.day_and_time_string_utc(),
	}))
	.into_response()
}

async fn serve_photo_file(app: &SharedApp, id: u64, filename: impl Fn(&Photo) -> &str) -> Response {
	let local_filename = {
		let state = app.world_state.lock().await;
		let Some(photo) = state.photos.get(&PhotoId(id)) else {
			return StatusCode::NOT_FOUND.into_response();
		};
		filename(photo).to_string()
	};
	match tokio::fs::read(app.config.resource_dir.join(&local_filename)).await {
		Ok(bytes) => (StatusCode::OK, bytes).into_response(),
		Err(_) => StatusCode::NOT_FOUND.into_response(),
	}
}

#[instrument(skip(app))]
async fn get_photo_midsize_image(State(app): State<SharedApp>, Path(id): Path<u64>) -> Response {
	serve_photo_file(&app, id, |p| &p.local_midsize_filename).await
}

#[instrument(skip(app))]
async fn get_photo_thumb_image(State(app): State<SharedApp>, Path(id): Path<u64>) -> Response {
	serve_photo_file(&app, id, |p| &p.local_thumbnail_filename).await
}

#[instrument(skip(app))]
async fn get_screenshot(State(app): State<SharedApp>, Path(id): Path<u64>) -> Response {
	let state = app.world_state.lock().await;
	let Some(shot) = state.screenshots.get(&ScreenshotId(id)) else {
		return StatusCode::NOT_FOUND.into_response();
	};
	Json(screenshot_json(shot)).into_response()
}

fn screenshot_json(shot: &Screenshot) -> serde_json::Value {
	json!({
		"id": shot.id.value(),
		"is_map_tile": shot.is_map_tile,
		"tile_x": shot.tile_x,
		"tile_y": shot.tile_y,
		"tile_z": shot.tile_z,
		"url": shot.url,
		"state": format!("{:?}", shot.state),
	})
}

/// ERC-721 metadata JSON for a parcel, used by NFT marketplaces
/// that resolve a token's `tokenURI` to this endpoint.
#[instrument(skip(app))]
async fn parcel_erc721_metadata(State(app): State<SharedApp>, Path(parcel_id): Path<u32>) -> Response {
	let state = app.world_state.lock().await;
	let Some((world_name, parcel)) = state
		.worlds
		.iter()
		.find_map(|(name, w)| w.parcels.get(&ParcelId(parcel_id)).map(|p| (name.clone(), p)))
	else {
		return StatusCode::NOT_FOUND.into_response();
	};

	let area_m2 = {
		let aabb = parcel.aabb();
		(aabb.max.x - aabb.min.x) * (aabb.max.y - aabb.min.y)
	};
	let height_m = {
		let aabb = parcel.aabb();
		aabb.max.z - aabb.min.z
	};
	let distance_from_origin_m = {
		let aabb = parcel.aabb();
		let cx = (aabb.min.x + aabb.max.x) / 2.0;
		let cy = (aabb.min.y + aabb.max.y) / 2.0;
		(cx * cx + cy * cy).sqrt()
	};

	Json(json!({
		"name": format!("Parcel #{parcel_id}"),
		"external_url": format!("https://substrata.example/p/{parcel_id}"),
		"image": format!("https://substrata.example/parcel_image/{parcel_id}"),
		"description": parcel.description,
		"attributes": [
			{ "trait_type": "District", "value": world_name },
			{ "display_type": "number", "trait_type": "Area (m^2)", "value": area_m2 },
			{ "display_type": "number", "trait_type": "Height (m)", "value": height_m },
			{ "display_type": "number", "trait_type": "Distance from origin (m)", "value": distance_from_origin_m },
		],
	}))
	.into_response()
}

/// ACME HTTP-01 challenge file server: filenames are restricted
/// to `[A-Za-z0-9_.-]+` to keep this from becoming an arbitrary-file-read.
#[instrument(skip(app))]
async fn acme_challenge(State(app): State<SharedApp>, Path(filename): Path<String>) -> Response {
	if !filename.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-') {
		return StatusCode::BAD_REQUEST.into_response();
	}
	match tokio::fs::read(app.config.acme_challenge_dir.join(&filename)).await {
		Ok(bytes) => (StatusCode::OK, bytes).into_response(),
		Err(_) => StatusCode::NOT_FOUND.into_response(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn session_cookie_header_has_expected_shape() {
		let (name, value) = session_cookie_header(SessionId(0x1234), MAX_AGE_SECS);
		assert_eq!(name, header::SET_COOKIE);
		assert_eq!(
			value,
			format!("site-b=00000000000000000000000000001234; Path=/; Max-Age={MAX_AGE_SECS}; HttpOnly")
		);
	}

	#[test]
	fn read_session_cookie_parses_among_other_cookies() {
		let mut headers = HeaderMap::new();
		headers.insert(header::COOKIE, "foo=bar; site-b=00000000000000000000000000000001; baz=qux".parse().unwrap());
		assert_eq!(read_session_cookie(&headers), Some(SessionId(1)));
	}

	#[test]
	fn read_session_cookie_absent_returns_none() {
		let headers = HeaderMap::new();
		assert_eq!(read_session_cookie(&headers), None);
	}

	#[test]
	fn acme_challenge_filename_validation_rejects_traversal() {
		let valid = "abcDEF123._-";
		let invalid = "../../etc/passwd";
		assert!(valid.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'));
		assert!(!invalid.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'));
	}

	use std::sync::Arc;

	use dashmap::DashMap;
	use substrata_common::{geom::Vec2d, model::parcel::NftStatus};
	use tokio::sync::Mutex as TokioMutex;

	use crate::{app::AppState, dispatcher::Dispatcher};

	fn test_app(store_path: &std::path::Path) -> SharedApp {
		let config = <crate::config::Config as clap::Parser>::parse_from(["substrata-server", "--store-path", store_path.to_str().unwrap()]);
		let state = AllWorldsState::new_with_root_world(UserId(0), Timestamp(0));
		Arc::new(AppState {
			config,
			world_state: TokioMutex::new(state),
			store: TokioMutex::new(substrata_common::store::Store::open(store_path).unwrap()),
			dispatcher: Dispatcher::new(),
			resources: DashMap::new(),
		})
	}

	fn sample_parcel(id: u32, owner_id: UserId) -> Parcel {
		let mut p = Parcel {
			db_key: None,
			id: ParcelId(id),
			owner_id,
			created_time: Timestamp(0),
			description: "original description".into(),
			admin_ids: vec![],
			writer_ids: vec![],
			child_parcel_ids: vec![],
			all_writeable: false,
			verts: [Vec2d::new(0.0, 0.0), Vec2d::new(1.0, 0.0), Vec2d::new(1.0, 1.0), Vec2d::new(0.0, 1.0)],
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

	async fn login_as(app: &SharedApp, user_id: UserId) -> HeaderMap {
		let mut state = app.world_state.lock().await;
		let session = UserWebSession {
			db_key: None,
			id: SessionId::generate(),
			user_id,
			created_time: Timestamp::now(),
		};
		let session_id = session.id;
		state.sessions.insert(session_id, session);
		drop(state);
		let mut headers = HeaderMap::new();
		headers.insert(header::COOKIE, format!("site-b={session_id}").parse().unwrap());
		headers
	}

	#[tokio::test]
	async fn edit_parcel_rejects_non_owner_non_admin() {
		let dir = tempfile::tempdir().unwrap();
		let app = test_app(&dir.path().join("store.bin"));
		{
			let mut state = app.world_state.lock().await;
			state.users.insert(UserId(1), test_user(UserId(1), "owner"));
			state.users.insert(UserId(2), test_user(UserId(2), "stranger"));
			let world = state.get_world_mut("").unwrap();
			world.parcels.insert(ParcelId(1), sample_parcel(1, UserId(1)));
		}
		let headers = login_as(&app, UserId(2)).await;

		let response = edit_parcel(
			State(app.clone()),
			Path(1),
			headers,
			Form(EditParcelForm { description: "hijacked".into() }),
		)
		.await;
		assert_eq!(response.status(), StatusCode::FORBIDDEN);

		let state = app.world_state.lock().await;
		assert_eq!(state.get_world("").unwrap().parcels.get(&ParcelId(1)).unwrap().description, "original description");
	}

	#[tokio::test]
	async fn edit_parcel_allows_owner_and_sets_flash_message() {
		let dir = tempfile::tempdir().unwrap();
		let app = test_app(&dir.path().join("store.bin"));
		{
			let mut state = app.world_state.lock().await;
			state.users.insert(UserId(1), test_user(UserId(1), "owner"));
			let world = state.get_world_mut("").unwrap();
			world.parcels.insert(ParcelId(1), sample_parcel(1, UserId(1)));
		}
		let headers = login_as(&app, UserId(1)).await;

		let response = edit_parcel(
			State(app.clone()),
			Path(1),
			headers,
			Form(EditParcelForm { description: "updated description".into() }),
		)
		.await;
		assert_eq!(response.status(), StatusCode::FOUND);
		assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/parcel/1");

		let mut state = app.world_state.lock().await;
		let world = state.get_world("").unwrap();
		assert_eq!(world.parcels.get(&ParcelId(1)).unwrap().description, "updated description");
		assert!(world.dirty.parcels.contains(&ParcelId(1)));
		assert_eq!(state.take_user_web_message(UserId(1)), Some("Parcel updated.".to_string()));
	}

	#[tokio::test]
	async fn edit_world_rejects_non_owner() {
		let dir = tempfile::tempdir().unwrap();
		let app = test_app(&dir.path().join("store.bin"));
		{
			let mut state = app.world_state.lock().await;
			state.users.insert(UserId(2), test_user(UserId(2), "stranger"));
		}
		let headers = login_as(&app, UserId(2)).await;

		let response = edit_world(
			State(app.clone()),
			Path(String::new()),
			headers,
			Form(EditWorldForm { description: "hijacked".into() }),
		)
		.await;
		assert_eq!(response.status(), StatusCode::FORBIDDEN);
	}

	fn test_user(id: UserId, name: &str) -> User {
		let salt = [1u8; 16];
		User {
			db_key: None,
			id,
			name: name.to_string(),
			email: format!("{name}@example.com"),
			created_time: Timestamp(0),
			password_hash: hash_password(&salt, "password"),
			salt,
			avatar_settings: Vec::new(),
			password_reset: Default::default(),
		}
	}
}
