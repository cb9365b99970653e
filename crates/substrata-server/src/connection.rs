//! Connection handler: owns one client socket and drives the
//! protocol state machine (`AwaitingHello` -> `AwaitingClientInfo` ->
//! `InWorld`, with `Streaming` multiplexed in and `Closing` as the
//! teardown path). Grounded in the shape of
//! `replicate-server::chad::handle_connection`'s accept-then-loop structure,
//! adapted from its framed-message-per-iteration style to this protocol.

use std::time::Duration;

use substrata_common::{
	error::DomainError,
	ids::{ClientAvatarId, UserId, WorldObjectUid},
	model::{avatar::Avatar, world_object::WorldObject},
	timestamp::Timestamp,
};
use tokio::{
	io::{AsyncWriteExt, BufReader},
	net::TcpStream,
};
use tracing::{info, instrument, warn};

use crate::{
	app::SharedApp,
	dispatcher::{Event, Subscription},
	protocol::{read_client_message, write_server_message, ClientMessage, FrameError, ServerMessage, PROTOCOL_MAGIC, PROTOCOL_VERSION},
};

/// How often an `InWorld` connection polls its dispatcher subscription for
/// queued broadcasts, interleaved with reading the next client frame.
const BROADCAST_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Maximum bytes of a single resource upload this server accepts.
const MAX_UPLOAD_SIZE: u64 = 512 * 1024 * 1024;

struct UploadState {
	url: String,
	tmp_path: std::path::PathBuf,
	file: tokio::fs::File,
	expected_size: u64,
	written: u64,
}

#[instrument(skip(app, socket), fields(peer = %peer_addr))]
pub async fn handle_connection(app: SharedApp, socket: TcpStream, peer_addr: std::net::SocketAddr) {
	if let Err(err) = run(app, socket).await {
		warn!(%err, "connection terminated with error");
	} else {
		info!("connection closed");
	}
}

async fn run(app: SharedApp, socket: TcpStream) -> Result<(), FrameError> {
	let (read_half, mut write_half) = socket.into_split();
	let mut reader = BufReader::new(read_half);

	// AwaitingHello
	let msg = read_client_message(&mut reader).await?;
	let ClientMessage::Hello { magic, protocol_version } = msg else {
		write_server_message(&mut write_half, &ServerMessage::Error { code: 1, message: "expected Hello".into() }).await?;
		return Ok(());
	};
	if magic != PROTOCOL_MAGIC || protocol_version != PROTOCOL_VERSION {
		write_server_message(
			&mut write_half,
			&ServerMessage::HelloResponse {
				ok: false,
				server_protocol_version: PROTOCOL_VERSION,
			},
		)
		.await?;
		return Ok(());
	}
	write_server_message(
		&mut write_half,
		&ServerMessage::HelloResponse {
			ok: true,
			server_protocol_version: PROTOCOL_VERSION,
		},
	)
	.await?;

	// AwaitingClientInfo
	let msg = read_client_message(&mut reader).await?;
	let ClientMessage::ClientInfo { session_cookie, username, password } = msg else {
		write_server_message(&mut write_half, &ServerMessage::Error { code: 2, message: "expected ClientInfo".into() }).await?;
		return Ok(());
	};

	let now = Timestamp::now();
	let user_id = {
		let state = app.world_state.lock().await;
		authenticate(&state, session_cookie.as_deref(), &username, &password, now)
	};
	let Some(user_id) = user_id else {
		write_server_message(&mut write_half, &ServerMessage::Error { code: 3, message: "authentication failed".into() }).await?;
		return Ok(());
	};

	let world_name = substrata_common::model::all_worlds_state::ROOT_WORLD_NAME.to_string();
	let avatar_id = {
		let mut state = app.world_state.lock().await;
		let world = state.get_world_mut(&world_name).expect("root world always exists");
		let avatar_id = ClientAvatarId(next_avatar_id());
		world.avatars.insert(
			avatar_id,
			Avatar {
				id: avatar_id,
				owner_id: user_id,
				pos: Default::default(),
				rot: Default::default(),
				name: username.clone(),
			},
		);
		avatar_id
	};
	write_server_message(&mut write_half, &ServerMessage::ClientInfoResponse { avatar_id }).await?;

	let subscription = app.dispatcher.subscribe(&world_name);

	// InWorld (with Streaming multiplexed in via `upload`).
	let result = in_world_loop(&app, &mut reader, &mut write_half, &world_name, user_id, avatar_id, &subscription).await;

	// Closing: unsubscribe (via Subscription::drop), remove avatar, broadcast death.
	{
		let mut state = app.world_state.lock().await;
		if let Some(world) = state.get_world_mut(&world_name) {
			world.avatars.remove(&avatar_id);
		}
	}
	app.dispatcher.publish(&world_name, Event::AvatarDead { avatar_id });

	result
}

#[allow(clippy::too_many_arguments)]
async fn in_world_loop<R, W>(
	app: &SharedApp,
	reader: &mut R,
	writer: &mut W,
	world_name: &str,
	user_id: UserId,
	avatar_id: ClientAvatarId,
	subscription: &Subscription,
) -> Result<(), FrameError>
where
	R: tokio::io::AsyncRead + Unpin,
	W: tokio::io::AsyncWrite + Unpin,
{
	let mut upload: Option<UploadState> = None;
	let mut poll_interval = tokio::time::interval(BROADCAST_POLL_INTERVAL);

	loop {
		tokio::select! {
			biased;

			msg = read_client_message(reader) => {
				let msg = match msg {
					Ok(m) => m,
					Err(FrameError::Closed) => return Ok(()),
					Err(e) => return Err(e),
				};
				if let Some(response) = handle_inbound(app, world_name, user_id, avatar_id, msg, &mut upload).await? {
					write_server_message(writer, &response).await?;
				}
			}

			_ = poll_interval.tick() => {
				while let Some(event) = subscription.handle.try_recv() {
					if let Some(out) = translate_event(event) {
						write_server_message(writer, &out).await?;
					}
				}
			}
		}
	}
}

async fn handle_inbound(
	app: &SharedApp,
	world_name: &str,
	user_id: UserId,
	avatar_id: ClientAvatarId,
	msg: ClientMessage,
	upload: &mut Option<UploadState>,
) -> Result<Option<ServerMessage>, FrameError> {
	match msg {
		ClientMessage::CreateObject { model_url, pos, rot } => {
			let aabb = substrata_common::geom::Aabb { min: pos, max: pos };
			let allowed = {
				let state = app.world_state.lock().await;
				state.user_may_modify_object_at(world_name, user_id, &aabb)
			};
			if !allowed {
				return Ok(Some(error_message(&DomainError::NotAuthorized)));
			}
			let now = Timestamp::now();
			let uid = WorldObjectUid(next_object_id());
			let object = WorldObject {
				db_key: None,
				uid,
				model_url: model_url.clone(),
				mats: vec![],
				pos,
				rot,
				scale: substrata_common::geom::Vec3d::new(1.0, 1.0, 1.0),
				aabb,
				voxel_blob: None,
				script_source: None,
				owner_id: user_id,
				creator_id: user_id,
				created_time: now,
				last_modified_time: now,
				lod_bias: 0.0,
				flags: substrata_common::model::world_object::ObjectFlags::COLLIDABLE,
				content_hash: [0; 32],
				state: substrata_common::model::world_object::ObjectState::JustCreated,
				from_remote_dirty: false,
				from_local_dirty: true,
			};
			{
				let mut state = app.world_state.lock().await;
				let world = state.get_world_mut(world_name).expect("world exists");
				world.upsert_object(object, now);
			}
			app.dispatcher.publish(
				world_name,
				Event::ObjectUpdated {
					uid,
					msg: ServerMessage::ObjectCreated { uid, owner_id: user_id, model_url, pos, rot },
				},
			);
			Ok(None)
		}

		ClientMessage::UpdateObject { uid, pos, rot } => {
			let aabb = substrata_common::geom::Aabb { min: pos, max: pos };
			let (old_aabb, owner) = {
				let state = app.world_state.lock().await;
				let Some(world) = state.get_world(world_name) else {
					return Ok(Some(error_message(&DomainError::WorldNotFound(world_name.to_string()))));
				};
				let Some(existing) = world.get_object(uid) else {
					return Ok(Some(error_message(&DomainError::ObjectNotFound(uid))));
				};
				(existing.aabb, existing.owner_id)
			};
			let allowed = {
				let state = app.world_state.lock().await;
				owner == user_id && state.user_may_modify_object_at(world_name, user_id, &old_aabb) && state.user_may_modify_object_at(world_name, user_id, &aabb)
			};
			if !allowed {
				return Ok(Some(error_message(&DomainError::NotAuthorized)));
			}
			let now = Timestamp::now();
			{
				let mut state = app.world_state.lock().await;
				let world = state.get_world_mut(world_name).expect("world exists");
				if let Some(obj) = world.objects.get_mut(&uid) {
					obj.pos = pos;
					obj.rot = rot;
					obj.aabb = aabb;
					obj.last_modified_time = now;
					obj.from_local_dirty = true;
					world.dirty.objects.insert(uid);
				}
			}
			app.dispatcher.publish(world_name, Event::ObjectUpdated { uid, msg: ServerMessage::ObjectUpdated { uid, pos, rot } });
			Ok(None)
		}

		ClientMessage::DestroyObject { uid } => {
			let (aabb, owner) = {
				let state = app.world_state.lock().await;
				let Some(world) = state.get_world(world_name) else {
					return Ok(Some(error_message(&DomainError::WorldNotFound(world_name.to_string()))));
				};
				let Some(existing) = world.get_object(uid) else {
					return Ok(Some(error_message(&DomainError::ObjectNotFound(uid))));
				};
				(existing.aabb, existing.owner_id)
			};
			let allowed = {
				let state = app.world_state.lock().await;
				owner == user_id && state.user_may_modify_object_at(world_name, user_id, &aabb)
			};
			if !allowed {
				return Ok(Some(error_message(&DomainError::NotAuthorized)));
			}
			let now = Timestamp::now();
			{
				let mut state = app.world_state.lock().await;
				let world = state.get_world_mut(world_name).expect("world exists");
				world.mark_object_dead(uid, now);
			}
			app.dispatcher.publish(world_name, Event::ObjectDestroyed { uid });
			Ok(None)
		}

		ClientMessage::AvatarUpdate { pos, rot } => {
			{
				let mut state = app.world_state.lock().await;
				if let Some(world) = state.get_world_mut(world_name) {
					if let Some(avatar) = world.avatars.get_mut(&avatar_id) {
						avatar.pos = pos;
						avatar.rot = rot;
					}
				}
			}
			app.dispatcher.publish(world_name, Event::AvatarUpdated { avatar_id, msg: ServerMessage::AvatarUpdated { avatar_id, pos, rot } });
			Ok(None)
		}

		ClientMessage::ChatMessage { text } => {
			const MAX_CHAT_LEN: usize = 2000;
			if text.len() > MAX_CHAT_LEN {
				return Ok(Some(error_message(&DomainError::Validation("chat message too long".into()))));
			}
			app.dispatcher.publish(world_name, Event::Chat { sender: avatar_id, text: text.clone() });
			Ok(None)
		}

		ClientMessage::ResourceUploadBegin { url, size } => {
			if size > MAX_UPLOAD_SIZE {
				return Ok(Some(error_message(&DomainError::Validation("resource exceeds upload quota".into()))));
			}
			let tmp_path = app.config.resource_dir.join("tmp").join(sanitize_component(&url));
			if let Some(parent) = tmp_path.parent() {
				tokio::fs::create_dir_all(parent).await.map_err(FrameError::Io)?;
			}
			let file = tokio::fs::File::create(&tmp_path).await.map_err(FrameError::Io)?;
			app.resources.insert(
				url.clone(),
				substrata_common::model::resource::Resource {
					url: url.clone(),
					local_path: String::new(),
					owner_id: user_id,
					state: substrata_common::model::resource::ResourceState::Transferring,
					file_size: 0,
					external_resource: false,
				},
			);
			*upload = Some(UploadState {
				url,
				tmp_path,
				file,
				expected_size: size,
				written: 0,
			});
			Ok(None)
		}

		ClientMessage::ResourceUploadChunk { bytes } => {
			let Some(state) = upload.as_mut() else {
				return Ok(Some(error_message(&DomainError::Validation("no upload in progress".into()))));
			};
			state.file.write_all(&bytes).await.map_err(FrameError::Io)?;
			state.written += bytes.len() as u64;
			Ok(None)
		}

		ClientMessage::ResourceUploadEnd => {
			let Some(state) = upload.take() else {
				return Ok(Some(error_message(&DomainError::Validation("no upload in progress".into()))));
			};
			if state.written != state.expected_size {
				// cancellation path: discard partial file, do not mark Present
				let _ = tokio::fs::remove_file(&state.tmp_path).await;
				app.resources.remove(&state.url);
				return Ok(Some(error_message(&DomainError::Validation("upload size mismatch".into()))));
			}
			let final_path = app.config.resource_dir.join(sanitize_component(&state.url));
			tokio::fs::rename(&state.tmp_path, &final_path).await.map_err(FrameError::Io)?;
			if let Some(mut entry) = app.resources.get_mut(&state.url) {
				entry.state = substrata_common::model::resource::ResourceState::Present;
				entry.local_path = sanitize_component(&state.url);
				entry.file_size = state.written;
			}
			Ok(None)
		}

		ClientMessage::VoicePacket { .. } => {
			// Forwarded by the dedicated UDP relay; a voice
			// packet arriving over the TCP connection is simply ignored.
			Ok(None)
		}

		ClientMessage::Hello { .. } | ClientMessage::ClientInfo { .. } => {
			Ok(Some(error_message(&DomainError::Validation("unexpected message in InWorld state".into()))))
		}
	}
}

fn translate_event(event: Event) -> Option<ServerMessage> {
	match event {
		Event::ObjectUpdated { msg, .. } => Some(msg),
		Event::ObjectDestroyed { uid } => Some(ServerMessage::ObjectDestroyed { uid }),
		Event::AvatarUpdated { msg, .. } => Some(msg),
		Event::AvatarDead { avatar_id } => Some(ServerMessage::AvatarDead { avatar_id }),
		Event::Chat { sender, text } => Some(ServerMessage::ChatBroadcast { sender, text }),
		// A real resync would decode-and-resend a full snapshot; plain
		// delivery resumes on the next queued event either way.
		Event::ResyncRequired => None,
	}
}

fn error_message(err: &DomainError) -> ServerMessage {
	ServerMessage::Error {
		code: domain_error_code(err),
		message: err.to_string(),
	}
}

fn domain_error_code(err: &DomainError) -> u32 {
	match err {
		DomainError::NotAuthorized => 100,
		DomainError::ObjectNotFound(_) => 101,
		DomainError::ParcelNotFound(_) => 102,
		DomainError::WorldNotFound(_) => 103,
		DomainError::WorldAlreadyExists(_) => 104,
		DomainError::WorldNameTooLong(_) => 105,
		DomainError::Validation(_) => 106,
		DomainError::ResourceNotFound(_) => 107,
	}
}

fn authenticate(state: &substrata_common::model::all_worlds_state::AllWorldsState, session_cookie: Option<&str>, username: &str, password: &str, now: Timestamp) -> Option<UserId> {
	if let Some(cookie) = session_cookie {
		if let Ok(id) = cookie.parse::<u128>() {
			if let Some(user) = state.session_user(substrata_common::model::user_web_session::SessionId(id), now) {
				return Some(user.id);
			}
		}
		return None;
	}
	let user = state.find_user_by_name(username)?;
	if user.check_password(password) {
		Some(user.id)
	} else {
		None
	}
}

fn sanitize_component(url: &str) -> String {
	url.chars().map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' { c } else { '_' }).collect()
}

fn next_avatar_id() -> u64 {
	use std::sync::atomic::{AtomicU64, Ordering};
	static NEXT: AtomicU64 = AtomicU64::new(1);
	NEXT.fetch_add(1, Ordering::Relaxed)
}

fn next_object_id() -> u64 {
	use std::sync::atomic::{AtomicU64, Ordering};
	static NEXT: AtomicU64 = AtomicU64::new(1);
	NEXT.fetch_add(1, Ordering::Relaxed)
}
