//! Client wire protocol: length-prefixed frames
//! `{u32 message_id, u32 length, payload[length]}` over TCP, sharing the
//! little-endian/length-prefixed-string primitives the store uses.

use substrata_common::{
	geom::{AxisAngle, Vec3d},
	ids::{UserId, WorldObjectUid},
	store::{Reader, Writer},
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol identifier sent as the first four bytes of `Hello`; the server
/// checks it against this value before accepting the rest of the handshake.
pub const PROTOCOL_MAGIC: u32 = 0x53425054; // "SBPT"
pub const PROTOCOL_VERSION: u32 = 1;

/// A single frame may not exceed this many bytes of payload; larger
/// declared lengths are a framing error.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
	#[error("connection closed")]
	Closed,
	#[error("frame of {0} bytes exceeds the maximum of {MAX_FRAME_LEN}")]
	Oversize(u32),
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Malformed(#[from] substrata_common::error::StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
	Hello { magic: u32, protocol_version: u32 },
	ClientInfo { session_cookie: Option<String>, username: String, password: String },
	CreateObject { model_url: String, pos: Vec3d, rot: AxisAngle },
	UpdateObject { uid: WorldObjectUid, pos: Vec3d, rot: AxisAngle },
	DestroyObject { uid: WorldObjectUid },
	AvatarUpdate { pos: Vec3d, rot: AxisAngle },
	ChatMessage { text: String },
	ResourceUploadBegin { url: String, size: u64 },
	ResourceUploadChunk { bytes: Vec<u8> },
	ResourceUploadEnd,
	VoicePacket { opus_payload: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
	HelloResponse { ok: bool, server_protocol_version: u32 },
	ClientInfoResponse { avatar_id: substrata_common::ids::ClientAvatarId },
	Error { code: u32, message: String },
	ObjectCreated { uid: WorldObjectUid, owner_id: UserId, model_url: String, pos: Vec3d, rot: AxisAngle },
	ObjectUpdated { uid: WorldObjectUid, pos: Vec3d, rot: AxisAngle },
	ObjectDestroyed { uid: WorldObjectUid },
	AvatarUpdated { avatar_id: substrata_common::ids::ClientAvatarId, pos: Vec3d, rot: AxisAngle },
	AvatarDead { avatar_id: substrata_common::ids::ClientAvatarId },
	ChatBroadcast { sender: substrata_common::ids::ClientAvatarId, text: String },
}

mod ids {
	pub const HELLO: u32 = 0;
	pub const HELLO_RESPONSE: u32 = 1;
	pub const CLIENT_INFO: u32 = 2;
	pub const CLIENT_INFO_RESPONSE: u32 = 3;
	pub const CREATE_OBJECT: u32 = 10;
	pub const UPDATE_OBJECT: u32 = 11;
	pub const DESTROY_OBJECT: u32 = 12;
	pub const AVATAR_UPDATE: u32 = 13;
	pub const CHAT_MESSAGE: u32 = 14;
	pub const RESOURCE_UPLOAD_BEGIN: u32 = 15;
	pub const RESOURCE_UPLOAD_CHUNK: u32 = 16;
	pub const RESOURCE_UPLOAD_END: u32 = 17;
	pub const VOICE_PACKET: u32 = 18;
	pub const ERROR: u32 = 19;
	pub const OBJECT_CREATED: u32 = 20;
	pub const OBJECT_UPDATED: u32 = 21;
	pub const OBJECT_DESTROYED: u32 = 22;
	pub const AVATAR_UPDATED: u32 = 23;
	pub const AVATAR_DEAD: u32 = 24;
	pub const CHAT_BROADCAST: u32 = 25;
}

fn write_vec3(w: &mut Writer, v: Vec3d) {
	w.write_f64(v.x);
	w.write_f64(v.y);
	w.write_f64(v.z);
}

fn read_vec3(r: &mut Reader) -> Result<Vec3d, substrata_common::error::StoreError> {
	Ok(Vec3d::new(r.read_f64()?, r.read_f64()?, r.read_f64()?))
}

fn write_axis_angle(w: &mut Writer, a: AxisAngle) {
	write_vec3(w, a.axis);
	w.write_f64(a.angle);
}

fn read_axis_angle(r: &mut Reader) -> Result<AxisAngle, substrata_common::error::StoreError> {
	Ok(AxisAngle {
		axis: read_vec3(r)?,
		angle: r.read_f64()?,
	})
}

impl ClientMessage {
	fn message_id(&self) -> u32 {
		use ids::*;
		match self {
			ClientMessage::Hello { .. } => HELLO,
			ClientMessage::ClientInfo { .. } => CLIENT_INFO,
			ClientMessage::CreateObject { .. } => CREATE_OBJECT,
			ClientMessage::UpdateObject { .. } => UPDATE_OBJECT,
			ClientMessage::DestroyObject { .. } => DESTROY_OBJECT,
			ClientMessage::AvatarUpdate { .. } => AVATAR_UPDATE,
			ClientMessage::ChatMessage { .. } => CHAT_MESSAGE,
			ClientMessage::ResourceUploadBegin { .. } => RESOURCE_UPLOAD_BEGIN,
			ClientMessage::ResourceUploadChunk { .. } => RESOURCE_UPLOAD_CHUNK,
			ClientMessage::ResourceUploadEnd => RESOURCE_UPLOAD_END,
			ClientMessage::VoicePacket { .. } => VOICE_PACKET,
		}
	}

	fn encode_payload(&self, w: &mut Writer) {
		match self {
			ClientMessage::Hello { magic, protocol_version } => {
				w.write_u32(*magic);
				w.write_u32(*protocol_version);
			}
			ClientMessage::ClientInfo { session_cookie, username, password } => {
				match session_cookie {
					Some(c) => {
						w.write_bool(true);
						w.write_string(c);
					}
					None => w.write_bool(false),
				}
				w.write_string(username);
				w.write_string(password);
			}
			ClientMessage::CreateObject { model_url, pos, rot } => {
				w.write_string(model_url);
				write_vec3(w, *pos);
				write_axis_angle(w, *rot);
			}
			ClientMessage::UpdateObject { uid, pos, rot } => {
				w.write_u64(uid.value());
				write_vec3(w, *pos);
				write_axis_angle(w, *rot);
			}
			ClientMessage::DestroyObject { uid } => w.write_u64(uid.value()),
			ClientMessage::AvatarUpdate { pos, rot } => {
				write_vec3(w, *pos);
				write_axis_angle(w, *rot);
			}
			ClientMessage::ChatMessage { text } => w.write_string(text),
			ClientMessage::ResourceUploadBegin { url, size } => {
				w.write_string(url);
				w.write_u64(*size);
			}
			ClientMessage::ResourceUploadChunk { bytes } => w.write_bytes(bytes),
			ClientMessage::ResourceUploadEnd => {}
			ClientMessage::VoicePacket { opus_payload } => w.write_bytes(opus_payload),
		}
	}

	pub fn encode(&self) -> Vec<u8> {
		let mut w = Writer::new();
		self.encode_payload(&mut w);
		w.into_bytes()
	}

	fn decode(message_id: u32, r: &mut Reader) -> Result<Self, FrameError> {
		use ids::*;
		Ok(match message_id {
			HELLO => ClientMessage::Hello {
				magic: r.read_u32()?,
				protocol_version: r.read_u32()?,
			},
			CLIENT_INFO => {
				let session_cookie = if r.read_bool()? { Some(r.read_string()?) } else { None };
				ClientMessage::ClientInfo {
					session_cookie,
					username: r.read_string()?,
					password: r.read_string()?,
				}
			}
			CREATE_OBJECT => ClientMessage::CreateObject {
				model_url: r.read_string()?,
				pos: read_vec3(r)?,
				rot: read_axis_angle(r)?,
			},
			UPDATE_OBJECT => ClientMessage::UpdateObject {
				uid: WorldObjectUid(r.read_u64()?),
				pos: read_vec3(r)?,
				rot: read_axis_angle(r)?,
			},
			DESTROY_OBJECT => ClientMessage::DestroyObject {
				uid: WorldObjectUid(r.read_u64()?),
			},
			AVATAR_UPDATE => ClientMessage::AvatarUpdate {
				pos: read_vec3(r)?,
				rot: read_axis_angle(r)?,
			},
			CHAT_MESSAGE => ClientMessage::ChatMessage { text: r.read_string()? },
			RESOURCE_UPLOAD_BEGIN => ClientMessage::ResourceUploadBegin {
				url: r.read_string()?,
				size: r.read_u64()?,
			},
			RESOURCE_UPLOAD_CHUNK => ClientMessage::ResourceUploadChunk { bytes: r.read_bytes()? },
			RESOURCE_UPLOAD_END => ClientMessage::ResourceUploadEnd,
			VOICE_PACKET => ClientMessage::VoicePacket { opus_payload: r.read_bytes()? },
			other => return Err(FrameError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, format!("unknown message id {other}")))),
		})
	}
}

impl ServerMessage {
	fn message_id(&self) -> u32 {
		use ids::*;
		match self {
			ServerMessage::HelloResponse { .. } => HELLO_RESPONSE,
			ServerMessage::ClientInfoResponse { .. } => CLIENT_INFO_RESPONSE,
			ServerMessage::Error { .. } => ERROR,
			ServerMessage::ObjectCreated { .. } => OBJECT_CREATED,
			ServerMessage::ObjectUpdated { .. } => OBJECT_UPDATED,
			ServerMessage::ObjectDestroyed { .. } => OBJECT_DESTROYED,
			ServerMessage::AvatarUpdated { .. } => AVATAR_UPDATED,
			ServerMessage::AvatarDead { .. } => AVATAR_DEAD,
			ServerMessage::ChatBroadcast { .. } => CHAT_BROADCAST,
		}
	}

	fn encode_payload(&self, w: &mut Writer) {
		match self {
			ServerMessage::HelloResponse { ok, server_protocol_version } => {
				w.write_bool(*ok);
				w.write_u32(*server_protocol_version);
			}
			ServerMessage::ClientInfoResponse { avatar_id } => w.write_u64(avatar_id.value()),
			ServerMessage::Error { code, message } => {
				w.write_u32(*code);
				w.write_string(message);
			}
			ServerMessage::ObjectCreated { uid, owner_id, model_url, pos, rot } => {
				w.write_u64(uid.value());
				w.write_u32(owner_id.value());
				w.write_string(model_url);
				write_vec3(w, *pos);
				write_axis_angle(w, *rot);
			}
			ServerMessage::ObjectUpdated { uid, pos, rot } => {
				w.write_u64(uid.value());
				write_vec3(w, *pos);
				write_axis_angle(w, *rot);
			}
			ServerMessage::ObjectDestroyed { uid } => w.write_u64(uid.value()),
			ServerMessage::AvatarUpdated { avatar_id, pos, rot } => {
				w.write_u64(avatar_id.value());
				write_vec3(w, *pos);
				write_axis_angle(w, *rot);
			}
			ServerMessage::AvatarDead { avatar_id } => w.write_u64(avatar_id.value()),
			ServerMessage::ChatBroadcast { sender, text } => {
				w.write_u64(sender.value());
				w.write_string(text);
			}
		}
	}

	pub fn encode(&self) -> Vec<u8> {
		let mut w = Writer::new();
		self.encode_payload(&mut w);
		w.into_bytes()
	}
}

/// Writes one frame: `{u32 message_id, u32 length, payload}`.
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, message_id: u32, payload: &[u8]) -> Result<(), FrameError> {
	w.write_u32_le(message_id).await?;
	w.write_u32_le(payload.len() as u32).await?;
	w.write_all(payload).await?;
	Ok(())
}

pub async fn write_client_message<W: AsyncWrite + Unpin>(w: &mut W, msg: &ClientMessage) -> Result<(), FrameError> {
	write_frame(w, msg.message_id(), &msg.encode()).await
}

pub async fn write_server_message<W: AsyncWrite + Unpin>(w: &mut W, msg: &ServerMessage) -> Result<(), FrameError> {
	write_frame(w, msg.message_id(), &msg.encode()).await
}

/// Reads one frame's header and payload, rejecting an oversize declared
/// length before allocating a buffer for it.
async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<(u32, Vec<u8>), FrameError> {
	let message_id = match r.read_u32_le().await {
		Ok(v) => v,
		Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
		Err(e) => return Err(e.into()),
	};
	let length = r.read_u32_le().await?;
	if length > MAX_FRAME_LEN {
		return Err(FrameError::Oversize(length));
	}
	let mut payload = vec![0u8; length as usize];
	r.read_exact(&mut payload).await?;
	Ok((message_id, payload))
}

pub async fn read_client_message<R: AsyncRead + Unpin>(r: &mut R) -> Result<ClientMessage, FrameError> {
	let (message_id, payload) = read_frame(r).await?;
	let mut reader = Reader::new(&payload);
	ClientMessage::decode(message_id, &mut reader)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn hello_round_trips_over_an_in_memory_pipe() {
		let (mut client, mut server) = tokio::io::duplex(4096);
		let msg = ClientMessage::Hello {
			magic: PROTOCOL_MAGIC,
			protocol_version: PROTOCOL_VERSION,
		};
		write_client_message(&mut client, &msg).await.unwrap();
		let decoded = read_client_message(&mut server).await.unwrap();
		assert_eq!(decoded, msg);
	}

	#[tokio::test]
	async fn create_object_round_trips() {
		let (mut client, mut server) = tokio::io::duplex(4096);
		let msg = ClientMessage::CreateObject {
			model_url: "abc.glb".into(),
			pos: Vec3d::new(1.0, 2.0, 3.0),
			rot: AxisAngle {
				axis: Vec3d::new(0.0, 1.0, 0.0),
				angle: 0.5,
			},
		};
		write_client_message(&mut client, &msg).await.unwrap();
		let decoded = read_client_message(&mut server).await.unwrap();
		assert_eq!(decoded, msg);
	}

	#[tokio::test]
	async fn oversize_frame_is_rejected() {
		let (mut client, mut server) = tokio::io::duplex(4096);
		client.write_u32_le(ids::CHAT_MESSAGE).await.unwrap();
		client.write_u32_le(MAX_FRAME_LEN + 1).await.unwrap();
		drop(client); // never need to write the (huge) payload
		let err = read_client_message(&mut server).await.unwrap_err();
		assert!(matches!(err, FrameError::Oversize(_)));
	}

	#[tokio::test]
	async fn closed_connection_before_any_header_is_reported_distinctly() {
		let (client, mut server) = tokio::io::duplex(4096);
		drop(client);
		let err = read_client_message(&mut server).await.unwrap_err();
		assert!(matches!(err, FrameError::Closed));
	}

	#[test]
	fn server_message_round_trips_through_writer_reader_directly() {
		let msg = ServerMessage::ChatBroadcast {
			sender: substrata_common::ids::ClientAvatarId(7),
			text: "hi".into(),
		};
		let payload = msg.encode();
		let mut r = Reader::new(&payload);
		assert_eq!(r.read_u64().unwrap(), 7);
		assert_eq!(r.read_string().unwrap(), "hi");
	}
}
