//! Voice relay: a UDP socket that forwards Opus-encoded
//! voice packets verbatim to every other client in the sender's world. No
//! codec work happens here — this is purely packet forwarding, so audio
//! encode/decode lives entirely in `substrata-audio`. Grounded in
//! `replicate-server`'s datagram-relay loop, adapted from its per-room
//! broadcast to a per-world one keyed off the shared `world_state`.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use dashmap::DashMap;
use substrata_common::ids::ClientAvatarId;
use tokio::net::UdpSocket;
use tracing::{instrument, warn};

use crate::app::SharedApp;

const HEADER_LEN: usize = 12;
const PACKET_TYPE_VOICE: u32 = 1;
const MAX_PACKET_LEN: usize = 4096;

/// Maps an avatar to the UDP address its last voice packet arrived from.
/// Populated opportunistically — a client's address is only known once it
/// has sent at least one packet itself.
#[derive(Default)]
struct PeerRegistry(DashMap<ClientAvatarId, SocketAddr>);

#[instrument(skip(app))]
pub async fn run(app: SharedApp) -> std::io::Result<()> {
	let socket = Arc::new(UdpSocket::bind(app.config.voice_bind_addr).await?);
	let registry = Arc::new(PeerRegistry::default());
	let mut buf = [0u8; MAX_PACKET_LEN];

	loop {
		let (len, src) = match socket.recv_from(&mut buf).await {
			Ok(v) => v,
			Err(err) => {
				warn!(%err, "voice relay recv failed");
				continue;
			}
		};
		if let Some((sender, packet)) = parse_packet(&buf[..len]) {
			registry.0.insert(sender, src);
			relay(&app, &socket, &registry, sender, packet).await;
		}
	}
}

fn parse_packet(datagram: &[u8]) -> Option<(ClientAvatarId, &[u8])> {
	if datagram.len() < HEADER_LEN {
		return None;
	}
	let packet_type = u32::from_be_bytes(datagram[0..4].try_into().unwrap());
	if packet_type != PACKET_TYPE_VOICE {
		return None;
	}
	let avatar_uid = u32::from_be_bytes(datagram[4..8].try_into().unwrap()) as u64;
	Some((ClientAvatarId(avatar_uid), datagram))
}

async fn relay(app: &SharedApp, socket: &UdpSocket, registry: &PeerRegistry, sender: ClientAvatarId, packet: &[u8]) {
	let other_avatars: Vec<ClientAvatarId> = {
		let state = app.world_state.lock().await;
		let Some(world) = state.worlds.values().find(|w| w.avatars.contains_key(&sender)) else {
			return;
		};
		world.avatars.keys().copied().filter(|id| *id != sender).collect()
	};

	let addrs: HashMap<ClientAvatarId, SocketAddr> = other_avatars
		.into_iter()
		.filter_map(|id| registry.0.get(&id).map(|addr| (id, *addr)))
		.collect();

	for addr in addrs.values() {
		if let Err(err) = socket.send_to(packet, addr).await {
			warn!(%err, %addr, "voice relay send failed");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_packet_rejects_short_datagrams() {
		assert!(parse_packet(&[0u8; 4]).is_none());
	}

	#[test]
	fn parse_packet_rejects_wrong_type() {
		let mut datagram = vec![0u8; HEADER_LEN];
		datagram[0..4].copy_from_slice(&2u32.to_be_bytes());
		assert!(parse_packet(&datagram).is_none());
	}

	#[test]
	fn parse_packet_extracts_avatar_id() {
		let mut datagram = vec![0u8; HEADER_LEN + 3];
		datagram[0..4].copy_from_slice(&PACKET_TYPE_VOICE.to_be_bytes());
		datagram[4..8].copy_from_slice(&42u32.to_be_bytes());
		let (avatar_id, packet) = parse_packet(&datagram).unwrap();
		assert_eq!(avatar_id, ClientAvatarId(42));
		assert_eq!(packet.len(), HEADER_LEN + 3);
	}
}
