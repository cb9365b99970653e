//! A server-owned avatar with scripted behaviour.
//! Like [`super::avatar::Avatar`], not a persisted store record: its
//! definition lives in world configuration and it is recreated on server
//! start, referencing its `Avatar` only through the world's map (never an
//! owning handle), since the bot and its avatar would otherwise reference
//! each other.

use serde::{Deserialize, Serialize};

use crate::ids::{ChatBotId, ClientAvatarId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatBot {
	pub id: ChatBotId,
	pub avatar_id: ClientAvatarId,
	pub name: String,
	pub llm_prompt: String,
}
