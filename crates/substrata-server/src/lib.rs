//! Persistent multi-user 3D world server.

pub mod app;
pub mod config;
pub mod connection;
pub mod db_flush;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod reaper;
pub mod resource_service;
pub mod voice_relay;
pub mod web_admin;
