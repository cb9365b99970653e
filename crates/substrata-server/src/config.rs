//! CLI configuration, following
//! `identity_server`'s `clap::Parser` + `env` pattern.

use std::{net::SocketAddr, path::PathBuf};

#[derive(clap::Parser, Debug, Clone)]
#[command(name = "substrata-server", about = "Persistent multi-user 3D world server")]
pub struct Config {
	/// Path to the persistent object store file.
	#[arg(long, env, default_value = "substrata.store")]
	pub store_path: PathBuf,

	/// Root directory resources are served from and uploaded into.
	#[arg(long, env, default_value = "resources")]
	pub resource_dir: PathBuf,

	/// Directory of static public files for the web admin surface.
	#[arg(long, env, default_value = "public")]
	pub public_dir: PathBuf,

	/// Directory ACME HTTP-01 challenge files are read from.
	#[arg(long, env, default_value = "acme-challenge")]
	pub acme_challenge_dir: PathBuf,

	/// Directory the screenshot bot writes map tiles and parcel shots into.
	#[arg(long, env, default_value = "screenshots")]
	pub screenshot_dir: PathBuf,

	/// TLS certificate, PEM-encoded. Omit to serve plain HTTP (dev only).
	#[arg(long, env)]
	pub tls_cert_path: Option<PathBuf>,

	/// TLS private key, PEM-encoded.
	#[arg(long, env)]
	pub tls_key_path: Option<PathBuf>,

	/// SMTP server used to send password-reset emails.
	#[arg(long, env)]
	pub smtp_host: Option<String>,
	#[arg(long, env)]
	pub smtp_username: Option<String>,
	#[arg(long, env)]
	pub smtp_password: Option<String>,

	/// Address the client TCP protocol listens on.
	#[arg(long, env, default_value = "[::]:7600")]
	pub client_bind_addr: SocketAddr,

	/// Address the resource/web-admin HTTP service listens on.
	#[arg(long, env, default_value = "[::]:7601")]
	pub http_bind_addr: SocketAddr,

	/// Address the voice relay's UDP socket listens on.
	#[arg(long, env, default_value = "[::]:7602")]
	pub voice_bind_addr: SocketAddr,

	/// How often the DB flush task writes dirty entities, in seconds.
	#[arg(long, env, default_value_t = 5)]
	pub db_flush_interval_secs: u64,

	/// How often the reaper drains dead objects, in seconds.
	#[arg(long, env, default_value_t = 10)]
	pub reaper_interval_secs: u64,
}
