//! Configuration loading: a TOML file (`ConfigFile`) with a handful of
//! environment-variable overrides, in the teacher's layered-config style —
//! the file is the base layer, environment variables win when set.
//!
//! This crate also owns the [`RelayInfo`] document served on the NIP-11
//! endpoint and the mapping from a configured `query_cache` field name to
//! one of [`relay_dag`]'s registered extractor functions.

mod extractors;

use std::env;

use camino::Utf8PathBuf;
use eyre::{Result as EyreResult, WrapErr};
use serde::{Deserialize, Serialize};

pub use extractors::build_extractors;

pub const CONFIG_FILE: &str = "relay.toml";

/// Per-connection dispatch strategy (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Every `EVENT` is routed to a single universal handler.
    Unlimited,
    /// `EVENT`s are routed by kind to a registered per-kind handler;
    /// unrecognized kinds are rejected.
    Smart,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Unlimited
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ConfigFile {
    /// Base TCP port for the websocket/HTTP listener.
    pub port: u16,
    /// Whether a bind conflict on `port` should probe subsequent ports.
    /// Off by default — see SPEC_FULL §9: convenient in development,
    /// surprising in production.
    pub probe_port: bool,
    pub mode: Mode,
    /// `bucket_name -> field_name`, resolved at startup into a
    /// [`relay_dag::CacheExtractors`] registry via [`build_extractors`].
    pub query_cache: std::collections::HashMap<String, String>,
    pub relay_name: String,
    pub relay_description: String,
    pub relay_pubkey: String,
    pub relay_contact: String,
    pub relay_software: String,
    pub relay_version: String,
    /// General-event freshness window, in seconds either side of now.
    pub event_freshness_secs: i64,
    /// AUTH-event freshness window, in seconds either side of now.
    pub auth_freshness_secs: i64,
    /// RocksDB storage directory.
    pub data_dir: Utf8PathBuf,
    /// `tracing_subscriber::EnvFilter` directive string, e.g.
    /// `"relayd=info,relay_protocol=debug"`.
    pub log: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            port: 7777,
            probe_port: false,
            mode: Mode::default(),
            query_cache: std::collections::HashMap::new(),
            relay_name: "relay".to_string(),
            relay_description: String::new(),
            relay_pubkey: String::new(),
            relay_contact: String::new(),
            relay_software: "relayd".to_string(),
            relay_version: env!("CARGO_PKG_VERSION").to_string(),
            event_freshness_secs: 5 * 60,
            auth_freshness_secs: 10 * 60,
            data_dir: Utf8PathBuf::from("./data"),
            log: "relayd=info,relay_protocol=info".to_string(),
        }
    }
}

impl ConfigFile {
    /// Load from `path`, then apply the supported environment overrides.
    /// Missing file is not an error — the defaults (plus env overrides)
    /// stand in, matching the teacher's init-with-sensible-defaults style.
    pub fn load(path: &camino::Utf8Path) -> EyreResult<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).wrap_err_with(|| format!("reading {path}"))?;
            toml::from_str(&raw).wrap_err_with(|| format!("parsing {path}"))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = env::var("RELAY_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        if let Ok(mode) = env::var("RELAY_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "unlimited" => self.mode = Mode::Unlimited,
                "smart" => self.mode = Mode::Smart,
                _ => {}
            }
        }
        if let Ok(dir) = env::var("RELAY_DATA_DIR") {
            self.data_dir = Utf8PathBuf::from(dir);
        }
        if let Ok(log) = env::var("RUST_LOG") {
            if !log.trim().is_empty() {
                self.log = log;
            }
        }
    }
}

/// The NIP-11-style document served on `GET /` with
/// `Accept: application/nostr+json` (§4.8, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayInfo {
    pub name: String,
    pub description: String,
    pub pubkey: String,
    pub contact: String,
    pub supported_nips: Vec<u32>,
    pub software: String,
    pub version: String,
}

impl From<&ConfigFile> for RelayInfo {
    fn from(config: &ConfigFile) -> Self {
        Self {
            name: config.relay_name.clone(),
            description: config.relay_description.clone(),
            pubkey: config.relay_pubkey.clone(),
            contact: config.relay_contact.clone(),
            supported_nips: vec![1, 2, 9, 11, 18, 23, 24, 25, 42, 51, 56, 57],
            software: config.relay_software.clone(),
            version: config.relay_version.clone(),
        }
    }
}
