//! Core library for the Wi-Fi provisioning workflow engine.
//! This crate drives the scan -> select -> store credentials -> connect ->
//! poll-status sequence against a headless device that exposes the
//! hex-JSON RPC surface, and keeps the per-SSID parameter store in sync
//! with the device's own remembered-network table.
//! Rendering is out of scope: a UI layer only invokes the engine's
//! operations and subscribes to its session events.

pub mod backends;
pub mod catalog;
pub mod config;
pub mod protocol;
pub mod session;
pub mod status;
pub mod store;
pub mod traits;

pub use catalog::NetworkCatalog;
pub use config::EngineConfig;
pub use protocol::{AuthMode, Ifconfig, NetworkInfo, NetworkParams, Request};
pub use session::{FailureReason, Phase, ProvisioningEngine, SessionEvent, SessionOutcome};
pub use status::WifiStatus;
pub use store::{ParamStore, ParamsUpdate};

// Define a shared Error and Result type for the entire crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The network call itself failed (connectivity, timeout, ...).
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Invalid JSON in device reply: {0}")]
    Json(#[from] serde_json::Error),

    /// The device returned a well-formed error envelope.
    #[error("Device rejected the request: {0}")]
    DeviceRejected(String),

    /// The device reply had an unexpected shape.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("A provisioning session for '{0}' is already active")]
    SessionActive(String),

    #[error("No active provisioning session")]
    NoSession,

    /// The SSID is not present in the last scan.
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Invalid engine config: {0}")]
    Config(#[from] toml::de::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

/// A specialized `Result` type for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;
