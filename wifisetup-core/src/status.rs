//! Translation of raw `ap_status` codes into semantic outcomes.

use std::fmt;

/// Semantic connection status, from the device's 0..=5 status enum.
///
/// Codes outside the known range stay visible as `Unrecognized` so a
/// firmware mismatch is diagnosable instead of being coerced into one of
/// the known outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiStatus {
    Idle,
    Connecting,
    WrongPassword,
    ApNotFound,
    ConnectFailed,
    GotIp,
    Unrecognized(i64),
}

impl WifiStatus {
    /// Pure mapping, no side effects, total over all codes.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => WifiStatus::Idle,
            1 => WifiStatus::Connecting,
            2 => WifiStatus::WrongPassword,
            3 => WifiStatus::ApNotFound,
            4 => WifiStatus::ConnectFailed,
            5 => WifiStatus::GotIp,
            other => WifiStatus::Unrecognized(other),
        }
    }
}

impl fmt::Display for WifiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WifiStatus::Idle => write!(f, "idle"),
            WifiStatus::Connecting => write!(f, "connecting"),
            WifiStatus::WrongPassword => write!(f, "wrong password"),
            WifiStatus::ApNotFound => write!(f, "access point not found"),
            WifiStatus::ConnectFailed => write!(f, "connect failed"),
            WifiStatus::GotIp => write!(f, "got IP address"),
            WifiStatus::Unrecognized(code) => write!(f, "unrecognized status {code}"),
        }
    }
}
