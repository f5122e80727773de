//! Wire types for the device's control API.
//!
//! The device speaks a compact positional dialect: scan results arrive as
//! `[ssid, bssid, channel, rssi, authmode, hidden]` tuples and `ifconfig`
//! as a `[ip, netmask, gw, dns]` 4-tuple. Requests are JSON objects tagged
//! with an `op` field. The decoders here turn those shapes into typed
//! records and classify anything unexpected as a protocol violation.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// A single request to the device, one variant per supported op.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ScanWifi,
    GetWifiParams,
    SetWifiParam { params: NetworkParams },
    ConnectConfiguredWifi { ssid: String },
    Ifconfig,
    ApStatus,
    Reset,
}

impl Request {
    /// The wire name of the op, as it appears in the `op` field.
    pub fn op(&self) -> &'static str {
        match self {
            Request::ScanWifi => "scan_wifi",
            Request::GetWifiParams => "get_wifi_params",
            Request::SetWifiParam { .. } => "set_wifi_param",
            Request::ConnectConfiguredWifi { .. } => "connect_configured_wifi",
            Request::Ifconfig => "ifconfig",
            Request::ApStatus => "ap_status",
            Request::Reset => "reset",
        }
    }
}

/// Authentication mode of an access point, from the device's numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    /// Codes the firmware added after this enum was written.
    Unknown(u64),
}

impl AuthMode {
    pub fn from_code(code: u64) -> Self {
        match code {
            0 => AuthMode::Open,
            1 => AuthMode::Wep,
            2 => AuthMode::WpaPsk,
            3 => AuthMode::Wpa2Psk,
            4 => AuthMode::WpaWpa2Psk,
            other => AuthMode::Unknown(other),
        }
    }

    /// Open networks need no password.
    pub fn is_open(&self) -> bool {
        matches!(self, AuthMode::Open)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Open => write!(f, "Open"),
            AuthMode::Wep => write!(f, "WEP"),
            AuthMode::WpaPsk => write!(f, "WPA PSK"),
            AuthMode::Wpa2Psk => write!(f, "WPA2 PSK"),
            AuthMode::WpaWpa2Psk => write!(f, "WPA/WPA2 PSK"),
            AuthMode::Unknown(code) => write!(f, "Unknown({code})"),
        }
    }
}

/// One Wi-Fi network found during a scan. Ephemeral: the catalog replaces
/// these wholesale on every scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub ssid: String,
    pub bssid: [u8; 6],
    pub channel: u32,
    pub rssi: i32,
    pub auth_mode: AuthMode,
    pub hidden: bool,
}

impl NetworkInfo {
    /// BSSID in the usual hex form, for display.
    pub fn bssid_hex(&self) -> String {
        hex::encode(self.bssid)
    }
}

/// Interface configuration obtained from a successful connection.
/// On the wire this is the positional `[ip, netmask, gw, dns]` tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "(String, String, String, String)",
    into = "(String, String, String, String)"
)]
pub struct Ifconfig {
    pub ip: String,
    pub netmask: String,
    pub gw: String,
    pub dns: String,
}

impl From<(String, String, String, String)> for Ifconfig {
    fn from(t: (String, String, String, String)) -> Self {
        Ifconfig {
            ip: t.0,
            netmask: t.1,
            gw: t.2,
            dns: t.3,
        }
    }
}

impl From<Ifconfig> for (String, String, String, String) {
    fn from(c: Ifconfig) -> Self {
        (c.ip, c.netmask, c.gw, c.dns)
    }
}

impl fmt::Display for Ifconfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ip={} netmask={} gw={} dns={}",
            self.ip, self.netmask, self.gw, self.dns
        )
    }
}

/// Remembered connection parameters for one SSID. Persisted on the device
/// via `set_wifi_param`; survives across scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ifconfig: Option<Ifconfig>,
}

impl NetworkParams {
    /// A fresh record for a network that was never configured.
    pub fn empty(ssid: &str) -> Self {
        NetworkParams {
            ssid: ssid.to_string(),
            password: String::new(),
            ip: None,
            last_ifconfig: None,
        }
    }
}

// --- Reply decoders ---

/// Decodes a `scan_wifi` reply. An empty array is a valid empty scan;
/// a missing (`null`) reply is not.
pub fn decode_scan(value: &Value) -> Result<Vec<NetworkInfo>> {
    let rows = match value {
        Value::Array(rows) => rows,
        Value::Null => {
            return Err(Error::ProtocolViolation(
                "scan_wifi reply is missing".to_string(),
            ));
        }
        other => {
            return Err(Error::ProtocolViolation(format!(
                "scan_wifi reply is not an array: {other}"
            )));
        }
    };
    rows.iter().map(decode_scan_row).collect()
}

fn decode_scan_row(row: &Value) -> Result<NetworkInfo> {
    let fields = row
        .as_array()
        .filter(|fields| fields.len() >= 6)
        .ok_or_else(|| Error::ProtocolViolation(format!("malformed scan row: {row}")))?;

    let ssid = fields[0]
        .as_str()
        .ok_or_else(|| Error::ProtocolViolation(format!("scan row ssid is not a string: {row}")))?
        .to_string();
    let channel = u32::try_from(as_u64(&fields[2], "channel")?)
        .map_err(|_| Error::ProtocolViolation(format!("scan row channel out of range: {row}")))?;
    let rssi = fields[3]
        .as_i64()
        .ok_or_else(|| Error::ProtocolViolation(format!("scan row rssi is not a number: {row}")))?
        as i32;
    let auth_mode = AuthMode::from_code(as_u64(&fields[4], "authmode")?);

    Ok(NetworkInfo {
        ssid,
        bssid: decode_bssid(&fields[1])?,
        channel,
        rssi,
        auth_mode,
        hidden: truthy(&fields[5]),
    })
}

/// The firmware serializes the raw BSSID bytes either as a JSON string
/// (one character per byte) or as an array of numbers.
fn decode_bssid(value: &Value) -> Result<[u8; 6]> {
    let bytes: Vec<u8> = match value {
        Value::String(s) => s
            .chars()
            .map(|c| {
                u8::try_from(c as u32)
                    .map_err(|_| Error::ProtocolViolation(format!("bssid byte out of range: {s}")))
            })
            .collect::<Result<_>>()?,
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| {
                        Error::ProtocolViolation(format!("bssid byte out of range: {value}"))
                    })
            })
            .collect::<Result<_>>()?,
        other => {
            return Err(Error::ProtocolViolation(format!(
                "bssid is neither string nor array: {other}"
            )));
        }
    };
    <[u8; 6]>::try_from(bytes)
        .map_err(|_| Error::ProtocolViolation(format!("bssid is not 6 bytes: {value}")))
}

/// Decodes a `get_wifi_params` reply into the per-SSID table.
/// A `null` reply means the device has no remembered networks yet.
pub fn decode_params_table(value: &Value) -> Result<HashMap<String, NetworkParams>> {
    match value {
        Value::Null => Ok(HashMap::new()),
        other => Ok(serde_json::from_value(other.clone())?),
    }
}

/// Decodes an `ifconfig` reply: the 4-tuple, or `None` when the device is
/// not connected.
pub fn decode_ifconfig(value: &Value) -> Result<Option<Ifconfig>> {
    match value {
        Value::Null => Ok(None),
        other => Ok(Some(serde_json::from_value(other.clone()).map_err(
            |_| Error::ProtocolViolation(format!("ifconfig reply is not a 4-tuple: {other}")),
        )?)),
    }
}

/// Decodes an `ap_status` reply into the raw status code.
pub fn decode_status(value: &Value) -> Result<i64> {
    value.as_i64().ok_or_else(|| {
        Error::ProtocolViolation(format!("ap_status reply is not an integer: {value}"))
    })
}

fn as_u64(value: &Value, field: &str) -> Result<u64> {
    value.as_u64().ok_or_else(|| {
        Error::ProtocolViolation(format!("scan row {field} is not a number: {value}"))
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}
