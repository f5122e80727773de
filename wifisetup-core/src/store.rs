//! Per-SSID configuration store.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::protocol::{self, Ifconfig, NetworkParams, Request};
use crate::traits::DeviceTransport;
use crate::Result;

/// Partial update applied to a stored record; unset fields are kept.
#[derive(Debug, Clone, Default)]
pub struct ParamsUpdate {
    pub password: Option<String>,
    pub ip: Option<String>,
    pub last_ifconfig: Option<Ifconfig>,
}

impl ParamsUpdate {
    pub fn password(value: &str) -> Self {
        ParamsUpdate {
            password: Some(value.to_string()),
            ..Self::default()
        }
    }
}

/// Mapping from SSID to remembered connection parameters.
///
/// The store itself is in-memory; the durable copy is the device's own
/// remembered-network table, kept in sync through `push` and `refresh`.
/// Records are created lazily on first update and never deleted here, so
/// stale entries persist until overwritten. Entries are keyed by SSID
/// alone (not SSID + BSSID), matching the device table: two access points
/// sharing one name share credentials.
///
/// Writes are serialized by the lock; concurrent updates to one SSID
/// resolve last-write-wins, and a write is never lost to a concurrent read.
#[derive(Debug, Default)]
pub struct ParamStore {
    params: RwLock<HashMap<String, NetworkParams>>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored record, or a fresh one with an empty password if
    /// the SSID was never configured. Never fails, never inserts.
    pub async fn get(&self, ssid: &str) -> NetworkParams {
        self.params
            .read()
            .await
            .get(ssid)
            .cloned()
            .unwrap_or_else(|| NetworkParams::empty(ssid))
    }

    /// Merges `update` into the stored (or freshly defaulted) record and
    /// returns the merged result. Idempotent.
    pub async fn update(&self, ssid: &str, update: ParamsUpdate) -> NetworkParams {
        let mut params = self.params.write().await;
        let record = params
            .entry(ssid.to_string())
            .or_insert_with(|| NetworkParams::empty(ssid));
        if let Some(password) = update.password {
            record.password = password;
        }
        if let Some(ip) = update.ip {
            record.ip = Some(ip);
        }
        if let Some(ifconfig) = update.last_ifconfig {
            record.last_ifconfig = Some(ifconfig);
        }
        record.clone()
    }

    /// Submits the stored record for `ssid` to the device so its own
    /// remembered-network table is updated. The local record is read as-is;
    /// local updates precede and are independent of this call.
    pub async fn push(&self, device: &dyn DeviceTransport, ssid: &str) -> Result<()> {
        let params = self.get(ssid).await;
        device.call(&Request::SetWifiParam { params }).await?;
        Ok(())
    }

    /// Replaces the local table with the device's remembered networks
    /// (`get_wifi_params`). A failed fetch leaves the local table untouched.
    pub async fn refresh(&self, device: &dyn DeviceTransport) -> Result<()> {
        let reply = device.call(&Request::GetWifiParams).await?;
        let table = protocol::decode_params_table(&reply)?;
        tracing::debug!(count = table.len(), "remembered networks loaded from device");
        *self.params.write().await = table;
        Ok(())
    }

    pub async fn snapshot(&self) -> HashMap<String, NetworkParams> {
        self.params.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::MockDevice;
    use serde_json::json;

    #[tokio::test]
    async fn get_never_fails_for_unknown_ssid() {
        let store = ParamStore::new();
        let params = store.get("Nowhere").await;
        assert_eq!(params.ssid, "Nowhere");
        assert_eq!(params.password, "");
        assert!(params.ip.is_none());
        assert!(params.last_ifconfig.is_none());
    }

    #[tokio::test]
    async fn update_then_get_round_trips_and_is_idempotent() {
        let store = ParamStore::new();
        let first = store.update("Home", ParamsUpdate::password("secret1")).await;
        let second = store.update("Home", ParamsUpdate::password("secret1")).await;
        assert_eq!(first, second);
        assert_eq!(store.get("Home").await, first);

        // A later partial update keeps the untouched fields.
        let merged = store
            .update(
                "Home",
                ParamsUpdate {
                    ip: Some("10.0.0.9".to_string()),
                    ..ParamsUpdate::default()
                },
            )
            .await;
        assert_eq!(merged.password, "secret1");
        assert_eq!(merged.ip.as_deref(), Some("10.0.0.9"));
    }

    #[tokio::test]
    async fn push_submits_the_stored_record() {
        let device = MockDevice::new();
        device.enqueue("set_wifi_param", json!(true));

        let store = ParamStore::new();
        store.update("Home", ParamsUpdate::password("secret1")).await;
        store.push(&device, "Home").await.unwrap();

        let sent = device.last_request("set_wifi_param").unwrap();
        assert_eq!(
            sent,
            json!({
                "op": "set_wifi_param",
                "params": {"ssid": "Home", "password": "secret1"}
            })
        );
    }

    #[tokio::test]
    async fn refresh_replaces_local_table_only_on_success() {
        let device = MockDevice::new();
        device.enqueue(
            "get_wifi_params",
            json!({"Home": {"ssid": "Home", "password": "secret1"}}),
        );
        device.enqueue_transport_error("get_wifi_params", "timed out");

        let store = ParamStore::new();
        store.refresh(&device).await.unwrap();
        assert_eq!(store.get("Home").await.password, "secret1");

        assert!(store.refresh(&device).await.is_err());
        assert_eq!(store.get("Home").await.password, "secret1");
    }
}
