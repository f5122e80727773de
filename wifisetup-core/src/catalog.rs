//! Catalog of the most recent scan results.

use tokio::sync::RwLock;

use crate::protocol::{self, NetworkInfo, Request};
use crate::traits::DeviceTransport;
use crate::Result;

/// Holds the networks found by the last scan, sorted descending by RSSI.
///
/// A failed scan never touches the previous contents; the caller simply
/// re-scans. Replacement is atomic with respect to lookups.
#[derive(Debug, Default)]
pub struct NetworkCatalog {
    networks: RwLock<Vec<NetworkInfo>>,
}

impl NetworkCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a `scan_wifi` request and replaces the catalog with the
    /// decoded result. Returns the new contents.
    pub async fn scan(&self, device: &dyn DeviceTransport) -> Result<Vec<NetworkInfo>> {
        let reply = device.call(&Request::ScanWifi).await?;
        let mut found = protocol::decode_scan(&reply)?;
        found.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        tracing::debug!(count = found.len(), "scan complete");
        *self.networks.write().await = found.clone();
        Ok(found)
    }

    /// Bounds-checked lookup by position in the last scan.
    pub async fn get(&self, index: usize) -> Option<NetworkInfo> {
        self.networks.read().await.get(index).cloned()
    }

    /// Lookup by SSID. With duplicate SSIDs (several access points sharing
    /// one name) this returns the strongest-signal match.
    pub async fn get_by_ssid(&self, ssid: &str) -> Option<NetworkInfo> {
        self.networks
            .read()
            .await
            .iter()
            .find(|network| network.ssid == ssid)
            .cloned()
    }

    pub async fn snapshot(&self) -> Vec<NetworkInfo> {
        self.networks.read().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.networks.read().await.is_empty()
    }
}
