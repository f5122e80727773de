use async_trait::async_trait;
use serde_json::Value;

use crate::protocol::Request;

// 在这里定义共享的设备接口 trait，后端（HTTP / Mock）都实现它。

/// One round trip to the device's control API.
///
/// Implementations frame the request, perform the exchange and decode the
/// raw reply. They never retry: retry and polling policy belong to the
/// callers (catalog, store, state machine).
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Issues a single request and returns the decoded JSON reply.
    async fn call(&self, request: &Request) -> crate::Result<Value>;
}

/// Sink for user-facing error notifications.
///
/// The transport surfaces every failed call here exactly once; this is the
/// engine's only mandated notification path (the UI toast in the original
/// system). Everything else is caller-driven via session events.
pub trait Notifier: Send + Sync {
    fn notify_error(&self, message: &str);
}

/// Default sink: forwards to the tracing log.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify_error(&self, message: &str) {
        tracing::error!(target: "wifisetup", "{message}");
    }
}
