//! Provisioning state machine.
//!
//! One session at a time walks `Idle -> Editing -> Submitting ->
//! Connecting -> Polling -> {Succeeded, Failed} -> Idle`. The device can
//! only attempt one connection at once, so a second session is rejected
//! outright instead of interleaved. All device calls within a session are
//! strictly sequential; the poll loop is a self-rescheduling tick with a
//! cooperative cancellation check at every tick boundary.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio::time::sleep;

use crate::catalog::NetworkCatalog;
use crate::config::DEFAULT_POLL_INTERVAL_MS;
use crate::protocol::{self, Ifconfig, NetworkInfo, NetworkParams, Request};
use crate::status::WifiStatus;
use crate::store::{ParamStore, ParamsUpdate};
use crate::traits::DeviceTransport;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Editing,
    Submitting,
    Connecting,
    Polling,
    Succeeded,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Editing => "editing",
            Phase::Submitting => "submitting",
            Phase::Connecting => "connecting",
            Phase::Polling => "polling",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Why a session ended in `Failed`. These are normal outcomes of the state
/// machine, not errors: the engine stays usable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    WrongPassword,
    ApNotFound,
    ConnectFailed,
    UnrecognizedStatus(i64),
    Transport(String),
    Protocol(String),
}

impl FailureReason {
    fn from_error(err: &Error) -> Self {
        match err {
            Error::ProtocolViolation(message) => FailureReason::Protocol(message.clone()),
            other => FailureReason::Transport(other.to_string()),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::WrongPassword => write!(f, "wrong password"),
            FailureReason::ApNotFound => write!(f, "access point not found"),
            FailureReason::ConnectFailed => write!(f, "connect failed"),
            FailureReason::UnrecognizedStatus(code) => {
                write!(f, "unrecognized device status {code}")
            }
            FailureReason::Transport(message) => write!(f, "transport failure: {message}"),
            FailureReason::Protocol(message) => write!(f, "protocol violation: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Succeeded { ifconfig: Ifconfig },
    Failed { reason: FailureReason },
    /// The device reported no connection attempt in progress: silent abort
    /// back to idle, no error surfaced.
    Aborted,
    Cancelled,
}

/// Transition notifications for the UI layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PhaseChanged {
        ssid: String,
        phase: Phase,
    },
    PollTick {
        ssid: String,
        elapsed: Duration,
        status: WifiStatus,
    },
    Finished {
        ssid: String,
        outcome: SessionOutcome,
    },
}

/// Read-only view of the active session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub target_ssid: String,
    pub phase: Phase,
    pub elapsed: Duration,
    pub last_status: Option<WifiStatus>,
}

struct Session {
    id: u64,
    target_ssid: String,
    phase: Phase,
    elapsed: Duration,
    last_status: Option<i64>,
    cancelled: Arc<AtomicBool>,
}

/// The provisioning workflow engine: owns the catalog, the parameter store
/// and the single active session.
pub struct ProvisioningEngine {
    device: Arc<dyn DeviceTransport>,
    catalog: NetworkCatalog,
    store: ParamStore,
    session: Mutex<Option<Session>>,
    next_id: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
    poll_interval: Duration,
}

impl ProvisioningEngine {
    pub fn new(device: Arc<dyn DeviceTransport>) -> Self {
        Self::with_poll_interval(device, Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
    }

    pub fn with_poll_interval(device: Arc<dyn DeviceTransport>, poll_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        ProvisioningEngine {
            device,
            catalog: NetworkCatalog::new(),
            store: ParamStore::new(),
            session: Mutex::new(None),
            next_id: AtomicU64::new(1),
            events,
            poll_interval,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn catalog(&self) -> &NetworkCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &ParamStore {
        &self.store
    }

    /// Re-scans and replaces the catalog. If the active session's target
    /// vanished from the air, the session is orphaned and closed.
    pub async fn scan(&self) -> Result<Vec<NetworkInfo>> {
        let found = self.catalog.scan(self.device.as_ref()).await?;
        let orphaned = {
            let mut session = self.session.lock().await;
            let target_vanished = session.as_ref().is_some_and(|active| {
                !found
                    .iter()
                    .any(|network| network.ssid == active.target_ssid)
            });
            if target_vanished {
                session.take().map(|active| {
                    active.cancelled.store(true, Ordering::SeqCst);
                    active.target_ssid
                })
            } else {
                None
            }
        };
        if let Some(ssid) = orphaned {
            tracing::warn!(%ssid, "target vanished from scan, session closed");
            self.emit(SessionEvent::Finished {
                ssid,
                outcome: SessionOutcome::Cancelled,
            });
        }
        Ok(found)
    }

    /// Pulls the device's remembered-network table into the local store.
    pub async fn refresh_params(&self) -> Result<()> {
        self.store.refresh(self.device.as_ref()).await
    }

    /// Opens an editing session for a network from the last scan. Rejected
    /// while another session is active, without touching that session.
    pub async fn open(&self, ssid: &str) -> Result<NetworkParams> {
        let network = self
            .catalog
            .get_by_ssid(ssid)
            .await
            .ok_or_else(|| Error::UnknownNetwork(ssid.to_string()))?;
        {
            let mut session = self.session.lock().await;
            if let Some(active) = session.as_ref() {
                return Err(Error::SessionActive(active.target_ssid.clone()));
            }
            *session = Some(Session {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                target_ssid: network.ssid.clone(),
                phase: Phase::Editing,
                elapsed: Duration::ZERO,
                last_status: None,
                cancelled: Arc::new(AtomicBool::new(false)),
            });
        }
        self.emit(SessionEvent::PhaseChanged {
            ssid: network.ssid.clone(),
            phase: Phase::Editing,
        });
        Ok(self.store.get(&network.ssid).await)
    }

    /// Edits the parameters of the session's target network. No device
    /// calls are issued while editing.
    pub async fn update_params(&self, update: ParamsUpdate) -> Result<NetworkParams> {
        let ssid = self
            .session
            .lock()
            .await
            .as_ref()
            .map(|active| active.target_ssid.clone())
            .ok_or(Error::NoSession)?;
        Ok(self.store.update(&ssid, update).await)
    }

    /// Discards the active session. Polling stops at the next tick
    /// boundary; in-flight device calls complete but their results are
    /// thrown away. No-op when idle.
    pub async fn cancel(&self) {
        let closed = {
            let mut session = self.session.lock().await;
            session.take().map(|active| {
                active.cancelled.store(true, Ordering::SeqCst);
                active.target_ssid
            })
        };
        if let Some(ssid) = closed {
            tracing::info!(%ssid, "provisioning session cancelled");
            self.emit(SessionEvent::Finished {
                ssid,
                outcome: SessionOutcome::Cancelled,
            });
        }
    }

    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        self.session.lock().await.as_ref().map(|active| SessionSnapshot {
            target_ssid: active.target_ssid.clone(),
            phase: active.phase,
            elapsed: active.elapsed,
            last_status: active.last_status.map(WifiStatus::from_code),
        })
    }

    pub async fn phase(&self) -> Phase {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|active| active.phase)
            .unwrap_or(Phase::Idle)
    }

    /// Reboots the device so it leaves setup mode and joins the configured
    /// network. Rejected while a session is active.
    pub async fn reset_device(&self) -> Result<()> {
        if let Some(active) = self.session.lock().await.as_ref() {
            return Err(Error::SessionActive(active.target_ssid.clone()));
        }
        self.device.call(&Request::Reset).await?;
        Ok(())
    }

    /// Runs the "test these settings" sequence for the session opened with
    /// [`open`](Self::open): push params -> trigger connect -> poll status
    /// until a terminal outcome. Returns that outcome; `Err` only for
    /// misuse (no session, or the session is already past editing).
    pub async fn provision(&self) -> Result<SessionOutcome> {
        let (id, ssid, cancelled) = {
            let session = self.session.lock().await;
            let active = session.as_ref().ok_or(Error::NoSession)?;
            if active.phase != Phase::Editing {
                return Err(Error::SessionActive(active.target_ssid.clone()));
            }
            (active.id, active.target_ssid.clone(), active.cancelled.clone())
        };

        if !self.set_phase(id, Phase::Submitting).await {
            return Ok(SessionOutcome::Cancelled);
        }
        if let Err(err) = self.store.push(self.device.as_ref(), &ssid).await {
            return Ok(self.fail(id, &ssid, FailureReason::from_error(&err)).await);
        }

        if !self.set_phase(id, Phase::Connecting).await {
            return Ok(SessionOutcome::Cancelled);
        }
        let connect = Request::ConnectConfiguredWifi { ssid: ssid.clone() };
        if let Err(err) = self.device.call(&connect).await {
            return Ok(self.fail(id, &ssid, FailureReason::from_error(&err)).await);
        }

        if !self.set_phase(id, Phase::Polling).await {
            return Ok(SessionOutcome::Cancelled);
        }
        self.poll_until_terminal(id, &ssid, &cancelled).await
    }

    async fn poll_until_terminal(
        &self,
        id: u64,
        ssid: &str,
        cancelled: &AtomicBool,
    ) -> Result<SessionOutcome> {
        loop {
            sleep(self.poll_interval).await;

            // Cooperative cancellation: checked at the top of every tick,
            // before any device call is issued.
            if cancelled.load(Ordering::SeqCst) {
                return Ok(SessionOutcome::Cancelled);
            }

            // The interval is added before the status call resolves, so
            // elapsed time reflects the wall-clock wait.
            let elapsed = {
                let mut session = self.session.lock().await;
                match session.as_mut() {
                    Some(active) if active.id == id => {
                        active.elapsed += self.poll_interval;
                        active.elapsed
                    }
                    _ => return Ok(SessionOutcome::Cancelled),
                }
            };

            let code = match self.device.call(&Request::ApStatus).await {
                Ok(reply) => match protocol::decode_status(&reply) {
                    Ok(code) => code,
                    Err(err) => {
                        return Ok(self.fail(id, ssid, FailureReason::from_error(&err)).await);
                    }
                },
                Err(err) => {
                    return Ok(self.fail(id, ssid, FailureReason::from_error(&err)).await);
                }
            };
            if cancelled.load(Ordering::SeqCst) {
                // The in-flight call completed; its result is discarded.
                return Ok(SessionOutcome::Cancelled);
            }

            let status = WifiStatus::from_code(code);
            {
                let mut session = self.session.lock().await;
                if let Some(active) = session.as_mut().filter(|active| active.id == id) {
                    active.last_status = Some(code);
                }
            }
            self.emit(SessionEvent::PollTick {
                ssid: ssid.to_string(),
                elapsed,
                status,
            });
            tracing::debug!(%ssid, %status, ?elapsed, "poll tick");

            match status {
                WifiStatus::Connecting => continue,
                WifiStatus::Idle => {
                    {
                        let mut session = self.session.lock().await;
                        if session.as_ref().is_some_and(|active| active.id == id) {
                            session.take();
                        }
                    }
                    tracing::info!(%ssid, "device idle while polling, session aborted");
                    self.emit(SessionEvent::Finished {
                        ssid: ssid.to_string(),
                        outcome: SessionOutcome::Aborted,
                    });
                    return Ok(SessionOutcome::Aborted);
                }
                WifiStatus::GotIp => {
                    let outcome = match self.device.call(&Request::Ifconfig).await {
                        Err(err) => self.fail(id, ssid, FailureReason::from_error(&err)).await,
                        Ok(reply) => match protocol::decode_ifconfig(&reply) {
                            Err(err) => {
                                self.fail(id, ssid, FailureReason::from_error(&err)).await
                            }
                            // The device claims success but has no address:
                            // internal inconsistency, never a success.
                            Ok(None) => {
                                self.fail(
                                    id,
                                    ssid,
                                    FailureReason::Protocol(
                                        "device reports an IP address but ifconfig is empty"
                                            .to_string(),
                                    ),
                                )
                                .await
                            }
                            Ok(Some(ifconfig)) => {
                                if cancelled.load(Ordering::SeqCst) {
                                    return Ok(SessionOutcome::Cancelled);
                                }
                                self.succeed(id, ssid, ifconfig).await
                            }
                        },
                    };
                    return Ok(outcome);
                }
                WifiStatus::WrongPassword => {
                    return Ok(self.fail(id, ssid, FailureReason::WrongPassword).await);
                }
                WifiStatus::ApNotFound => {
                    return Ok(self.fail(id, ssid, FailureReason::ApNotFound).await);
                }
                WifiStatus::ConnectFailed => {
                    return Ok(self.fail(id, ssid, FailureReason::ConnectFailed).await);
                }
                WifiStatus::Unrecognized(code) => {
                    return Ok(self.fail(id, ssid, FailureReason::UnrecognizedStatus(code)).await);
                }
            }
        }
    }

    /// Updates the phase of session `id`. Returns false when the session
    /// was cancelled or replaced in the meantime.
    async fn set_phase(&self, id: u64, phase: Phase) -> bool {
        let ssid = {
            let mut session = self.session.lock().await;
            match session.as_mut() {
                Some(active) if active.id == id => {
                    active.phase = phase;
                    active.target_ssid.clone()
                }
                _ => return false,
            }
        };
        tracing::debug!(%ssid, %phase, "session phase");
        self.emit(SessionEvent::PhaseChanged { ssid, phase });
        true
    }

    async fn fail(&self, id: u64, ssid: &str, reason: FailureReason) -> SessionOutcome {
        {
            let mut session = self.session.lock().await;
            if !session.as_ref().is_some_and(|active| active.id == id) {
                // Cancellation won the race; this result is discarded.
                return SessionOutcome::Cancelled;
            }
            session.take();
        }
        tracing::warn!(%ssid, %reason, "provisioning failed");
        self.emit(SessionEvent::PhaseChanged {
            ssid: ssid.to_string(),
            phase: Phase::Failed,
        });
        let outcome = SessionOutcome::Failed { reason };
        self.emit(SessionEvent::Finished {
            ssid: ssid.to_string(),
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn succeed(&self, id: u64, ssid: &str, ifconfig: Ifconfig) -> SessionOutcome {
        {
            let mut session = self.session.lock().await;
            if !session.as_ref().is_some_and(|active| active.id == id) {
                return SessionOutcome::Cancelled;
            }
            session.take();
        }
        self.store
            .update(
                ssid,
                ParamsUpdate {
                    password: None,
                    ip: Some(ifconfig.ip.clone()),
                    last_ifconfig: Some(ifconfig.clone()),
                },
            )
            .await;
        tracing::info!(%ssid, %ifconfig, "provisioning succeeded");
        self.emit(SessionEvent::PhaseChanged {
            ssid: ssid.to_string(),
            phase: Phase::Succeeded,
        });
        let outcome = SessionOutcome::Succeeded { ifconfig };
        self.emit(SessionEvent::Finished {
            ssid: ssid.to_string(),
            outcome: outcome.clone(),
        });
        outcome
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine; events are best-effort notifications.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::MockDevice;
    use serde_json::json;

    fn home_scan() -> serde_json::Value {
        json!([["Home", [0, 1, 2, 3, 4, 5], 6, -40, 3, 0]])
    }

    fn ifconfig_tuple() -> serde_json::Value {
        json!(["192.168.1.5", "255.255.255.0", "192.168.1.1", "8.8.8.8"])
    }

    async fn editing_engine(device: Arc<MockDevice>) -> Arc<ProvisioningEngine> {
        device.enqueue("scan_wifi", home_scan());
        let engine = Arc::new(ProvisioningEngine::new(device));
        engine.scan().await.unwrap();
        engine.open("Home").await.unwrap();
        engine
            .update_params(ParamsUpdate::password("secret1"))
            .await
            .unwrap();
        engine
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_connect_succeeds_and_stores_ifconfig() {
        let device = Arc::new(MockDevice::new());
        device.enqueue("set_wifi_param", json!(true));
        device.enqueue("connect_configured_wifi", json!(null));
        device.enqueue("ap_status", json!(1));
        device.enqueue("ap_status", json!(5));
        device.enqueue("ifconfig", ifconfig_tuple());

        let engine = editing_engine(device.clone()).await;
        let outcome = engine.provision().await.unwrap();

        let expected = Ifconfig {
            ip: "192.168.1.5".to_string(),
            netmask: "255.255.255.0".to_string(),
            gw: "192.168.1.1".to_string(),
            dns: "8.8.8.8".to_string(),
        };
        assert_eq!(
            outcome,
            SessionOutcome::Succeeded {
                ifconfig: expected.clone()
            }
        );

        let stored = engine.store().get("Home").await;
        assert_eq!(stored.password, "secret1");
        assert_eq!(stored.ip.as_deref(), Some("192.168.1.5"));
        assert_eq!(stored.last_ifconfig, Some(expected));

        // Within one session, calls are strictly sequential.
        assert_eq!(
            device.calls(),
            vec![
                "scan_wifi",
                "set_wifi_param",
                "connect_configured_wifi",
                "ap_status",
                "ap_status",
                "ifconfig",
            ]
        );
        assert_eq!(engine.phase().await, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_wrong_password_leaves_store_for_retry() {
        let device = Arc::new(MockDevice::new());
        device.enqueue("set_wifi_param", json!(true));
        device.enqueue("connect_configured_wifi", json!(null));
        device.enqueue("ap_status", json!(2));

        let engine = editing_engine(device.clone()).await;
        let outcome = engine.provision().await.unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::Failed {
                reason: FailureReason::WrongPassword
            }
        );

        // Password stays for the next attempt, nothing else was written.
        let stored = engine.store().get("Home").await;
        assert_eq!(stored.password, "secret1");
        assert!(stored.ip.is_none());
        assert!(stored.last_ifconfig.is_none());
        assert_eq!(device.call_count("ifconfig"), 0);
        assert_eq!(engine.phase().await, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn got_ip_without_ifconfig_is_never_a_success() {
        let device = Arc::new(MockDevice::new());
        device.enqueue("set_wifi_param", json!(true));
        device.enqueue("connect_configured_wifi", json!(null));
        device.enqueue("ap_status", json!(5));
        device.enqueue("ifconfig", json!(null));

        let engine = editing_engine(device.clone()).await;
        let outcome = engine.provision().await.unwrap();
        assert!(matches!(
            outcome,
            SessionOutcome::Failed {
                reason: FailureReason::Protocol(_)
            }
        ));
        assert!(engine.store().get("Home").await.last_ifconfig.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_status_silently_aborts() {
        let device = Arc::new(MockDevice::new());
        device.enqueue("set_wifi_param", json!(true));
        device.enqueue("connect_configured_wifi", json!(null));
        device.enqueue("ap_status", json!(0));

        let engine = editing_engine(device.clone()).await;
        assert_eq!(engine.provision().await.unwrap(), SessionOutcome::Aborted);
        assert!(engine.snapshot().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unrecognized_status_fails_diagnosably() {
        let device = Arc::new(MockDevice::new());
        device.enqueue("set_wifi_param", json!(true));
        device.enqueue("connect_configured_wifi", json!(null));
        device.enqueue("ap_status", json!(42));

        let engine = editing_engine(device.clone()).await;
        assert_eq!(
            engine.provision().await.unwrap(),
            SessionOutcome::Failed {
                reason: FailureReason::UnrecognizedStatus(42)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_while_submitting_fails_the_session() {
        let device = Arc::new(MockDevice::new());
        device.enqueue_transport_error("set_wifi_param", "connection refused");

        let engine = editing_engine(device.clone()).await;
        let outcome = engine.provision().await.unwrap();
        assert!(matches!(
            outcome,
            SessionOutcome::Failed {
                reason: FailureReason::Transport(_)
            }
        ));
        // The sequence stopped before the connect call.
        assert_eq!(device.call_count("connect_configured_wifi"), 0);
        assert_eq!(engine.phase().await, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn second_session_is_rejected_without_touching_the_first() {
        let device = Arc::new(MockDevice::new());
        device.enqueue(
            "scan_wifi",
            json!([
                ["Home", [0, 1, 2, 3, 4, 5], 6, -40, 3, 0],
                ["CafeGuest", [9, 8, 7, 6, 5, 4], 1, -60, 0, 0],
            ]),
        );

        let engine = Arc::new(ProvisioningEngine::new(device));
        engine.scan().await.unwrap();
        engine.open("Home").await.unwrap();

        let err = engine.open("CafeGuest").await.unwrap_err();
        assert!(matches!(err, Error::SessionActive(ssid) if ssid == "Home"));

        let snapshot = engine.snapshot().await.unwrap();
        assert_eq!(snapshot.target_ssid, "Home");
        assert_eq!(snapshot.phase, Phase::Editing);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_polling_stops_device_calls() {
        let device = Arc::new(MockDevice::new());
        device.enqueue("set_wifi_param", json!(true));
        device.enqueue("connect_configured_wifi", json!(null));
        // Never finishes connecting on its own.
        device.set_default("ap_status", json!(1));

        let engine = editing_engine(device.clone()).await;
        let task = tokio::spawn({
            let engine = engine.clone();
            async move { engine.provision().await }
        });

        while device.call_count("ap_status") < 2 {
            sleep(Duration::from_millis(50)).await;
        }
        engine.cancel().await;
        let at_cancel = device.call_count("ap_status");

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, SessionOutcome::Cancelled);
        // At most the one in-flight tick may complete after cancel; after
        // the next tick boundary no further status calls are issued.
        assert!(device.call_count("ap_status") <= at_cancel + 1);
        assert!(engine.snapshot().await.is_none());

        // The engine is reusable after cancellation.
        device.enqueue("scan_wifi", home_scan());
        engine.scan().await.unwrap();
        engine.open("Home").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn rescan_closes_an_orphaned_session() {
        let device = Arc::new(MockDevice::new());
        let engine = editing_engine(device.clone()).await;

        device.enqueue(
            "scan_wifi",
            json!([["CafeGuest", [9, 8, 7, 6, 5, 4], 1, -60, 0, 0]]),
        );
        let mut events = engine.subscribe();
        engine.scan().await.unwrap();

        assert!(engine.snapshot().await.is_none());
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::Finished {
                outcome: SessionOutcome::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn operations_without_a_session_are_rejected() {
        let device = Arc::new(MockDevice::new());
        let engine = ProvisioningEngine::new(device);
        assert!(matches!(
            engine.update_params(ParamsUpdate::password("x")).await,
            Err(Error::NoSession)
        ));
        assert!(matches!(engine.provision().await, Err(Error::NoSession)));
        // Cancel with no session is a harmless no-op.
        engine.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reset_is_rejected_while_a_session_is_active() {
        let device = Arc::new(MockDevice::new());
        let engine = editing_engine(device.clone()).await;
        assert!(matches!(
            engine.reset_device().await,
            Err(Error::SessionActive(_))
        ));

        engine.cancel().await;
        device.enqueue("reset", json!(null));
        engine.reset_device().await.unwrap();
        assert_eq!(device.call_count("reset"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn events_trace_the_full_phase_sequence() {
        let device = Arc::new(MockDevice::new());
        device.enqueue("set_wifi_param", json!(true));
        device.enqueue("connect_configured_wifi", json!(null));
        device.enqueue("ap_status", json!(1));
        device.enqueue("ap_status", json!(5));
        device.enqueue("ifconfig", ifconfig_tuple());

        let engine = editing_engine(device.clone()).await;
        let mut events = engine.subscribe();
        engine.provision().await.unwrap();

        let mut phases = Vec::new();
        let mut ticks = 0;
        let mut finished = None;
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::PhaseChanged { phase, .. } => phases.push(phase),
                SessionEvent::PollTick { .. } => ticks += 1,
                SessionEvent::Finished { outcome, .. } => finished = Some(outcome),
            }
        }
        assert_eq!(
            phases,
            vec![
                Phase::Submitting,
                Phase::Connecting,
                Phase::Polling,
                Phase::Succeeded,
            ]
        );
        assert_eq!(ticks, 2);
        assert!(matches!(finished, Some(SessionOutcome::Succeeded { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_ticks_accumulate_wall_clock_wait() {
        let device = Arc::new(MockDevice::new());
        device.enqueue("set_wifi_param", json!(true));
        device.enqueue("connect_configured_wifi", json!(null));
        device.enqueue("ap_status", json!(1));
        device.enqueue("ap_status", json!(1));
        device.enqueue("ap_status", json!(5));
        device.enqueue("ifconfig", ifconfig_tuple());

        let engine = editing_engine(device.clone()).await;
        let mut events = engine.subscribe();
        engine.provision().await.unwrap();

        let mut elapsed = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::PollTick { elapsed: e, .. } = event {
                elapsed.push(e);
            }
        }
        assert_eq!(
            elapsed,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(1500),
            ]
        );
    }
}
