//! A mock device for tests and hardware-free development.
//!
//! Replies are scripted per op: queued replies are consumed first, then a
//! sticky default, then (for `MockDevice::canned()`) a built-in happy
//! path. Every issued request is recorded so tests can assert call order
//! and that cancellation really stops the traffic.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::protocol::Request;
use crate::traits::DeviceTransport;
use crate::{Error, Result};

enum MockReply {
    Reply(Value),
    TransportError(String),
    Rejected(String),
}

#[derive(Default)]
pub struct MockDevice {
    scripted: Mutex<HashMap<&'static str, VecDeque<MockReply>>>,
    defaults: Mutex<HashMap<&'static str, Value>>,
    requests: Mutex<Vec<Value>>,
    canned: bool,
    status_calls: AtomicUsize,
}

impl MockDevice {
    /// A device that only answers what tests script into it.
    pub fn new() -> Self {
        Self::default()
    }

    /// A device with a built-in happy path: three networks, a connection
    /// attempt that reports `CONNECTING` twice and then `GOT_IP`.
    pub fn canned() -> Self {
        MockDevice {
            canned: true,
            ..Self::default()
        }
    }

    pub fn enqueue(&self, op: &'static str, reply: Value) {
        self.push(op, MockReply::Reply(reply));
    }

    pub fn enqueue_transport_error(&self, op: &'static str, message: &str) {
        self.push(op, MockReply::TransportError(message.to_string()));
    }

    pub fn enqueue_rejected(&self, op: &'static str, code: &str) {
        self.push(op, MockReply::Rejected(code.to_string()));
    }

    /// Sticky reply used whenever the queue for `op` is empty.
    pub fn set_default(&self, op: &'static str, reply: Value) {
        self.defaults.lock().unwrap().insert(op, reply);
    }

    fn push(&self, op: &'static str, reply: MockReply) {
        self.scripted
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(reply);
    }

    /// Op names of every request issued so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|request| request.get("op").and_then(Value::as_str).map(String::from))
            .collect()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls().iter().filter(|name| name == &op).count()
    }

    /// The most recent full request for `op`, as serialized on the wire.
    pub fn last_request(&self, op: &str) -> Option<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|request| request.get("op").and_then(Value::as_str) == Some(op))
            .cloned()
    }

    fn canned_reply(&self, op: &str) -> Result<Value> {
        match op {
            "scan_wifi" => Ok(json!([
                ["MyHomeWiFi", [0x00, 0x11, 0x22, 0x33, 0x44, 0x55], 6, -42, 3, 0],
                ["CafeGuest", [0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb], 1, -61, 0, 0],
                ["HiddenNetwork", [0xcc, 0xdd, 0xee, 0xff, 0x00, 0x11], 11, -77, 4, 1],
            ])),
            "get_wifi_params" => Ok(json!({})),
            "set_wifi_param" => Ok(json!(true)),
            "connect_configured_wifi" => {
                self.status_calls.store(0, Ordering::SeqCst);
                Ok(Value::Null)
            }
            "ap_status" => {
                let tick = self.status_calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!(if tick < 2 { 1 } else { 5 }))
            }
            "ifconfig" => Ok(json!(["192.168.1.5", "255.255.255.0", "192.168.1.1", "8.8.8.8"])),
            "reset" => Ok(Value::Null),
            other => Err(Error::DeviceRejected(format!("unknown op '{other}'"))),
        }
    }
}

#[async_trait]
impl DeviceTransport for MockDevice {
    async fn call(&self, request: &Request) -> Result<Value> {
        let op = request.op();
        self.requests
            .lock()
            .unwrap()
            .push(serde_json::to_value(request)?);

        let scripted = self.scripted.lock().unwrap().get_mut(op).and_then(VecDeque::pop_front);
        if let Some(reply) = scripted {
            return match reply {
                MockReply::Reply(value) => Ok(value),
                MockReply::TransportError(message) => Err(Error::Transport(message)),
                MockReply::Rejected(code) => Err(Error::DeviceRejected(code)),
            };
        }
        if let Some(value) = self.defaults.lock().unwrap().get(op) {
            return Ok(value.clone());
        }
        if self.canned {
            return self.canned_reply(op);
        }
        Err(Error::DeviceRejected(format!("unscripted op '{op}'")))
    }
}
