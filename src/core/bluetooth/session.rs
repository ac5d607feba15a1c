//! Mutable state of one screen session.
//!
//! All mutation goes through a single `tokio::sync::Mutex` that is never held
//! across a transport call, so event delivery is never blocked by a suspended
//! connection sequence. Every continuation that resumes after a suspension
//! point re-checks its sequence token before touching anything.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::core::bluetooth::registry::Registry;
use crate::core::bluetooth::types::{PeripheralId, ScanState, ServiceBinding, SessionSnapshot};

pub type SharedSession = Arc<Mutex<SessionState>>;

/// Identifies one connection attempt for one peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceToken(u64);

#[derive(Debug, Default)]
pub struct SessionState {
    pub registry: Registry,
    pub scan: ScanState,
    /// Published only while its peripheral is `Ready`
    pub binding: Option<ServiceBinding>,
    /// Token of the attempt currently in flight, per peripheral
    in_flight: HashMap<PeripheralId, SequenceToken>,
    next_token: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSession {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn begin_sequence(&mut self, id: &PeripheralId) -> SequenceToken {
        self.next_token += 1;
        let token = SequenceToken(self.next_token);
        self.in_flight.insert(id.clone(), token);
        token
    }

    pub fn is_current(&self, id: &PeripheralId, token: SequenceToken) -> bool {
        self.in_flight.get(id) == Some(&token)
    }

    pub fn has_sequence(&self, id: &PeripheralId) -> bool {
        self.in_flight.contains_key(id)
    }

    /// Marks the attempt as done. Has no effect if `token` is stale.
    pub fn finish_sequence(&mut self, id: &PeripheralId, token: SequenceToken) {
        if self.is_current(id, token) {
            self.in_flight.remove(id);
        }
    }

    /// Makes any attempt in flight for `id` stale.
    pub fn invalidate_sequence(&mut self, id: &PeripheralId) -> bool {
        self.in_flight.remove(id).is_some()
    }

    /// Withdraws the binding if it belongs to `id`.
    pub fn clear_binding_for(&mut self, id: &PeripheralId) -> Option<ServiceBinding> {
        if self.binding.as_ref().is_some_and(|b| &b.peripheral_id == id) {
            self.binding.take()
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            peripherals: self.registry.list(),
            binding: self.binding.clone(),
            is_scanning: self.scan == ScanState::Scanning,
        }
    }

    /// Starts a discovery session from an empty registry. Attempts in flight
    /// go stale and the binding is withdrawn along with the records.
    pub fn clear_peripherals(&mut self) {
        self.registry.clear();
        self.in_flight.clear();
        self.binding = None;
    }

    pub fn reset(&mut self) {
        self.registry.clear();
        self.scan = ScanState::Idle;
        self.binding = None;
        self.in_flight.clear();
    }
}
