//! Session registry: who is watching which device.
//!
//! Sessions are keyed by an opaque token the worker assigns at accept
//! time. Per device the registry keeps the set of watching sessions;
//! the device controller is a process-wide singleton outside the
//! per-device sets. Registration enforces the protocol's admission
//! rules: one controller, at most one session per `(id, kind)` per
//! device (the older one is evicted), and no guest without a host.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;

use vps_core::frame::Frame;
use vps_core::{command, ConnectionType};

use crate::session::ClientSession;

/// What admission decided for one registering session.
#[derive(Debug, Default)]
pub struct RegisterOutcome {
    /// Older session with the same identity that must now be torn
    /// down.
    pub evicted: Option<u64>,
    /// Guest arrived with no host on the device; it was notified and
    /// must be closed without ever entering the registry.
    pub rejected_guest: bool,
    /// A controller is already installed; the new one is ignored.
    pub duplicate_controller: bool,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<u64, ClientSession>,
    by_device: HashMap<u8, HashSet<u64>>,
    controller: Option<u64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an accepted socket before its connect frame arrives.
    pub fn insert_pending(&mut self, token: u64, session: ClientSession) {
        self.sessions.insert(token, session);
    }

    pub fn get_mut(&mut self, token: u64) -> Option<&mut ClientSession> {
        self.sessions.get_mut(&token)
    }

    pub fn session_count(&self, device: u8) -> usize {
        self.by_device.get(&device).map_or(0, HashSet::len)
    }

    pub fn has_host(&self, device: u8) -> bool {
        self.device_tokens(device).any(|t| {
            self.sessions
                .get(&t)
                .is_some_and(|s| s.kind.contains(ConnectionType::HOST))
        })
    }

    fn device_tokens(&self, device: u8) -> impl Iterator<Item = u64> + '_ {
        self.by_device.get(&device).into_iter().flatten().copied()
    }

    /// Apply admission rules for a session whose identity is now
    /// fixed.
    pub fn register(&mut self, token: u64) -> RegisterOutcome {
        let mut outcome = RegisterOutcome::default();
        let Some(session) = self.sessions.get(&token) else {
            return outcome;
        };
        let (id, kind, device) = (session.id.clone(), session.kind, session.device);

        if kind.contains(ConnectionType::CONTROLLER) {
            if self.controller.is_some() {
                tracing::warn!(id = %id, "controller already installed, new one ignored");
                outcome.duplicate_controller = true;
            } else {
                tracing::info!(id = %id, "device controller installed");
                self.controller = Some(token);
            }
            return outcome;
        }

        if kind.contains(ConnectionType::GUEST) && !self.has_host(device) {
            tracing::warn!(id = %id, device, "guest without host rejected");
            if let Some(session) = self.sessions.get_mut(&token) {
                session.send(&Frame::new(
                    command::CONNECTION_DISCONNECT_GUEST,
                    device,
                    id.into_bytes(),
                ));
            }
            outcome.rejected_guest = true;
            return outcome;
        }

        // Same identity already watching this device: the old session
        // is stale. The caller tears it down through the regular
        // disconnect path so departure broadcasts still fire.
        outcome.evicted = self.device_tokens(device).find(|&t| {
            self.sessions
                .get(&t)
                .is_some_and(|s| s.id == id && s.kind == kind)
        });
        if outcome.evicted.is_some() {
            tracing::info!(id = %id, device, kind = kind.describe(), "evicting stale session");
        }

        self.by_device.entry(device).or_default().insert(token);
        tracing::info!(id = %id, device, kind = kind.describe(), "session registered");
        outcome
    }

    /// Drop a session from every index and hand it back to the caller.
    pub fn remove(&mut self, token: u64) -> Option<ClientSession> {
        let session = self.sessions.remove(&token)?;
        if let Some(set) = self.by_device.get_mut(&session.device) {
            set.remove(&token);
            if set.is_empty() {
                self.by_device.remove(&session.device);
            }
        }
        if self.controller == Some(token) {
            tracing::info!("device controller disconnected");
            self.controller = None;
        }
        Some(session)
    }

    /// Fan one pre-encoded mirroring frame out to every session of a
    /// device; returns how many received it.
    pub fn broadcast_mirroring(&mut self, device: u8, wire: &Bytes) -> usize {
        let tokens: Vec<u64> = self.device_tokens(device).collect();
        for &t in &tokens {
            if let Some(session) = self.sessions.get_mut(&t) {
                session.send_mirroring(wire.clone());
            }
        }
        tokens.len()
    }

    /// Send one control frame to every session of a device.
    pub fn broadcast_frame(&mut self, device: u8, frame: &Frame) {
        let tokens: Vec<u64> = self.device_tokens(device).collect();
        for &t in &tokens {
            if let Some(session) = self.sessions.get_mut(&t) {
                session.send(frame);
            }
        }
    }

    /// Forward a frame to the controller; `false` if none is
    /// installed.
    pub fn send_controller(&mut self, frame: &Frame) -> bool {
        let Some(token) = self.controller else {
            return false;
        };
        match self.sessions.get_mut(&token) {
            Some(session) => {
                session.send(frame);
                true
            }
            None => false,
        }
    }

    /// Find a guest on a device by its session id.
    pub fn find_guest(&self, device: u8, guest_id: &str) -> Option<u64> {
        self.device_tokens(device).find(|&t| {
            self.sessions
                .get(&t)
                .is_some_and(|s| s.kind.contains(ConnectionType::GUEST) && s.id == guest_id)
        })
    }
}
