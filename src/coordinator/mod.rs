//! Load coordination: one in-flight load per symbol, per-symbol cooldown,
//! request tokens.
//!
//! A load moves `Idle → Fetching → Merging → Filtering → Rendering → Idle`.
//! A non-forced load for a symbol is suppressed while any load of that symbol
//! is in flight or within the cooldown since it last started. Every admitted
//! load gets a fresh token; only the holder of the latest token may render.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    Fetching,
    Merging,
    Filtering,
    Rendering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub token: RequestToken,
    pub symbol: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    InFlight,
    Cooldown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted(LoadTicket),
    Suppressed(SuppressReason),
}

#[derive(Debug)]
pub struct LoadCoordinator {
    cooldown: Duration,
    /// One entry per symbol with a load still running.
    in_flight: HashMap<String, RequestToken>,
    /// Most recently admitted load; owns `phase` and the render gate.
    current: Option<LoadTicket>,
    phase: LoadPhase,
    last_started: HashMap<String, Instant>,
    latest: u64,
}

impl LoadCoordinator {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            in_flight: HashMap::new(),
            current: None,
            phase: LoadPhase::Idle,
            last_started: HashMap::new(),
            latest: 0,
        }
    }

    pub fn try_begin(&mut self, symbol: &str, force: bool) -> Admission {
        self.try_begin_at(symbol, force, Instant::now())
    }

    pub fn try_begin_at(&mut self, symbol: &str, force: bool, now: Instant) -> Admission {
        if !force {
            if self.in_flight.contains_key(symbol) {
                debug!("{symbol}: load already in flight, suppressed");
                return Admission::Suppressed(SuppressReason::InFlight);
            }
            let cooling = self
                .last_started
                .get(symbol)
                .is_some_and(|at| now.saturating_duration_since(*at) < self.cooldown);
            if cooling {
                debug!("{symbol}: within {:?} cooldown, suppressed", self.cooldown);
                return Admission::Suppressed(SuppressReason::Cooldown);
            }
        }

        self.latest += 1;
        let ticket = LoadTicket {
            token: RequestToken(self.latest),
            symbol: symbol.to_string(),
        };
        if let Some(prev) = self.current.replace(ticket.clone()) {
            debug!("{}: superseded by {} (token {})", prev.symbol, symbol, self.latest);
        }
        self.in_flight.insert(symbol.to_string(), ticket.token);
        self.last_started.insert(symbol.to_string(), now);
        self.phase = LoadPhase::Fetching;
        Admission::Admitted(ticket)
    }

    /// Move the latest load to `phase`. Superseded tickets are ignored.
    pub fn advance(&mut self, ticket: &LoadTicket, phase: LoadPhase) {
        if self.is_current(ticket.token) {
            self.phase = phase;
        }
    }

    /// Release `ticket`'s symbol if it still holds it. A superseded load of
    /// another symbol still clears its own entry.
    pub fn finish(&mut self, ticket: &LoadTicket) {
        if self.in_flight.get(&ticket.symbol) == Some(&ticket.token) {
            self.in_flight.remove(&ticket.symbol);
        }
        if self.is_current(ticket.token) {
            self.current = None;
            self.phase = LoadPhase::Idle;
        }
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        token.0 == self.latest
    }

    pub fn is_in_flight(&self, symbol: &str) -> bool {
        self.in_flight.contains_key(symbol)
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    /// Symbol of the latest load, while it runs.
    pub fn in_flight_symbol(&self) -> Option<&str> {
        self.current.as_ref().map(|t| t.symbol.as_str())
    }
}

// ── Guard ─────────────────────────────────────────────────────────────────────

/// Holds an admitted ticket and releases it on drop, success or failure.
pub struct LoadGuard<'a> {
    coordinator: &'a Mutex<LoadCoordinator>,
    ticket: LoadTicket,
}

impl<'a> LoadGuard<'a> {
    pub fn new(coordinator: &'a Mutex<LoadCoordinator>, ticket: LoadTicket) -> Self {
        Self { coordinator, ticket }
    }

    pub fn ticket(&self) -> &LoadTicket {
        &self.ticket
    }

    pub fn advance(&self, phase: LoadPhase) {
        lock(self.coordinator).advance(&self.ticket, phase);
    }

    pub fn is_current(&self) -> bool {
        lock(self.coordinator).is_current(self.ticket.token)
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        lock(self.coordinator).finish(&self.ticket);
    }
}

/// The coordinator holds plain data, so a poisoned lock is still usable.
pub fn lock(coordinator: &Mutex<LoadCoordinator>) -> std::sync::MutexGuard<'_, LoadCoordinator> {
    coordinator.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
