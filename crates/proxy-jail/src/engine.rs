//! The ban decision engine.
//!
//! [`Engine`] owns the whitelist, the per-address counter table, the geo
//! lookup and the backend/logger capabilities. Every method takes
//! `&mut self`; the [`Dispatcher`](crate::Dispatcher) is what serializes
//! concurrent submitters onto a single engine.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use proxy_jail_geo::GeoProvider;
use tracing::{debug, info};

use crate::backend::BanBackend;
use crate::config::ForgivablePolicy;
use crate::counter::{CountOutcome, ErrorCounter};
use crate::logger::{BanAction, BanLogEntry, BanLogger};
use crate::matcher::Whitelist;

/// One unit of work for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Ban immediately, bypassing escalation.
    Ban {
        /// Address to ban.
        ip: IpAddr,
        /// Ban length.
        timeout_minutes: u32,
        /// Why.
        reason: String,
    },
    /// Count one error against an address.
    Error {
        /// Offending address.
        ip: IpAddr,
        /// What went wrong.
        reason: String,
    },
    /// Drop idle counters.
    Sweep,
}

/// Serialized ban decision state.
pub struct Engine {
    whitelist: Whitelist,
    policy: ForgivablePolicy,
    counters: HashMap<IpAddr, ErrorCounter>,
    geo: Option<Box<dyn GeoProvider>>,
    backend: Option<Arc<dyn BanBackend>>,
    logger: Arc<dyn BanLogger>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("whitelist", &self.whitelist)
            .field("policy", &self.policy)
            .field("tracked", &self.counters.len())
            .field("geo", &self.geo.is_some())
            .field("backend", &self.backend.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine. A missing backend skips the ban call but still
    /// logs and tracks state.
    #[must_use]
    pub fn new(
        whitelist: Whitelist,
        policy: ForgivablePolicy,
        backend: Option<Arc<dyn BanBackend>>,
        logger: Arc<dyn BanLogger>,
        geo: Option<Box<dyn GeoProvider>>,
    ) -> Self {
        Self {
            whitelist,
            policy,
            counters: HashMap::new(),
            geo,
            backend,
            logger,
        }
    }

    /// Processes one event to completion.
    pub fn process(&mut self, event: Event, now: Instant) {
        match event {
            Event::Ban {
                ip,
                timeout_minutes,
                reason,
            } => self.handle_ban(ip, timeout_minutes, reason),
            Event::Error { ip, reason } => self.handle_error(ip, reason, now),
            Event::Sweep => {
                self.sweep(now);
            }
        }
    }

    /// Bans `ip` unconditionally unless it is whitelisted.
    pub fn handle_ban(&mut self, ip: IpAddr, timeout_minutes: u32, reason: String) {
        let ip = ip.to_canonical();
        if self.whitelist.contains(&ip) {
            debug!(ip = %ip, "Whitelisted, ignoring ban");
            return;
        }

        self.execute_ban(ip, timeout_minutes, vec![reason]);
    }

    /// Counts one error against `ip`, escalating to a ban past the burst.
    ///
    /// IPv4-mapped addresses share the counter of their IPv4 form.
    pub fn handle_error(&mut self, ip: IpAddr, reason: String, now: Instant) {
        let ip = ip.to_canonical();
        if self.whitelist.contains(&ip) {
            debug!(ip = %ip, "Whitelisted, ignoring error");
            return;
        }

        let policy = &self.policy;
        let outcome = self
            .counters
            .entry(ip)
            .or_insert_with(|| ErrorCounter::new(policy, now))
            .record(reason, now);

        match outcome {
            CountOutcome::AlreadyBanned { reason } => {
                self.logger
                    .log(&BanLogEntry::observation(ip, reason, BanAction::Banned));
            }
            CountOutcome::Counted { reason } => {
                debug!(ip = %ip, reason = %reason, "Error counted");
                self.logger
                    .log(&BanLogEntry::observation(ip, reason, BanAction::CountError));
            }
            CountOutcome::Escalated { reasons } => {
                self.execute_ban(ip, self.policy.ban_minutes, reasons);
            }
        }
    }

    fn execute_ban(&mut self, ip: IpAddr, timeout_minutes: u32, reasons: Vec<String>) {
        if let Some(backend) = &self.backend {
            backend.ban_ip(ip, timeout_minutes);
        }

        let geo = self.geo.as_mut().map(|geo| geo.lookup(ip));
        let jail_until = Utc::now() + chrono::Duration::minutes(i64::from(timeout_minutes));

        info!(
            ip = %ip,
            minutes = timeout_minutes,
            reasons = reasons.len(),
            "Address banned"
        );
        self.logger
            .log(&BanLogEntry::ban(ip, jail_until, reasons, geo));
    }

    /// Drops counters that are neither banned nor holding unspent errors.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.is_idle(now));

        let removed = before.saturating_sub(self.counters.len());
        if removed > 0 {
            debug!(removed, remaining = self.counters.len(), "Swept idle counters");
        }
        removed
    }

    /// Number of addresses with counter state.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.counters.len()
    }

    /// Whether `ip` is banned through error escalation at `now`.
    #[must_use]
    pub fn is_banned(&self, ip: &IpAddr, now: Instant) -> bool {
        self.counters
            .get(&ip.to_canonical())
            .is_some_and(|c| c.is_banned(now))
    }
}
