//! Ban logging backends.
//!
//! This module provides the [`BanLogger`] trait, the [`BanLogEntry`] every
//! logger receives, and a `tracing`-based implementation.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use proxy_jail_geo::GeoRecord;
use serde::{Deserialize, Serialize};

/// What happened to an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BanAction {
    /// The address was banned.
    #[serde(rename = "ban")]
    Ban,
    /// An error was counted but forgiven.
    #[serde(rename = "count error")]
    CountError,
    /// An error arrived while the address was already banned.
    #[serde(rename = "banned")]
    Banned,
}

impl BanAction {
    /// The wire name of the action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ban => "ban",
            Self::CountError => "count error",
            Self::Banned => "banned",
        }
    }
}

impl fmt::Display for BanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ban decision or observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BanLogEntry {
    /// The address concerned.
    pub ip: IpAddr,
    /// When the ban ends; only set for [`BanAction::Ban`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jail_until: Option<DateTime<Utc>>,
    /// Reasons, oldest first.
    pub reasons: Vec<String>,
    /// What happened.
    pub action: BanAction,
    /// Location context; only looked up for bans.
    pub geo: Option<GeoRecord>,
}

impl BanLogEntry {
    /// A ban with its expiry, reasons and optional location.
    #[must_use]
    pub fn ban(
        ip: IpAddr,
        jail_until: DateTime<Utc>,
        reasons: Vec<String>,
        geo: Option<GeoRecord>,
    ) -> Self {
        Self {
            ip,
            jail_until: Some(jail_until),
            reasons,
            action: BanAction::Ban,
            geo,
        }
    }

    /// A non-ban observation carrying the triggering reason.
    #[must_use]
    pub fn observation(ip: IpAddr, reason: impl Into<String>, action: BanAction) -> Self {
        Self {
            ip,
            jail_until: None,
            reasons: vec![reason.into()],
            action,
            geo: None,
        }
    }

    /// Serializes the entry as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Trait for ban log destinations.
///
/// Called synchronously from the serialized consumer, after the backend.
/// Implementations must not block indefinitely.
pub trait BanLogger: Send + Sync {
    /// Logs one entry.
    fn log(&self, entry: &BanLogEntry);
}

/// Ban logger that uses the `tracing` infrastructure.
///
/// Bans are logged with `tracing::warn!`, observations with
/// `tracing::info!`. The geo record is embedded as JSON.
#[derive(Debug, Clone, Default)]
pub struct TracingBanLogger {
    /// Optional service name attached to every event.
    service: Option<String>,
}

impl TracingBanLogger {
    /// Creates a new tracing-based ban logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a logger that tags events with `service`.
    #[must_use]
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: Some(service.into()),
        }
    }
}

impl BanLogger for TracingBanLogger {
    fn log(&self, entry: &BanLogEntry) {
        let service = self.service.as_deref().unwrap_or("proxy-jail");
        let jail_until = entry
            .jail_until
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let geo = entry
            .geo
            .as_ref()
            .and_then(|g| serde_json::to_string(g).ok())
            .unwrap_or_default();
        let reasons = &entry.reasons;

        match entry.action {
            BanAction::Ban => {
                tracing::warn!(
                    target: "proxy_jail",
                    service,
                    ip = %entry.ip,
                    %jail_until,
                    ?reasons,
                    action = %entry.action,
                    %geo,
                    "{}", entry.action
                );
            }
            BanAction::CountError | BanAction::Banned => {
                tracing::info!(
                    target: "proxy_jail",
                    service,
                    ip = %entry.ip,
                    ?reasons,
                    action = %entry.action,
                    "{}", entry.action
                );
            }
        }
    }
}
