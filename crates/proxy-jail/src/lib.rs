//! # proxy-jail
//!
//! Serialized ban decisions for reverse proxies.
//!
//! Request handlers report abusive clients; this crate decides whether and
//! for how long to ban them and hands the decision to a firewall backend:
//!
//! - [`Dispatcher`] - the async funnel; one consumer processes every ban and
//!   error in submission order
//! - [`Engine`] - whitelist checks, per-address error counting and escalation
//! - [`Whitelist`] - IPv4 addresses and CIDR networks that are never banned
//! - [`BanBackend`] / [`BanLogger`] - capabilities supplied by the embedder
//! - [`JailConfig`] - unified configuration with sensible defaults
//!
//! Geolocation enrichment lives in `proxy-jail-geo` and is re-exported here.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use proxy_jail::{Dispatcher, JailConfig, TracingBanLogger};
//!
//! # async fn run() -> proxy_jail::JailResult<()> {
//! let config = JailConfig::builder().whitelist_rule("10.0.0.0/8").build();
//! let jail = Dispatcher::builder()
//!     .config(config)
//!     .logger(Arc::new(TracingBanLogger::new()))
//!     .build()?;
//!
//! jail.log_ip_error("198.51.100.7".parse().unwrap(), "invalid token").await?;
//! jail.ban_ip("198.51.100.8".parse().unwrap(), 30, "path traversal").await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod counter;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod logger;
pub mod matcher;

// Re-export main types
pub use backend::BanBackend;
pub use config::{ForgivablePolicy, JailConfig, JailConfigBuilder};
pub use counter::{CountOutcome, ErrorCounter};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use engine::{Engine, Event};
pub use error::{JailError, JailResult};
pub use logger::{BanAction, BanLogEntry, BanLogger, TracingBanLogger};
pub use matcher::{AddressMatcher, Whitelist};
pub use proxy_jail_geo::{GeoLookup, GeoPaths, GeoProvider, GeoRecord};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::BanBackend;
    pub use crate::config::{ForgivablePolicy, JailConfig};
    pub use crate::dispatcher::Dispatcher;
    pub use crate::error::{JailError, JailResult};
    pub use crate::logger::{BanAction, BanLogEntry, BanLogger, TracingBanLogger};
    pub use proxy_jail_geo::GeoRecord;
}
