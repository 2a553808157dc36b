//! # proxy-jail-geo
//!
//! Geolocation enrichment for ban decisions.
//!
//! - [`GeoLookup`] - point lookups against a city and an autonomous-system
//!   database, refreshed from staged replacement files without downtime
//! - [`GeoDatabase`] - the opened database pair, with [`MaxMindDatabase`] as
//!   the production reader
//! - [`GeoRecord`] - the per-lookup result
//!
//! # Example
//!
//! ```rust,no_run
//! use proxy_jail_geo::{GeoLookup, GeoPaths};
//!
//! let paths = GeoPaths {
//!     city: "/var/lib/geo/GeoLite2-City.mmdb".into(),
//!     staged_city: "/var/lib/geo/staged/GeoLite2-City.mmdb".into(),
//!     asn: "/var/lib/geo/GeoLite2-ASN.mmdb".into(),
//!     staged_asn: "/var/lib/geo/staged/GeoLite2-ASN.mmdb".into(),
//! };
//! let mut lookup: GeoLookup = GeoLookup::open_degraded(paths);
//! let record = lookup.get_ip_geo("81.2.69.160".parse().unwrap());
//! println!("{} / {}", record.country, record.city);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod database;
pub mod error;
pub mod lookup;
pub mod record;
pub mod sync;

pub use database::{GeoDatabase, MaxMindDatabase};
pub use error::{GeoError, GeoResult};
pub use lookup::{DEFAULT_CHECK_INTERVAL, GeoLookup, GeoPaths, GeoProvider};
pub use record::GeoRecord;
