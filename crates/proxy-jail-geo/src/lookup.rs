//! Geolocation lookup with staged-file hot swap.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::database::{GeoDatabase, MaxMindDatabase};
use crate::error::GeoResult;
use crate::record::GeoRecord;
use crate::sync::{copy_preserving_mtime, staged_update};

/// Default interval between staged-file checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Live and staged paths of the city and ASN databases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoPaths {
    /// Live city database.
    pub city: PathBuf,
    /// Staged replacement for the city database.
    pub staged_city: PathBuf,
    /// Live autonomous-system database.
    pub asn: PathBuf,
    /// Staged replacement for the autonomous-system database.
    pub staged_asn: PathBuf,
}

/// Something that resolves addresses to geo records.
///
/// Takes `&mut self`: providers may refresh their state on lookup and are
/// never shared between threads.
pub trait GeoProvider: Send {
    /// Resolves `ip`, degrading to an address-only record.
    fn lookup(&mut self, ip: IpAddr) -> GeoRecord;
}

/// Geo lookup that refreshes its databases from staged files.
///
/// There is no internal locking; callers must serialize access, which
/// `&mut self` on every mutating path enforces.
#[derive(Debug)]
pub struct GeoLookup<D = MaxMindDatabase> {
    paths: GeoPaths,
    handle: Option<D>,
    generation: u64,
    check_interval: Duration,
    last_check: Option<Instant>,
}

impl<D: GeoDatabase> GeoLookup<D> {
    /// Opens the live databases, then runs a first update check.
    ///
    /// # Errors
    ///
    /// Returns an error if the live databases cannot be opened.
    pub fn open(paths: GeoPaths) -> GeoResult<Self> {
        let handle = D::open(&paths.city, &paths.asn)?;
        let mut lookup = Self {
            paths,
            handle: Some(handle),
            generation: 1,
            check_interval: DEFAULT_CHECK_INTERVAL,
            last_check: None,
        };
        lookup.maybe_update(Instant::now());
        Ok(lookup)
    }

    /// Like [`GeoLookup::open`], but starts without a handle on failure.
    ///
    /// Lookups return address-only records until a scheduled check manages
    /// to open the databases.
    #[must_use]
    pub fn open_degraded(paths: GeoPaths) -> Self {
        match Self::open(paths.clone()) {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(error = %e, "Geo databases unavailable, lookups degraded");
                Self {
                    paths,
                    handle: None,
                    generation: 0,
                    check_interval: DEFAULT_CHECK_INTERVAL,
                    last_check: Some(Instant::now()),
                }
            }
        }
    }

    /// Sets the minimum interval between update checks.
    #[must_use]
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Looks up `ip`, first running a throttled update check.
    pub fn get_ip_geo(&mut self, ip: IpAddr) -> GeoRecord {
        self.maybe_update(Instant::now());

        match &self.handle {
            Some(db) => db.lookup(ip),
            None => {
                warn!(ip = %ip, "No geo database handle, returning address only");
                GeoRecord::address_only(ip)
            }
        }
    }

    /// Runs an update check unless one ran within the check interval.
    fn maybe_update(&mut self, now: Instant) {
        if self
            .last_check
            .is_some_and(|last| now.saturating_duration_since(last) < self.check_interval)
        {
            return;
        }
        self.last_check = Some(now);

        if let Err(e) = self.check_for_update() {
            warn!(error = %e, generation = self.generation, "Geo database update failed");
        }
    }

    /// Compares live and staged files and swaps the handle if needed.
    ///
    /// Bypasses the check interval. Returns `true` when a new handle was
    /// swapped in. On copy or reopen failure the lookup is left without a
    /// handle until the next check.
    pub fn check_for_update(&mut self) -> GeoResult<bool> {
        let city = staged_update(&self.paths.city, &self.paths.staged_city)?;
        let asn = staged_update(&self.paths.asn, &self.paths.staged_asn)?;

        if city.is_none() && asn.is_none() && self.handle.is_some() {
            debug!("Geo databases up to date");
            return Ok(false);
        }

        // The live files are about to be overwritten.
        self.handle = None;

        if let Some(stamp) = city {
            copy_preserving_mtime(&self.paths.staged_city, &self.paths.city, &stamp)?;
        }
        if let Some(stamp) = asn {
            copy_preserving_mtime(&self.paths.staged_asn, &self.paths.asn, &stamp)?;
        }

        let handle = D::open(&self.paths.city, &self.paths.asn)?;
        self.handle = Some(handle);
        self.generation = self.generation.saturating_add(1);
        info!(
            generation = self.generation,
            city_updated = city.is_some(),
            asn_updated = asn.is_some(),
            "Geo databases reloaded"
        );
        Ok(true)
    }

    /// Identity of the active handle; increments on every swap.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a usable database handle is active.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.handle.is_some()
    }

    /// The configured paths.
    #[must_use]
    pub const fn paths(&self) -> &GeoPaths {
        &self.paths
    }
}

impl<D: GeoDatabase> GeoProvider for GeoLookup<D> {
    fn lookup(&mut self, ip: IpAddr) -> GeoRecord {
        self.get_ip_geo(ip)
    }
}
