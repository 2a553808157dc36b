//! Database readers behind the geo lookup.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

use maxminddb::{Reader, geoip2};
use tracing::debug;

use crate::error::{GeoError, GeoResult};
use crate::record::{GeoRecord, subdivision_path};

/// A pair of opened city and autonomous-system databases.
///
/// A handle is opened as a unit and replaced as a unit; it is never
/// mutated after `open` returns.
pub trait GeoDatabase: Sized + Send {
    /// Opens both databases.
    fn open(city: &Path, asn: &Path) -> GeoResult<Self>;

    /// Resolves `ip`. Missing data yields empty fields, never an error.
    fn lookup(&self, ip: IpAddr) -> GeoRecord;
}

/// `MaxMind` GeoIP2/GeoLite2 city and ASN databases.
///
/// Both files are read fully into memory, so no file descriptor stays open
/// and the live files may be overwritten once the handle is dropped.
pub struct MaxMindDatabase {
    city: Reader<Vec<u8>>,
    asn: Reader<Vec<u8>>,
}

impl MaxMindDatabase {
    fn open_reader(path: &Path) -> GeoResult<Reader<Vec<u8>>> {
        Reader::open_readfile(path).map_err(|e| GeoError::Database {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for MaxMindDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaxMindDatabase")
            .field("city", &self.city.metadata.database_type)
            .field("asn", &self.asn.metadata.database_type)
            .finish()
    }
}

impl GeoDatabase for MaxMindDatabase {
    fn open(city: &Path, asn: &Path) -> GeoResult<Self> {
        Ok(Self {
            city: Self::open_reader(city)?,
            asn: Self::open_reader(asn)?,
        })
    }

    fn lookup(&self, ip: IpAddr) -> GeoRecord {
        let city = self
            .city
            .lookup::<geoip2::City<'_>>(ip)
            .map_err(|e| debug!(ip = %ip, error = %e, "City lookup missed"))
            .ok();
        let asn = self
            .asn
            .lookup::<geoip2::Asn<'_>>(ip)
            .map_err(|e| debug!(ip = %ip, error = %e, "ASN lookup missed"))
            .ok();

        build_record(ip, city.as_ref(), asn.as_ref())
    }
}

/// Merges city and ASN results; either may be missing.
fn build_record(
    ip: IpAddr,
    city: Option<&geoip2::City<'_>>,
    asn: Option<&geoip2::Asn<'_>>,
) -> GeoRecord {
    let mut record = GeoRecord::address_only(ip);

    if let Some(city) = city {
        apply_city(&mut record, city);
    }

    // ASN data resolves independently of city data.
    if let Some(asn) = asn {
        record.autonomous_system_organization = asn
            .autonomous_system_organization
            .unwrap_or_default()
            .to_owned();
    }

    record
}

fn english(names: Option<&BTreeMap<&str, &str>>) -> String {
    names
        .and_then(|names| names.get("en"))
        .map(|name| (*name).to_owned())
        .unwrap_or_default()
}

fn apply_city(record: &mut GeoRecord, city: &geoip2::City<'_>) {
    record.city = english(city.city.as_ref().and_then(|c| c.names.as_ref()));
    record.country = english(city.country.as_ref().and_then(|c| c.names.as_ref()));

    if let Some(traits) = &city.traits {
        record.proxy = traits.is_anonymous_proxy.unwrap_or(false);
        record.anycast = traits.is_anycast.unwrap_or(false);
        record.satellite = traits.is_satellite_provider.unwrap_or(false);
    }

    if let Some(subdivisions) = &city.subdivisions {
        record.subdivision =
            subdivision_path(subdivisions.iter().map(|s| english(s.names.as_ref())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = MaxMindDatabase::open(&dir.path().join("city.mmdb"), &dir.path().join("asn.mmdb"));
        match result {
            Err(GeoError::Database { path, .. }) => assert!(path.ends_with("city.mmdb")),
            other => panic!("expected database error, got {other:?}"),
        }
    }

    #[test]
    fn test_open_garbage_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let city = dir.path().join("city.mmdb");
        let asn = dir.path().join("asn.mmdb");
        std::fs::write(&city, b"not a maxmind database").unwrap();
        std::fs::write(&asn, b"not a maxmind database").unwrap();

        assert!(matches!(
            MaxMindDatabase::open(&city, &asn),
            Err(GeoError::Database { .. })
        ));
    }

    const CITY_JSON: &str = r#"{
        "city": {"names": {"de": "Bottrop", "en": "Bottrop"}},
        "country": {"iso_code": "DE", "names": {"en": "Germany", "fr": "Allemagne"}},
        "subdivisions": [
            {"iso_code": "NW", "names": {"en": "North Rhine-Westphalia"}},
            {"iso_code": "MS", "names": {"en": "Muenster"}}
        ],
        "traits": {"is_anonymous_proxy": true, "is_satellite_provider": false}
    }"#;

    fn ip() -> IpAddr {
        "2.160.0.1".parse().unwrap()
    }

    #[test]
    fn test_record_from_city_and_asn() {
        let city: geoip2::City<'_> = serde_json::from_str(CITY_JSON).unwrap();
        let asn: geoip2::Asn<'_> = serde_json::from_str(
            r#"{"autonomous_system_number": 3320, "autonomous_system_organization": "Deutsche Telekom AG"}"#,
        )
        .unwrap();

        let record = build_record(ip(), Some(&city), Some(&asn));

        assert_eq!(record.ip, ip());
        assert_eq!(record.city, "Bottrop");
        assert_eq!(record.country, "Germany");
        assert_eq!(record.subdivision, "Muenster/North Rhine-Westphalia");
        assert!(record.proxy);
        assert!(!record.anycast);
        assert!(!record.satellite);
        assert_eq!(record.autonomous_system_organization, "Deutsche Telekom AG");
    }

    #[test]
    fn test_record_asn_without_city() {
        let asn: geoip2::Asn<'_> =
            serde_json::from_str(r#"{"autonomous_system_organization": "Example Transit"}"#)
                .unwrap();

        let record = build_record(ip(), None, Some(&asn));

        assert!(record.city.is_empty());
        assert!(record.country.is_empty());
        assert!(record.subdivision.is_empty());
        assert_eq!(record.autonomous_system_organization, "Example Transit");
    }

    #[test]
    fn test_record_without_data_is_address_only() {
        assert_eq!(build_record(ip(), None, None), GeoRecord::address_only(ip()));
    }

    #[test]
    fn test_record_city_without_english_names() {
        let city: geoip2::City<'_> =
            serde_json::from_str(r#"{"city": {"names": {"ja": "ロンドン"}}, "traits": {}}"#).unwrap();

        let record = build_record(ip(), Some(&city), None);

        assert!(record.city.is_empty());
        assert!(!record.proxy);
        assert!(record.autonomous_system_organization.is_empty());
    }

    #[test]
    fn test_english_name_selection() {
        let mut names = BTreeMap::new();
        names.insert("de", "London");
        names.insert("en", "London");
        names.insert("fr", "Londres");
        assert_eq!(english(Some(&names)), "London");

        names.remove("en");
        assert_eq!(english(Some(&names)), "");
        assert_eq!(english(None), "");
    }
}
