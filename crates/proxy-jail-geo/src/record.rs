//! Geolocation lookup results.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Best-effort location metadata for one address.
///
/// Records are produced per lookup and never stored. Fields the databases
/// could not resolve stay empty or `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoRecord {
    /// The address that was looked up.
    pub ip: IpAddr,
    /// English city name.
    pub city: String,
    /// Subdivisions from least to most specific, joined by `/`.
    pub subdivision: String,
    /// English country name.
    pub country: String,
    /// Address belongs to an anonymous proxy.
    pub proxy: bool,
    /// Address is anycast.
    pub anycast: bool,
    /// Address belongs to a satellite provider.
    pub satellite: bool,
    /// Organization owning the autonomous system.
    pub autonomous_system_organization: String,
}

impl GeoRecord {
    /// A record carrying only the address, used when nothing resolves.
    #[must_use]
    pub fn address_only(ip: IpAddr) -> Self {
        Self {
            ip,
            city: String::new(),
            subdivision: String::new(),
            country: String::new(),
            proxy: false,
            anycast: false,
            satellite: false,
            autonomous_system_organization: String::new(),
        }
    }

    /// Whether any descriptive field was resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !self.city.is_empty()
            || !self.subdivision.is_empty()
            || !self.country.is_empty()
            || !self.autonomous_system_organization.is_empty()
            || self.proxy
            || self.anycast
            || self.satellite
    }
}

/// Builds the display path for subdivisions stored most specific first.
pub(crate) fn subdivision_path<I, S>(most_specific_first: I) -> String
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut names: Vec<String> = most_specific_first.into_iter().map(Into::into).collect();
    names.reverse();
    names.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_only_is_unresolved() {
        let record = GeoRecord::address_only("81.2.69.160".parse().unwrap());
        assert_eq!(record.ip.to_string(), "81.2.69.160");
        assert!(!record.is_resolved());
        assert!(record.city.is_empty());
        assert!(!record.proxy);
    }

    #[test]
    fn test_asn_alone_counts_as_resolved() {
        let mut record = GeoRecord::address_only("1.1.1.1".parse().unwrap());
        record.autonomous_system_organization = "Cloudflare".into();
        assert!(record.is_resolved());
    }

    #[test]
    fn test_subdivision_path_is_reversed() {
        assert_eq!(subdivision_path(["Westminster", "England"]), "England/Westminster");
        assert_eq!(subdivision_path(["England"]), "England");
        assert_eq!(subdivision_path(Vec::<String>::new()), "");
    }

    #[test]
    fn test_serializes_snake_case() {
        let mut record = GeoRecord::address_only("81.2.69.160".parse().unwrap());
        record.city = "London".into();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["ip"], "81.2.69.160");
        assert_eq!(json["city"], "London");
        assert_eq!(json["autonomous_system_organization"], "");
        assert_eq!(json["satellite"], false);
    }
}
