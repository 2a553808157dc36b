//! Whitelist rules: exact IPv4 addresses and IPv4 networks.

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use ipnet::Ipv4Net;

use crate::error::{JailError, JailResult};

/// One whitelist rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMatcher {
    /// Matches a single address.
    Exact(Ipv4Addr),
    /// Matches every address in a network.
    Network(Ipv4Net),
}

impl AddressMatcher {
    /// Parses `a.b.c.d` or `a.b.c.d/len`.
    ///
    /// # Errors
    ///
    /// Returns `JailError::InvalidRule` for malformed rules and
    /// `JailError::UnsupportedFamily` for IPv6 rules.
    pub fn parse(rule: &str) -> JailResult<Self> {
        let trimmed = rule.trim();

        let Some((addr, prefix)) = trimmed.split_once('/') else {
            return parse_v4(trimmed, rule).map(Self::Exact);
        };

        let addr = parse_v4(addr, rule)?;
        let prefix: u8 = prefix.parse().map_err(|e| JailError::InvalidRule {
            rule: rule.to_string(),
            reason: format!("prefix length: {e}"),
        })?;
        let net = Ipv4Net::new(addr, prefix).map_err(|e| JailError::InvalidRule {
            rule: rule.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self::Network(net))
    }

    /// Whether `ip` is covered by this rule.
    ///
    /// IPv4-mapped IPv6 addresses are compared as IPv4; any other IPv6
    /// address never matches.
    #[must_use]
    pub fn matches(&self, ip: &IpAddr) -> bool {
        let IpAddr::V4(ip) = ip.to_canonical() else {
            return false;
        };

        match self {
            Self::Exact(addr) => *addr == ip,
            Self::Network(net) => net.contains(&ip),
        }
    }
}

impl FromStr for AddressMatcher {
    type Err = JailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_v4(addr: &str, rule: &str) -> JailResult<Ipv4Addr> {
    match addr.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => Ok(v4),
        Ok(IpAddr::V6(_)) => Err(JailError::UnsupportedFamily(rule.to_string())),
        Err(e) => Err(JailError::InvalidRule {
            rule: rule.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Ordered set of whitelist rules. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    rules: Vec<AddressMatcher>,
}

impl Whitelist {
    /// Parses every rule; the first invalid one fails the whole list.
    ///
    /// # Errors
    ///
    /// Returns the error of the first rule that fails to parse.
    pub fn from_rules<I, S>(rules: I) -> JailResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = rules
            .into_iter()
            .map(|rule| AddressMatcher::parse(rule.as_ref()))
            .collect::<JailResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Whether any rule covers `ip`.
    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.rules.iter().any(|rule| rule.matches(ip))
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the list has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test_case("10.0.0.0/8", "10.1.2.3", true ; "inside network")]
    #[test_case("10.0.0.0/8", "11.0.0.1", false ; "outside network")]
    #[test_case("192.168.1.10", "192.168.1.10", true ; "exact match")]
    #[test_case("192.168.1.10", "192.168.1.11", false ; "exact mismatch")]
    #[test_case("192.168.1.0/24", "192.168.1.0", true ; "network address")]
    #[test_case("192.168.1.0/24", "192.168.1.255", true ; "broadcast address")]
    #[test_case("192.168.1.0/24", "192.168.2.0", false ; "next network")]
    #[test_case("10.1.2.3/8", "10.200.0.1", true ; "host bits ignored")]
    #[test_case("0.0.0.0/0", "203.0.113.7", true ; "default route")]
    #[test_case("203.0.113.7/32", "203.0.113.7", true ; "host route")]
    fn test_matches(rule: &str, addr: &str, expected: bool) {
        let matcher = AddressMatcher::parse(rule).unwrap();
        assert_eq!(matcher.matches(&ip(addr)), expected);
    }

    #[test_case("not-an-ip" ; "garbage")]
    #[test_case("10.0.0.0/33" ; "prefix too long")]
    #[test_case("10.0.0.0/abc" ; "prefix not numeric")]
    #[test_case("10.0.0.0/8/8" ; "two slashes")]
    #[test_case("" ; "empty")]
    fn test_invalid_rule(rule: &str) {
        assert!(matches!(
            AddressMatcher::parse(rule),
            Err(JailError::InvalidRule { .. })
        ));
    }

    #[test_case("::1" ; "v6 address")]
    #[test_case("2001:db8::/32" ; "v6 network")]
    fn test_ipv6_rule_rejected(rule: &str) {
        assert!(matches!(
            AddressMatcher::parse(rule),
            Err(JailError::UnsupportedFamily(_))
        ));
    }

    #[test_case("10.0.0.0/8", "::ffff:10.0.0.1", true ; "mapped inside network")]
    #[test_case("10.0.0.0/8", "::ffff:11.0.0.1", false ; "mapped outside network")]
    #[test_case("192.168.1.10", "::ffff:192.168.1.10", true ; "mapped exact")]
    #[test_case("0.0.0.0/0", "2001:db8::1", false ; "native v6")]
    #[test_case("0.0.0.0/0", "::1", false ; "v6 loopback")]
    fn test_ipv6_input(rule: &str, addr: &str, expected: bool) {
        let matcher = AddressMatcher::parse(rule).unwrap();
        assert_eq!(matcher.matches(&ip(addr)), expected);
    }

    #[test]
    fn test_from_str() {
        let matcher: AddressMatcher = "127.0.0.1".parse().unwrap();
        assert_eq!(matcher, AddressMatcher::Exact(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_whitelist_any_rule() {
        let whitelist = Whitelist::from_rules(["127.0.0.1", "10.0.0.0/8"]).unwrap();
        assert_eq!(whitelist.len(), 2);
        assert!(whitelist.contains(&ip("127.0.0.1")));
        assert!(whitelist.contains(&ip("10.9.9.9")));
        assert!(!whitelist.contains(&ip("192.168.0.1")));
    }

    #[test]
    fn test_whitelist_rejects_bad_rule() {
        let err = Whitelist::from_rules(["127.0.0.1", "10.0.0.0/99"]).unwrap_err();
        assert!(matches!(err, JailError::InvalidRule { rule, .. } if rule == "10.0.0.0/99"));
    }

    #[test]
    fn test_empty_whitelist() {
        let whitelist = Whitelist::default();
        assert!(whitelist.is_empty());
        assert!(!whitelist.contains(&ip("127.0.0.1")));
    }

    proptest! {
        #[test]
        fn prop_network_contains_its_hosts(base in any::<u32>(), prefix in 0u8..=32, host in any::<u32>()) {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            let network = Ipv4Addr::from(base & mask);
            let inside = IpAddr::V4(Ipv4Addr::from((base & mask) | (host & !mask)));

            let matcher = AddressMatcher::parse(&format!("{network}/{prefix}")).unwrap();
            prop_assert!(matcher.matches(&inside));
        }

        #[test]
        fn prop_exact_matches_only_itself(a in any::<u32>(), b in any::<u32>()) {
            let matcher = AddressMatcher::parse(&Ipv4Addr::from(a).to_string()).unwrap();
            prop_assert_eq!(matcher.matches(&IpAddr::V4(Ipv4Addr::from(b))), a == b);
        }
    }
}
