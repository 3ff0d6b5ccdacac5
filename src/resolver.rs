//! Device Resolver (C1): maps a source address to a stable device identifier.
//!
//! The mapping table is held behind an `arc_swap::ArcSwap` so `resolve` is
//! lock-free on the read path and a `reload` is a single atomic pointer
//! swap — readers never observe a half-updated map, matching the teacher's
//! pattern of swapping an immutable configuration snapshot rather than
//! locking a mutable one in place.

use arc_swap::ArcSwap;
use ipnet::IpNet;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

/// A CIDR range with an auto-assignment policy.
#[derive(Debug, Clone)]
pub struct CidrRule {
    pub network: IpNet,
    pub prefix_tag: String,
    pub auto_assign: bool,
}

/// The immutable routing table swapped in on each `reload`.
#[derive(Debug, Clone, Default)]
pub struct DeviceMap {
    exact: ahash::AHashMap<IpAddr, String>,
    /// Sorted longest-prefix-first so the first match wins.
    ranges: Vec<CidrRule>,
}

impl DeviceMap {
    pub fn new(exact: ahash::AHashMap<IpAddr, String>, mut ranges: Vec<CidrRule>) -> Self {
        ranges.sort_by_key(|r| std::cmp::Reverse(r.network.prefix_len()));
        DeviceMap { exact, ranges }
    }
}

/// Resolves source addresses to device ids with the three-tier lookup
/// order from the spec: exact match, longest-prefix auto-assign match,
/// then an `unknown-<ip>` fallback.
pub struct DeviceResolver {
    map: ArcSwap<DeviceMap>,
}

impl Default for DeviceResolver {
    fn default() -> Self {
        DeviceResolver {
            map: ArcSwap::from_pointee(DeviceMap::default()),
        }
    }
}

impl DeviceResolver {
    pub fn new(map: DeviceMap) -> Self {
        DeviceResolver {
            map: ArcSwap::from_pointee(map),
        }
    }

    /// Atomically replaces the routing table. Concurrent `resolve` calls
    /// either see the old or the new table in full, never a mix.
    pub fn reload(&self, map: DeviceMap) {
        self.map.store(Arc::new(map));
    }

    /// Resolves a source-IP literal to a device id. Never fails: an
    /// unparsable address falls back to `unknown-invalid`.
    pub fn resolve(&self, source_ip: &str) -> String {
        let Ok(addr) = IpAddr::from_str(source_ip) else {
            return "unknown-invalid".to_string();
        };
        self.resolve_addr(addr)
    }

    pub fn resolve_addr(&self, addr: IpAddr) -> String {
        let map = self.map.load();

        if let Some(id) = map.exact.get(&addr) {
            return id.clone();
        }

        for rule in &map.ranges {
            if rule.auto_assign && rule.network.contains(&addr) {
                return format!("{}-{}", rule.prefix_tag, dashed(addr));
            }
        }

        format!("unknown-{}", dashed(addr))
    }
}

fn dashed(addr: IpAddr) -> String {
    addr.to_string().replace(['.', ':'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with(exact: &[(&str, &str)], ranges: &[(&str, &str, bool)]) -> DeviceMap {
        let exact = exact
            .iter()
            .map(|(ip, id)| (IpAddr::from_str(ip).unwrap(), id.to_string()))
            .collect();
        let ranges = ranges
            .iter()
            .map(|(cidr, tag, auto)| CidrRule {
                network: cidr.parse().unwrap(),
                prefix_tag: tag.to_string(),
                auto_assign: *auto,
            })
            .collect();
        DeviceMap::new(exact, ranges)
    }

    #[test]
    fn exact_match_wins_over_cidr() {
        let resolver = DeviceResolver::new(map_with(
            &[("10.0.0.5", "core-switch-1")],
            &[("10.0.0.0/24", "branch", true)],
        ));
        assert_eq!(resolver.resolve("10.0.0.5"), "core-switch-1");
    }

    #[test]
    fn cidr_auto_assign_builds_id_from_prefix_and_ip() {
        let resolver = DeviceResolver::new(map_with(&[], &[("10.0.0.0/24", "branch", true)]));
        assert_eq!(resolver.resolve("10.0.0.7"), "branch-10-0-0-7");
    }

    #[test]
    fn non_auto_assign_cidr_is_skipped() {
        let resolver = DeviceResolver::new(map_with(&[], &[("10.0.0.0/24", "branch", false)]));
        assert_eq!(resolver.resolve("10.0.0.7"), "unknown-10-0-0-7");
    }

    #[test]
    fn longest_prefix_wins() {
        let resolver = DeviceResolver::new(map_with(
            &[],
            &[
                ("10.0.0.0/8", "wide", true),
                ("10.0.0.0/24", "narrow", true),
            ],
        ));
        assert_eq!(resolver.resolve("10.0.0.7"), "narrow-10-0-0-7");
    }

    #[test]
    fn unparseable_address_is_unknown_invalid() {
        let resolver = DeviceResolver::default();
        assert_eq!(resolver.resolve("not-an-ip"), "unknown-invalid");
    }

    #[test]
    fn unmatched_address_falls_back_to_unknown() {
        let resolver = DeviceResolver::default();
        assert_eq!(resolver.resolve("192.168.1.1"), "unknown-192-168-1-1");
    }

    #[test]
    fn reload_is_visible_to_subsequent_resolves() {
        let resolver = DeviceResolver::default();
        assert_eq!(resolver.resolve("10.0.0.5"), "unknown-10-0-0-5");
        resolver.reload(map_with(&[("10.0.0.5", "core-switch-1")], &[]));
        assert_eq!(resolver.resolve("10.0.0.5"), "core-switch-1");
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        let resolver = DeviceResolver::new(map_with(&[], &[("10.0.0.0/24", "branch", true)]));
        let first = resolver.resolve("10.0.0.9");
        for _ in 0..10 {
            assert_eq!(resolver.resolve("10.0.0.9"), first);
        }
    }
}
