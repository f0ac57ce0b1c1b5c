//! Property-based tests for allocation and validation logic.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::unwrap_used)]

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use proptest::prelude::*;

use strata_cli::domain::compute::validate_capacity;
use strata_cli::domain::config::{VALID_CONFIG_KEYS, validate_config_key};
use strata_cli::domain::edge::{DefaultAction, EdgePolicyProps, EdgeRule, Scope, VisibilityConfig};
use strata_cli::domain::network::{
    NetworkProps, SubnetConfiguration, SubnetType, allocate_subnets,
};
use strata_cli::domain::stack::logical_id;

// ============================================================================
// Subnet allocation
// ============================================================================

fn overlaps(a: Ipv4Network, b: Ipv4Network) -> bool {
    a.contains(b.network()) || b.contains(a.network())
}

proptest! {
    /// Every allocated block lies inside the network and no two overlap.
    #[test]
    fn prop_allocations_disjoint_and_contained(
        octet in 0u8..=255,
        prefix in 16u8..=22,
        max_azs in 1u8..=6,
        masks in proptest::collection::vec(prefix_range(), 1..4),
    ) {
        let cidr = Ipv4Network::new(Ipv4Addr::new(10, octet, 0, 0), prefix).unwrap();
        let types = [SubnetType::Public, SubnetType::PrivateWithEgress, SubnetType::Isolated];
        let props = NetworkProps {
            subnets: masks
                .iter()
                .enumerate()
                .map(|(i, mask)| SubnetConfiguration::new(&format!("tier{i}"), *mask, types[i % 3]))
                .collect(),
            ..NetworkProps::three_tier(cidr, max_azs)
        };
        // Exhaustion is a legitimate outcome; only successful plans are checked.
        if let Ok(allocations) = allocate_subnets(&props) {
            prop_assert_eq!(allocations.len(), masks.len() * usize::from(max_azs));
            for (i, a) in allocations.iter().enumerate() {
                prop_assert!(cidr.contains(a.cidr.network()));
                prop_assert!(cidr.contains(a.cidr.broadcast()));
                for b in &allocations[i + 1..] {
                    prop_assert!(!overlaps(a.cidr, b.cidr), "{} overlaps {}", a.cidr, b.cidr);
                }
            }
        }
    }
}

fn prefix_range() -> impl Strategy<Value = u8> {
    24u8..=28
}

// ============================================================================
// Capacity bounds
// ============================================================================

proptest! {
    /// Accepted exactly when 1 <= min <= max.
    #[test]
    fn prop_capacity_bounds(min in 0u32..50, max in 0u32..50) {
        prop_assert_eq!(validate_capacity(min, max, None).is_ok(), min >= 1 && min <= max);
    }

    /// A desired capacity must sit within the bounds.
    #[test]
    fn prop_desired_within_bounds(min in 1u32..10, span in 0u32..10, desired in 0u32..30) {
        let max = min + span;
        prop_assert_eq!(
            validate_capacity(min, max, Some(desired)).is_ok(),
            (min..=max).contains(&desired)
        );
    }
}

// ============================================================================
// Configuration whitelist
// ============================================================================

proptest! {
    /// Arbitrary keys outside the whitelist are rejected.
    #[test]
    fn prop_arbitrary_keys_rejected(key in "[a-z_]{1,20}\\.[a-z_]{1,20}") {
        prop_assume!(!VALID_CONFIG_KEYS.contains(&key.as_str()));
        prop_assert!(validate_config_key(&key).is_err());
    }
}

#[test]
fn test_every_whitelisted_key_accepted() {
    for key in VALID_CONFIG_KEYS {
        assert!(validate_config_key(key).is_ok(), "{key}");
    }
}

// ============================================================================
// Logical ids
// ============================================================================

proptest! {
    /// Ids are alphanumeric, bounded and a pure function of the path.
    #[test]
    fn prop_logical_id_shape(path in proptest::collection::vec("[ -~]{0,40}", 1..5)) {
        let parts: Vec<&str> = path.iter().map(String::as_str).collect();
        let id = logical_id(&parts);
        prop_assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        prop_assert!(id.len() <= 255);
        prop_assert_eq!(id, logical_id(&parts));
    }

    /// Multi-component paths differing only in punctuation get distinct ids.
    #[test]
    fn prop_logical_id_suffix_disambiguates(name in "[a-z]{1,10}") {
        let dashed = format!("{name}-");
        prop_assert_ne!(logical_id(&["Vpc", &name]), logical_id(&["Vpc", &dashed]));
    }
}

// ============================================================================
// Edge policy priorities
// ============================================================================

proptest! {
    /// A rule set is accepted exactly when its priorities are unique.
    #[test]
    fn prop_priorities_must_be_unique(priorities in proptest::collection::vec(0u32..6, 1..6)) {
        let rules = priorities
            .iter()
            .enumerate()
            .map(|(i, p)| EdgeRule::managed("AWS", &format!("Group{i}"), *p))
            .collect();
        let props = EdgePolicyProps {
            name: "MyWebACL".to_string(),
            scope: Scope::Regional,
            default_action: DefaultAction::Allow,
            visibility: VisibilityConfig::enabled("WafStack-WebACL"),
            rules,
            association: None,
        };
        let mut unique = priorities.clone();
        unique.sort_unstable();
        unique.dedup();
        prop_assert_eq!(props.validate().is_ok(), unique.len() == priorities.len());
    }
}
