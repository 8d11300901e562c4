//! IPv4 subnet targeting for queries addressing a whole address range.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use tracing::warn;

/// Whether `target` is a CIDR-style subnet form (`a.b.c.d/p`).
///
/// A plain dotted quad is a user identifier, not a subnet, so the slash is
/// required.
pub fn is_subnet(target: &str) -> bool {
    target.contains('/') && target.parse::<Ipv4Network>().is_ok()
}

/// The subset of `users` whose address lies inside `subnet`, in input
/// order. Users that do not parse as IPv4 addresses never match.
pub fn users_in_subnet(subnet: &str, users: &[String]) -> Vec<String> {
    let network: Ipv4Network = match subnet.parse() {
        Ok(network) => network,
        Err(err) => {
            warn!(subnet, %err, "not a valid subnet, no users selected");
            return Vec::new();
        }
    };
    users
        .iter()
        .filter(|user| {
            user.parse::<Ipv4Addr>()
                .map(|ip| network.contains(ip))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}
