// Shared types for routes, tables and configuration

//! Shared data structures
//!
//! This module defines the vocabulary used across the crate: address families,
//! routing table ids, route descriptors as understood by `ip route`, the
//! lifecycle commands and the configuration file structures.

use ipnetwork::IpNetwork;
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;

/// Address family a routing operation applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// IPv4 (`ip -4`)
    V4,
    /// IPv6 (`ip -6`)
    V6,
}

impl AddressFamily {
    /// Both families, in the order they are processed
    pub const ALL: [AddressFamily; 2] = [AddressFamily::V4, AddressFamily::V6];

    /// Flag selecting this family on the `ip` command line
    pub fn ip_flag(self) -> &'static str {
        match self {
            AddressFamily::V4 => "-4",
            AddressFamily::V6 => "-6",
        }
    }

    /// Whether a network belongs to this family
    pub fn contains(self, network: &IpNetwork) -> bool {
        match self {
            AddressFamily::V4 => network.is_ipv4(),
            AddressFamily::V6 => network.is_ipv6(),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => f.write_str("IPv4"),
            AddressFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// Numeric routing table id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub u32);

impl TableId {
    /// The kernel's main table
    pub const MAIN: TableId = TableId(254);

    /// Tables the kernel reserves (unspec, default, main, local)
    pub fn is_reserved(self) -> bool {
        matches!(self.0, 0 | 253 | 254 | 255)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == TableId::MAIN {
            f.write_str("main")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Route destination: the catch-all default or a specific prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// 0.0.0.0/0 or ::/0
    Default,
    /// A specific network prefix
    Prefix(IpNetwork),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Default => f.write_str("default"),
            Destination::Prefix(net) => write!(f, "{}", net),
        }
    }
}

/// Everything in a route besides its destination
///
/// `options` holds the remaining `ip route` attributes (`proto static`,
/// `scope link`, `metric 50`, ...) as raw tokens so the descriptor can be
/// replayed verbatim onto another destination or table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NextHop {
    /// Gateway address (`via`), absent for device routes
    pub gateway: Option<IpAddr>,
    /// Output device (`dev`)
    pub device: Option<String>,
    /// Remaining attributes, in `ip route` order
    pub options: Vec<String>,
}

impl NextHop {
    /// Build a route to `destination` through this next hop
    pub fn to(&self, destination: Destination) -> Route {
        Route {
            destination,
            next_hop: self.clone(),
        }
    }

    /// Arguments describing this next hop on the `ip route add` command line
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(4 + self.options.len());
        if let Some(gateway) = self.gateway {
            args.push("via".to_string());
            args.push(gateway.to_string());
        }
        if let Some(device) = &self.device {
            args.push("dev".to_string());
            args.push(device.clone());
        }
        args.extend(self.options.iter().cloned());
        args
    }
}

impl fmt::Display for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args().join(" "))
    }
}

/// A single routing table entry (the table and family are implied by context)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Where the route leads
    pub destination: Destination,
    /// How traffic gets there
    pub next_hop: NextHop,
}

impl Route {
    /// Whether this is the default route
    pub fn is_default(&self) -> bool {
        self.destination == Destination::Default
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let next_hop = self.next_hop.to_string();
        if next_hop.is_empty() {
            write!(f, "{}", self.destination)
        } else {
            write!(f, "{} {}", self.destination, next_hop)
        }
    }
}

/// Lifecycle commands issued by wg-quick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// PostUp: move the default route out and install the whitelist
    Up,
    /// PreDown: remove the policy table's default route
    Down,
}

impl Command {
    /// Error policy used when the caller does not override it
    pub fn default_policy(self) -> ErrorPolicy {
        match self {
            Command::Up => ErrorPolicy::Strict,
            Command::Down => ErrorPolicy::BestEffort,
        }
    }
}

/// What to do when a route mutation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Abort on the first failure and return it
    Strict,
    /// Log the failure and carry on with the remaining steps
    BestEffort,
}

/// Whitelisted prefixes, one ordered list per family
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    /// IPv4 prefixes routed through the VPN
    pub ipv4: Vec<IpNetwork>,
    /// IPv6 prefixes routed through the VPN
    pub ipv6: Vec<IpNetwork>,
}

impl Whitelist {
    /// Prefixes for one family
    pub fn for_family(&self, family: AddressFamily) -> &[IpNetwork] {
        match family {
            AddressFamily::V4 => &self.ipv4,
            AddressFamily::V6 => &self.ipv6,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// `[general]` section
    #[serde(default)]
    pub general: GeneralConfig,
    /// `[whitelist]` section
    #[serde(default)]
    pub whitelist: WhitelistConfig,
}

/// General configuration options
#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    /// env_logger filter used unless RUST_LOG is set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Policy table id; looked up from the interface fwmark when absent
    #[serde(default)]
    pub table: Option<u32>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            table: None,
        }
    }
}

/// Whitelist used when none is given on the command line
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WhitelistConfig {
    /// IPv4 prefixes
    #[serde(default)]
    pub ipv4: Vec<String>, // CIDR notation
    /// IPv6 prefixes
    #[serde(default)]
    pub ipv6: Vec<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_table_id_display() {
        assert_eq!(TableId::MAIN.to_string(), "main");
        assert_eq!(TableId(51820).to_string(), "51820");
    }

    #[test]
    fn test_table_id_reserved() {
        assert!(TableId(0).is_reserved());
        assert!(TableId(253).is_reserved());
        assert!(TableId::MAIN.is_reserved());
        assert!(TableId(255).is_reserved());
        assert!(!TableId(51820).is_reserved());
        assert!(!TableId(1).is_reserved());
    }

    #[test]
    fn test_family_flags() {
        assert_eq!(AddressFamily::V4.ip_flag(), "-4");
        assert_eq!(AddressFamily::V6.ip_flag(), "-6");
        assert_eq!(AddressFamily::ALL, [AddressFamily::V4, AddressFamily::V6]);
    }

    #[test]
    fn test_family_contains() {
        let v4: IpNetwork = "10.0.0.0/8".parse().unwrap();
        let v6: IpNetwork = "2001:db8::/32".parse().unwrap();
        assert!(AddressFamily::V4.contains(&v4));
        assert!(!AddressFamily::V4.contains(&v6));
        assert!(AddressFamily::V6.contains(&v6));
        assert!(!AddressFamily::V6.contains(&v4));
    }

    #[test]
    fn test_route_display() {
        let next_hop = NextHop {
            gateway: Some(IpAddr::V4(Ipv4Addr::new(10, 8, 0, 1))),
            device: Some("wg0".to_string()),
            options: vec!["metric".to_string(), "50".to_string()],
        };
        assert_eq!(
            next_hop.to(Destination::Default).to_string(),
            "default via 10.8.0.1 dev wg0 metric 50"
        );

        let prefix = Destination::Prefix("203.0.113.0/24".parse().unwrap());
        assert_eq!(
            next_hop.to(prefix).to_string(),
            "203.0.113.0/24 via 10.8.0.1 dev wg0 metric 50"
        );
    }

    #[test]
    fn test_device_only_next_hop() {
        let next_hop = NextHop {
            gateway: None,
            device: Some("wg0".to_string()),
            options: vec!["scope".to_string(), "link".to_string()],
        };
        assert_eq!(next_hop.args(), vec!["dev", "wg0", "scope", "link"]);
    }

    #[test]
    fn test_is_default() {
        let hop = NextHop::default();
        assert!(hop.to(Destination::Default).is_default());
        assert!(!hop
            .to(Destination::Prefix("10.0.0.0/8".parse().unwrap()))
            .is_default());
    }

    #[test]
    fn test_command_default_policy() {
        assert_eq!(Command::Up.default_policy(), ErrorPolicy::Strict);
        assert_eq!(Command::Down.default_policy(), ErrorPolicy::BestEffort);
    }

    #[test]
    fn test_whitelist_for_family() {
        let whitelist = Whitelist {
            ipv4: vec!["203.0.113.0/24".parse().unwrap()],
            ipv6: vec![],
        };
        assert_eq!(whitelist.for_family(AddressFamily::V4).len(), 1);
        assert!(whitelist.for_family(AddressFamily::V6).is_empty());
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert!(config.general.table.is_none());
        assert!(config.whitelist.ipv4.is_empty());
        assert!(config.whitelist.ipv6.is_empty());
    }
}
