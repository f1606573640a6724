// Route action planning for one address family

//! Route transition planning
//!
//! Given what is currently in the policy and main tables, this module decides
//! which mutations turn the policy table into its whitelisted form. Planning
//! is pure; the engine applies the actions through a routing table port.

use crate::types::{Destination, Route};
use ipnetwork::IpNetwork;
use std::fmt;

/// A mutation of the policy table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    /// Remove the policy table's default route
    DeleteDefault,
    /// Insert a route into the policy table
    Add(Route),
}

impl fmt::Display for RouteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteAction::DeleteDefault => f.write_str("del default"),
            RouteAction::Add(route) => write!(f, "add {}", route),
        }
    }
}

/// Plan the `up` transition for one family
///
/// The VPN default route is replaced by the main table's default route and
/// each whitelisted prefix gets a route through the VPN's old next hop.
/// Without a VPN default route there is nothing to delete and no next hop to
/// whitelist through, so only the main default route is mirrored.
pub fn plan_up(
    vpn_route: Option<&Route>,
    main_route: Option<&Route>,
    prefixes: &[IpNetwork],
) -> Vec<RouteAction> {
    let mut actions = Vec::with_capacity(2 + prefixes.len());

    if vpn_route.is_some() {
        actions.push(RouteAction::DeleteDefault);
    }

    if let Some(main) = main_route {
        actions.push(RouteAction::Add(main.next_hop.to(Destination::Default)));
    }

    if let Some(vpn) = vpn_route {
        actions.extend(
            prefixes
                .iter()
                .map(|prefix| RouteAction::Add(vpn.next_hop.to(Destination::Prefix(*prefix)))),
        );
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NextHop;

    fn via(gateway: &str, device: &str) -> NextHop {
        NextHop {
            gateway: Some(gateway.parse().unwrap()),
            device: Some(device.to_string()),
            options: vec![],
        }
    }

    fn prefixes(list: &[&str]) -> Vec<IpNetwork> {
        list.iter().map(|p| p.parse().unwrap()).collect()
    }

    #[test]
    fn test_plan_full_transition() {
        let vpn = via("10.8.0.1", "wg0").to(Destination::Default);
        let main = via("192.168.1.1", "eth0").to(Destination::Default);
        let actions = plan_up(
            Some(&vpn),
            Some(&main),
            &prefixes(&["203.0.113.0/24", "198.51.100.0/24"]),
        );

        assert_eq!(
            actions,
            vec![
                RouteAction::DeleteDefault,
                RouteAction::Add(main.clone()),
                RouteAction::Add(
                    via("10.8.0.1", "wg0")
                        .to(Destination::Prefix("203.0.113.0/24".parse().unwrap()))
                ),
                RouteAction::Add(
                    via("10.8.0.1", "wg0")
                        .to(Destination::Prefix("198.51.100.0/24".parse().unwrap()))
                ),
            ]
        );
    }

    #[test]
    fn test_plan_without_main_route() {
        let vpn = via("10.8.0.1", "wg0").to(Destination::Default);
        let actions = plan_up(Some(&vpn), None, &prefixes(&["203.0.113.0/24"]));

        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], RouteAction::DeleteDefault);
        assert!(actions
            .iter()
            .all(|a| !matches!(a, RouteAction::Add(r) if r.is_default())));
    }

    #[test]
    fn test_plan_empty_whitelist() {
        let vpn = via("10.8.0.1", "wg0").to(Destination::Default);
        let main = via("192.168.1.1", "eth0").to(Destination::Default);
        let actions = plan_up(Some(&vpn), Some(&main), &[]);

        assert_eq!(
            actions,
            vec![RouteAction::DeleteDefault, RouteAction::Add(main)]
        );
    }

    #[test]
    fn test_plan_without_vpn_route_skips_whitelist() {
        let main = via("192.168.1.1", "eth0").to(Destination::Default);
        let actions = plan_up(None, Some(&main), &prefixes(&["203.0.113.0/24"]));

        assert_eq!(actions, vec![RouteAction::Add(main)]);
    }

    #[test]
    fn test_plan_nothing_to_do() {
        assert!(plan_up(None, None, &prefixes(&["203.0.113.0/24"])).is_empty());
    }

    #[test]
    fn test_action_display() {
        assert_eq!(RouteAction::DeleteDefault.to_string(), "del default");
        let route = via("10.8.0.1", "wg0").to(Destination::Default);
        assert_eq!(
            RouteAction::Add(route).to_string(),
            "add default via 10.8.0.1 dev wg0"
        );
    }
}
