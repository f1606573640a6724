// iproute2 routing table backend

//! Routing table access through the `ip` command
//!
//! Every operation is a single `ip -4|-6 route ...` invocation. Mutating
//! commands are logged with [`COMMAND_TAG`] before they are spawned so the
//! wg-quick output shows exactly what was changed.

use crate::route_table::RoutingTable;
use crate::types::{AddressFamily, Destination, NextHop, Route, TableId};
use anyhow::{Context, Result};
use std::net::IpAddr;
use std::process::Output;
use tokio::process::Command;

/// Prefix of every logged mutating command
pub const COMMAND_TAG: &str = "wg-whitelist:";

/// Status flags printed by `ip route show` that `ip route add` does not accept
const STATUS_FLAGS: [&str; 8] = [
    "linkdown",
    "dead",
    "offload",
    "trap",
    "rt_offload",
    "rt_trap",
    "pervasive",
    "notify",
];

/// Routing table backend that shells out to iproute2
#[derive(Debug, Default, Clone, Copy)]
pub struct IpRoute;

impl IpRoute {
    /// Create a new `ip` backed routing table handle
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[String]) -> Result<Output> {
        Command::new("ip")
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute 'ip {}'", args.join(" ")))
    }

    async fn mutate(&self, args: &[String]) -> Result<Output> {
        log::info!("{} ip {}", COMMAND_TAG, args.join(" "));
        self.run(args).await
    }
}

impl RoutingTable for IpRoute {
    async fn default_route(&self, family: AddressFamily, table: TableId) -> Result<Option<Route>> {
        let args = show_default_args(family, table);
        let output = self.run(&args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ip {} failed: {}", args.join(" "), stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let route = first_route_block(&stdout)
            .map(|block| parse_route_line(&block))
            .transpose()
            .with_context(|| format!("Unexpected output from 'ip {}'", args.join(" ")))?;

        match &route {
            Some(route) => log::debug!("{} table {} default: {}", family, table, route),
            None => log::debug!("{} table {} has no default route", family, table),
        }
        Ok(route)
    }

    async fn add_route(&self, family: AddressFamily, table: TableId, route: &Route) -> Result<()> {
        let args = add_args(family, table, route);
        let output = self.mutate(&args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ip {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(())
    }

    async fn delete_route(
        &self,
        family: AddressFamily,
        table: TableId,
        destination: &Destination,
    ) -> Result<bool> {
        let args = delete_args(family, table, destination);
        let output = self.mutate(&args).await?;

        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_not_found(&stderr) {
            log::debug!("No {} route to {} in table {}", family, destination, table);
            return Ok(false);
        }
        anyhow::bail!("ip {} failed: {}", args.join(" "), stderr.trim())
    }
}

fn base_args(family: AddressFamily, verb: &str) -> Vec<String> {
    vec![
        family.ip_flag().to_string(),
        "route".to_string(),
        verb.to_string(),
    ]
}

/// `ip route show default table <t>`
pub fn show_default_args(family: AddressFamily, table: TableId) -> Vec<String> {
    let mut args = base_args(family, "show");
    args.extend(["default".to_string(), "table".to_string(), table.to_string()]);
    args
}

/// `ip route add <destination> <next hop...> table <t> [nexthop ...]`
pub fn add_args(family: AddressFamily, table: TableId, route: &Route) -> Vec<String> {
    let mut args = base_args(family, "add");
    args.push(route.destination.to_string());

    // iproute2 reads everything after `nexthop` as next hop specs
    let mut hop = route.next_hop.args();
    let multipath = hop
        .iter()
        .position(|arg| arg == "nexthop")
        .map(|pos| hop.split_off(pos))
        .unwrap_or_default();
    args.extend(hop);
    args.extend(["table".to_string(), table.to_string()]);
    args.extend(multipath);
    args
}

/// `ip route del <destination> table <t>`
pub fn delete_args(family: AddressFamily, table: TableId, destination: &Destination) -> Vec<String> {
    let mut args = base_args(family, "del");
    args.extend([destination.to_string(), "table".to_string(), table.to_string()]);
    args
}

/// Whether `ip route del` failed only because the route was absent
pub fn is_not_found(stderr: &str) -> bool {
    stderr.contains("No such process") || stderr.contains("No such file or directory")
}

/// First route of `ip route show` output, with its multipath continuation lines
///
/// The `nexthop ...` lines that follow a multipath route are indented; they
/// are joined onto the route line so the whole descriptor parses as one.
fn first_route_block(output: &str) -> Option<String> {
    let mut lines = output.lines().skip_while(|line| line.trim().is_empty());
    let first = lines.next()?;
    if first.starts_with(char::is_whitespace) {
        return None;
    }

    let mut block = first.trim_end().to_string();
    for line in lines.take_while(|line| line.starts_with(char::is_whitespace)) {
        block.push(' ');
        block.push_str(line.trim());
    }
    Some(block)
}

/// Parse one route of `ip route show` output
///
/// Example: `default via 192.168.1.1 dev eth0 proto dhcp src 192.168.1.20 metric 100`
///
/// Everything from the first `nexthop` on is kept verbatim in `options`, so
/// multipath routes replay as `nexthop via X dev Y weight W ...`. An `nhid`
/// reference is dropped when the route also names its next hop, since
/// `ip route add` refuses both together.
pub fn parse_route_line(line: &str) -> Result<Route> {
    let mut tokens = line.split_whitespace().peekable();

    if tokens.peek() == Some(&"unicast") {
        tokens.next();
    }

    let destination = match tokens.next() {
        Some("default") => Destination::Default,
        Some(kind @ ("blackhole" | "unreachable" | "prohibit" | "throw")) => {
            anyhow::bail!("Unsupported route type '{}'", kind)
        }
        Some(prefix) => Destination::Prefix(
            prefix
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid destination '{}': {}", prefix, e))?,
        ),
        None => anyhow::bail!("Empty route line"),
    };

    let mut next_hop = NextHop::default();
    let mut nhid = None;
    let mut multipath = Vec::new();
    while let Some(token) = tokens.next() {
        if !multipath.is_empty() || token == "nexthop" {
            if !STATUS_FLAGS.contains(&token) {
                multipath.push(token.to_string());
            }
            continue;
        }

        match token {
            "via" => {
                if matches!(tokens.peek(), Some(&"inet") | Some(&"inet6")) {
                    tokens.next();
                }
                let gateway = tokens.next().context("Missing gateway after 'via'")?;
                next_hop.gateway = Some(
                    gateway
                        .parse::<IpAddr>()
                        .map_err(|e| anyhow::anyhow!("Invalid gateway '{}': {}", gateway, e))?,
                );
            }
            "dev" => {
                let device = tokens.next().context("Missing device after 'dev'")?;
                next_hop.device = Some(device.to_string());
            }
            "nhid" => {
                nhid = Some(tokens.next().context("Missing id after 'nhid'")?.to_string());
            }
            // Remaining lifetime of an RA route, printed as e.g. "1795sec"
            "expires" => {
                tokens.next();
            }
            flag if STATUS_FLAGS.contains(&flag) => {}
            other => next_hop.options.push(other.to_string()),
        }
    }

    let explicit = next_hop.gateway.is_some() || next_hop.device.is_some() || !multipath.is_empty();
    match nhid {
        Some(id) if !explicit => {
            let mut options = vec!["nhid".to_string(), id];
            options.append(&mut next_hop.options);
            next_hop.options = options;
        }
        Some(id) => log::debug!("Dropping nhid {} from route with explicit next hop", id),
        None => {}
    }
    next_hop.options.extend(multipath);

    Ok(Route {
        destination,
        next_hop,
    })
}
