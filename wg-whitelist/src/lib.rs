// WireGuard split-tunnel whitelist library
// Shared modules for the hook binary and tests

#![warn(missing_docs)]

//! WireGuard Split-Tunnel Whitelist Library
//!
//! This library rewrites a wg-quick policy routing table so that only
//! whitelisted destinations keep going through the tunnel, while everything
//! else follows the main table's default route again.
//!
//! # Main Components
//!
//! - [`config`]: Configuration file parsing and whitelist parsing
//! - [`engine`]: `up` / `down` route state transitions
//! - [`ip_route`]: Routing table backend using iproute2
//! - [`memory_table`]: In-memory routing tables for tests
//! - [`plan`]: Pure planning of route actions
//! - [`route_table`]: The routing table port trait
//! - [`types`]: Shared data structures
//! - [`wg_interface`]: Interface validation and fwmark table lookup

pub mod config;
pub mod engine;
pub mod ip_route;
pub mod memory_table;
pub mod plan;
pub mod route_table;
pub mod types;
pub mod wg_interface;
