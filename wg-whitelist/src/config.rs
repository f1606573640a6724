// Configuration file and whitelist parser

//! Configuration file parsing and validation
//!
//! This module handles loading the optional TOML configuration file and
//! parsing whitelist prefixes, including family checks and host-bit clearing.

use crate::types::{AddressFamily, Config, TableId, Whitelist};
use anyhow::{Context, Result};
use ipnetwork::IpNetwork;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/wg-whitelist/config.toml";

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Load configuration from TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
    parse_config(&contents)
}

/// Load the configuration, tolerating a missing file at the default location
///
/// An explicitly given path must exist; the default path is optional and
/// falls back to built-in defaults.
pub fn load_optional_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(DEFAULT_CONFIG_PATH),
        None => Ok(Config::default()),
    }
}

/// Path the configuration is read from
pub fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Parse and validate configuration text
pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).context("Failed to parse config file")?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration values
fn validate_config(config: &Config) -> Result<()> {
    let level = config.general.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        anyhow::bail!(
            "Unknown log_level '{}', expected one of {:?}",
            config.general.log_level,
            LOG_LEVELS
        );
    }

    if let Some(table) = config.general.table {
        validate_table(TableId(table))?;
    }

    for entry in &config.whitelist.ipv4 {
        parse_prefix(entry, AddressFamily::V4)
            .with_context(|| format!("Invalid whitelist.ipv4 entry: {}", entry))?;
    }
    for entry in &config.whitelist.ipv6 {
        parse_prefix(entry, AddressFamily::V6)
            .with_context(|| format!("Invalid whitelist.ipv6 entry: {}", entry))?;
    }

    Ok(())
}

/// Reject table ids that would point the engine at a kernel table
pub fn validate_table(table: TableId) -> Result<()> {
    if table.is_reserved() {
        anyhow::bail!(
            "Table {} is reserved by the kernel and cannot be used as a policy table",
            table.0
        );
    }
    Ok(())
}

/// Parse a prefix in CIDR notation (or a bare address) for the given family
///
/// Host bits are cleared so `192.168.1.100/24` becomes `192.168.1.0/24`,
/// which is the form `ip route add` accepts.
pub fn parse_prefix(text: &str, family: AddressFamily) -> Result<IpNetwork> {
    let network: IpNetwork = text
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid prefix '{}': {}", text, e))?;

    anyhow::ensure!(
        family.contains(&network),
        "Prefix '{}' is not an {} prefix",
        text,
        family
    );

    IpNetwork::new(network.network(), network.prefix())
        .map_err(|e| anyhow::anyhow!("Invalid prefix '{}': {}", text, e))
}

/// Parse a whitespace-separated prefix list, as passed by wg-quick hooks
pub fn parse_whitelist(text: &str, family: AddressFamily) -> Result<Vec<IpNetwork>> {
    text.split_whitespace()
        .map(|entry| parse_prefix(entry, family))
        .collect()
}

/// Build the whitelist from command line lists, falling back to the config
///
/// A list given on the command line (even an empty one) replaces the
/// configured list for that family.
pub fn resolve_whitelist(
    ipv4: Option<&str>,
    ipv6: Option<&str>,
    config: &Config,
) -> Result<Whitelist> {
    let ipv4 = match ipv4 {
        Some(text) => parse_whitelist(text, AddressFamily::V4)?,
        None => parse_list(&config.whitelist.ipv4, AddressFamily::V4)?,
    };
    let ipv6 = match ipv6 {
        Some(text) => parse_whitelist(text, AddressFamily::V6)?,
        None => parse_list(&config.whitelist.ipv6, AddressFamily::V6)?,
    };
    Ok(Whitelist { ipv4, ipv6 })
}

fn parse_list(entries: &[String], family: AddressFamily) -> Result<Vec<IpNetwork>> {
    entries
        .iter()
        .map(|entry| parse_prefix(entry, family))
        .collect()
}
