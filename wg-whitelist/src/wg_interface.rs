// WireGuard interface helpers

//! WireGuard interface validation and policy table lookup
//!
//! wg-quick marks tunnel packets with the interface's fwmark and routes
//! everything else through a policy table of the same number. This module
//! reads that fwmark over netlink so the table id never has to be guessed.

use crate::types::TableId;
use anyhow::{Context, Result};
use wireguard_control::{Backend, Device, InterfaceName};

/// Longest interface name the kernel accepts (IFNAMSIZ - 1)
const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Validates that an interface name is safe to pass to `ip` and netlink.
/// Only allows alphanumeric characters, hyphens, and underscores.
///
/// # Errors
///
/// Returns an error if the name is empty, longer than 15 bytes, or contains
/// any other character.
pub fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("Interface name cannot be empty");
    }

    if name.len() > MAX_INTERFACE_NAME_LEN {
        anyhow::bail!(
            "Interface name '{}' is longer than {} bytes",
            name,
            MAX_INTERFACE_NAME_LEN
        );
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        anyhow::bail!(
            "Interface name contains invalid characters: '{}'. Only alphanumeric, hyphens, and underscores are allowed",
            name
        );
    }

    Ok(())
}

/// Convert an interface fwmark into the policy table id wg-quick uses
pub fn table_from_fwmark(interface: &str, fwmark: Option<u32>) -> Result<TableId> {
    match fwmark {
        Some(mark) if mark != 0 => Ok(TableId(mark)),
        _ => anyhow::bail!(
            "Interface {} has no fwmark; set `table` in the config or pass --table",
            interface
        ),
    }
}

/// Look up the policy table of a WireGuard interface from its fwmark
pub async fn table_for_interface(interface: &str) -> Result<TableId> {
    let iface_name: InterfaceName = interface
        .parse()
        .with_context(|| format!("Invalid interface name: {}", interface))?;

    // Netlink calls are blocking
    let fwmark = tokio::task::spawn_blocking(move || {
        let device = Device::get(&iface_name, Backend::Kernel)
            .context("Failed to get WireGuard device info")?;
        Ok::<Option<u32>, anyhow::Error>(device.fwmark)
    })
    .await
    .context("Netlink task panicked")??;

    let table = table_from_fwmark(interface, fwmark)?;
    log::debug!("Interface {} fwmark selects table {}", interface, table);
    Ok(table)
}
