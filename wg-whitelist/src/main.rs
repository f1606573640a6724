// WireGuard split-tunnel whitelist hook

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use wg_whitelist::{
    config::{self, load_optional_config},
    engine::WhitelistEngine,
    ip_route::IpRoute,
    types::{Command, Config, ErrorPolicy, TableId},
    wg_interface,
};

#[derive(Parser)]
#[command(name = "wg-whitelist")]
#[command(about = "Route only whitelisted prefixes through a wg-quick tunnel", long_about = None)]
struct Args {
    /// Path to configuration file (default: /etc/wg-whitelist/config.toml, if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Policy routing table id (default: the interface's fwmark)
    #[arg(short, long, global = true)]
    table: Option<u32>,

    /// Log failed route changes and continue
    #[arg(long, global = true, conflicts_with = "strict")]
    best_effort: bool,

    /// Stop at the first failed route change
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: LifecycleCommand,
}

#[derive(Subcommand)]
enum LifecycleCommand {
    /// Install the whitelist (wg-quick PostUp)
    Up {
        /// WireGuard interface (%i)
        interface: String,
        /// Whitespace-separated IPv4 prefixes
        ipv4: Option<String>,
        /// Whitespace-separated IPv6 prefixes
        ipv6: Option<String>,
    },
    /// Remove the policy table's default route (wg-quick PreDown)
    Down {
        /// WireGuard interface (%i)
        interface: String,
    },
}

impl LifecycleCommand {
    fn command(&self) -> Command {
        match self {
            LifecycleCommand::Up { .. } => Command::Up,
            LifecycleCommand::Down { .. } => Command::Down,
        }
    }

    fn interface(&self) -> &str {
        match self {
            LifecycleCommand::Up { interface, .. } | LifecycleCommand::Down { interface } => {
                interface
            }
        }
    }
}

impl Args {
    fn error_policy(&self) -> ErrorPolicy {
        if self.best_effort {
            ErrorPolicy::BestEffort
        } else if self.strict {
            ErrorPolicy::Strict
        } else {
            self.command.command().default_policy()
        }
    }
}

/// Resolve the policy table: command line, then config, then fwmark
async fn resolve_table(args: &Args, config: &Config) -> Result<TableId> {
    let table = match args.table.or(config.general.table) {
        Some(table) => TableId(table),
        None => wg_interface::table_for_interface(args.command.interface())
            .await
            .context("Failed to determine policy table from interface fwmark")?,
    };
    config::validate_table(table)?;
    Ok(table)
}

fn main() -> Result<()> {
    // One command at a time; no worker threads needed
    let runtime = tokio::runtime::Builder::new_current_thread()
        .thread_name("wg-whitelist")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = load_optional_config(args.config.as_deref()).with_context(|| {
        format!(
            "Failed to load config from {}",
            config::config_path(args.config.as_deref()).display()
        )
    })?;

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.general.log_level),
    )
    .init();

    let interface = args.command.interface();
    wg_interface::validate_interface_name(interface)
        .context("Invalid WireGuard interface name")?;

    // Parse input before touching any route
    let whitelist = match &args.command {
        LifecycleCommand::Up { ipv4, ipv6, .. } => {
            Some(config::resolve_whitelist(ipv4.as_deref(), ipv6.as_deref(), &config)?)
        }
        LifecycleCommand::Down { .. } => None,
    };

    let table = resolve_table(&args, &config).await?;
    let policy = args.error_policy();
    let engine = WhitelistEngine::new(IpRoute::new(), table);

    log::info!(
        "{:?} on {} (table {}, {:?})",
        args.command.command(),
        interface,
        table,
        policy
    );

    match whitelist {
        Some(whitelist) => {
            log::info!(
                "Whitelist: {} IPv4, {} IPv6 prefixes",
                whitelist.ipv4.len(),
                whitelist.ipv6.len()
            );
            let transitions = engine.up(&whitelist, policy).await?;
            let failed: usize = transitions.iter().map(|t| t.failed).sum();
            if failed > 0 {
                log::warn!("{} route changes failed", failed);
            }
        }
        None => engine.down(policy).await?,
    }

    log::info!("Done");
    Ok(())
}
