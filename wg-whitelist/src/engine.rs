// Whitelist routing engine

//! Route state transitions for the VPN policy table
//!
//! `up` hands the policy table's default route back to the main table's
//! gateway and keeps only whitelisted prefixes on the VPN. `down` removes the
//! policy table's default route again. Neither operation is transactional: a
//! failure midway leaves whatever was already applied in place.

use crate::plan::{plan_up, RouteAction};
use crate::route_table::RoutingTable;
use crate::types::{AddressFamily, ErrorPolicy, Route, TableId, Whitelist};
use anyhow::Result;

/// What `up` saw and did for one address family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Family the transition applied to
    pub family: AddressFamily,
    /// Default route found in the policy table before the change
    pub vpn_route: Option<Route>,
    /// Default route found in the main table
    pub main_route: Option<Route>,
    /// Actions planned, in the order they were applied
    pub actions: Vec<RouteAction>,
    /// Actions that failed (only non-zero under best effort)
    pub failed: usize,
}

/// Moves the default route between tables and installs whitelist entries
pub struct WhitelistEngine<T> {
    routes: T,
    table: TableId,
}

impl<T: RoutingTable> WhitelistEngine<T> {
    /// Create an engine managing policy table `table` through `routes`
    pub fn new(routes: T, table: TableId) -> Self {
        Self { routes, table }
    }

    /// Policy table id
    pub fn table(&self) -> TableId {
        self.table
    }

    /// Access the underlying routing table port
    pub fn routes(&self) -> &T {
        &self.routes
    }

    /// Whitelist the given prefixes, IPv4 first, then IPv6
    pub async fn up(&self, whitelist: &Whitelist, policy: ErrorPolicy) -> Result<Vec<Transition>> {
        let mut transitions = Vec::with_capacity(AddressFamily::ALL.len());
        for family in AddressFamily::ALL {
            transitions.push(self.up_family(family, whitelist, policy).await?);
        }
        Ok(transitions)
    }

    async fn up_family(
        &self,
        family: AddressFamily,
        whitelist: &Whitelist,
        policy: ErrorPolicy,
    ) -> Result<Transition> {
        let vpn_route = self.routes.default_route(family, self.table).await?;
        let main_route = self.routes.default_route(family, TableId::MAIN).await?;
        let prefixes = whitelist.for_family(family);

        match &vpn_route {
            Some(route) => log::info!("{} VPN route (table {}): {}", family, self.table, route),
            None if prefixes.is_empty() => {
                log::debug!("{} has no default route in table {}", family, self.table)
            }
            None => log::warn!(
                "{} has no default route in table {}, skipping {} whitelist entries",
                family,
                self.table,
                prefixes.len()
            ),
        }
        match &main_route {
            Some(route) => log::info!("{} main route: {}", family, route),
            None => log::info!("{} has no default route in the main table", family),
        }

        let actions = plan_up(vpn_route.as_ref(), main_route.as_ref(), prefixes);
        let mut failed = 0;

        for action in &actions {
            let result = match action {
                RouteAction::DeleteDefault => self
                    .routes
                    .delete_default_route(family, self.table)
                    .await
                    .map(|_| ()),
                RouteAction::Add(route) => self.routes.add_route(family, self.table, route).await,
            };

            if let Err(e) = result {
                match policy {
                    ErrorPolicy::Strict => return Err(e),
                    ErrorPolicy::BestEffort => {
                        log::warn!("{} {} failed: {}", family, action, e);
                        failed += 1;
                    }
                }
            }
        }

        Ok(Transition {
            family,
            vpn_route,
            main_route,
            actions,
            failed,
        })
    }

    /// Remove the policy table's default route in both families
    ///
    /// A missing route is never an error, so running this twice is harmless.
    /// Whitelist entries are left for the table's owner to flush.
    pub async fn down(&self, policy: ErrorPolicy) -> Result<()> {
        for family in AddressFamily::ALL {
            match self.routes.delete_default_route(family, self.table).await {
                Ok(true) => log::info!("{} default route removed from table {}", family, self.table),
                Ok(false) => log::debug!(
                    "{} default route already absent from table {}",
                    family,
                    self.table
                ),
                Err(e) => match policy {
                    ErrorPolicy::Strict => return Err(e),
                    ErrorPolicy::BestEffort => {
                        log::warn!("Failed to remove {} default route: {}", family, e)
                    }
                },
            }
        }
        Ok(())
    }
}
