//! Routing table port
//!
//! The engine only talks to the kernel through this trait. [`IpRoute`] is the
//! real implementation; [`MemoryRoutingTable`] models tables in memory so the
//! transition logic can be tested without root.
//!
//! [`IpRoute`]: crate::ip_route::IpRoute
//! [`MemoryRoutingTable`]: crate::memory_table::MemoryRoutingTable

use crate::types::{AddressFamily, Destination, Route, TableId};
use anyhow::Result;

/// Read and mutate routes in a numbered routing table
#[allow(async_fn_in_trait)]
pub trait RoutingTable {
    /// Current default route of `table`, or `None` when it has none
    async fn default_route(&self, family: AddressFamily, table: TableId) -> Result<Option<Route>>;

    /// Insert `route` into `table`
    async fn add_route(&self, family: AddressFamily, table: TableId, route: &Route) -> Result<()>;

    /// Remove the route to `destination` from `table`
    ///
    /// Returns `Ok(false)` if there was no such route.
    async fn delete_route(
        &self,
        family: AddressFamily,
        table: TableId,
        destination: &Destination,
    ) -> Result<bool>;

    /// Remove the default route from `table`
    async fn delete_default_route(&self, family: AddressFamily, table: TableId) -> Result<bool> {
        self.delete_route(family, table, &Destination::Default).await
    }
}
