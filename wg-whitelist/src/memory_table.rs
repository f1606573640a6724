//! In-memory routing tables
//!
//! Models the kernel closely enough for the engine: routes are kept per
//! `(family, table)` in insertion order, adding a second route to the same
//! destination fails like `RTNETLINK answers: File exists`, and deleting an
//! absent route reports "not found" instead of failing.

use crate::route_table::RoutingTable;
use crate::types::{AddressFamily, Destination, Route, TableId};
use anyhow::Result;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Routing tables held in memory
#[derive(Debug, Default)]
pub struct MemoryRoutingTable {
    tables: RefCell<HashMap<(AddressFamily, TableId), Vec<Route>>>,
    rejected: RefCell<HashSet<Destination>>,
    rejected_deletes: RefCell<HashSet<(AddressFamily, Destination)>>,
    journal: RefCell<Vec<String>>,
}

impl MemoryRoutingTable {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a route without recording it in the journal
    pub fn insert(&self, family: AddressFamily, table: TableId, route: Route) {
        self.tables
            .borrow_mut()
            .entry((family, table))
            .or_default()
            .push(route);
    }

    /// Snapshot of a table's routes
    pub fn routes(&self, family: AddressFamily, table: TableId) -> Vec<Route> {
        self.tables
            .borrow()
            .get(&(family, table))
            .cloned()
            .unwrap_or_default()
    }

    /// Make every later `add_route` to `destination` fail
    pub fn reject(&self, destination: Destination) {
        self.rejected.borrow_mut().insert(destination);
    }

    /// Make every later `delete_route` of `destination` in `family` fail
    pub fn reject_delete(&self, family: AddressFamily, destination: Destination) {
        self.rejected_deletes
            .borrow_mut()
            .insert((family, destination));
    }

    /// Mutations applied so far, rendered like `ip route` commands
    pub fn journal(&self) -> Vec<String> {
        self.journal.borrow().clone()
    }

    fn record(&self, entry: String) {
        log::debug!("memory: {}", entry);
        self.journal.borrow_mut().push(entry);
    }
}

impl RoutingTable for MemoryRoutingTable {
    async fn default_route(&self, family: AddressFamily, table: TableId) -> Result<Option<Route>> {
        Ok(self
            .tables
            .borrow()
            .get(&(family, table))
            .and_then(|routes| routes.iter().find(|route| route.is_default()).cloned()))
    }

    async fn add_route(&self, family: AddressFamily, table: TableId, route: &Route) -> Result<()> {
        if self.rejected.borrow().contains(&route.destination) {
            anyhow::bail!("add {} table {} rejected", route.destination, table);
        }

        let mut tables = self.tables.borrow_mut();
        let routes = tables.entry((family, table)).or_default();
        if routes.iter().any(|r| r.destination == route.destination) {
            anyhow::bail!("RTNETLINK answers: File exists");
        }
        routes.push(route.clone());
        drop(tables);

        self.record(format!("{} add {} table {}", family.ip_flag(), route, table));
        Ok(())
    }

    async fn delete_route(
        &self,
        family: AddressFamily,
        table: TableId,
        destination: &Destination,
    ) -> Result<bool> {
        if self
            .rejected_deletes
            .borrow()
            .contains(&(family, destination.clone()))
        {
            anyhow::bail!("RTNETLINK answers: Operation not permitted");
        }

        let mut tables = self.tables.borrow_mut();
        let Some(routes) = tables.get_mut(&(family, table)) else {
            return Ok(false);
        };
        let Some(pos) = routes.iter().position(|r| &r.destination == destination) else {
            return Ok(false);
        };
        routes.remove(pos);
        drop(tables);

        self.record(format!("{} del {} table {}", family.ip_flag(), destination, table));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NextHop;

    fn device_route(destination: Destination, device: &str) -> Route {
        NextHop {
            gateway: None,
            device: Some(device.to_string()),
            options: vec![],
        }
        .to(destination)
    }

    #[tokio::test]
    async fn test_default_route_lookup() {
        let table = MemoryRoutingTable::new();
        assert!(table
            .default_route(AddressFamily::V4, TableId(100))
            .await
            .unwrap()
            .is_none());

        table.insert(
            AddressFamily::V4,
            TableId(100),
            device_route(Destination::Default, "wg0"),
        );
        let route = table
            .default_route(AddressFamily::V4, TableId(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(route.next_hop.device.as_deref(), Some("wg0"));

        // Tables are scoped per family
        assert!(table
            .default_route(AddressFamily::V6, TableId(100))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_add_duplicate_fails() {
        let table = MemoryRoutingTable::new();
        let route = device_route(Destination::Default, "wg0");
        table
            .add_route(AddressFamily::V4, TableId(100), &route)
            .await
            .unwrap();
        assert!(table
            .add_route(AddressFamily::V4, TableId(100), &route)
            .await
            .is_err());
        assert_eq!(table.routes(AddressFamily::V4, TableId(100)).len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let table = MemoryRoutingTable::new();
        assert!(!table
            .delete_default_route(AddressFamily::V4, TableId(100))
            .await
            .unwrap());

        table.insert(
            AddressFamily::V4,
            TableId(100),
            device_route(Destination::Default, "wg0"),
        );
        assert!(table
            .delete_default_route(AddressFamily::V4, TableId(100))
            .await
            .unwrap());
        assert!(table.routes(AddressFamily::V4, TableId(100)).is_empty());
    }

    #[tokio::test]
    async fn test_reject_and_journal() {
        let table = MemoryRoutingTable::new();
        let prefix = Destination::Prefix("203.0.113.0/24".parse().unwrap());
        table.reject(prefix.clone());

        assert!(table
            .add_route(AddressFamily::V4, TableId(100), &device_route(prefix, "wg0"))
            .await
            .is_err());
        table
            .add_route(
                AddressFamily::V4,
                TableId(100),
                &device_route(Destination::Default, "eth0"),
            )
            .await
            .unwrap();

        assert_eq!(
            table.journal(),
            vec!["-4 add default dev eth0 table 100".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reject_delete() {
        let table = MemoryRoutingTable::new();
        table.insert(
            AddressFamily::V4,
            TableId(100),
            device_route(Destination::Default, "wg0"),
        );
        table.reject_delete(AddressFamily::V4, Destination::Default);

        assert!(table
            .delete_default_route(AddressFamily::V4, TableId(100))
            .await
            .is_err());
        assert_eq!(table.routes(AddressFamily::V4, TableId(100)).len(), 1);

        // Only the rejected family fails
        assert!(!table
            .delete_default_route(AddressFamily::V6, TableId(100))
            .await
            .unwrap());
    }
}
