//! Peripheral registry
//! Owns every known peripheral record, keyed by id, in discovery order.

use std::collections::HashMap;

use crate::core::bluetooth::types::{ConnectionStatus, Peripheral, PeripheralId};

#[derive(Debug, Default)]
pub struct Registry {
    /// Ids in the order they were first discovered
    order: Vec<PeripheralId>,
    entries: HashMap<PeripheralId, Peripheral>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a peripheral or merges it into the existing record for its id.
    ///
    /// A stale `Discovered` status never overwrites a more advanced one; any
    /// other incoming status is an explicit change and is applied.
    pub fn upsert(&mut self, peripheral: Peripheral) {
        match self.entries.get_mut(peripheral.id()) {
            Some(existing) => existing.merge(peripheral),
            None => {
                self.order.push(peripheral.id().clone());
                self.entries.insert(peripheral.id().clone(), peripheral);
            }
        }
    }

    /// Moves a known peripheral to `status`. Returns false if the id is unknown.
    pub fn set_status(&mut self, id: &PeripheralId, status: ConnectionStatus) -> bool {
        match self.entries.get_mut(id) {
            Some(peripheral) => {
                peripheral.set_status(status);
                true
            }
            None => false,
        }
    }

    pub fn set_rssi(&mut self, id: &PeripheralId, rssi: i16) -> bool {
        match self.entries.get_mut(id) {
            Some(peripheral) => {
                peripheral.set_rssi(rssi);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &PeripheralId) -> Option<&Peripheral> {
        self.entries.get(id)
    }

    pub fn status(&self, id: &PeripheralId) -> Option<&ConnectionStatus> {
        self.entries.get(id).map(Peripheral::status)
    }

    /// Snapshot of all peripherals in discovery order.
    pub fn list(&self) -> Vec<Peripheral> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .cloned()
            .collect()
    }

    pub fn remove(&mut self, id: &PeripheralId) -> Option<Peripheral> {
        let removed = self.entries.remove(id)?;
        self.order.retain(|known| known != id);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::error::FailureReason;
    use rstest::rstest;

    fn ids(registry: &Registry) -> Vec<String> {
        registry.list().iter().map(|p| p.id().to_string()).collect()
    }

    #[test]
    fn repeated_discovery_keeps_one_entry_with_latest_fields() {
        let mut registry = Registry::new();
        registry.upsert(Peripheral::new("A").with_name("first").with_rssi(-80));
        registry.upsert(Peripheral::new("B"));
        registry.upsert(Peripheral::new("A").with_name("second").with_rssi(-40));

        assert_eq!(registry.len(), 2);
        assert_eq!(ids(&registry), vec!["A", "B"]);
        let a = registry.get(&"A".into()).unwrap();
        assert_eq!(a.name(), "second");
        assert_eq!(a.rssi(), Some(-40));
    }

    #[rstest]
    #[case(ConnectionStatus::Connecting)]
    #[case(ConnectionStatus::Connected)]
    #[case(ConnectionStatus::ServicesResolving)]
    #[case(ConnectionStatus::Ready)]
    #[case(ConnectionStatus::Failed(FailureReason::NoServices))]
    fn stale_discovery_does_not_downgrade_status(#[case] status: ConnectionStatus) {
        let mut registry = Registry::new();
        registry.upsert(Peripheral::new("A"));
        assert!(registry.set_status(&"A".into(), status.clone()));

        registry.upsert(Peripheral::new("A").with_rssi(-50));

        assert_eq!(registry.status(&"A".into()), Some(&status));
    }

    #[test]
    fn explicit_status_in_upsert_is_applied() {
        let mut registry = Registry::new();
        registry.upsert(Peripheral::new("A").with_status(ConnectionStatus::Ready));
        registry.upsert(Peripheral::new("A").with_status(ConnectionStatus::Disconnected));

        assert_eq!(registry.status(&"A".into()), Some(&ConnectionStatus::Disconnected));
    }

    #[test]
    fn remove_and_clear_are_total() {
        let mut registry = Registry::new();
        assert!(registry.remove(&"missing".into()).is_none());
        assert!(!registry.set_status(&"missing".into(), ConnectionStatus::Ready));

        registry.upsert(Peripheral::new("A"));
        registry.upsert(Peripheral::new("B"));
        assert!(registry.remove(&"A".into()).is_some());
        assert_eq!(ids(&registry), vec!["B"]);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn reinserted_peripheral_goes_to_the_end() {
        let mut registry = Registry::new();
        registry.upsert(Peripheral::new("A"));
        registry.upsert(Peripheral::new("B"));
        registry.remove(&"A".into());
        registry.upsert(Peripheral::new("A"));

        assert_eq!(ids(&registry), vec!["B", "A"]);
    }
}
