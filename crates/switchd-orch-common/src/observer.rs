//! Subject/observer registry for topology notifications.
//!
//! Components publish typed updates into an [`EventFanout`]; the dispatcher
//! drains the queue each cycle and delivers every update to the orchs
//! subscribed to its subject type, ahead of backlog processing. This is how
//! link-state and forwarding-table events reach dependents without waiting
//! for the next reconciliation pass.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use switchd_types::{IpAddress, MacAddress};

/// The kinds of topology change a component can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectType {
    /// A forwarding-table (FDB) entry was added or removed
    FdbChange,
    /// A port's operational state changed
    PortOperChange,
    /// A neighbor was resolved or removed
    NeighborChange,
}

/// An FDB entry change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdbFlushUpdate {
    /// MAC of the affected forwarding entry.
    pub mac: MacAddress,
    /// Alias of the VLAN the entry was learned on.
    pub vlan_alias: String,
    /// Alias of the member port the entry pointed at.
    pub port_alias: String,
    /// True if the entry was added; false if removed.
    pub added: bool,
    /// Whether the member port is still admin/oper up. An up port means the
    /// entry merely aged out.
    pub port_up: bool,
}

/// A port operational state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortOperUpdate {
    pub alias: String,
    pub oper_up: bool,
}

/// A neighbor resolution or removal, published for the routing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborUpdate {
    pub ip: IpAddress,
    pub alias: String,
    /// The resolved MAC; `None` on removal.
    pub mac: Option<MacAddress>,
    pub added: bool,
}

/// A typed topology update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectUpdate {
    FdbFlush(FdbFlushUpdate),
    PortOper(PortOperUpdate),
    Neighbor(NeighborUpdate),
}

impl SubjectUpdate {
    /// Returns the subject type this update is delivered under.
    pub fn subject_type(&self) -> SubjectType {
        match self {
            SubjectUpdate::FdbFlush(_) => SubjectType::FdbChange,
            SubjectUpdate::PortOper(_) => SubjectType::PortOperChange,
            SubjectUpdate::Neighbor(_) => SubjectType::NeighborChange,
        }
    }
}

/// Registry of (subject type → subscriber names) plus the queue of
/// undelivered updates.
#[derive(Default)]
pub struct EventFanout {
    subscribers: HashMap<SubjectType, Vec<String>>,
    queue: VecDeque<SubjectUpdate>,
}

impl EventFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes an orch (by name) to a subject type.
    pub fn subscribe(&mut self, subject: SubjectType, observer: impl Into<String>) {
        let observer = observer.into();
        let list = self.subscribers.entry(subject).or_default();
        if !list.contains(&observer) {
            list.push(observer);
        }
    }

    /// Removes an orch from a subject type's subscriber list.
    pub fn unsubscribe(&mut self, subject: SubjectType, observer: &str) {
        if let Some(list) = self.subscribers.get_mut(&subject) {
            list.retain(|name| name != observer);
        }
    }

    /// Returns true if the named orch is subscribed to the subject type.
    pub fn is_subscribed(&self, subject: SubjectType, observer: &str) -> bool {
        self.subscribers
            .get(&subject)
            .map(|list| list.iter().any(|name| name == observer))
            .unwrap_or(false)
    }

    /// Returns the subscriber names for a subject type.
    pub fn subscribers_of(&self, subject: SubjectType) -> Vec<String> {
        self.subscribers.get(&subject).cloned().unwrap_or_default()
    }

    /// Queues an update for delivery on the next dispatch cycle.
    pub fn notify(&mut self, update: SubjectUpdate) {
        self.queue.push_back(update);
    }

    /// Drains all queued updates in publication order.
    pub fn drain(&mut self) -> Vec<SubjectUpdate> {
        self.queue.drain(..).collect()
    }

    /// Number of undelivered updates.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

/// Shared fan-out handle; publishers and the dispatcher hold clones.
pub type SharedFanout = Arc<Mutex<EventFanout>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_is_idempotent() {
        let mut fanout = EventFanout::new();
        fanout.subscribe(SubjectType::PortOperChange, "NeighOrch");
        fanout.subscribe(SubjectType::PortOperChange, "NeighOrch");

        assert_eq!(
            fanout.subscribers_of(SubjectType::PortOperChange),
            vec!["NeighOrch"]
        );
        assert!(fanout.is_subscribed(SubjectType::PortOperChange, "NeighOrch"));
        assert!(!fanout.is_subscribed(SubjectType::FdbChange, "NeighOrch"));
    }

    #[test]
    fn test_notify_and_drain_in_order() {
        let mut fanout = EventFanout::new();
        fanout.notify(SubjectUpdate::PortOper(PortOperUpdate {
            alias: "Ethernet4".into(),
            oper_up: false,
        }));
        fanout.notify(SubjectUpdate::PortOper(PortOperUpdate {
            alias: "Ethernet8".into(),
            oper_up: true,
        }));

        assert_eq!(fanout.pending(), 2);
        let drained = fanout.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(
            drained[0].subject_type(),
            SubjectType::PortOperChange
        );
        assert_eq!(fanout.pending(), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let mut fanout = EventFanout::new();
        fanout.subscribe(SubjectType::FdbChange, "NeighOrch");
        fanout.unsubscribe(SubjectType::FdbChange, "NeighOrch");
        assert!(fanout.subscribers_of(SubjectType::FdbChange).is_empty());
    }
}
