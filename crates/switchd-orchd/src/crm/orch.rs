//! CRM counter bookkeeping and threshold monitoring.

use super::types::{CrmResource, CrmResourceEntry, CrmThresholdType};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use switchd_orch_common::{Orch, TaskResult};

/// Per-resource used counters with threshold state.
pub struct CrmOrch {
    resources: HashMap<CrmResource, CrmResourceEntry>,
}

impl CrmOrch {
    pub fn new() -> Self {
        let resources = CrmResource::ALL
            .iter()
            .map(|res| (*res, CrmResourceEntry::default()))
            .collect();
        Self { resources }
    }

    /// Records one successful hardware create. Returns the new used count.
    pub fn inc_res_used(&mut self, resource: CrmResource) -> u32 {
        let entry = self.resources.entry(resource).or_default();
        entry.used += 1;
        debug!("CRM: {} used count increased to {}", resource, entry.used);
        entry.used
    }

    /// Records one successful hardware remove. Returns the new used count.
    ///
    /// An underflow means a create/remove pair went missing somewhere; the
    /// counter pins at zero and the mismatch is logged.
    pub fn dec_res_used(&mut self, resource: CrmResource) -> u32 {
        let entry = self.resources.entry(resource).or_default();
        if entry.used == 0 {
            error!("CRM: {} used count underflow", resource);
        } else {
            entry.used -= 1;
        }
        debug!("CRM: {} used count decreased to {}", resource, entry.used);
        entry.used
    }

    /// Returns the used count for a resource class.
    pub fn used(&self, resource: CrmResource) -> u32 {
        self.resources.get(&resource).map(|e| e.used).unwrap_or(0)
    }

    /// Sets the capacity reported by the hardware layer.
    pub fn set_capacity(&mut self, resource: CrmResource, capacity: u32) {
        self.resources.entry(resource).or_default().capacity = capacity;
    }

    /// Configures the thresholds for a resource class.
    pub fn set_thresholds(
        &mut self,
        resource: CrmResource,
        threshold_type: CrmThresholdType,
        high: u32,
        low: u32,
    ) {
        let entry = self.resources.entry(resource).or_default();
        entry.threshold_type = threshold_type;
        entry.high_threshold = high;
        entry.low_threshold = low;
    }

    /// Checks every resource against its thresholds, logging crossings once
    /// per transition. Returns the resources currently exceeded.
    pub fn check_thresholds(&mut self) -> Vec<CrmResource> {
        let mut exceeded = Vec::new();
        for (resource, entry) in self.resources.iter_mut() {
            if entry.is_above_high() {
                if !entry.exceeded {
                    warn!(
                        "CRM: {} threshold exceeded, used {} of {}",
                        resource, entry.used, entry.capacity
                    );
                    entry.exceeded = true;
                }
                exceeded.push(*resource);
            } else if entry.exceeded && entry.is_below_low() {
                info!(
                    "CRM: {} threshold cleared, used {} of {}",
                    resource, entry.used, entry.capacity
                );
                entry.exceeded = false;
            }
        }
        exceeded
    }
}

impl Default for CrmOrch {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared CRM handle; every create/remove path in the orchestrators holds
/// one.
pub type SharedCrm = Arc<Mutex<CrmOrch>>;

/// Creates a shared CRM instance.
pub fn new_shared() -> SharedCrm {
    Arc::new(Mutex::new(CrmOrch::new()))
}

/// Dispatcher adapter that runs the periodic threshold check.
pub struct CrmMonitorOrch {
    crm: SharedCrm,
}

impl CrmMonitorOrch {
    pub fn new(crm: SharedCrm) -> Self {
        Self { crm }
    }
}

#[async_trait]
impl Orch for CrmMonitorOrch {
    fn name(&self) -> &str {
        "CrmOrch"
    }

    fn priority(&self) -> i32 {
        55
    }

    async fn do_task(&mut self) -> TaskResult<()> {
        Ok(())
    }

    fn on_timer(&mut self) {
        self.crm.lock().unwrap().check_thresholds();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inc_dec_pairs() {
        let mut crm = CrmOrch::new();
        assert_eq!(crm.inc_res_used(CrmResource::Ipv4Neighbor), 1);
        assert_eq!(crm.inc_res_used(CrmResource::Ipv4Neighbor), 2);
        assert_eq!(crm.dec_res_used(CrmResource::Ipv4Neighbor), 1);
        assert_eq!(crm.dec_res_used(CrmResource::Ipv4Neighbor), 0);
        assert_eq!(crm.used(CrmResource::Ipv4Neighbor), 0);
        // Families are independent
        assert_eq!(crm.used(CrmResource::Ipv6Neighbor), 0);
    }

    #[test]
    fn test_underflow_pins_at_zero() {
        let mut crm = CrmOrch::new();
        assert_eq!(crm.dec_res_used(CrmResource::Ipv4Route), 0);
        assert_eq!(crm.used(CrmResource::Ipv4Route), 0);
    }

    #[test]
    fn test_threshold_transitions_once() {
        let mut crm = CrmOrch::new();
        crm.set_capacity(CrmResource::Ipv4NextHop, 10);
        crm.set_thresholds(
            CrmResource::Ipv4NextHop,
            CrmThresholdType::Percentage,
            80,
            50,
        );

        for _ in 0..9 {
            crm.inc_res_used(CrmResource::Ipv4NextHop);
        }
        let exceeded = crm.check_thresholds();
        assert_eq!(exceeded, vec![CrmResource::Ipv4NextHop]);
        // Still exceeded on a second pass
        assert_eq!(crm.check_thresholds().len(), 1);

        for _ in 0..6 {
            crm.dec_res_used(CrmResource::Ipv4NextHop);
        }
        assert!(crm.check_thresholds().is_empty());
    }

    #[tokio::test]
    async fn test_monitor_orch_is_idle() {
        let crm = new_shared();
        let mut monitor = CrmMonitorOrch::new(crm);
        assert_eq!(monitor.name(), "CrmOrch");
        assert!(!monitor.has_pending_tasks());
        monitor.do_task().await.unwrap();
        monitor.on_timer();
    }
}
