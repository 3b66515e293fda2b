//! Hardware resource accounting (CRM).
//!
//! Every successful hardware create/remove of a counted object class updates
//! the matching counter here exactly once; the counters therefore track the
//! true hardware object count, not the bookkeeping intent. A periodic check
//! logs threshold crossings for capacity monitoring.

mod orch;
mod types;

pub use orch::{new_shared, CrmMonitorOrch, CrmOrch, SharedCrm};
pub use types::{CrmResource, CrmResourceEntry, CrmThresholdType};
