//! The trait the dispatch loop drives.

use crate::observer::SubjectUpdate;
use crate::task::TaskResult;
use async_trait::async_trait;

/// An orchestration agent owning one or more table backlogs.
///
/// The dispatcher calls, in order and once per cycle:
///
/// 1. [`Orch::on_subject_update`] for queued topology events the orch
///    subscribed to
/// 2. [`Orch::ingest`] to pull one bounded batch from each change feed
/// 3. [`Orch::do_task`], only if [`Orch::has_pending_tasks`], to drain
///    backlogs; a handler leaves any task it cannot complete in place and
///    continues to the next key
/// 4. periodically, [`Orch::on_timer`] for housekeeping
///
/// `do_task` returns `Err` only for unrecoverable failures; the dispatcher
/// stops on those. Everything retryable is expressed by leaving tasks in the
/// backlog.
#[async_trait]
pub trait Orch: Send + Sync {
    /// Returns the name of this orch (for logging, diagnostics, and fan-out
    /// subscription matching).
    fn name(&self) -> &str;

    /// Returns the service priority. Lower values are serviced first.
    fn priority(&self) -> i32 {
        0
    }

    /// Pulls pending change batches from this orch's feeds into its
    /// backlogs.
    fn ingest(&mut self) {}

    /// Drains pending backlog tasks.
    async fn do_task(&mut self) -> TaskResult<()>;

    /// Returns true if any backlog holds unconsumed tasks.
    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// Dumps outstanding tasks for diagnostics; the backlog is the visible
    /// "still pending" state.
    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }

    /// Called on the periodic housekeeping tick.
    fn on_timer(&mut self) {}

    /// Delivers a topology event this orch subscribed to.
    fn on_subject_update(&mut self, _update: &SubjectUpdate) {}
}
