//! OrchDaemon implementation.
//!
//! The daemon is the single thread of control: it delivers queued topology
//! events, ingests change feeds into backlogs, drains backlogs in priority
//! order, and runs periodic housekeeping. All core state is mutated from
//! inside this loop; nothing here needs locks for correctness, only for
//! ownership across components.

use log::{debug, error, info};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use switchd_orch_common::{EventFanout, Orch, SharedFanout, TaskResult};

/// Configuration for the OrchDaemon.
#[derive(Debug, Clone)]
pub struct OrchDaemonConfig {
    /// Pause between dispatch cycles in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Housekeeping timer period in milliseconds.
    pub timer_interval_ms: u64,
}

impl Default for OrchDaemonConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 100,
            timer_interval_ms: 1000,
        }
    }
}

/// The main orchestration daemon.
///
/// Registered orchs are grouped by priority; lower values drain first, and
/// orchs sharing a priority are serviced round-robin, one handler
/// invocation per cycle each.
pub struct OrchDaemon {
    config: OrchDaemonConfig,
    orchs: BTreeMap<i32, Vec<Box<dyn Orch>>>,
    fanout: SharedFanout,
    running: Arc<AtomicBool>,
}

impl OrchDaemon {
    pub fn new(config: OrchDaemonConfig) -> Self {
        Self {
            config,
            orchs: BTreeMap::new(),
            fanout: Arc::new(Mutex::new(EventFanout::new())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the shared fan-out handle components publish into.
    pub fn fanout(&self) -> SharedFanout {
        Arc::clone(&self.fanout)
    }

    /// Returns a handle that stops the loop from another task (e.g. a
    /// signal handler).
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Returns true while the dispatch loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Registers an orch. Service order follows [`Orch::priority`].
    pub fn register_orch(&mut self, orch: Box<dyn Orch>) {
        let priority = orch.priority();
        info!("Registering {} with priority {}", orch.name(), priority);
        self.orchs.entry(priority).or_default().push(orch);
    }

    /// Runs one dispatch cycle: topology events, then feed ingest and
    /// backlog drain in priority order.
    ///
    /// An `Err` is an unrecoverable failure reported by a handler; the
    /// caller must stop dispatching.
    pub async fn run_cycle(&mut self) -> TaskResult<()> {
        // Topology events bypass the backlogs and are applied first
        let updates = self.fanout.lock().unwrap().drain();
        for update in updates {
            let subscribers = self
                .fanout
                .lock()
                .unwrap()
                .subscribers_of(update.subject_type());
            for orchs in self.orchs.values_mut() {
                for orch in orchs.iter_mut() {
                    if subscribers.iter().any(|name| name == orch.name()) {
                        orch.on_subject_update(&update);
                    }
                }
            }
        }

        for orchs in self.orchs.values_mut() {
            for orch in orchs.iter_mut() {
                orch.ingest();
                if orch.has_pending_tasks() {
                    debug!("Processing tasks for {}", orch.name());
                    orch.do_task().await?;
                }
            }
        }
        Ok(())
    }

    /// Runs the housekeeping tick on every orch.
    pub fn tick_timers(&mut self) {
        for orchs in self.orchs.values_mut() {
            for orch in orchs.iter_mut() {
                orch.on_timer();
            }
        }
    }

    /// Runs the dispatch loop until [`OrchDaemon::stop`] or an
    /// unrecoverable handler failure.
    pub async fn run(&mut self) {
        info!("Starting dispatch loop with {} priority groups", self.orchs.len());
        self.running.store(true, Ordering::SeqCst);
        let mut last_timer = Instant::now();
        let timer_interval = Duration::from_millis(self.config.timer_interval_ms);

        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.run_cycle().await {
                error!("Unrecoverable orchestration failure: {}", e);
                self.running.store(false, Ordering::SeqCst);
                break;
            }

            if last_timer.elapsed() >= timer_interval {
                self.tick_timers();
                last_timer = Instant::now();
            }

            tokio::time::sleep(Duration::from_millis(self.config.heartbeat_interval_ms)).await;
        }

        info!("Dispatch loop stopped");
    }

    /// Stops the dispatch loop after the current cycle.
    pub fn stop(&self) {
        info!("Stopping dispatch loop");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Dumps daemon and backlog state for diagnostics.
    pub fn dump(&self) -> Vec<String> {
        let mut lines = vec![format!("OrchDaemon running: {}", self.is_running())];
        for (priority, orchs) in &self.orchs {
            for orch in orchs {
                let pending = orch.dump_pending_tasks();
                lines.push(format!(
                    "  [{:3}] {} - {} pending",
                    priority,
                    orch.name(),
                    pending.len()
                ));
                for task in pending {
                    lines.push(format!("        {}", task));
                }
            }
        }
        lines
    }
}
