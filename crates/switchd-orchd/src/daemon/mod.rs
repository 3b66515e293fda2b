//! The dispatch loop.

mod orchdaemon;

pub use orchdaemon::{OrchDaemon, OrchDaemonConfig};
