//! Router-interface orchestration.
//!
//! [`IntfsOrch`] owns the alias → router-interface resource graph: it
//! creates hardware RIFs when an alias is first configured, accepts and
//! rejects prefix assignments, programs the implied self routes and
//! directed-broadcast bindings, and tears interfaces down once nothing
//! references them. Other orchestrators reach this state only through the
//! shared [`RifRegistry`] accessor.

mod orch;
mod registry;
mod types;

pub use orch::{IntfsOrch, IntfsOrchCallbacks, IntfsOrchConfig};
pub use registry::RifRegistry;
pub use types::{IntfsEntry, PendingRifCounter, RifType};
