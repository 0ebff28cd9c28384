//! Background services that don't sit on the hot request path: each is a
//! `run_forever(self) -> !` task on a `tokio::time::interval`, grounded on
//! `OrderEventsCleaner::run_forever` from the teacher's periodic db cleanup.

pub mod scheduler;
pub mod stuck_recovery;
pub mod syncer;
