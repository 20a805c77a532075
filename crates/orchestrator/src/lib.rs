//! Rebalancing orchestration: pair cycles, pre-flight replenishment,
//! and the session driver that ties a configured run together.

pub mod cycle;
pub mod session;

pub use cycle::{CycleOrchestrator, Pacing, PairCycleConfig};
pub use session::SessionDriver;
