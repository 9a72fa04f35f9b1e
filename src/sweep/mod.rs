//! Sweep core: fee pricing, transaction assembly and execution

pub mod builder;
pub mod engine;
pub mod fees;
pub mod pending;
pub mod types;

pub use builder::{compute_sweep_amount, TransactionBuilder};
pub use engine::{NetworkStats, SweepConfig, SweepEngine};
pub use fees::{FeeConfig, FeeEstimator, MultiplierOverride};
pub use pending::{PendingEntry, PendingRegistry, PendingSnapshot};
pub use types::{BurnOptions, BurnOutcome, SweepTransaction, TxStatus};
