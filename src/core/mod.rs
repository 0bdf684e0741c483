pub mod comparator;
pub mod engine;
pub mod executor;
pub mod scanner;

pub use comparator::{ActionPlan, ActionSummary, Reconciler, SyncAction};
pub use engine::{Direction, SyncConfig, SyncEngine, SyncReport};
pub use executor::{ExecutionStats, Failure, RunContext, TransferExecutor};
pub use scanner::{ScanConfig, Tree, TreeEntry, TreeScanner};
