//! Orchestration
//!
//! The bounded control loop and the per-run bookkeeping it owns: budget,
//! step ledger, conversation history and fused run state.

pub mod budget;
pub mod conversation;
pub mod core;
pub mod ledger;
pub mod prompt;
pub mod state;
pub mod summary;

pub use budget::BudgetTracker;
pub use conversation::Conversation;
pub use self::core::{Orchestrator, ProgressFn};
pub use ledger::{LedgerError, Step, StepLedger, StepOutcome, StepStatus};
pub use state::{
    Artifact, RunError, RunRequest, RunResult, RunState, TerminationReason, Workflow,
};
