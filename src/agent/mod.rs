//! Agent system
//!
//! Three pieces:
//! - `Agent`: the model dispatch loop, bounded by its own call budget
//! - `AgentTool`: a delegation edge wrapping a child agent as a tool
//! - `DelegationLedger`: per-run accounting for capped edges

mod base;
mod budget;
mod delegate;

pub use base::*;
pub use budget::DelegationLedger;
pub use delegate::AgentTool;
