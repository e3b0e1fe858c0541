//! Stage graph execution
//!
//! - **stage**: the closed set of stages and the routing function
//! - **state**: the record threaded through a run and its partial updates
//! - **engine**: the step-bounded run loop

pub mod engine;
pub mod stage;
pub mod state;

pub use engine::{StageExecutor, WorkflowEngine, DEFAULT_STEP_LIMIT};
pub use stage::{next_stage, RoutingRules, Stage};
pub use state::{StageUpdate, WorkflowState};
