//! Agent Core: session state, tool dispatch and the conversation loop.
//!
//! Submodules:
//! - `session`: Per-conversation state (bindings, history, strategic notes)
//! - `tool_router`: Tool registry, argument schemas and the dispatcher
//! - `filter`: Filter specs compiled to predicates over listing records
//! - `budget`: Line-item budget and flight-window validation
//! - `confirmation`: Deletion confirmation state machine
//! - `orchestrator`: Per-turn loop between the model and the tools
//! - `tokens`: Token estimation and tool-result truncation
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod budget;
pub mod confirmation;
pub mod errors;
pub mod filter;
pub mod orchestrator;
pub mod session;
pub mod tokens;
pub mod tool_router;
pub mod types;

// Re-exports for convenience
pub use budget::{BudgetSummary, Violation, ViolationPolicy};
pub use confirmation::{ConfirmationPolicy, ConfirmationState, Signal, SignalOutcome};
pub use errors::{AgentError, ErrorKind};
pub use filter::{CompiledFilter, FieldCatalog, FilterSpec};
pub use orchestrator::{Orchestrator, TurnOutcome};
pub use session::{Session, SessionSummary, StrategicContext};
pub use tool_router::{DispatchSettings, ToolDispatcher};
pub use types::{LineItem, MediaPlanRef, Money, ToolCallRecord, ToolOutcome, WorkspaceRef};
