//! Reasoning/acting loop, multi-hop planner, configuration, and the engine
//! that wires them to a corpus.

pub mod agent;
pub mod budget;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod planner;

pub use agent::{ReasoningAgent, SessionOutcome, Termination};
pub use budget::{BudgetManager, ContextEntry, PruneReport, estimate_tokens};
pub use config::Config;
pub use engine::{Engine, Services};
pub use error::AgentError;
pub use events::{EventSink, SessionEvent};
pub use planner::{MultiHopPlanner, Operation, PlanParseError, PlannerOutcome, RetrievalPlan};
