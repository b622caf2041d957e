use serde::Serialize;
use tokio::sync::mpsc;

/// Planner state machine positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "round", rename_all = "snake_case")]
pub enum PlannerPhase {
    Analyze,
    Round(usize),
    Complete,
    Fallback,
}

/// Structured progress reported by agent and planner sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        question: String,
        max_iterations: usize,
    },
    IterationStarted {
        iteration: usize,
    },
    ReasoningStarted {
        iteration: usize,
    },
    /// The reasoning output could not be decoded into a decision.
    DecisionRejected {
        iteration: usize,
        error: String,
    },
    ToolCallStarted {
        iteration: usize,
        tool: String,
    },
    ToolCallFinished {
        iteration: usize,
        tool: String,
        success: bool,
        result_count: usize,
    },
    ContextPruned {
        removed_entries: usize,
        truncated: bool,
        tokens_before: usize,
        tokens_after: usize,
    },
    FinalAnswer {
        iterations: usize,
        fallback: bool,
    },
    SessionError {
        message: String,
    },
    PlannerPhase {
        phase: PlannerPhase,
    },
    PlanReceived {
        round: usize,
        operations: usize,
        is_final: bool,
        repaired: bool,
    },
    PlanRejected {
        round: usize,
        error: String,
    },
    OperationExecuted {
        round: usize,
        operation: String,
        success: bool,
    },
    OperationSkipped {
        round: usize,
        operation: String,
        reason: String,
    },
}

/// Non-blocking event emitter. Sending never waits and a dropped receiver is
/// ignored, so sessions run the same with or without a listener.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventSink {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A connected sink and its receiver.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
