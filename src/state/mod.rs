// Build state module
//
// This module provides the BuildStateMachine that tracks the phases of one build and
// emits change events so front ends can report progress without polling.

use thiserror::Error;
use tokio::sync::broadcast;

/// Phases of one build
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuildPhase {
    Idle,
    Validating,
    Patching,
    Packaging,
    Finalizing,
    Done,
    Failed,
}

impl BuildPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: BuildPhase) -> bool {
        use BuildPhase::*;
        match (self, next) {
            (Idle, Validating)
            | (Validating, Patching)
            | (Patching, Packaging)
            | (Packaging, Finalizing)
            | (Finalizing, Done) => true,
            (from, Failed) => !from.is_terminal() && from != Idle,
            _ => false,
        }
    }
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Patching => "patching",
            Self::Packaging => "packaging",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid build transition {from} -> {to}")]
pub struct TransitionError {
    pub from: BuildPhase,
    pub to: BuildPhase,
}

/// Events emitted as a build progresses
#[derive(Clone, Debug, PartialEq)]
pub enum BuildEvent {
    /// The build moved to a new phase
    PhaseChanged { from: BuildPhase, to: BuildPhase },

    /// A module finished applying
    ModuleApplied { module: String, warnings: usize },

    /// A module failed to apply
    ModuleFailed { module: String, reason: String },
}

/// Tracks the phase of one build and validates transitions.
///
/// # Usage
///
/// - [`transition()`](Self::transition) to move forward; illegal moves are rejected
/// - [`fail()`](Self::fail) to abort from any non-terminal phase
/// - [`subscribe()`](Self::subscribe) to receive [`BuildEvent`]s
pub struct BuildStateMachine {
    phase: BuildPhase,

    /// Every phase entered, starting with `Idle`
    history: Vec<BuildPhase>,

    /// Broadcast channel for build events; sending with no subscribers is fine
    events_tx: broadcast::Sender<BuildEvent>,
}

impl BuildStateMachine {
    /// Create a state machine in `Idle` with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(100);
        Self {
            phase: BuildPhase::Idle,
            history: vec![BuildPhase::Idle],
            events_tx,
        }
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    pub fn history(&self) -> &[BuildPhase] {
        &self.history
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.events_tx.subscribe()
    }

    /// Move to `next`, rejecting transitions the build pipeline does not allow
    pub fn transition(&mut self, next: BuildPhase) -> Result<(), TransitionError> {
        if !self.phase.can_transition_to(next) {
            return Err(TransitionError {
                from: self.phase,
                to: next,
            });
        }

        let from = self.phase;
        self.phase = next;
        self.history.push(next);
        tracing::debug!("Build phase {} -> {}", from, next);
        self.emit(BuildEvent::PhaseChanged { from, to: next });
        Ok(())
    }

    /// Abort the build. A no-op once the build already ended.
    pub fn fail(&mut self) {
        if self.phase.can_transition_to(BuildPhase::Failed) {
            let _ = self.transition(BuildPhase::Failed);
        }
    }

    pub fn emit(&self, event: BuildEvent) {
        // Ignore send errors - it's OK if no one is listening
        let _ = self.events_tx.send(event);
    }
}

impl Default for BuildStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
