/// Task state definitions for tracking a single page or resource fetch
///
/// Every crawl task and every resource download walks the same small machine:
/// it starts `Pending`, enters `Fetching` once per attempt, and ends in either
/// `Succeeded` or `Abandoned`.
use crate::HarvestError;
use std::fmt;

/// Represents the current state of a fetch task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Task exists but no attempt has started
    Pending,

    /// An attempt is in flight (re-entered once per retry)
    Fetching,

    /// The body was fetched and handed on
    Succeeded,

    /// Retries were exhausted or the failure was fatal
    Abandoned,
}

impl TaskState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Abandoned)
    }

    /// Returns true if moving from `self` to `next` is allowed
    ///
    /// `Fetching -> Fetching` is the retry self-loop.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Fetching)
                | (Self::Fetching, Self::Fetching)
                | (Self::Fetching, Self::Succeeded)
                | (Self::Fetching, Self::Abandoned)
        )
    }

    /// Converts the state to its string form used in logs and the database
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Succeeded => "succeeded",
            Self::Abandoned => "abandoned",
        }
    }

    /// Parses a state from its string form
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "fetching" => Some(Self::Fetching),
            "succeeded" => Some(Self::Succeeded),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A task's current state plus every state it has passed through
#[derive(Debug, Clone)]
pub struct TaskLifecycle {
    state: TaskState,
    history: Vec<TaskState>,
}

impl TaskLifecycle {
    /// Creates a lifecycle in the `Pending` state
    pub fn new() -> Self {
        Self {
            state: TaskState::Pending,
            history: vec![TaskState::Pending],
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Every state entered so far, starting with `Pending`
    pub fn history(&self) -> &[TaskState] {
        &self.history
    }

    /// Number of attempts started so far
    pub fn attempts(&self) -> u32 {
        self.history
            .iter()
            .filter(|s| **s == TaskState::Fetching)
            .count() as u32
    }

    /// Moves to `next`, recording it in the history
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The transition was legal and has been applied
    /// * `Err(HarvestError::InvalidTransition)` - The state is unchanged
    pub fn transition(&mut self, next: TaskState) -> Result<(), HarvestError> {
        if !self.state.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Records the start of an attempt
    pub fn begin_attempt(&mut self) {
        self.apply(TaskState::Fetching);
    }

    /// Records a successful fetch
    pub fn succeed(&mut self) {
        self.apply(TaskState::Succeeded);
    }

    /// Records that the task was given up on
    pub fn abandon(&mut self) {
        self.apply(TaskState::Abandoned);
    }

    fn apply(&mut self, next: TaskState) {
        if let Err(e) = self.transition(next) {
            tracing::error!("Task lifecycle violation: {}", e);
        }
    }
}

impl Default for TaskLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
