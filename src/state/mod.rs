//! State module for tracking fetch progress
//!
//! # Components
//!
//! - `TaskState`: The states a page or resource fetch passes through
//! - `TaskLifecycle`: A task's current state plus its recorded history, with
//!   illegal transitions rejected

mod task_state;

pub use task_state::{TaskLifecycle, TaskState};
