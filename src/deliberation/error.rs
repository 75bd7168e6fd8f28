//! Pipeline error taxonomy.

use std::error::Error;
use std::fmt;

/// Errors that abort a pipeline run.
///
/// Tool failures are deliberately absent: they are written into the message log and the tool
/// loop carries on.
///
/// ```rust
/// use deliberation::PipelineError;
///
/// let err = PipelineError::RecursionLimitExceeded { limit: 100 };
/// assert!(!err.is_configuration());
/// assert_eq!(err.to_string(), "Recursion limit of 100 steps exceeded");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The selected analyst list was empty.
    NoRolesSelected,
    /// A role name did not match any known analyst role.
    UnknownRole(String),
    /// The same analyst role was selected twice.
    DuplicateRole(String),
    /// A configuration value was outside its accepted range.
    InvalidConfig(String),
    /// The model collaborator failed. Not retried at this layer.
    ModelInvocation { node: String, message: String },
    /// More node invocations than the global step ceiling allows.
    RecursionLimitExceeded { limit: usize },
    /// A fan-out task could not be joined.
    ExecutionFailed(String),
}

impl PipelineError {
    /// `true` for errors raised while assembling the graph, before any node runs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PipelineError::NoRolesSelected
                | PipelineError::UnknownRole(_)
                | PipelineError::DuplicateRole(_)
                | PipelineError::InvalidConfig(_)
        )
    }

    pub(crate) fn model(node: impl Into<String>, err: impl fmt::Display) -> Self {
        PipelineError::ModelInvocation {
            node: node.into(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::NoRolesSelected => {
                write!(f, "Configuration error: no analysts selected")
            }
            PipelineError::UnknownRole(name) => {
                write!(f, "Configuration error: unknown analyst role '{}'", name)
            }
            PipelineError::DuplicateRole(name) => {
                write!(f, "Configuration error: analyst role '{}' selected twice", name)
            }
            PipelineError::InvalidConfig(msg) => write!(f, "Configuration error: {}", msg),
            PipelineError::ModelInvocation { node, message } => {
                write!(f, "Model invocation failed in {}: {}", node, message)
            }
            PipelineError::RecursionLimitExceeded { limit } => {
                write!(f, "Recursion limit of {} steps exceeded", limit)
            }
            PipelineError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
        }
    }
}

impl Error for PipelineError {}
