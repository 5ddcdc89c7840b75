//! Step contract

use async_trait::async_trait;

use super::{StepError, Workplan};

/// What the recipe does once a step is done
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Run the next step
    Continue,
    /// Resume at the named step
    JumpTo(String),
    /// The request is answered, skip the remaining steps
    Stop,
}

impl Flow {
    pub fn jump(step: impl Into<String>) -> Self {
        Self::JumpTo(step.into())
    }
}

/// A single-purpose unit of work of a recipe
#[async_trait]
pub trait Step: Send + Sync {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError>;
}

/// Step backed by a synchronous closure
pub struct FnStep<F>(F);

/// Build a step from a closure
pub fn from_fn<F>(f: F) -> FnStep<F>
where
    F: Fn(&mut Workplan) -> Result<Flow, StepError> + Send + Sync,
{
    FnStep(f)
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&mut Workplan) -> Result<Flow, StepError> + Send + Sync,
{
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        (self.0)(workplan)
    }
}
