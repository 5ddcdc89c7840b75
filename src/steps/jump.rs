//! Conditional jumps

use async_trait::async_trait;

use crate::recipe::{Flow, Step, StepError, Workplan};

/// Jump to `target` when `ingredient` is truthy
pub struct JumpIf {
    ingredient: String,
    target: String,
}

impl JumpIf {
    pub fn new(ingredient: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            ingredient: ingredient.into(),
            target: target.into(),
        }
    }
}

#[async_trait]
impl Step for JumpIf {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        if workplan.truthy(&self.ingredient) {
            Ok(Flow::jump(self.target.clone()))
        } else {
            Ok(Flow::Continue)
        }
    }
}

/// Jump to `target` when `ingredient` is missing or falsy
pub struct JumpIfNot {
    ingredient: String,
    target: String,
}

impl JumpIfNot {
    pub fn new(ingredient: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            ingredient: ingredient.into(),
            target: target.into(),
        }
    }
}

#[async_trait]
impl Step for JumpIfNot {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        if workplan.truthy(&self.ingredient) {
            Ok(Flow::Continue)
        } else {
            Ok(Flow::jump(self.target.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{from_fn, Recipe};

    fn recipe() -> Recipe {
        let mark = |label: &'static str| {
            from_fn(move |workplan: &mut Workplan| {
                workplan.insert(label, true);
                Ok(Flow::Continue)
            })
        };
        Recipe::new("jumps")
            .cook(JumpIf::new("route", "redirect"), "jump_if_route", 10)
            .cook(mark("rendered"), "render", 20)
            .cook(from_fn(|_: &mut Workplan| Ok(Flow::Stop)), "stop", 30)
            .cook(mark("redirected"), "redirect", 40)
    }

    #[tokio::test]
    async fn test_jump_if_truthy() {
        let workplan = recipe()
            .execute(Workplan::new().with("route", "/admin".to_string()))
            .await;
        assert!(workplan.truthy("redirected"));
        assert!(!workplan.truthy("rendered"));
    }

    #[tokio::test]
    async fn test_no_jump_when_falsy() {
        let workplan = recipe().execute(Workplan::new().with("route", String::new())).await;
        assert!(workplan.truthy("rendered"));
        assert!(!workplan.truthy("redirected"));
    }

    #[tokio::test]
    async fn test_jump_if_not() {
        let step = JumpIfNot::new("user", "render");
        assert_eq!(step.cook(&mut Workplan::new()).await.unwrap(), Flow::jump("render"));

        let mut workplan = Workplan::new().with("user", 7i64);
        assert_eq!(step.cook(&mut workplan).await.unwrap(), Flow::Continue);
    }
}
