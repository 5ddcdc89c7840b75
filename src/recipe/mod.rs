//! Recipe runtime
//!
//! A [`Recipe`] is an ordered list of [`Step`]s sharing a [`Workplan`].
//! Steps are sorted by priority (lower runs earlier, insertion order breaks
//! ties) and may jump to another step by name. The first error stops the
//! recipe: it is stored under [`keys::ERROR`] and the error steps run.
//!
//! ```ignore
//! let recipe = Recipe::new("list_contents")
//!     .require(Ingredient::of::<u32>(keys::ITEMS_PER_PAGE))
//!     .cook(ExtractPage, "extract_page", 10)
//!     .cook(LoadListObjects::new(loader), "load_list", 30)
//!     .cook(Render::from_ingredient(engine.clone()), "render", 40)
//!     .on_error(RenderError::new(engine));
//!
//! let workplan = recipe.execute(workplan).await;
//! ```

mod error;
mod ingredient;
mod step;
mod workplan;

pub use error::StepError;
pub use ingredient::Ingredient;
pub use step::{from_fn, FnStep, Flow, Step};
pub use workplan::Workplan;

use std::sync::Arc;
use tracing::{debug, error, warn};

/// Jumps allowed during one execution before the recipe is considered looping
pub const MAX_JUMPS: usize = 64;

/// Step priorities (lower = earlier)
pub const PRIORITY_EARLY: i32 = -100;
pub const PRIORITY_DEFAULT: i32 = 0;
pub const PRIORITY_LATE: i32 = 100;

/// Well-known ingredient names
pub mod keys {
    pub const CLIENT: &str = "client";
    pub const REQUEST: &str = "request";
    pub const USER: &str = "user";
    pub const SESSION: &str = "session";
    pub const ERROR: &str = "error";
    /// Status of the rendered page, when not 200
    pub const STATUS: &str = "status";

    // Endpoint configuration
    pub const ROUTE: &str = "route";
    pub const TEMPLATE: &str = "template";
    pub const ERROR_TEMPLATE: &str = "error_template";
    pub const ITEMS_PER_PAGE: &str = "items_per_page";
    pub const DEFAULT_ORDER_DIRECTION: &str = "default_order_direction";

    // Objects
    pub const ID: &str = "id";
    pub const SLUG: &str = "slug";
    pub const OBJECT: &str = "object";
    pub const OBJECTS: &str = "objects";
    pub const FORM: &str = "form";
    pub const SAVED: &str = "saved";
    pub const DELETED: &str = "deleted";
    pub const LIST_PARAMS: &str = "list_params";
    pub const ORDER: &str = "order";
}

struct Bowl {
    name: String,
    priority: i32,
    step: Arc<dyn Step>,
}

/// Extra steps merged into an endpoint's recipe
#[derive(Clone, Default)]
pub struct AdditionalSteps {
    steps: Vec<(String, i32, Arc<dyn Step>)>,
}

impl AdditionalSteps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<S: Step + 'static>(mut self, name: impl Into<String>, priority: i32, step: S) -> Self {
        self.steps.push((name.into(), priority, Arc::new(step)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// An ordered pipeline of steps with a single error path
pub struct Recipe {
    name: String,
    requirements: Vec<Ingredient>,
    steps: Vec<Bowl>,
    error_steps: Vec<Arc<dyn Step>>,
}

impl Recipe {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirements: Vec::new(),
            steps: Vec::new(),
            error_steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare an ingredient that must be in the workplan before cooking
    pub fn require(mut self, ingredient: Ingredient) -> Self {
        self.requirements.retain(|existing| existing.name() != ingredient.name());
        self.requirements.push(ingredient);
        self
    }

    /// Add a step; a step already registered under `name` is replaced
    pub fn cook<S: Step + 'static>(self, step: S, name: impl Into<String>, priority: i32) -> Self {
        self.cook_shared(Arc::new(step), name, priority)
    }

    pub fn cook_shared(mut self, step: Arc<dyn Step>, name: impl Into<String>, priority: i32) -> Self {
        let name = name.into();
        match self.steps.iter_mut().find(|bowl| bowl.name == name) {
            Some(bowl) => {
                debug!("Recipe '{}': replacing step '{}'", self.name, name);
                bowl.priority = priority;
                bowl.step = step;
            }
            None => self.steps.push(Bowl { name, priority, step }),
        }
        // Stable sort: equal priorities keep their insertion order
        self.steps.sort_by_key(|bowl| bowl.priority);
        self
    }

    /// Add a step to the error bowl
    pub fn on_error<S: Step + 'static>(mut self, step: S) -> Self {
        self.error_steps.push(Arc::new(step));
        self
    }

    pub fn with_additional(self, additional: &AdditionalSteps) -> Self {
        additional
            .steps
            .iter()
            .fold(self, |recipe, (name, priority, step)| {
                recipe.cook_shared(step.clone(), name.clone(), *priority)
            })
    }

    /// Step names in execution order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|bowl| bowl.name.as_str()).collect()
    }

    /// Cook the recipe; errors end up in the workplan, never in the caller
    pub async fn execute(&self, mut workplan: Workplan) -> Workplan {
        if let Err(error) = self.run(&mut workplan).await {
            self.fail(&mut workplan, error).await;
        }
        workplan
    }

    /// Skip the steps and go straight to the error bowl
    pub async fn reject(&self, mut workplan: Workplan, error: StepError) -> Workplan {
        self.fail(&mut workplan, error).await;
        workplan
    }

    async fn run(&self, workplan: &mut Workplan) -> Result<(), StepError> {
        for ingredient in &self.requirements {
            ingredient.check(workplan)?;
        }

        let mut cursor = 0;
        let mut jumps = 0;

        while let Some(bowl) = self.steps.get(cursor) {
            debug!("Recipe '{}': cooking '{}'", self.name, bowl.name);

            let flow = bowl.step.cook(workplan).await.map_err(|error| {
                debug!("Recipe '{}': step '{}' failed: {}", self.name, bowl.name, error);
                error
            })?;

            match flow {
                Flow::Continue => cursor += 1,
                Flow::Stop => break,
                Flow::JumpTo(target) => {
                    jumps += 1;
                    if jumps > MAX_JUMPS {
                        return Err(StepError::JumpLimit(self.name.clone()));
                    }
                    cursor = self
                        .steps
                        .iter()
                        .position(|bowl| bowl.name == target)
                        .ok_or(StepError::UnknownStep(target))?;
                }
            }
        }

        Ok(())
    }

    async fn fail(&self, workplan: &mut Workplan, error: StepError) {
        if error.status().is_server_error() {
            error!("Recipe '{}' failed: {:#}", self.name, error);
        } else {
            debug!("Recipe '{}' rejected the request: {}", self.name, error);
        }

        workplan.insert(keys::ERROR, error);

        for step in &self.error_steps {
            match step.cook(workplan).await {
                Ok(Flow::Stop) => break,
                Ok(_) => {}
                Err(handler_error) => {
                    warn!("Recipe '{}': error step failed: {}", self.name, handler_error);
                    break;
                }
            }
        }
    }
}
