//! Form steps

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::Value;
use std::marker::PhantomData;

use super::RENDER_FORM;
use crate::forms::{Form, FormState, ObjectForm};
use crate::http::ServerRequest;
use crate::object::Object;
use crate::recipe::{keys, Flow, Step, StepError, Workplan};

type Prefill<F> = fn(&Workplan) -> Result<F, StepError>;
type Apply<F> = fn(&F, &mut Workplan) -> Result<(), StepError>;

/// Build the form of the request
///
/// POST requests submit the received fields. Other requests get a fresh
/// form, filled from the `object` ingredient for object forms.
pub struct FormHandling<F: Form> {
    prefill: Option<Prefill<F>>,
}

impl<F: Form> FormHandling<F> {
    pub fn new() -> Self {
        Self { prefill: None }
    }

    pub fn for_object<T>() -> Self
    where
        T: Object,
        F: ObjectForm<T>,
    {
        Self {
            prefill: Some(prefill_from_object::<T, F>),
        }
    }
}

impl<F: Form> Default for FormHandling<F> {
    fn default() -> Self {
        Self::new()
    }
}

fn prefill_from_object<T: Object, F: ObjectForm<T>>(workplan: &Workplan) -> Result<F, StepError> {
    Ok(F::from_object(workplan.require::<T>(keys::OBJECT)?))
}

#[async_trait]
impl<F: Form> Step for FormHandling<F> {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let request = workplan.require::<ServerRequest>(keys::REQUEST)?;

        let state = if request.is_post() {
            let empty = Value::Object(Default::default());
            FormState::<F>::submit(request.form.as_ref().unwrap_or(&empty))
        } else {
            let form = match self.prefill {
                Some(prefill) => prefill(workplan)?,
                None => F::default(),
            };
            FormState::fresh(form)
        };

        workplan.add_view_parameter("form", state.view())?;
        workplan.insert(keys::FORM, state);
        Ok(Flow::Continue)
    }
}

/// Act on the form built by [`FormHandling`]
///
/// Forms that were not submitted, or that carry errors, send the recipe to
/// the `render_form` step; a rejected submission answers 422.
pub struct FormProcessing<F: Form> {
    apply: Option<Apply<F>>,
    _form: PhantomData<fn() -> F>,
}

impl<F: Form> FormProcessing<F> {
    /// Only validate; later steps read the form themselves
    pub fn new() -> Self {
        Self {
            apply: None,
            _form: PhantomData,
        }
    }

    /// Validate, then copy the form onto the `object` ingredient
    pub fn onto<T>() -> Self
    where
        T: Object,
        F: ObjectForm<T>,
    {
        Self {
            apply: Some(apply_onto_object::<T, F>),
            _form: PhantomData,
        }
    }
}

impl<F: Form> Default for FormProcessing<F> {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_onto_object<T: Object, F: ObjectForm<T>>(form: &F, workplan: &mut Workplan) -> Result<(), StepError> {
    let object = workplan.require_mut::<T>(keys::OBJECT)?;
    form.apply(object);
    Ok(())
}

#[async_trait]
impl<F: Form> Step for FormProcessing<F> {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let state = workplan.require::<FormState<F>>(keys::FORM)?;

        if !state.is_valid() {
            if state.submitted {
                workplan.insert(keys::STATUS, StatusCode::UNPROCESSABLE_ENTITY);
            }
            return Ok(Flow::jump(RENDER_FORM));
        }

        if let Some(apply) = self.apply {
            if let Some(state) = workplan.take::<FormState<F>>(keys::FORM) {
                let applied = apply(&state.form, workplan);
                workplan.insert(keys::FORM, state);
                applied?;
            }
        }
        Ok(Flow::Continue)
    }
}

/// Record a form error found by a later step and show the form again
pub fn reject_form<F: Form>(
    workplan: &mut Workplan,
    field: &str,
    message: &str,
    status: StatusCode,
) -> Result<Flow, StepError> {
    let state = workplan.require_mut::<FormState<F>>(keys::FORM)?;
    state.errors.add(field, message);
    let view = state.view();
    workplan.add_view_parameter("form", view)?;
    workplan.insert(keys::STATUS, status);
    Ok(Flow::jump(RENDER_FORM))
}
