//! Forms
//!
//! A form is a plain serde structure decoded from the submitted fields of a
//! request. Object forms can be filled from an existing object and applied
//! back onto it. HTML forms submit every field as a string, so the helpers
//! in [`fields`] accept both the textual and the JSON representation.

mod account;
pub mod fields;
mod objects;

pub use account::{LoginForm, PasswordForm, RecoveryForm, TotpCodeForm};
pub use objects::{CategoryForm, ContentForm, ContentTypeForm, ItemForm, MediaForm, UserForm};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::object::Object;

/// Key of errors that do not belong to a single field
pub const GLOBAL_ERRORS: &str = "_form";

/// A form submitted by a client
pub trait Form: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Errors that make the submission unusable
    fn validate(&self) -> FormErrors {
        FormErrors::new()
    }
}

/// Form editing an object
pub trait ObjectForm<T: Object>: Form {
    fn from_object(object: &T) -> Self;

    fn apply(&self, object: &mut T);
}

/// Validation errors by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    /// Record `message` on `field` when `condition` does not hold
    pub fn check(&mut self, condition: bool, field: &str, message: impl Into<String>) {
        if !condition {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn merge(&mut self, other: FormErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }
}

/// A form together with what happened to it during this request
#[derive(Debug, Clone)]
pub struct FormState<F> {
    pub form: F,
    /// Whether the client sent the form
    pub submitted: bool,
    pub errors: FormErrors,
}

impl<F: Form> FormState<F> {
    /// Form shown before any submission
    pub fn fresh(form: F) -> Self {
        Self {
            form,
            submitted: false,
            errors: FormErrors::new(),
        }
    }

    /// Decode and validate submitted fields
    ///
    /// Fields that cannot be decoded are reported as a global error on an
    /// empty form.
    pub fn submit(data: &Value) -> Self {
        match serde_json::from_value::<F>(strip_empty_keys(data)) {
            Ok(form) => {
                let errors = form.validate();
                Self {
                    form,
                    submitted: true,
                    errors,
                }
            }
            Err(e) => {
                let mut errors = FormErrors::new();
                errors.add(GLOBAL_ERRORS, format!("Invalid submission: {}", e));
                Self {
                    form: F::default(),
                    submitted: true,
                    errors,
                }
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.submitted && self.errors.is_empty()
    }

    /// What templates receive under `form`
    pub fn view(&self) -> Value {
        let mut view = Map::new();
        view.insert("values".to_string(), serde_json::to_value(&self.form).unwrap_or(Value::Null));
        view.insert("errors".to_string(), serde_json::to_value(&self.errors).unwrap_or(Value::Null));
        view.insert("submitted".to_string(), Value::Bool(self.submitted));
        Value::Object(view)
    }
}

/// Drop fields without a name, as sent by some browsers for unnamed inputs
fn strip_empty_keys(data: &Value) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct NameForm {
        #[serde(default)]
        name: String,
        #[serde(default, deserialize_with = "fields::number")]
        age: u32,
    }

    impl Form for NameForm {
        fn validate(&self) -> FormErrors {
            let mut errors = FormErrors::new();
            errors.check(!self.name.trim().is_empty(), "name", "Name is required");
            errors
        }
    }

    #[test]
    fn test_submit_valid_form() {
        let state = FormState::<NameForm>::submit(&json!({"name": "Jane", "age": "42"}));
        assert!(state.is_valid());
        assert_eq!(state.form.age, 42);
    }

    #[test]
    fn test_submit_invalid_form() {
        let state = FormState::<NameForm>::submit(&json!({"name": " "}));
        assert!(state.submitted);
        assert!(!state.is_valid());
        assert_eq!(state.errors.get("name"), ["Name is required".to_string()]);
    }

    #[test]
    fn test_undecodable_submission_is_a_global_error() {
        let state = FormState::<NameForm>::submit(&json!({"name": "Jane", "age": "many"}));
        assert!(!state.is_valid());
        assert_eq!(state.errors.get(GLOBAL_ERRORS).len(), 1);
    }

    #[test]
    fn test_fresh_form_is_not_valid() {
        let state = FormState::fresh(NameForm::default());
        assert!(!state.is_valid());
        assert!(state.errors.is_empty());
    }

    #[test]
    fn test_view_shape() {
        let state = FormState::<NameForm>::submit(&json!({"name": ""}));
        let view = state.view();
        assert_eq!(view["values"]["name"], "");
        assert_eq!(view["errors"]["name"][0], "Name is required");
        assert_eq!(view["submitted"], true);
    }

    #[test]
    fn test_errors_merge() {
        let mut errors = FormErrors::new();
        errors.add("a", "one");
        let mut other = FormErrors::new();
        other.add("a", "two");
        other.add("b", "three");
        errors.merge(other);
        assert_eq!(errors.get("a").len(), 2);
        assert_eq!(errors.get("b").len(), 1);
    }
}
