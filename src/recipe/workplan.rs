//! Workplan: the typed context threaded through the steps of a recipe

use serde::Serialize;
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;

use super::StepError;

/// Named values shared by the steps of one recipe execution
///
/// Besides ingredients, the workplan collects the parameters handed to the
/// template engine by rendering steps.
#[derive(Default)]
pub struct Workplan {
    ingredients: HashMap<String, Box<dyn Any + Send + Sync>>,
    view: Map<String, Value>,
}

impl Workplan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }

    /// Add or replace an ingredient
    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.ingredients.insert(name.into(), Box::new(value));
    }

    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.ingredients.get(name).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, name: &str) -> Option<&mut T> {
        self.ingredients.get_mut(name).and_then(|value| value.downcast_mut::<T>())
    }

    /// Remove an ingredient and return it, if it has the expected type
    ///
    /// An ingredient of another type is left in place.
    pub fn take<T: Any>(&mut self, name: &str) -> Option<T> {
        let value = self.ingredients.remove(name)?;
        match value.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(value) => {
                self.ingredients.insert(name.to_string(), value);
                None
            }
        }
    }

    /// Like [`get`](Self::get), failing with the matching [`StepError`]
    pub fn require<T: Any>(&self, name: &str) -> Result<&T, StepError> {
        match self.ingredients.get(name) {
            None => Err(StepError::MissingIngredient {
                name: name.to_string(),
                type_name: std::any::type_name::<T>(),
            }),
            Some(value) => value.downcast_ref::<T>().ok_or_else(|| StepError::WrongIngredientType {
                name: name.to_string(),
                type_name: std::any::type_name::<T>(),
            }),
        }
    }

    pub fn require_mut<T: Any>(&mut self, name: &str) -> Result<&mut T, StepError> {
        match self.ingredients.get_mut(name) {
            None => Err(StepError::MissingIngredient {
                name: name.to_string(),
                type_name: std::any::type_name::<T>(),
            }),
            Some(value) => value.downcast_mut::<T>().ok_or_else(|| StepError::WrongIngredientType {
                name: name.to_string(),
                type_name: std::any::type_name::<T>(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ingredients.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.ingredients.remove(name).is_some()
    }

    /// Type of a stored ingredient
    pub fn type_of(&self, name: &str) -> Option<TypeId> {
        self.ingredients.get(name).map(|value| (**value).type_id())
    }

    /// Whether an ingredient is present and does not hold an "empty" value
    ///
    /// `false`, `0`, empty strings and null JSON values are falsy; any other
    /// present ingredient is truthy.
    pub fn truthy(&self, name: &str) -> bool {
        let Some(value) = self.ingredients.get(name) else {
            return false;
        };
        let value: &(dyn Any + Send + Sync) = &**value;

        if let Some(flag) = value.downcast_ref::<bool>() {
            *flag
        } else if let Some(text) = value.downcast_ref::<String>() {
            !text.is_empty()
        } else if let Some(text) = value.downcast_ref::<&'static str>() {
            !text.is_empty()
        } else if let Some(number) = value.downcast_ref::<i64>() {
            *number != 0
        } else if let Some(number) = value.downcast_ref::<u32>() {
            *number != 0
        } else if let Some(json) = value.downcast_ref::<Value>() {
            !json.is_null() && json != &Value::Bool(false)
        } else {
            true
        }
    }

    /// Expose a value to the template engine
    pub fn add_view_parameter(&mut self, name: impl Into<String>, value: impl Serialize) -> Result<(), StepError> {
        let value = serde_json::to_value(value).map_err(|e| StepError::Internal(e.into()))?;
        self.view.insert(name.into(), value);
        Ok(())
    }

    pub fn view(&self) -> &Map<String, Value> {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.view
    }

    /// Names of the stored ingredients, sorted
    pub fn ingredient_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ingredients.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for Workplan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workplan")
            .field("ingredients", &self.ingredient_names())
            .field("view", &self.view)
            .finish()
    }
}
