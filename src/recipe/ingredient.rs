//! Typed recipe requirements

use std::any::{Any, TypeId};

use super::{StepError, Workplan};

/// A named, typed value a recipe needs before its first step runs
#[derive(Debug, Clone)]
pub struct Ingredient {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
}

impl Ingredient {
    pub fn of<T: Any>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check(&self, workplan: &Workplan) -> Result<(), StepError> {
        match workplan.type_of(&self.name) {
            None => Err(StepError::MissingIngredient {
                name: self.name.clone(),
                type_name: self.type_name,
            }),
            Some(type_id) if type_id != self.type_id => Err(StepError::WrongIngredientType {
                name: self.name.clone(),
                type_name: self.type_name,
            }),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check() {
        let ingredient = Ingredient::of::<u32>("items_per_page");
        assert_eq!(ingredient.name(), "items_per_page");

        assert!(matches!(
            ingredient.check(&Workplan::new()),
            Err(StepError::MissingIngredient { .. })
        ));
        assert!(matches!(
            ingredient.check(&Workplan::new().with("items_per_page", 15i64)),
            Err(StepError::WrongIngredientType { .. })
        ));
        assert!(ingredient.check(&Workplan::new().with("items_per_page", 15u32)).is_ok());
    }
}
