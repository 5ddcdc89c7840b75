//! Create, edit, delete and list persisted objects

use std::sync::Arc;

use crate::forms::ObjectForm;
use crate::object::{Loader, Object, SlugFinder, Sluggable, Writer};
use crate::recipe::{keys, AdditionalSteps, Ingredient, Recipe};
use crate::steps::{
    CreateObject, DeleteObject, ExtractOrder, ExtractPage, FormHandling, FormProcessing, JumpIf, LoadListObjects,
    LoadObject, RedirectClient, Render, RenderError, SaveObject, SlugPreparation, RENDER_FORM,
};
use crate::templating::TemplateEngine;

/// Slot for steps preparing the object once the form is applied, before it is saved
pub const PRIORITY_BEFORE_SAVE: i32 = 40;

/// Slot for steps running once the object is deleted, before the answer
pub const PRIORITY_AFTER_DELETE: i32 = 25;

const REDIRECT_CLIENT: &str = "redirect_client";

/// Slug generation for the create and edit recipes of sluggable objects
pub fn slug_steps<T: Sluggable>(finder: Arc<dyn SlugFinder>) -> AdditionalSteps {
    AdditionalSteps::new().add("slug_preparation", PRIORITY_BEFORE_SAVE, SlugPreparation::<T>::new(finder))
}

/// New object from a form, then redirect to `route`
///
/// The form is shown with the `template` ingredient until a valid submission
/// arrives.
pub fn create_object<T, F>(
    writer: Arc<dyn Writer<T>>,
    engine: Arc<TemplateEngine>,
    additional: &AdditionalSteps,
) -> Recipe
where
    T: Object,
    F: ObjectForm<T>,
{
    Recipe::new(format!("create_{}", T::KIND))
        .require(Ingredient::of::<String>(keys::ROUTE))
        .require(Ingredient::of::<String>(keys::TEMPLATE))
        .cook(CreateObject::<T>::new(), "create_object", 10)
        .cook(FormHandling::<F>::for_object::<T>(), "form_handling", 20)
        .cook(FormProcessing::<F>::onto::<T>(), "form_processing", 30)
        .cook(SaveObject::new(writer), "save_object", 50)
        .cook(RedirectClient::from_ingredient(), REDIRECT_CLIENT, 60)
        .cook(Render::from_ingredient(engine.clone()), RENDER_FORM, 70)
        .on_error(RenderError::new(engine))
        .with_additional(additional)
}

/// Edit the object `id` with a form; the form is rendered again once saved
pub fn edit_object<T, F>(
    loader: Arc<dyn Loader<T>>,
    writer: Arc<dyn Writer<T>>,
    engine: Arc<TemplateEngine>,
    additional: &AdditionalSteps,
) -> Recipe
where
    T: Object,
    F: ObjectForm<T>,
{
    Recipe::new(format!("edit_{}", T::KIND))
        .require(Ingredient::of::<i64>(keys::ID))
        .require(Ingredient::of::<String>(keys::TEMPLATE))
        .cook(LoadObject::new(loader), "load_object", 10)
        .cook(FormHandling::<F>::for_object::<T>(), "form_handling", 20)
        .cook(FormProcessing::<F>::onto::<T>(), "form_processing", 30)
        .cook(SaveObject::new(writer), "save_object", 50)
        .cook(Render::from_ingredient(engine.clone()), RENDER_FORM, 70)
        .on_error(RenderError::new(engine))
        .with_additional(additional)
}

/// Delete the object `id`
///
/// Redirects to `route` when the endpoint has one, renders `template`
/// otherwise.
pub fn delete_object<T: Object>(
    loader: Arc<dyn Loader<T>>,
    writer: Arc<dyn Writer<T>>,
    engine: Arc<TemplateEngine>,
    additional: &AdditionalSteps,
) -> Recipe {
    Recipe::new(format!("delete_{}", T::KIND))
        .require(Ingredient::of::<i64>(keys::ID))
        .cook(LoadObject::new(loader), "load_object", 10)
        .cook(DeleteObject::new(writer), "delete_object", 20)
        .cook(JumpIf::new(keys::ROUTE, REDIRECT_CLIENT), "jump_if_route", 30)
        .cook(Render::from_ingredient(engine.clone()), "render", 40)
        .cook(RedirectClient::from_ingredient(), REDIRECT_CLIENT, 50)
        .on_error(RenderError::new(engine))
        .with_additional(additional)
}

/// Paged and ordered list of objects rendered with `template`
pub fn list_objects<T: Object>(loader: Arc<dyn Loader<T>>, engine: Arc<TemplateEngine>) -> Recipe {
    Recipe::new(format!("list_{}", T::KIND))
        .require(Ingredient::of::<String>(keys::TEMPLATE))
        .cook(ExtractPage, "extract_page", 10)
        .cook(ExtractOrder::<T>::new(), "extract_order", 20)
        .cook(LoadListObjects::new(loader), "load_list_objects", 30)
        .cook(Render::from_ingredient(engine.clone()), "render", 40)
        .on_error(RenderError::new(engine))
}
