//! Media files: serving and uploading

use std::path::PathBuf;
use std::sync::Arc;

use super::crud::PRIORITY_AFTER_DELETE;
use crate::config::MediaConfig;
use crate::http::ServerRequest;
use crate::models::Media;
use crate::object::{Loader, Writer};
use crate::recipe::{from_fn, keys, AdditionalSteps, Flow, Recipe};
use crate::steps::{
    DiscardUnsavedUpload, LoadObject, RedirectClient, RemoveMediaFile, Render, RenderError, SaveObject, SendMedia,
    StoreMediaUpload, RENDER_FORM,
};
use crate::templating::TemplateEngine;

/// Send the file of the media `id`
pub fn render_media(loader: Arc<dyn Loader<Media>>, root: impl Into<PathBuf>, engine: Arc<TemplateEngine>) -> Recipe {
    Recipe::new("render_media")
        .cook(LoadObject::new(loader), "load_object", 10)
        .cook(SendMedia::new(root), "send_media", 20)
        .on_error(RenderError::new(engine))
}

/// Upload form on GET, stored media then redirect to `route` on POST
///
/// A file written for a media that could not be saved is removed again.
pub fn upload_media(writer: Arc<dyn Writer<Media>>, config: MediaConfig, engine: Arc<TemplateEngine>) -> Recipe {
    let root = config.path.clone();
    Recipe::new("upload_media")
        .cook(
            from_fn(|workplan| {
                let posted = workplan.require::<ServerRequest>(keys::REQUEST)?.is_post();
                Ok(if posted { Flow::Continue } else { Flow::jump(RENDER_FORM) })
            }),
            "show_form",
            0,
        )
        .cook(StoreMediaUpload::new(config), "store_upload", 10)
        .cook(SaveObject::new(writer), "save_object", 20)
        .cook(RedirectClient::from_ingredient(), "redirect_client", 30)
        .cook(Render::from_ingredient(engine.clone()), RENDER_FORM, 40)
        .on_error(DiscardUnsavedUpload::new(root))
        .on_error(RenderError::new(engine))
}

/// Removal of the stored file, for the media delete recipe
pub fn media_file_removal(root: impl Into<PathBuf>) -> AdditionalSteps {
    AdditionalSteps::new().add("remove_media_file", PRIORITY_AFTER_DELETE, RemoveMediaFile::new(root))
}
