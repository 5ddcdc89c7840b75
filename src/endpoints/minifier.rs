//! Minified CSS and JS bundles

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::AssetCache;
use crate::config::{AssetKind, AssetsConfig};
use crate::recipe::{keys, Recipe, StepError, Workplan};
use crate::steps::minify::{ASSET_KIND, ASSET_PATH, ASSET_SET, ASSET_VERSION, RETURN_FILE};
use crate::steps::{ComputePath, LoadPersistedAsset, LoadSource, MinifyAssets, PersistAsset, RenderError, ReturnFile};
use crate::templating::TemplateEngine;

/// Serve `/assets/{kind}/{set}`, building the bundle on first request
pub fn minifier(config: Arc<AssetsConfig>, cache: AssetCache, engine: Arc<TemplateEngine>) -> Recipe {
    Recipe::new("minifier")
        .cook(ComputePath::new(config.clone()), "compute_path", 10)
        .cook(LoadPersistedAsset::new(cache.clone()), "load_persisted_asset", 20)
        .cook(LoadSource::new(config), "load_source", 30)
        .cook(MinifyAssets, "minify_assets", 40)
        .cook(PersistAsset::new(cache), "persist_asset", 50)
        .cook(ReturnFile, RETURN_FILE, 60)
        .on_error(RenderError::new(engine))
}

/// Rebuild a bundle whatever was persisted before, without answering anyone
pub fn minify_command(config: Arc<AssetsConfig>, cache: AssetCache) -> Recipe {
    Recipe::new("minify_command")
        .cook(ComputePath::new(config.clone()), "compute_path", 10)
        .cook(LoadSource::new(config), "load_source", 30)
        .cook(MinifyAssets, "minify_assets", 40)
        .cook(PersistAsset::new(cache), "persist_asset", 50)
}

/// Cook [`minify_command`] for one set, returning the written file
pub async fn build_asset(recipe: &Recipe, kind: AssetKind, set: &str, version: Option<&str>) -> Result<PathBuf> {
    let mut workplan = Workplan::new().with(ASSET_KIND, kind).with(ASSET_SET, set.to_string());
    if let Some(version) = version {
        workplan.insert(ASSET_VERSION, version.to_string());
    }

    let mut workplan = recipe.execute(workplan).await;
    if let Some(error) = workplan.take::<StepError>(keys::ERROR) {
        return Err(anyhow::Error::new(error).context(format!("Failed to build {} set '{}'", kind, set)));
    }
    workplan
        .take::<PathBuf>(ASSET_PATH)
        .ok_or_else(|| anyhow!("No file was written for {} set '{}'", kind, set))
}
