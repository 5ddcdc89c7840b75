//! Asset minification steps
//!
//! `compute_path` names the bundle, `load_persisted_asset` short-cuts to
//! `return_file` when the bundle was already built, otherwise the sources
//! are loaded, minified and persisted before being returned.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, StatusCode};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::AssetCache;
use crate::config::{AssetKind, AssetsConfig};
use crate::http::{cache, Answer, Client, ServerRequest};
use crate::recipe::{keys, Flow, Step, StepError, Workplan};
use crate::services::minifier;

pub const ASSET_KIND: &str = "asset_kind";
pub const ASSET_SET: &str = "asset_set";
pub const ASSET_VERSION: &str = "asset_version";
pub const ASSET_PATH: &str = "asset_path";
pub const ASSET_SOURCE: &str = "asset_source";
pub const ASSET_CONTENT: &str = "asset_content";

/// Name of the [`ReturnFile`] step in minifier recipes
pub const RETURN_FILE: &str = "return_file";

/// Unversioned bundles are rebuilt on restart
const UNVERSIONED_MAX_AGE: u32 = 3600;

static VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,64}$").expect("valid version pattern"));

fn text_ingredient(workplan: &Workplan, name: &str, param: &str) -> Option<String> {
    workplan.get::<String>(name).cloned().or_else(|| {
        workplan
            .get::<ServerRequest>(keys::REQUEST)
            .and_then(|request| request.param(param))
            .map(str::to_string)
    })
}

/// Resolve kind, set and version of the requested bundle and the file it
/// is persisted to: `{output}/{set}.{version}.min.{ext}`
///
/// Values come from the ingredients of the same name, or else from the
/// `{kind}`/`{set}` route parameters and the `version` query parameter.
/// Clients only reach the default version and the versions listed by the
/// set; the `asset_version` ingredient may name any version.
pub struct ComputePath {
    config: Arc<AssetsConfig>,
}

impl ComputePath {
    pub fn new(config: Arc<AssetsConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Step for ComputePath {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let kind = match workplan.get::<AssetKind>(ASSET_KIND) {
            Some(kind) => *kind,
            None => text_ingredient(workplan, ASSET_KIND, "kind")
                .and_then(|kind| kind.parse::<AssetKind>().ok())
                .ok_or_else(|| StepError::not_found("Unknown asset kind"))?,
        };
        let set_name = text_ingredient(workplan, ASSET_SET, "set")
            .ok_or_else(|| StepError::not_found("No asset set requested"))?;
        let requested = workplan
            .get::<ServerRequest>(keys::REQUEST)
            .and_then(|request| request.query_param("version"))
            .map(str::to_string);
        let (version, from_client) = match workplan.get::<String>(ASSET_VERSION) {
            Some(version) => (version.clone(), false),
            None => match requested {
                Some(version) => (version, true),
                None => (self.config.default_version.clone(), false),
            },
        };

        if !VERSION.is_match(&version) {
            return Err(StepError::bad_request(format!("Invalid asset version '{}'", version)));
        }
        let set = match self.config.sets.get(&set_name) {
            Some(set) if set.kind == kind => set,
            _ => return Err(StepError::not_found(format!("No {} asset set named '{}'", kind, set_name))),
        };
        if from_client && !set.publishes(&version, &self.config.default_version) {
            return Err(StepError::not_found(format!("No version '{}' of asset set '{}'", version, set_name)));
        }

        let path = self
            .config
            .output_path
            .join(format!("{}.{}.min.{}", set_name, version, kind.extension()));

        workplan.insert(ASSET_KIND, kind);
        workplan.insert(ASSET_SET, set_name);
        workplan.insert(ASSET_VERSION, version);
        workplan.insert(ASSET_PATH, path);
        Ok(Flow::Continue)
    }
}

fn cache_key(workplan: &Workplan) -> Result<String, StepError> {
    Ok(AssetCache::key(
        *workplan.require::<AssetKind>(ASSET_KIND)?,
        workplan.require::<String>(ASSET_SET)?,
        workplan.require::<String>(ASSET_VERSION)?,
    ))
}

/// Jump to `return_file` with a bundle built earlier, from the cache or
/// from disk
pub struct LoadPersistedAsset {
    cache: AssetCache,
}

impl LoadPersistedAsset {
    pub fn new(cache: AssetCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Step for LoadPersistedAsset {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let key = cache_key(workplan)?;

        if let Some(content) = self.cache.get(&key).await {
            debug!("Asset {} served from cache", key);
            workplan.insert(ASSET_CONTENT, content);
            return Ok(Flow::jump(RETURN_FILE));
        }

        let path = workplan.require::<PathBuf>(ASSET_PATH)?.clone();
        match tokio::fs::read(&path).await {
            Ok(data) => {
                debug!("Asset {} loaded from {}", key, path.display());
                let content = Bytes::from(data);
                self.cache.insert(key, content.clone()).await;
                workplan.insert(ASSET_CONTENT, content);
                Ok(Flow::jump(RETURN_FILE))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Flow::Continue),
            Err(e) => Err(anyhow::Error::from(e)
                .context(format!("Failed to read {}", path.display()))
                .into()),
        }
    }
}

/// Concatenate the source files of the set into `asset_source`
pub struct LoadSource {
    config: Arc<AssetsConfig>,
}

impl LoadSource {
    pub fn new(config: Arc<AssetsConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Step for LoadSource {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let set_name = workplan.require::<String>(ASSET_SET)?;
        let set = self
            .config
            .sets
            .get(set_name)
            .ok_or_else(|| StepError::not_found(format!("No asset set named '{}'", set_name)))?;

        let mut source = String::new();
        for file in &set.files {
            let path = self.config.source_path.join(file);
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| anyhow::Error::from(e).context(format!("Failed to read asset source {}", path.display())))?;
            source.push_str(&text);
            if !source.ends_with('\n') {
                source.push('\n');
            }
        }

        workplan.insert(ASSET_SOURCE, source);
        Ok(Flow::Continue)
    }
}

/// Minify `asset_source` into `asset_content`
pub struct MinifyAssets;

#[async_trait]
impl Step for MinifyAssets {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let kind = *workplan.require::<AssetKind>(ASSET_KIND)?;
        let source = workplan.require::<String>(ASSET_SOURCE)?;

        let minified = minifier::minify(kind, source);
        debug!("Minified {} bytes of {} into {}", source.len(), kind, minified.len());

        workplan.insert(ASSET_CONTENT, Bytes::from(minified));
        Ok(Flow::Continue)
    }
}

/// Write `asset_content` to `asset_path` and cache it
pub struct PersistAsset {
    cache: AssetCache,
}

impl PersistAsset {
    pub fn new(cache: AssetCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Step for PersistAsset {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let key = cache_key(workplan)?;
        let path = workplan.require::<PathBuf>(ASSET_PATH)?.clone();
        let content = workplan.require::<Bytes>(ASSET_CONTENT)?.clone();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow::Error::from(e).context(format!("Failed to create {}", parent.display())))?;
        }
        tokio::fs::write(&path, &content)
            .await
            .map_err(|e| anyhow::Error::from(e).context(format!("Failed to write {}", path.display())))?;
        info!("Persisted asset {} ({} bytes)", path.display(), content.len());

        self.cache.insert(key, content).await;
        Ok(Flow::Continue)
    }
}

/// Answer with `asset_content`
///
/// Bundles requested with an explicit `version` are immutable.
pub struct ReturnFile;

#[async_trait]
impl Step for ReturnFile {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let kind = *workplan.require::<AssetKind>(ASSET_KIND)?;
        let content = workplan.require::<Bytes>(ASSET_CONTENT)?.clone();
        let request = workplan.get::<ServerRequest>(keys::REQUEST);

        let etag = cache::generate_etag(&content);
        let if_none_match = request.and_then(|request| request.header(header::IF_NONE_MATCH.as_str()));
        let cache_control = if request.map_or(false, |request| request.query_param("version").is_some()) {
            cache::cache_control_static(cache::STATIC_MAX_AGE, true)
        } else {
            cache::cache_control_static(UNVERSIONED_MAX_AGE, false)
        };

        let answer = if cache::etag_matches(if_none_match, &etag) {
            Answer::new(StatusCode::NOT_MODIFIED)
        } else {
            Answer::new(StatusCode::OK).with_body(kind.content_type(), content)?
        };
        let answer = answer
            .with_header(header::ETAG, &etag)?
            .with_header(header::CACHE_CONTROL, &cache_control)?;

        workplan.require_mut::<Client>(keys::CLIENT)?.accept_response(answer);
        Ok(Flow::Stop)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::AssetSet;
    use crate::recipe::Recipe;
    use crate::steps::testing::{answer, workplan};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    /// Assets config over a temporary directory holding a `site` CSS set
    pub(crate) fn assets_config(dir: &TempDir) -> Arc<AssetsConfig> {
        let source = dir.path().join("src");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("a.css"), "body {\n  color: red;\n}\n").unwrap();
        std::fs::write(source.join("b.css"), "/* b */ p { margin: 0 }").unwrap();

        let mut sets = BTreeMap::new();
        sets.insert(
            "site".to_string(),
            AssetSet {
                kind: AssetKind::Css,
                files: vec![PathBuf::from("a.css"), PathBuf::from("b.css")],
                versions: vec!["v1".to_string(), "v2".to_string()],
            },
        );
        Arc::new(AssetsConfig {
            source_path: source,
            output_path: dir.path().join("build"),
            default_version: "latest".to_string(),
            sets,
        })
    }

    fn recipe(config: Arc<AssetsConfig>, cache: AssetCache) -> Recipe {
        Recipe::new("minifier")
            .cook(ComputePath::new(config.clone()), "compute_path", 10)
            .cook(LoadPersistedAsset::new(cache.clone()), "load_persisted_asset", 20)
            .cook(LoadSource::new(config), "load_source", 30)
            .cook(MinifyAssets, "minify_assets", 40)
            .cook(PersistAsset::new(cache), "persist_asset", 50)
            .cook(ReturnFile, RETURN_FILE, 60)
    }

    fn request(kind: &str, set: &str) -> ServerRequest {
        ServerRequest::get(format!("/assets/{}/{}", kind, set))
            .with_param("kind", kind)
            .with_param("set", set)
    }

    #[tokio::test]
    async fn test_compute_path() {
        let dir = TempDir::new().unwrap();
        let config = assets_config(&dir);
        let mut workplan = workplan(request("css", "site").with_query("version", "v2"));

        ComputePath::new(config.clone()).cook(&mut workplan).await.unwrap();
        assert_eq!(
            workplan.get::<PathBuf>(ASSET_PATH).unwrap(),
            &config.output_path.join("site.v2.min.css")
        );
    }

    #[tokio::test]
    async fn test_compute_path_rejects_unknown_sets() {
        let dir = TempDir::new().unwrap();
        let config = assets_config(&dir);

        for (kind, set) in [("js", "site"), ("css", "other"), ("png", "site")] {
            let mut workplan = workplan(request(kind, set));
            let error = ComputePath::new(config.clone()).cook(&mut workplan).await.unwrap_err();
            assert_eq!(error.status(), StatusCode::NOT_FOUND);
        }

        let mut workplan = workplan(request("css", "site").with_query("version", "../../x"));
        let error = ComputePath::new(config).cook(&mut workplan).await.unwrap_err();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unlisted_versions_are_not_built() {
        let dir = TempDir::new().unwrap();
        let config = assets_config(&dir);
        let recipe = recipe(config.clone(), AssetCache::new());

        for n in 0..5 {
            let workplan = recipe
                .execute(workplan(request("css", "site").with_query("version", &format!("x{}", n))))
                .await;
            assert!(workplan.contains(keys::ERROR));
            assert!(!workplan.contains(ASSET_CONTENT));
        }
        assert!(!config.output_path.exists());

        let listed = recipe.execute(workplan(request("css", "site").with_query("version", "v1"))).await;
        assert_eq!(answer(&listed).status, StatusCode::OK);
        assert!(config.output_path.join("site.v1.min.css").exists());
    }

    #[tokio::test]
    async fn test_command_may_name_any_version() {
        let dir = TempDir::new().unwrap();
        let mut workplan = workplan(request("css", "site").with_query("version", "x1"))
            .with(ASSET_VERSION, "2024-06".to_string());

        ComputePath::new(assets_config(&dir)).cook(&mut workplan).await.unwrap();
        assert_eq!(workplan.get::<String>(ASSET_VERSION).unwrap(), "2024-06");
    }

    #[tokio::test]
    async fn test_minifier_builds_then_reuses_bundle() {
        let dir = TempDir::new().unwrap();
        let config = assets_config(&dir);
        let cache = AssetCache::new();
        let recipe = recipe(config.clone(), cache.clone());

        let built = recipe.execute(workplan(request("css", "site"))).await;
        let body = answer(&built).body_text();
        assert_eq!(body, "body{color:red}p{margin:0}");
        assert!(built.contains(ASSET_SOURCE));
        assert!(config.output_path.join("site.latest.min.css").exists());

        let reused = recipe.execute(workplan(request("css", "site"))).await;
        assert!(!reused.contains(ASSET_SOURCE));
        assert_eq!(answer(&reused).body_text(), body);
    }

    #[tokio::test]
    async fn test_persisted_file_is_used_after_restart() {
        let dir = TempDir::new().unwrap();
        let config = assets_config(&dir);
        std::fs::create_dir_all(&config.output_path).unwrap();
        std::fs::write(config.output_path.join("site.latest.min.css"), "persisted").unwrap();

        let workplan = recipe(config, AssetCache::new())
            .execute(workplan(request("css", "site")))
            .await;
        assert_eq!(answer(&workplan).body_text(), "persisted");
    }

    #[tokio::test]
    async fn test_return_file_headers() {
        let mut workplan = workplan(request("css", "site").with_query("version", "v1"))
            .with(ASSET_KIND, AssetKind::Css)
            .with(ASSET_CONTENT, Bytes::from_static(b"a{}"));

        ReturnFile.cook(&mut workplan).await.unwrap();
        let sent = answer(&workplan);
        assert_eq!(sent.headers[header::CONTENT_TYPE], "text/css; charset=utf-8");
        assert!(sent.headers[header::CACHE_CONTROL].to_str().unwrap().contains("immutable"));
    }
}
