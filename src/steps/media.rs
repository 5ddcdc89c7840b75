//! Media steps: serving, uploading and removing files

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::MediaConfig;
use crate::http::{cache, Answer, Client, ServerRequest};
use crate::models::Media;
use crate::recipe::{keys, Flow, Step, StepError, Workplan};

/// Media files may change while keeping their URL
const MEDIA_MAX_AGE: u32 = 86_400;

/// Stored file names are generated, never chosen by clients
fn media_file(root: &Path, media: &Media) -> Result<PathBuf, StepError> {
    let name = media.local_path.as_str();
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(StepError::not_found(format!("Media {} has no file", media.id)));
    }
    Ok(root.join(name))
}

/// Types a browser would run scripts from when opened directly
fn is_scriptable(mime_type: &str) -> bool {
    matches!(mime_type, "image/svg+xml" | "text/html" | "application/xhtml+xml" | "text/xml" | "application/xml")
}

/// Answer with the file of the loaded media
///
/// Sends type, ETag and cache headers; a matching `If-None-Match` gets a
/// 304 without body. SVG and other markup run in a sandbox.
pub struct SendMedia {
    root: PathBuf,
}

impl SendMedia {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Step for SendMedia {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let media = workplan.require::<Media>(keys::OBJECT)?;
        let path = media_file(&self.root, media)?;

        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Media {} points to missing file {}", media.id, path.display());
                return Err(StepError::not_found("Media not found"));
            }
            Err(e) => return Err(anyhow::Error::from(e).context(format!("Failed to read {}", path.display())).into()),
        };

        let etag = cache::generate_etag(&data);
        let if_none_match = workplan
            .get::<ServerRequest>(keys::REQUEST)
            .and_then(|request| request.header(header::IF_NONE_MATCH.as_str()));

        let answer = if cache::etag_matches(if_none_match, &etag) {
            Answer::new(StatusCode::NOT_MODIFIED)
        } else {
            let file_name = media.name.replace(['"', '\\', '\r', '\n'], "_");
            let answer = Answer::new(StatusCode::OK)
                .with_body(&media.mime_type, data)?
                .with_header(header::CONTENT_DISPOSITION, &format!("inline; filename=\"{}\"", file_name))?
                .with_header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")?;
            if is_scriptable(&media.mime_type) {
                answer.with_header(header::CONTENT_SECURITY_POLICY, "sandbox")?
            } else {
                answer
            }
        };
        let answer = answer
            .with_header(header::ETAG, &etag)?
            .with_header(header::CACHE_CONTROL, &cache::cache_control_static(MEDIA_MAX_AGE, false))?;

        workplan.require_mut::<Client>(keys::CLIENT)?.accept_response(answer);
        Ok(Flow::Stop)
    }
}

/// Write the uploaded file to the media directory and put the matching
/// [`Media`] in `object`
///
/// The `name` and `alternative` form fields describe the media; the name
/// defaults to the uploaded file name.
pub struct StoreMediaUpload {
    config: MediaConfig,
}

impl StoreMediaUpload {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Step for StoreMediaUpload {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let request = workplan.require::<ServerRequest>(keys::REQUEST)?;
        let upload = request
            .upload
            .as_ref()
            .ok_or_else(|| StepError::bad_request("No file uploaded"))?;

        if upload.data.is_empty() {
            return Err(StepError::bad_request("The uploaded file is empty"));
        }
        if upload.data.len() as u64 > self.config.max_file_size {
            return Err(StepError::bad_request(format!(
                "File too large (max {} bytes)",
                self.config.max_file_size
            )));
        }
        if !self.config.is_type_allowed(&upload.content_type) {
            return Err(StepError::bad_request(format!(
                "File type '{}' is not allowed",
                upload.content_type
            )));
        }

        let field = |name: &str| {
            request
                .form
                .as_ref()
                .and_then(|form| form.get(name))
                .and_then(|value| value.as_str())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let name = field("name").unwrap_or_else(|| upload.file_name.clone());
        let alternative = field("alternative");

        let local_path = format!(
            "{}.{}",
            uuid::Uuid::new_v4().simple(),
            self.config.get_extension(&upload.content_type)
        );
        let path = self.config.path.join(&local_path);

        tokio::fs::create_dir_all(&self.config.path)
            .await
            .map_err(|e| anyhow::Error::from(e).context("Failed to create media directory"))?;
        tokio::fs::write(&path, &upload.data)
            .await
            .map_err(|e| anyhow::Error::from(e).context(format!("Failed to write {}", path.display())))?;
        info!("Stored upload '{}' as {}", upload.file_name, local_path);

        let now = Utc::now();
        let media = Media {
            id: 0,
            name,
            mime_type: upload.content_type.clone(),
            length: upload.data.len() as i64,
            alternative,
            local_path,
            created_at: now,
            updated_at: now,
        };
        workplan.insert(keys::OBJECT, media);
        Ok(Flow::Continue)
    }
}

/// Delete the file of the `object` media, once the media itself is gone
pub struct RemoveMediaFile {
    root: PathBuf,
}

impl RemoveMediaFile {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Step for RemoveMediaFile {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let media = workplan.require::<Media>(keys::OBJECT)?;
        let Ok(path) = media_file(&self.root, media) else {
            return Ok(Flow::Continue);
        };

        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove media file {}: {}", path.display(), e);
        }
        Ok(Flow::Continue)
    }
}

/// Error step of uploads: delete a stored file whose media was never saved
pub struct DiscardUnsavedUpload {
    root: PathBuf,
}

impl DiscardUnsavedUpload {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Step for DiscardUnsavedUpload {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        if workplan.truthy(keys::SAVED) {
            return Ok(Flow::Continue);
        }
        let Some(media) = workplan.get::<Media>(keys::OBJECT) else {
            return Ok(Flow::Continue);
        };
        let Ok(path) = media_file(&self.root, media) else {
            return Ok(Flow::Continue);
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!("Discarded unsaved upload {}", path.display()),
            Err(e) => warn!("Failed to discard upload {}: {}", path.display(), e),
        }
        Ok(Flow::Continue)
    }
}
