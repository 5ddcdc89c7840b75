//! Steps
//!
//! Single purpose units recipes are assembled from. Each step receives its
//! collaborators (repositories, template engine, services) when it is
//! built and exchanges everything else through the workplan, under the
//! names of [`keys`](crate::recipe::keys) or of the constants declared next
//! to the steps.

pub mod auth;
pub mod content;
pub mod form;
pub mod jump;
pub mod listing;
pub mod media;
pub mod minify;
pub mod object;
pub mod recovery;
pub mod render;
pub mod slug;
pub mod totp;

pub use auth::{Authenticate, CloseSession};
pub use content::{ExtractSlug, LoadPublishedContent, ResolveContentTemplate, ResolveStaticTemplate};
pub use form::{FormHandling, FormProcessing};
pub use jump::{JumpIf, JumpIfNot};
pub use listing::{ExtractOrder, ExtractPage, LoadListObjects};
pub use media::{DiscardUnsavedUpload, RemoveMediaFile, SendMedia, StoreMediaUpload};
pub use minify::{ComputePath, LoadPersistedAsset, LoadSource, MinifyAssets, PersistAsset, ReturnFile};
pub use object::{CreateObject, DeleteObject, LoadObject, SaveObject};
pub use recovery::{
    FindUserByEmail, LoadRecoveryAccess, NotifyUserAboutRecoveryAccess, OpenRecoverySession,
    PrepareRecoveryAccess, RemoveRecoveryAccess, UpdatePassword,
};
pub use render::{RedirectClient, Render, RenderError};
pub use slug::SlugPreparation;
pub use totp::{ConfirmTotp, DisableTotp, EnableTotp, LoadTotpStatus, PromoteSession, ValidateTotp};

/// Name of the step rendering a form again after a failed submission
pub const RENDER_FORM: &str = "render_form";

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use sqlx::SqlitePool;

    use crate::db::{create_test_pool, migrations};
    use crate::http::{Answer, Client, ServerRequest};
    use crate::recipe::{keys, Workplan};
    use crate::templating::TemplateEngine;

    pub async fn pool() -> SqlitePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    pub fn workplan(request: ServerRequest) -> Workplan {
        Workplan::new()
            .with(keys::CLIENT, Client::new())
            .with(keys::REQUEST, request)
    }

    pub fn answer(workplan: &Workplan) -> &Answer {
        workplan
            .get::<Client>(keys::CLIENT)
            .and_then(Client::answer)
            .expect("client received no answer")
    }

    /// `Set-Cookie` header the client will send along with its answer
    pub fn sent_cookie(workplan: &Workplan) -> String {
        workplan
            .get::<Client>(keys::CLIENT)
            .and_then(|client| client.pending_headers().get(axum::http::header::SET_COOKIE))
            .and_then(|value| value.to_str().ok())
            .expect("client sends no cookie")
            .to_string()
    }

    /// Engine with one-line templates printing what the tests look at
    pub fn engine() -> Arc<TemplateEngine> {
        let templates = [
            ("error.html", "error {{ status }}: {{ message }}"),
            ("list.html", "{% for object in objects %}{{ object.title }};{% endfor %}"),
            ("form.html", "form {{ form.submitted }} {{ form.errors | json_encode() | safe }}"),
            ("content.html", "{{ content.title }}"),
            ("page.html", "page {{ object.title | default(value='') }}"),
            ("pages/about.html", "about"),
        ];
        Arc::new(
            TemplateEngine::from_templates(
                templates
                    .iter()
                    .map(|(name, source)| (name.to_string(), source.to_string())),
            )
            .expect("valid test templates"),
        )
    }
}
