//! Generic object steps: create, load, save and delete

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::info;

use crate::object::{Loader, Object, Writer};
use crate::recipe::{keys, Flow, Step, StepError, Workplan};

/// Put a new, unsaved object in the workplan
pub struct CreateObject<T>(PhantomData<fn() -> T>);

impl<T: Object> CreateObject<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Object> Default for CreateObject<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Object> Step for CreateObject<T> {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        workplan.insert(keys::OBJECT, T::default());
        Ok(Flow::Continue)
    }
}

/// Load the object identified by the `id` ingredient
pub struct LoadObject<T: Object> {
    loader: Arc<dyn Loader<T>>,
}

impl<T: Object> LoadObject<T> {
    pub fn new(loader: Arc<dyn Loader<T>>) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl<T: Object> Step for LoadObject<T> {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let id = *workplan.require::<i64>(keys::ID)?;

        let object = self
            .loader
            .load(id)
            .await?
            .ok_or_else(|| StepError::not_found(format!("No {} with id {}", T::KIND, id)))?;

        workplan.add_view_parameter("object", &object)?;
        workplan.insert(keys::OBJECT, object);
        Ok(Flow::Continue)
    }
}

/// Persist the object of the workplan
///
/// Afterwards `saved` is true and `id` holds the identifier of the object,
/// which redirections may use.
pub struct SaveObject<T: Object> {
    writer: Arc<dyn Writer<T>>,
}

impl<T: Object> SaveObject<T> {
    pub fn new(writer: Arc<dyn Writer<T>>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<T: Object> Step for SaveObject<T> {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let object = workplan.require_mut::<T>(keys::OBJECT)?;
        let created = object.is_new();

        if let Err(e) = self.writer.save(object).await {
            if is_unique_violation(&e) {
                return Err(StepError::bad_request(format!("This {} already exists", T::KIND)));
            }
            return Err(e.context(format!("Failed to save {}", T::KIND)).into());
        }

        let id = object.id();
        let view = serde_json::to_value(&*object).map_err(anyhow::Error::from)?;
        info!("{} {} {}", if created { "Created" } else { "Updated" }, T::KIND, id);

        workplan.view_mut().insert("object".to_string(), view);
        workplan.add_view_parameter("saved", true)?;
        workplan.insert(keys::ID, id);
        workplan.insert(keys::SAVED, true);
        Ok(Flow::Continue)
    }
}

fn is_unique_violation(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.to_string().contains("UNIQUE constraint failed"))
}

/// Remove the loaded object
pub struct DeleteObject<T: Object> {
    writer: Arc<dyn Writer<T>>,
}

impl<T: Object> DeleteObject<T> {
    pub fn new(writer: Arc<dyn Writer<T>>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<T: Object> Step for DeleteObject<T> {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let object = workplan.require::<T>(keys::OBJECT)?.clone();

        self.writer
            .remove(&object)
            .await
            .map_err(|e| e.context(format!("Failed to delete {}", T::KIND)))?;
        info!("Deleted {} {}", T::KIND, object.id());

        workplan.add_view_parameter("deleted", true)?;
        workplan.insert(keys::DELETED, true);
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxCategoryRepository, SqlxUserRepository};
    use crate::http::ServerRequest;
    use crate::models::{Category, User};
    use crate::steps::testing::{pool, workplan};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_create_object() {
        let mut workplan = Workplan::new();
        CreateObject::<Category>::new().cook(&mut workplan).await.unwrap();
        assert!(workplan.get::<Category>(keys::OBJECT).unwrap().is_new());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let repo = SqlxCategoryRepository::boxed(pool().await);

        let mut workplan = workplan(ServerRequest::get("/"));
        workplan.insert(
            keys::OBJECT,
            Category {
                name: "News".to_string(),
                slug: "news".to_string(),
                ..Category::default()
            },
        );
        SaveObject::new(repo.clone()).cook(&mut workplan).await.unwrap();
        let id = *workplan.get::<i64>(keys::ID).unwrap();
        assert!(id > 0);
        assert!(workplan.truthy(keys::SAVED));

        let mut other = Workplan::new().with(keys::ID, id);
        LoadObject::new(repo).cook(&mut other).await.unwrap();
        assert_eq!(other.get::<Category>(keys::OBJECT).unwrap().name, "News");
        assert_eq!(other.view()["object"]["slug"], "news");
    }

    #[tokio::test]
    async fn test_load_missing_object_is_not_found() {
        let repo = SqlxCategoryRepository::boxed(pool().await);
        let mut workplan = Workplan::new().with(keys::ID, 42i64);

        let error = LoadObject::new(repo).cook(&mut workplan).await.unwrap_err();
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_load_without_id_is_missing_ingredient() {
        let repo = SqlxCategoryRepository::boxed(pool().await);
        let error = LoadObject::new(repo).cook(&mut Workplan::new()).await.unwrap_err();
        assert!(matches!(error, StepError::MissingIngredient { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_is_a_bad_request() {
        let repo = SqlxUserRepository::boxed(pool().await);
        for expected in [None, Some(StatusCode::BAD_REQUEST)] {
            let mut workplan = Workplan::new().with(keys::OBJECT, User::new("a@example.com", "", ""));
            let result = SaveObject::new(repo.clone()).cook(&mut workplan).await;
            assert_eq!(result.err().map(|e| e.status()), expected);
        }
    }

    #[tokio::test]
    async fn test_delete_object() {
        let repo = SqlxCategoryRepository::boxed(pool().await);
        let mut workplan = Workplan::new().with(
            keys::OBJECT,
            Category {
                name: "Old".to_string(),
                slug: "old".to_string(),
                ..Category::default()
            },
        );
        SaveObject::new(repo.clone()).cook(&mut workplan).await.unwrap();
        let id = *workplan.get::<i64>(keys::ID).unwrap();

        DeleteObject::new(repo.clone()).cook(&mut workplan).await.unwrap();
        assert!(workplan.truthy(keys::DELETED));
        assert!(repo.load(id).await.unwrap().is_none());
    }
}
