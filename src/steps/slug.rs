use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::object::{generate_slug, SlugFinder, Sluggable};
use crate::recipe::{keys, Flow, Step, StepError, Workplan};

/// Give the `object` ingredient a unique slug
///
/// An empty slug is derived from the slug source (the object kind when the
/// source has no usable character). A slug already used by another object
/// gets a `-2`, `-3`... suffix.
pub struct SlugPreparation<T: Sluggable> {
    finder: Arc<dyn SlugFinder>,
    _object: PhantomData<fn() -> T>,
}

impl<T: Sluggable> SlugPreparation<T> {
    pub fn new(finder: Arc<dyn SlugFinder>) -> Self {
        Self {
            finder,
            _object: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Sluggable> Step for SlugPreparation<T> {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let object = workplan.require::<T>(keys::OBJECT)?;
        let id = object.id();

        let mut base = generate_slug(object.slug());
        if base.is_empty() {
            base = generate_slug(&object.slug_source());
        }
        if base.is_empty() {
            base = T::KIND.to_string();
        }

        let mut slug = base.clone();
        let mut suffix = 1;
        while self.finder.slug_exists(&slug, id).await? {
            suffix += 1;
            slug = format!("{}-{}", base, suffix);
        }

        workplan.require_mut::<T>(keys::OBJECT)?.set_slug(slug);
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxCategoryRepository;
    use crate::models::Category;
    use crate::object::Writer;
    use crate::steps::testing::pool;

    fn category(name: &str, slug: &str) -> Category {
        Category {
            name: name.to_string(),
            slug: slug.to_string(),
            ..Category::default()
        }
    }

    async fn prepare(repo: Arc<SqlxCategoryRepository>, object: Category) -> String {
        let mut workplan = Workplan::new().with(keys::OBJECT, object);
        SlugPreparation::<Category>::new(repo).cook(&mut workplan).await.unwrap();
        workplan.get::<Category>(keys::OBJECT).unwrap().slug.clone()
    }

    #[tokio::test]
    async fn test_slug_from_source() {
        let repo = SqlxCategoryRepository::boxed(pool().await);
        assert_eq!(prepare(repo, category("Hello World", "")).await, "hello-world");
    }

    #[tokio::test]
    async fn test_given_slug_is_normalized() {
        let repo = SqlxCategoryRepository::boxed(pool().await);
        assert_eq!(prepare(repo, category("Anything", "My Slug")).await, "my-slug");
    }

    #[tokio::test]
    async fn test_fallback_to_kind() {
        let repo = SqlxCategoryRepository::boxed(pool().await);
        assert_eq!(prepare(repo, category("!!!", "")).await, "category");
    }

    #[tokio::test]
    async fn test_taken_slug_gets_suffix() {
        let repo = SqlxCategoryRepository::boxed(pool().await);
        for _ in 0..2 {
            let mut taken = category("News", "");
            taken.slug = prepare(repo.clone(), taken.clone()).await;
            repo.save(&mut taken).await.unwrap();
        }

        assert_eq!(prepare(repo, category("News", "")).await, "news-3");
    }

    #[tokio::test]
    async fn test_own_slug_is_kept() {
        let repo = SqlxCategoryRepository::boxed(pool().await);
        let mut saved = category("News", "news");
        repo.save(&mut saved).await.unwrap();

        assert_eq!(prepare(repo, saved).await, "news");
    }
}
