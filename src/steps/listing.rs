//! Listing steps: pagination, ordering and the paged query

use async_trait::async_trait;
use serde_json::json;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::http::ServerRequest;
use crate::object::{Direction, ListParams, ListQuery, Loader, Object, Order};
use crate::recipe::{keys, Flow, Step, StepError, Workplan};

/// Read the `page` query parameter into `list_params`
///
/// The page size comes from the `items_per_page` ingredient. Pages that do
/// not parse fall back to the first one.
pub struct ExtractPage;

#[async_trait]
impl Step for ExtractPage {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let per_page = workplan
            .get::<u32>(keys::ITEMS_PER_PAGE)
            .copied()
            .unwrap_or(ListParams::default().per_page);
        let page = workplan
            .get::<ServerRequest>(keys::REQUEST)
            .and_then(|request| request.query_param("page"))
            .and_then(|page| page.parse::<u32>().ok())
            .unwrap_or(1);

        workplan.insert(keys::LIST_PARAMS, ListParams::new(page, per_page));
        Ok(Flow::Continue)
    }
}

/// Read `order` and `direction` query parameters into `order`
///
/// Columns that are not sortable for `T` are ignored in favour of the
/// default order of the object.
pub struct ExtractOrder<T>(PhantomData<fn() -> T>);

impl<T: Object> ExtractOrder<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Object> Default for ExtractOrder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Object> Step for ExtractOrder<T> {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let default_direction = workplan
            .get::<Direction>(keys::DEFAULT_ORDER_DIRECTION)
            .copied()
            .unwrap_or_default();
        let request = workplan.get::<ServerRequest>(keys::REQUEST);

        let column = request
            .and_then(|request| request.query_param("order"))
            .filter(|column| T::SORTABLE_COLUMNS.iter().any(|sortable| sortable == column))
            .unwrap_or(T::DEFAULT_ORDER)
            .to_string();
        let direction = request
            .and_then(|request| request.query_param("direction"))
            .and_then(|direction| direction.parse::<Direction>().ok())
            .unwrap_or(default_direction);

        workplan.insert(keys::ORDER, Order::new(column, direction));
        Ok(Flow::Continue)
    }
}

/// Run the paged query and expose `objects` and `pagination`
pub struct LoadListObjects<T: Object> {
    loader: Arc<dyn Loader<T>>,
}

impl<T: Object> LoadListObjects<T> {
    pub fn new(loader: Arc<dyn Loader<T>>) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl<T: Object> Step for LoadListObjects<T> {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let params = workplan.get::<ListParams>(keys::LIST_PARAMS).copied().unwrap_or_default();
        let order = workplan
            .get::<Order>(keys::ORDER)
            .cloned()
            .unwrap_or_else(|| Order::new(T::DEFAULT_ORDER, Direction::Asc));

        let result = self.loader.query(&ListQuery { params, order: order.clone() }).await?;

        workplan.add_view_parameter("objects", &result.items)?;
        workplan.add_view_parameter(
            "pagination",
            json!({
                "page": result.page,
                "per_page": result.per_page,
                "total": result.total,
                "total_pages": result.total_pages(),
                "has_next": result.has_next(),
                "has_prev": result.has_prev(),
            }),
        )?;
        workplan.add_view_parameter("order", &order)?;
        workplan.insert(keys::OBJECTS, result);
        Ok(Flow::Continue)
    }
}
