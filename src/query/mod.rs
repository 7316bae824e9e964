//! Spatial query compilation, validation and execution

mod compiler;
mod description;
pub mod schema;
mod store;
mod validator;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use compiler::{BindValue, CompiledQuery, OutputColumn, QueryCompiler};
pub use description::{
    OrderBy, QueryGeometry, QueryKind, SortDirection, SpatialQueryDescription, TimeRange,
};
pub use store::{PgSpatialStore, SpatialQueryResult, SpatialStore};
pub use validator::QueryValidator;

use crate::error::ActionError;

/// Compile, check and run descriptions against one store
pub struct QueryService {
    compiler: QueryCompiler,
    validator: Arc<QueryValidator>,
    store: Arc<dyn SpatialStore>,
}

impl QueryService {
    pub fn new(
        compiler: QueryCompiler,
        validator: Arc<QueryValidator>,
        store: Arc<dyn SpatialStore>,
    ) -> Self {
        Self {
            compiler,
            validator,
            store,
        }
    }

    /// Compile and validate without executing
    pub fn prepare(&self, description: &SpatialQueryDescription) -> Result<CompiledQuery, ActionError> {
        let query = self.compiler.compile(description)?;
        self.validator.validate(&query)?;
        Ok(query)
    }

    pub async fn run(
        &self,
        description: &SpatialQueryDescription,
    ) -> Result<SpatialQueryResult, ActionError> {
        let query = self.prepare(description)?;
        self.store.execute(&query).await
    }

    pub async fn table_counts(&self) -> Result<BTreeMap<String, i64>, ActionError> {
        self.store.table_counts().await
    }
}
