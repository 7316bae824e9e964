//! Execution of validated statements against PostGIS

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use serde_with::serde_as;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use super::compiler::{BindValue, CompiledQuery, OutputColumn};
use super::schema::{self, ColumnKind};
use super::validator::QueryValidator;
use crate::config::DatabaseConfig;
use crate::error::ActionError;

/// Outcome of one executed query, immutable once built
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpatialQueryResult {
    statement: String,
    #[serde_as(as = "serde_with::DurationMilliSecondsWithFrac<f64>")]
    #[serde(rename = "duration_ms")]
    duration: Duration,
    row_count: usize,
    columns: Vec<OutputColumn>,
    rows: Vec<Map<String, Value>>,
}

impl SpatialQueryResult {
    pub fn new(
        statement: impl Into<String>,
        duration: Duration,
        columns: Vec<OutputColumn>,
        rows: Vec<Map<String, Value>>,
    ) -> Self {
        Self {
            statement: statement.into(),
            duration,
            row_count: rows.len(),
            columns,
            rows,
        }
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    pub fn rows(&self) -> &[Map<String, Value>] {
        &self.rows
    }
}

/// Somewhere validated spatial queries can run
#[async_trait]
pub trait SpatialStore: Send + Sync {
    async fn execute(&self, query: &CompiledQuery) -> Result<SpatialQueryResult, ActionError>;

    /// Row count per whitelisted table
    async fn table_counts(&self) -> Result<BTreeMap<String, i64>, ActionError>;
}

/// PostgreSQL/PostGIS store behind a lazily connected pool
pub struct PgSpatialStore {
    pool: PgPool,
    validator: Arc<QueryValidator>,
}

impl PgSpatialStore {
    pub fn new(pool: PgPool, validator: Arc<QueryValidator>) -> Self {
        Self { pool, validator }
    }

    /// Build the pool without opening a connection yet
    pub fn connect_lazy(
        config: &DatabaseConfig,
        validator: Arc<QueryValidator>,
    ) -> Result<Self, ActionError> {
        info!(
            "Configuring spatial store pool: max_connections={}",
            config.max_connections
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy(&config.url)?;
        Ok(Self::new(pool, validator))
    }
}

#[async_trait]
impl SpatialStore for PgSpatialStore {
    async fn execute(&self, query: &CompiledQuery) -> Result<SpatialQueryResult, ActionError> {
        self.validator.validate(query)?;

        let mut statement = sqlx::query(&query.statement);
        for bind in &query.binds {
            statement = match bind {
                BindValue::Text(value) => statement.bind(value.as_str()),
                BindValue::Float(value) => statement.bind(*value),
                BindValue::Int(value) => statement.bind(*value),
                BindValue::Timestamp(value) => statement.bind(*value),
            };
        }

        let started = Instant::now();
        let rows = statement.fetch_all(&self.pool).await?;
        let duration = started.elapsed();
        debug!(
            "Query on {} returned {} rows in {:?}",
            query.table,
            rows.len(),
            duration
        );

        let rows = rows
            .iter()
            .map(|row| row_to_json(row, &query.columns))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SpatialQueryResult::new(
            query.statement.clone(),
            duration,
            query.columns.clone(),
            rows,
        ))
    }

    async fn table_counts(&self) -> Result<BTreeMap<String, i64>, ActionError> {
        let mut counts = BTreeMap::new();
        for table in schema::table_names() {
            let statement = format!("SELECT COUNT(*) FROM {}", table);
            self.validator.validate_statement(&statement)?;
            let count: i64 = sqlx::query_scalar(&statement).fetch_one(&self.pool).await?;
            counts.insert(table.to_string(), count);
        }
        Ok(counts)
    }
}

fn row_to_json(row: &PgRow, columns: &[OutputColumn]) -> Result<Map<String, Value>, sqlx::Error> {
    let mut object = Map::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        object.insert(column.name.clone(), column_value(row, index, column.kind)?);
    }
    Ok(object)
}

/// Decode one cell by its declared kind, tolerating narrower integer and
/// float widths
fn column_value(row: &PgRow, index: usize, kind: ColumnKind) -> Result<Value, sqlx::Error> {
    let value = match kind {
        ColumnKind::Integer => row
            .try_get::<Option<i32>, _>(index)
            .map(|v| v.map(i64::from))
            .or_else(|_| row.try_get::<Option<i64>, _>(index))?
            .map(Value::from),
        ColumnKind::Float => row
            .try_get::<Option<f64>, _>(index)
            .or_else(|_| {
                row.try_get::<Option<f32>, _>(index)
                    .map(|v| v.map(f64::from))
            })?
            .map(Value::from),
        ColumnKind::Text => row.try_get::<Option<String>, _>(index)?.map(Value::from),
        ColumnKind::Boolean => row.try_get::<Option<bool>, _>(index)?.map(Value::from),
        ColumnKind::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(|ts| Value::from(ts.to_rfc3339())),
        ColumnKind::Json | ColumnKind::Point | ColumnKind::Polygon => {
            row.try_get::<Option<Value>, _>(index)?
        }
    };
    Ok(value.unwrap_or(Value::Null))
}
