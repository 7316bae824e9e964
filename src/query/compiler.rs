//! Spatial query compiler
//!
//! Turns a `SpatialQueryDescription` into parameterized PostGIS SQL. Every
//! user-supplied value travels as a bind parameter; the statement text is
//! assembled only from whitelisted identifiers and fixed SQL fragments.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::description::{QueryGeometry, QueryKind, SortDirection, SpatialQueryDescription};
use super::schema::{self, ColumnKind, TableSchema};
use crate::config::QueryConfig;
use crate::error::{ActionError, UnsafeReason};

/// A positional parameter value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BindValue {
    Text(String),
    Float(f64),
    Int(i64),
    Timestamp(DateTime<Utc>),
}

/// One column of the result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputColumn {
    pub name: String,
    pub kind: ColumnKind,
}

/// Statement text plus its ordered bind values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub table: String,
    pub statement: String,
    pub binds: Vec<BindValue>,
    pub columns: Vec<OutputColumn>,
    /// Effective row limit after clamping
    pub limit: u32,
}

/// Accumulates bind values and hands out `$n` placeholders
#[derive(Default)]
struct Binds {
    values: Vec<BindValue>,
}

impl Binds {
    fn push(&mut self, value: BindValue) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }
}

#[derive(Debug, Clone)]
pub struct QueryCompiler {
    max_rows: u32,
    point_radius_m: f64,
}

impl QueryCompiler {
    pub fn new(max_rows: u32, point_radius_m: f64) -> Self {
        Self {
            max_rows,
            point_radius_m,
        }
    }

    pub fn from_config(config: &QueryConfig) -> Self {
        Self::new(config.max_rows, config.point_radius_m)
    }

    pub fn compile(&self, description: &SpatialQueryDescription) -> Result<CompiledQuery, ActionError> {
        let table = schema::table(&description.table).ok_or_else(|| {
            ActionError::UnsafeQuery(UnsafeReason::TableNotWhitelisted(description.table.clone()))
        })?;

        let mut binds = Binds::default();
        let mut predicates = Vec::new();

        if let Some(range) = &description.time_range {
            if range.start > range.end {
                return Err(ActionError::InvalidRange {
                    start: range.start,
                    end: range.end,
                });
            }
            let start = binds.push(BindValue::Timestamp(range.start));
            let end = binds.push(BindValue::Timestamp(range.end));
            predicates.push(format!(
                "{} BETWEEN {} AND {}",
                table.timestamp_column, start, end
            ));
        }

        if let Some(geometry) = &description.geometry {
            geometry.validate()?;
            if !geometry.fits(description.kind) {
                return Err(ActionError::InvalidGeometry(format!(
                    "geometry does not match query type {:?}",
                    description.kind
                )));
            }
            predicates.push(self.spatial_predicate(table, geometry, &mut binds)?);
        }

        if let Some(entity_id) = &description.entity_id {
            let column = table.entity_column.ok_or_else(|| {
                ActionError::InvalidParameter(format!(
                    "table '{}' cannot be filtered by entity",
                    table.name
                ))
            })?;
            let placeholder = binds.push(BindValue::Text(entity_id.clone()));
            predicates.push(format!("{} = {}", column, placeholder));
        }

        let columns = project(table, description.fields.as_deref())?;
        let select_list = columns
            .iter()
            .map(|c| {
                if c.kind.is_geometry() {
                    format!("ST_AsGeoJSON({0})::jsonb AS {0}", c.name)
                } else {
                    c.name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        let ordering = order(table, description)?;

        let limit = match description.limit {
            Some(0) => {
                return Err(ActionError::InvalidParameter(
                    "limit must be greater than zero".to_string(),
                ))
            }
            Some(requested) => requested.min(self.max_rows),
            None => self.max_rows,
        };

        let mut statement = format!("SELECT {} FROM {}", select_list, table.name);
        if !predicates.is_empty() {
            statement.push_str(" WHERE ");
            statement.push_str(&predicates.join(" AND "));
        }
        if !ordering.is_empty() {
            statement.push_str(" ORDER BY ");
            statement.push_str(&ordering.join(", "));
        }
        let placeholder = binds.push(BindValue::Int(i64::from(limit)));
        statement.push_str(" LIMIT ");
        statement.push_str(&placeholder);

        Ok(CompiledQuery {
            table: table.name.to_string(),
            statement,
            binds: binds.values,
            columns,
            limit,
        })
    }

    fn spatial_predicate(
        &self,
        table: &TableSchema,
        geometry: &QueryGeometry,
        binds: &mut Binds,
    ) -> Result<String, ActionError> {
        let column = table.geometry_column;
        let geojson = serde_json::to_string(&geometry.to_geojson())?;
        let shape = format!(
            "ST_SetSRID(ST_GeomFromGeoJSON({}), 4326)",
            binds.push(BindValue::Text(geojson))
        );

        let predicate = match geometry {
            QueryGeometry::Point { .. } | QueryGeometry::Circle { .. } => {
                let radius = match geometry {
                    QueryGeometry::Circle { radius, .. } => *radius,
                    _ => self.point_radius_m,
                };
                format!(
                    "ST_DWithin({}::geography, {}::geography, {})",
                    column,
                    shape,
                    binds.push(BindValue::Float(radius))
                )
            }
            QueryGeometry::Polygon { .. } | QueryGeometry::BBox { .. } => {
                if table.geometry_kind() == ColumnKind::Polygon {
                    format!("ST_Intersects({}, {})", column, shape)
                } else {
                    format!("ST_Within({}, {})", column, shape)
                }
            }
        };
        Ok(predicate)
    }
}

fn project(table: &TableSchema, fields: Option<&[String]>) -> Result<Vec<OutputColumn>, ActionError> {
    match fields {
        Some(fields) if !fields.is_empty() => fields
            .iter()
            .map(|field| {
                table
                    .column(field)
                    .map(|c| OutputColumn {
                        name: c.name.to_string(),
                        kind: c.kind,
                    })
                    .ok_or_else(|| not_whitelisted(table, field))
            })
            .collect(),
        _ => Ok(table
            .columns
            .iter()
            .map(|c| OutputColumn {
                name: c.name.to_string(),
                kind: c.kind,
            })
            .collect()),
    }
}

fn order(table: &TableSchema, description: &SpatialQueryDescription) -> Result<Vec<String>, ActionError> {
    if description.order_by.is_empty() {
        if description.kind == QueryKind::Trajectory {
            return Ok(vec![format!(
                "{} {}",
                table.timestamp_column,
                SortDirection::Asc.as_sql()
            )]);
        }
        return Ok(Vec::new());
    }

    description
        .order_by
        .iter()
        .map(|entry| {
            let column = table
                .column(&entry.column)
                .ok_or_else(|| not_whitelisted(table, &entry.column))?;
            if column.kind.is_geometry() {
                return Err(ActionError::InvalidParameter(format!(
                    "cannot order by geometry column '{}'",
                    column.name
                )));
            }
            Ok(format!("{} {}", column.name, entry.direction.as_sql()))
        })
        .collect()
}

fn not_whitelisted(table: &TableSchema, column: &str) -> ActionError {
    ActionError::UnsafeQuery(UnsafeReason::ColumnNotWhitelisted {
        table: table.name.to_string(),
        column: column.to_string(),
    })
}
