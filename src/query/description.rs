//! Structured spatial query descriptions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ActionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Point,
    Polygon,
    Circle,
    Bbox,
    Trajectory,
}

/// Inclusive time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Search area in `[longitude, latitude]` positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueryGeometry {
    Point {
        coordinates: [f64; 2],
    },
    /// Outer ring first, holes after
    Polygon {
        coordinates: Vec<Vec<[f64; 2]>>,
    },
    Circle {
        center: [f64; 2],
        /// Meters
        radius: f64,
    },
    /// `[min_lon, min_lat, max_lon, max_lat]`
    #[serde(rename = "BBox")]
    BBox {
        bbox: [f64; 4],
    },
}

fn check_position(position: &[f64; 2], what: &str) -> Result<(), ActionError> {
    let [lon, lat] = *position;
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(ActionError::InvalidGeometry(format!(
            "{} longitude {} is outside [-180, 180]",
            what, lon
        )));
    }
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(ActionError::InvalidGeometry(format!(
            "{} latitude {} is outside [-90, 90]",
            what, lat
        )));
    }
    Ok(())
}

fn check_ring(index: usize, ring: &[[f64; 2]]) -> Result<(), ActionError> {
    for position in ring {
        check_position(position, "polygon")?;
    }
    if ring.len() < 4 {
        return Err(ActionError::InvalidGeometry(format!(
            "polygon ring {} needs at least 4 positions, got {}",
            index,
            ring.len()
        )));
    }
    if ring.first() != ring.last() {
        return Err(ActionError::InvalidGeometry(format!(
            "polygon ring {} is not closed",
            index
        )));
    }

    let open = &ring[..ring.len() - 1];
    let distinct = open
        .iter()
        .enumerate()
        .filter(|&(i, p)| !open[..i].contains(p))
        .count();
    if distinct < 3 {
        return Err(ActionError::InvalidGeometry(format!(
            "polygon ring {} has only {} distinct vertices",
            index, distinct
        )));
    }
    Ok(())
}

impl QueryGeometry {
    /// Check coordinate ranges and shape constraints
    pub fn validate(&self) -> Result<(), ActionError> {
        match self {
            QueryGeometry::Point { coordinates } => check_position(coordinates, "point"),
            QueryGeometry::Polygon { coordinates } => {
                if coordinates.is_empty() {
                    return Err(ActionError::InvalidGeometry(
                        "polygon has no rings".to_string(),
                    ));
                }
                for (i, ring) in coordinates.iter().enumerate() {
                    check_ring(i, ring)?;
                }
                Ok(())
            }
            QueryGeometry::Circle { center, radius } => {
                check_position(center, "circle center")?;
                if !radius.is_finite() || *radius <= 0.0 {
                    return Err(ActionError::InvalidGeometry(format!(
                        "circle radius must be positive, got {}",
                        radius
                    )));
                }
                Ok(())
            }
            QueryGeometry::BBox { bbox } => {
                let [min_lon, min_lat, max_lon, max_lat] = *bbox;
                check_position(&[min_lon, min_lat], "bbox min")?;
                check_position(&[max_lon, max_lat], "bbox max")?;
                if min_lon >= max_lon || min_lat >= max_lat {
                    return Err(ActionError::InvalidGeometry(format!(
                        "bbox min ({}, {}) must be below max ({}, {})",
                        min_lon, min_lat, max_lon, max_lat
                    )));
                }
                Ok(())
            }
        }
    }

    /// Whether this shape may be used with the given query kind
    pub fn fits(&self, kind: QueryKind) -> bool {
        matches!(
            (kind, self),
            (QueryKind::Trajectory, _)
                | (QueryKind::Point, QueryGeometry::Point { .. })
                | (QueryKind::Polygon, QueryGeometry::Polygon { .. })
                | (QueryKind::Circle, QueryGeometry::Circle { .. })
                | (QueryKind::Bbox, QueryGeometry::BBox { .. })
        )
    }

    /// GeoJSON geometry handed to `ST_GeomFromGeoJSON`
    ///
    /// Circles serialize as their center point; the radius is bound separately.
    pub fn to_geojson(&self) -> Value {
        match self {
            QueryGeometry::Point { coordinates } => {
                json!({ "type": "Point", "coordinates": coordinates })
            }
            QueryGeometry::Polygon { coordinates } => {
                json!({ "type": "Polygon", "coordinates": coordinates })
            }
            QueryGeometry::Circle { center, .. } => {
                json!({ "type": "Point", "coordinates": center })
            }
            QueryGeometry::BBox { bbox } => {
                let [w, s, e, n] = *bbox;
                json!({
                    "type": "Polygon",
                    "coordinates": [[[w, s], [e, s], [e, n], [w, n], [w, s]]],
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// What an agent asks of the spatial store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialQueryDescription {
    #[serde(rename = "type")]
    pub kind: QueryKind,
    pub table: String,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub geometry: Option<QueryGeometry>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl SpatialQueryDescription {
    pub fn new(kind: QueryKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            time_range: None,
            geometry: None,
            entity_id: None,
            fields: None,
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn with_time_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.time_range = Some(TimeRange { start, end });
        self
    }

    pub fn with_geometry(mut self, geometry: QueryGeometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}
