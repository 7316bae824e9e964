//! Static table and column whitelist
//!
//! The only identifiers that ever appear in generated SQL come from here.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
    Json,
    Point,
    Polygon,
}

impl ColumnKind {
    pub fn is_geometry(&self) -> bool {
        matches!(self, ColumnKind::Point | ColumnKind::Polygon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
    Column { name, kind }
}

#[derive(Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub timestamp_column: &'static str,
    pub geometry_column: &'static str,
    /// Column identifying the tracked entity, if the table has one
    pub entity_column: Option<&'static str>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn geometry_kind(&self) -> ColumnKind {
        self.column(self.geometry_column)
            .map(|c| c.kind)
            .unwrap_or(ColumnKind::Point)
    }
}

use ColumnKind::*;

pub static TABLES: &[TableSchema] = &[
    TableSchema {
        name: "drone_trajectory",
        columns: &[
            col("id", Integer),
            col("drone_id", Text),
            col("location", Point),
            col("altitude", Float),
            col("speed", Float),
            col("heading", Float),
            col("timestamp", Timestamp),
            col("metadata", Json),
        ],
        timestamp_column: "timestamp",
        geometry_column: "location",
        entity_column: Some("drone_id"),
    },
    TableSchema {
        name: "device_status",
        columns: &[
            col("id", Integer),
            col("device_id", Text),
            col("device_type", Text),
            col("status", Text),
            col("location", Point),
            col("battery_level", Float),
            col("last_seen", Timestamp),
            col("properties", Json),
        ],
        timestamp_column: "last_seen",
        geometry_column: "location",
        entity_column: Some("device_id"),
    },
    TableSchema {
        name: "mission_log",
        columns: &[
            col("id", Integer),
            col("mission_id", Text),
            col("device_id", Text),
            col("action", Text),
            col("status", Text),
            col("start_location", Point),
            col("end_location", Point),
            col("started_at", Timestamp),
            col("completed_at", Timestamp),
            col("error_message", Text),
            col("metadata", Json),
        ],
        timestamp_column: "started_at",
        geometry_column: "start_location",
        entity_column: Some("device_id"),
    },
    TableSchema {
        name: "geo_fence",
        columns: &[
            col("id", Integer),
            col("name", Text),
            col("description", Text),
            col("boundary", Polygon),
            col("fence_type", Text),
            col("is_active", Boolean),
            col("created_at", Timestamp),
            col("updated_at", Timestamp),
        ],
        timestamp_column: "created_at",
        geometry_column: "boundary",
        entity_column: None,
    },
    TableSchema {
        name: "telemetry_data",
        columns: &[
            col("id", Integer),
            col("device_id", Text),
            col("location", Point),
            col("battery", Float),
            col("speed", Float),
            col("heading", Float),
            col("payload", Json),
            col("recorded_at", Timestamp),
        ],
        timestamp_column: "recorded_at",
        geometry_column: "location",
        entity_column: Some("device_id"),
    },
    TableSchema {
        name: "spatial_index",
        columns: &[
            col("id", Integer),
            col("entity_id", Text),
            col("entity_type", Text),
            col("bounds", Polygon),
            col("updated_at", Timestamp),
        ],
        timestamp_column: "updated_at",
        geometry_column: "bounds",
        entity_column: Some("entity_id"),
    },
];

/// Look up a whitelisted table by exact name
pub fn table(name: &str) -> Option<&'static TableSchema> {
    TABLES.iter().find(|t| t.name == name)
}

pub fn table_names() -> impl Iterator<Item = &'static str> {
    TABLES.iter().map(|t| t.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_declares_its_special_columns() {
        for table in TABLES {
            let ts = table.column(table.timestamp_column);
            assert_eq!(ts.map(|c| c.kind), Some(ColumnKind::Timestamp), "{}", table.name);

            let geom = table.column(table.geometry_column);
            assert!(geom.map(|c| c.kind.is_geometry()).unwrap_or(false), "{}", table.name);

            if let Some(entity) = table.entity_column {
                assert!(table.column(entity).is_some(), "{}", table.name);
            }
        }
    }

    #[test]
    fn test_lookup_is_exact() {
        assert!(table("drone_trajectory").is_some());
        assert!(table("DRONE_TRAJECTORY").is_none());
        assert!(table("drone_trajectory; --").is_none());
        assert_eq!(table_names().count(), 6);
    }

    #[test]
    fn test_polygon_tables() {
        assert_eq!(table("geo_fence").unwrap().geometry_kind(), ColumnKind::Polygon);
        assert_eq!(table("drone_trajectory").unwrap().geometry_kind(), ColumnKind::Point);
    }
}
