//! Geofence containment and event derivation

use crate::geometry::{distance, elapsed_seconds};
use crate::{FenceGeometry, GeoFence, GeoFenceEvent, GeoFenceEventKind, GeoPoint, TrajectoryPoint};

impl GeoFence {
    /// Check whether a point lies inside the fence
    ///
    /// Points exactly on a polygon edge may fall either way.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        match &self.geometry {
            FenceGeometry::Polygon { ring } => ring_contains(ring, point),
            FenceGeometry::Circle { center, radius_m } => distance(center, point) <= *radius_m,
        }
    }
}

/// Ray casting on a planar lon/lat ring
fn ring_contains(ring: &[GeoPoint], point: &GeoPoint) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let (x, y) = (point.longitude, point.latitude);
    let mut inside = false;
    let mut j = ring.len() - 1;

    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].longitude, ring[i].latitude);
        let (xj, yj) = (ring[j].longitude, ring[j].latitude);

        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Walk a trajectory and derive enter/exit/dwell events for one fence
///
/// A single dwell event is emitted per visit, at the first point where the
/// time inside reaches `dwell_threshold_s`. Inactive fences yield nothing.
pub fn fence_events(
    fence: &GeoFence,
    entity_id: &str,
    points: &[TrajectoryPoint],
    dwell_threshold_s: f64,
) -> Vec<GeoFenceEvent> {
    let mut events = Vec::new();
    if !fence.active {
        return events;
    }

    // (index of entry point, dwell already reported)
    let mut visit: Option<(usize, bool)> = None;

    for (i, point) in points.iter().enumerate() {
        let inside = fence.contains(&point.location);
        let event = |kind, dwell_seconds| GeoFenceEvent {
            fence_id: fence.id.clone(),
            entity_id: entity_id.to_string(),
            kind,
            location: point.location,
            timestamp: point.timestamp,
            dwell_seconds,
        };

        match (inside, visit) {
            (true, None) => {
                events.push(event(GeoFenceEventKind::Enter, None));
                visit = Some((i, false));
                if dwell_threshold_s <= 0.0 {
                    events.push(event(GeoFenceEventKind::Dwell, Some(0.0)));
                    visit = Some((i, true));
                }
            }
            (true, Some((entered, false))) => {
                let dwell = elapsed_seconds(points[entered].timestamp, point.timestamp);
                if dwell >= dwell_threshold_s {
                    events.push(event(GeoFenceEventKind::Dwell, Some(dwell)));
                    visit = Some((entered, true));
                }
            }
            (false, Some((entered, _))) => {
                let dwell = elapsed_seconds(points[entered].timestamp, point.timestamp);
                events.push(event(GeoFenceEventKind::Exit, Some(dwell)));
                visit = None;
            }
            _ => {}
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn square_fence() -> GeoFence {
        let ring = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(1.0, 0.0),
            GeoPoint::new(1.0, 1.0),
            GeoPoint::new(0.0, 1.0),
            GeoPoint::new(0.0, 0.0),
        ];
        GeoFence {
            id: "fence-1".into(),
            name: "test square".into(),
            geometry: FenceGeometry::Polygon { ring },
            active: true,
            created_at: at(0),
            updated_at: at(0),
        }
    }

    #[test]
    fn test_polygon_contains() {
        let fence = square_fence();
        assert!(fence.contains(&GeoPoint::new(0.5, 0.5)));
        assert!(!fence.contains(&GeoPoint::new(1.5, 0.5)));
        assert!(!fence.contains(&GeoPoint::new(0.5, -0.1)));
    }

    #[test]
    fn test_circle_contains() {
        let fence = GeoFence {
            geometry: FenceGeometry::Circle {
                center: GeoPoint::new(116.39, 39.91),
                radius_m: 500.0,
            },
            ..square_fence()
        };
        assert!(fence.contains(&GeoPoint::new(116.39, 39.912)));
        assert!(!fence.contains(&GeoPoint::new(116.39, 39.92)));
    }

    #[test]
    fn test_enter_dwell_exit() {
        let fence = square_fence();
        let points = vec![
            TrajectoryPoint::new(GeoPoint::new(-0.5, 0.5), at(0)),
            TrajectoryPoint::new(GeoPoint::new(0.2, 0.5), at(10)),
            TrajectoryPoint::new(GeoPoint::new(0.4, 0.5), at(50)),
            TrajectoryPoint::new(GeoPoint::new(0.6, 0.5), at(100)),
            TrajectoryPoint::new(GeoPoint::new(1.6, 0.5), at(110)),
        ];

        let events = fence_events(&fence, "drone-1", &points, 60.0);
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                GeoFenceEventKind::Enter,
                GeoFenceEventKind::Dwell,
                GeoFenceEventKind::Exit
            ]
        );
        assert_eq!(events[1].dwell_seconds, Some(90.0));
        assert_eq!(events[2].dwell_seconds, Some(100.0));
        assert_eq!(events[0].timestamp, at(10));
    }

    #[test]
    fn test_short_visit_has_no_dwell() {
        let fence = square_fence();
        let points = vec![
            TrajectoryPoint::new(GeoPoint::new(0.5, 0.5), at(0)),
            TrajectoryPoint::new(GeoPoint::new(2.0, 0.5), at(30)),
        ];

        let events = fence_events(&fence, "robot-2", &points, 60.0);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, GeoFenceEventKind::Enter);
        assert_eq!(events[1].kind, GeoFenceEventKind::Exit);
    }

    #[test]
    fn test_inactive_fence_is_silent() {
        let fence = GeoFence {
            active: false,
            ..square_fence()
        };
        let points = vec![TrajectoryPoint::new(GeoPoint::new(0.5, 0.5), at(0))];
        assert!(fence_events(&fence, "x", &points, 0.0).is_empty());
    }
}
