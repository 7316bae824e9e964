//! Trajectory geometry and kinematics
//!
//! Pure functions over ordered location samples. Nothing here allocates more
//! than its output or touches I/O.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{limits, GeoPoint, TrajectoryPoint};

/// Great-circle distance in meters (haversine)
pub fn distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    // Absolute deltas keep the result bit-for-bit symmetric
    let delta_lat = (b.latitude - a.latitude).abs().to_radians();
    let delta_lon = (b.longitude - a.longitude).abs().to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();

    limits::EARTH_RADIUS_M * c
}

/// Sum of segment distances, 0 for fewer than two points
pub fn path_length(points: &[TrajectoryPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| distance(&pair[0].location, &pair[1].location))
        .sum()
}

/// Seconds between two timestamps, millisecond resolution
pub fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// Path length over elapsed time in m/s
///
/// Saturates to 0 when there are fewer than two points or no time has passed.
pub fn average_speed(points: &[TrajectoryPoint]) -> f64 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return 0.0;
    };
    if points.len() < 2 {
        return 0.0;
    }
    let elapsed = elapsed_seconds(first.timestamp, last.timestamp);
    if elapsed <= 0.0 {
        return 0.0;
    }
    path_length(points) / elapsed
}

/// Highest recorded speed, if any point carries one
pub fn max_speed(points: &[TrajectoryPoint]) -> Option<f64> {
    points
        .iter()
        .filter_map(|p| p.speed)
        .fold(None, |max, s| Some(max.map_or(s, |m: f64| m.max(s))))
}

/// A sustained interval at or below the stop speed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopInterval {
    pub start_index: usize,
    pub end_index: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_s: f64,
    pub location: GeoPoint,
}

/// Find maximal runs of stopped points lasting at least `min_duration_s`
///
/// A point is stopped when its speed (absent counts as 0) is at most
/// `speed_threshold`. A run still open at the end of the input is closed at
/// the last point and reported if long enough.
pub fn stop_intervals(
    points: &[TrajectoryPoint],
    speed_threshold: f64,
    min_duration_s: f64,
) -> Vec<StopInterval> {
    let mut stops = Vec::new();
    let mut run_start: Option<usize> = None;

    let close_run = |start: usize, end: usize, stops: &mut Vec<StopInterval>| {
        let duration_s = elapsed_seconds(points[start].timestamp, points[end].timestamp);
        if duration_s >= min_duration_s {
            stops.push(StopInterval {
                start_index: start,
                end_index: end,
                start_time: points[start].timestamp,
                end_time: points[end].timestamp,
                duration_s,
                location: points[start].location,
            });
        }
    };

    for (i, point) in points.iter().enumerate() {
        let stopped = point.speed.unwrap_or(0.0) <= speed_threshold;
        match (stopped, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                close_run(start, i - 1, &mut stops);
                run_start = None;
            }
            _ => {}
        }
    }

    if let Some(start) = run_start {
        close_run(start, points.len() - 1, &mut stops);
    }

    stops
}

/// Start indices of stop intervals
pub fn detect_stops(
    points: &[TrajectoryPoint],
    speed_threshold: f64,
    min_duration_s: f64,
) -> Vec<usize> {
    stop_intervals(points, speed_threshold, min_duration_s)
        .into_iter()
        .map(|stop| stop.start_index)
        .collect()
}

/// Summary statistics for one trajectory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryStats {
    pub point_count: usize,
    pub distance_m: f64,
    pub duration_s: f64,
    pub average_speed_mps: f64,
    pub max_speed_mps: Option<f64>,
    pub stops: Vec<StopInterval>,
}

pub fn summarize(
    points: &[TrajectoryPoint],
    speed_threshold: f64,
    min_duration_s: f64,
) -> TrajectoryStats {
    let duration_s = match (points.first(), points.last()) {
        (Some(first), Some(last)) => elapsed_seconds(first.timestamp, last.timestamp).max(0.0),
        _ => 0.0,
    };

    TrajectoryStats {
        point_count: points.len(),
        distance_m: path_length(points),
        duration_s,
        average_speed_mps: average_speed(points),
        max_speed_mps: max_speed(points),
        stops: stop_intervals(points, speed_threshold, min_duration_s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn sample(secs: i64, speed: Option<f64>) -> TrajectoryPoint {
        TrajectoryPoint {
            location: GeoPoint::new(116.39, 39.91),
            timestamp: at(secs),
            speed,
            heading: None,
            accuracy: None,
        }
    }

    #[test]
    fn test_distance_symmetric_and_zero() {
        let pairs = [
            (GeoPoint::new(116.3975, 39.9087), GeoPoint::new(121.4737, 31.2304)),
            (GeoPoint::new(-0.1278, 51.5074), GeoPoint::new(2.3522, 48.8566)),
            (GeoPoint::new(179.9, -10.0), GeoPoint::new(-179.9, 10.0)),
            (GeoPoint::new(0.0, 0.0), GeoPoint::new(180.0, 0.0)),
        ];
        for (a, b) in pairs {
            assert_eq!(distance(&a, &b), distance(&b, &a));
            assert_eq!(distance(&a, &a), 0.0);
        }
    }

    #[test]
    fn test_distance_known_values() {
        // One degree of latitude is about 111.195 km on this sphere
        let d = distance(&GeoPoint::new(0.0, 0.0), &GeoPoint::new(0.0, 1.0));
        assert!((d - 111_194.93).abs() < 1.0, "got {d}");

        let half = std::f64::consts::PI * limits::EARTH_RADIUS_M;
        let antipodal = distance(&GeoPoint::new(0.0, 0.0), &GeoPoint::new(180.0, 0.0));
        assert!((antipodal - half).abs() < 1e-6);
    }

    #[test]
    fn test_path_length_equally_spaced() {
        // The equator is a great circle, so these points are collinear
        let points: Vec<_> = (0..6)
            .map(|i| TrajectoryPoint::new(GeoPoint::new(i as f64 * 0.01, 0.0), at(i)))
            .collect();
        let segment = distance(&points[0].location, &points[1].location);

        let total = path_length(&points);
        assert!((total - 5.0 * segment).abs() < 1e-6);
    }

    #[test]
    fn test_path_length_degenerate() {
        assert_eq!(path_length(&[]), 0.0);
        assert_eq!(path_length(&[sample(0, None)]), 0.0);
    }

    #[test]
    fn test_average_speed_saturates() {
        assert_eq!(average_speed(&[]), 0.0);
        assert_eq!(average_speed(&[sample(0, None)]), 0.0);

        let same_time = [
            TrajectoryPoint::new(GeoPoint::new(0.0, 0.0), at(5)),
            TrajectoryPoint::new(GeoPoint::new(0.0, 0.01), at(5)),
        ];
        assert_eq!(average_speed(&same_time), 0.0);
    }

    #[test]
    fn test_average_speed() {
        let points = [
            TrajectoryPoint::new(GeoPoint::new(0.0, 0.0), at(0)),
            TrajectoryPoint::new(GeoPoint::new(0.0, 1.0), at(10_000)),
        ];
        let speed = average_speed(&points);
        assert!((speed - 11.119493).abs() < 1e-3, "got {speed}");
    }

    #[test]
    fn test_detect_stops_sixty_seconds() {
        let mut points = vec![sample(0, Some(5.0))];
        for t in (10..=70).step_by(10) {
            points.push(sample(t, Some(0.3)));
        }
        points.push(sample(80, Some(4.0)));

        // Run spans 10..=70, exactly 60 s
        assert_eq!(detect_stops(&points, 0.5, 60.0), vec![1]);
    }

    #[test]
    fn test_detect_stops_fifty_nine_seconds() {
        let points = vec![
            sample(0, Some(5.0)),
            sample(1, Some(0.5)),
            sample(30, Some(0.1)),
            sample(60, Some(0.0)),
            sample(61, Some(3.0)),
        ];
        assert!(detect_stops(&points, 0.5, 60.0).is_empty());
    }

    #[test]
    fn test_missing_speed_counts_as_stopped() {
        let points = vec![
            sample(0, Some(2.0)),
            sample(10, None),
            sample(100, None),
            sample(110, Some(2.0)),
        ];
        assert_eq!(detect_stops(&points, 0.5, 60.0), vec![1]);
    }

    #[test]
    fn test_trailing_open_run_is_included() {
        let points = vec![
            sample(0, Some(6.0)),
            sample(10, Some(0.2)),
            sample(40, Some(0.2)),
            sample(75, Some(0.0)),
        ];
        let stops = stop_intervals(&points, 0.5, 60.0);
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].start_index, 1);
        assert_eq!(stops[0].end_index, 3);
        assert_eq!(stops[0].duration_s, 65.0);
    }

    #[test]
    fn test_multiple_stops() {
        let points = vec![
            sample(0, Some(0.0)),
            sample(120, Some(0.0)),
            sample(130, Some(8.0)),
            sample(140, Some(0.1)),
            sample(150, Some(0.1)),
            sample(160, Some(9.0)),
            sample(170, Some(0.0)),
            sample(300, Some(0.0)),
        ];
        assert_eq!(detect_stops(&points, 0.5, 60.0), vec![0, 6]);
    }

    #[test]
    fn test_summarize() {
        let points = vec![
            TrajectoryPoint::new(GeoPoint::new(0.0, 0.0), at(0)).with_speed(10.0),
            TrajectoryPoint::new(GeoPoint::new(0.0, 0.001), at(10)).with_speed(12.5),
            TrajectoryPoint::new(GeoPoint::new(0.0, 0.002), at(20)).with_speed(0.0),
        ];
        let stats = summarize(&points, 0.5, 60.0);
        assert_eq!(stats.point_count, 3);
        assert_eq!(stats.duration_s, 20.0);
        assert_eq!(stats.max_speed_mps, Some(12.5));
        assert!(stats.stops.is_empty());
        assert!((stats.distance_m - path_length(&points)).abs() < 1e-9);
    }
}
