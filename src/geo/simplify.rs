//! Route geometry simplification and smoothing
//!
//! All functions are pure. Each one returns its input unchanged when the path
//! is too short for it to do anything, and none of them ever moves or drops
//! the first or last point.

use serde::{Deserialize, Serialize};

use super::{LatLon, METERS_PER_DEGREE};

/// Upper bound on tolerance doublings in `prepare_for_display`
const MAX_REDUCTION_ROUNDS: usize = 32;

/// Smallest tolerance used when escalating toward the point budget
const MIN_ESCALATION_TOLERANCE_M: f64 = 0.5;

/// Parameters of the display pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryOptions {
    /// Douglas–Peucker tolerance in meters
    pub tolerance_m: f64,
    /// Largest path handed to interpolation and smoothing
    pub max_points: usize,
    /// Segments are split into this many pieces before smoothing
    pub density: usize,
    /// Blend factor toward the neighbor midpoint, 0..=1
    pub smoothing: f64,
    /// Number of smoothing passes
    pub passes: usize,
}

impl Default for GeometryOptions {
    fn default() -> Self {
        Self {
            tolerance_m: 9.0,
            max_points: 200,
            density: 3,
            smoothing: 0.5,
            passes: 1,
        }
    }
}

/// Douglas–Peucker reduction with a tolerance in meters
///
/// A point survives only if its distance to the chord of the sub-path being
/// examined is strictly greater than `tolerance_m`. Sub-paths are processed
/// from an explicit work stack so long paths cannot exhaust the call stack.
pub fn reduce(path: &[LatLon], tolerance_m: f64) -> Vec<LatLon> {
    let n = path.len();
    if n < 3 {
        return path.to_vec();
    }
    let tolerance = if tolerance_m.is_nan() { 0.0 } else { tolerance_m.max(0.0) };

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut pending = vec![(0, n - 1)];
    while let Some((first, last)) = pending.pop() {
        if last <= first + 1 {
            continue;
        }

        let mut farthest = first;
        let mut max_distance = 0.0;
        for i in first + 1..last {
            let d = chord_distance_m(path[i], path[first], path[last]);
            if d > max_distance {
                max_distance = d;
                farthest = i;
            }
        }

        if max_distance > tolerance {
            keep[farthest] = true;
            pending.push((first, farthest));
            pending.push((farthest, last));
        }
    }

    path.iter()
        .zip(keep)
        .filter_map(|(p, kept)| kept.then_some(*p))
        .collect()
}

/// Distance in meters from `p` to the segment `a`–`b`
///
/// Uses an equirectangular projection centered on the segment.
fn chord_distance_m(p: LatLon, a: LatLon, b: LatLon) -> f64 {
    let cos = ((a.lat + b.lat) / 2.0).to_radians().cos();
    let project = |q: LatLon| {
        (
            (q.lon - a.lon) * cos * METERS_PER_DEGREE,
            (q.lat - a.lat) * METERS_PER_DEGREE,
        )
    };

    let (bx, by) = project(b);
    let (px, py) = project(p);
    let len_sq = bx * bx + by * by;
    if len_sq == 0.0 {
        return px.hypot(py);
    }

    let t = ((px * bx + py * by) / len_sq).clamp(0.0, 1.0);
    (px - t * bx).hypot(py - t * by)
}

/// Inserts `density - 1` evenly spaced points into every segment
pub fn interpolate(path: &[LatLon], density: usize) -> Vec<LatLon> {
    if path.len() < 2 || density <= 1 {
        return path.to_vec();
    }

    let mut out = Vec::with_capacity((path.len() - 1) * density + 1);
    for pair in path.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        out.push(a);
        for step in 1..density {
            let t = step as f64 / density as f64;
            out.push(LatLon {
                lat: a.lat + (b.lat - a.lat) * t,
                lon: a.lon + (b.lon - a.lon) * t,
            });
        }
    }
    if let Some(last) = path.last() {
        out.push(*last);
    }
    out
}

/// Blends every interior point toward the midpoint of its neighbors
///
/// `factor` is clamped to 0..=1; 0 leaves the path unchanged and 1 replaces
/// each interior point by its neighbor midpoint. Neighbors are read from the
/// input, not from already-smoothed points.
pub fn smooth(path: &[LatLon], factor: f64) -> Vec<LatLon> {
    if path.len() < 3 {
        return path.to_vec();
    }
    let f = if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) };

    let mut out = Vec::with_capacity(path.len());
    out.push(path[0]);
    for w in path.windows(3) {
        let (prev, cur, next) = (w[0], w[1], w[2]);
        let mid_lat = (prev.lat + next.lat) / 2.0;
        let mid_lon = (prev.lon + next.lon) / 2.0;
        out.push(LatLon {
            lat: (1.0 - f) * cur.lat + f * mid_lat,
            lon: (1.0 - f) * cur.lon + f * mid_lon,
        });
    }
    out.push(path[path.len() - 1]);
    out
}

/// Applies `smooth` `passes` times
pub fn smooth_passes(path: &[LatLon], factor: f64, passes: usize) -> Vec<LatLon> {
    let mut out = path.to_vec();
    for _ in 0..passes {
        out = smooth(&out, factor);
    }
    out
}

/// Reduce, then interpolate, then smooth
///
/// Reduction always runs first. When the reduced path is still larger than
/// `max_points` the tolerance is doubled until it fits, so interpolation and
/// smoothing never see an oversized path.
pub fn prepare_for_display(path: &[LatLon], opts: &GeometryOptions) -> Vec<LatLon> {
    let budget = opts.max_points.max(2);
    let mut tolerance = opts.tolerance_m;
    let mut reduced = reduce(path, tolerance);

    let mut rounds = 0;
    while reduced.len() > budget && rounds < MAX_REDUCTION_ROUNDS {
        tolerance = (tolerance * 2.0).max(MIN_ESCALATION_TOLERANCE_M);
        reduced = reduce(path, tolerance);
        rounds += 1;
    }
    if rounds > 0 {
        tracing::debug!(
            input = path.len(),
            output = reduced.len(),
            tolerance_m = tolerance,
            "Escalated reduction tolerance to fit point budget"
        );
    }

    let dense = interpolate(&reduced, opts.density);
    smooth_passes(&dense, opts.smoothing, opts.passes)
}
