//! Great-circle distance and per-series cumulative distance

use types::sample::Position;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Haversine distance between two positions, in kilometres.
pub fn great_circle_km(a: Position, b: Position) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.min(1.0).sqrt().asin()
}

/// Running distance along a series: `cum[0] = 0`, then the sum of
/// consecutive great-circle legs. Same length as `positions`.
pub fn cumulative_km(positions: &[Position]) -> Vec<f64> {
    let mut cum = Vec::with_capacity(positions.len());
    let mut total = 0.0;
    for (i, position) in positions.iter().enumerate() {
        if i > 0 {
            total += great_circle_km(positions[i - 1], *position);
        }
        cum.push(total);
    }
    cum
}
