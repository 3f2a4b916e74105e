/// Great-circle distance between two coordinates, in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_points_have_zero_distance() {
        assert_eq!(haversine_km(45.0, -122.0, 45.0, -122.0), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = haversine_km(40.7128, -74.0060, 34.0522, -118.2437);
        let b = haversine_km(34.0522, -118.2437, 40.7128, -74.0060);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn new_york_to_los_angeles_is_roughly_right() {
        let d = haversine_km(40.7128, -74.0060, 34.0522, -118.2437);
        assert!((3930.0..3970.0).contains(&d), "got {d}");
    }
}
