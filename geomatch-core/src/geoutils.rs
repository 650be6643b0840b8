//! Utilidades geográficas para cálculos de distância entre municípios.

use crate::catalog::LatLon;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distância Haversine (círculo máximo) em quilômetros entre dois pontos.
pub fn haversine_distance_km(origin: &LatLon, destination: &LatLon) -> f64 {
    let phi1 = origin.lat.to_radians();
    let phi2 = destination.lat.to_radians();
    let delta_phi = (destination.lat - origin.lat).to_radians();
    let delta_lambda = (destination.lon - origin.lon).to_radians();

    let sin_delta_phi = (delta_phi / 2.0).sin();
    let sin_delta_lambda = (delta_lambda / 2.0).sin();

    let a = sin_delta_phi * sin_delta_phi
        + phi1.cos() * phi2.cos() * sin_delta_lambda * sin_delta_lambda;
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}
