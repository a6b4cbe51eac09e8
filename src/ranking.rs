use geo::{GeodesicDistance, Point};
use serde::{Deserialize, Serialize};

use crate::hospitals::{HospitalFeature, LatLon};

/// How many hospitals to return when nothing lies inside the radius.
pub const FALLBACK_LIMIT: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum GeomMethod {
    #[serde(rename = "Centroid")]
    Centroid,
    #[default]
    #[serde(rename = "Representative Point")]
    RepresentativePoint,
}

impl GeomMethod {
    pub fn select(self, hospital: &HospitalFeature) -> LatLon {
        match self {
            GeomMethod::Centroid => hospital.centroid,
            GeomMethod::RepresentativePoint => hospital.representative_point,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankedHospital<'a> {
    pub hospital: &'a HospitalFeature,
    pub point: LatLon,
    pub distance_km: f64,
}

#[derive(Debug, Clone)]
pub struct Ranking<'a> {
    /// Ascending by distance.
    pub hospitals: Vec<RankedHospital<'a>>,
    /// False when the radius matched nothing and `hospitals` holds the
    /// globally nearest instead.
    pub within_radius: bool,
}

/// Distance on the WGS84 ellipsoid, in kilometres.
pub fn geodesic_km(a: LatLon, b: LatLon) -> f64 {
    let pa = Point::new(a.lon, a.lat);
    let pb = Point::new(b.lon, b.lat);
    pa.geodesic_distance(&pb) / 1000.0
}

pub fn rank_hospitals(
    hospitals: &[HospitalFeature],
    user: LatLon,
    radius_km: f64,
    method: GeomMethod,
) -> Ranking<'_> {
    let mut all: Vec<RankedHospital<'_>> = hospitals
        .iter()
        .map(|hospital| {
            let point = method.select(hospital);
            RankedHospital {
                hospital,
                point,
                distance_km: geodesic_km(user, point),
            }
        })
        .collect();
    all.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

    let in_radius = all
        .iter()
        .take_while(|h| h.distance_km <= radius_km)
        .count();
    if in_radius > 0 {
        all.truncate(in_radius);
        Ranking {
            hospitals: all,
            within_radius: true,
        }
    } else {
        all.truncate(FALLBACK_LIMIT);
        Ranking {
            hospitals: all,
            within_radius: false,
        }
    }
}

pub fn directions_url(user: LatLon, dest: LatLon) -> String {
    format!(
        "https://www.google.com/maps/dir/{},{}/{},{}",
        user.lat, user.lon, dest.lat, dest.lon
    )
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
