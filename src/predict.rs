use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::dataset::{COL_KATEGORI, COL_PENYAKIT, COL_TINDAKAN};
use crate::error::ApiError;
use crate::hospitals::LatLon;
use crate::ranking::{GeomMethod, RankedHospital, directions_url, rank_hospitals, round_to};

const DEFAULT_BUDGET: i64 = 5_000_000;
const DEFAULT_LAT: f64 = -6.2;
const DEFAULT_LON: f64 = 106.8;
const DEFAULT_RADIUS_KM: f64 = 10.0;
const MIN_RADIUS_KM: f64 = 1.0;

fn default_budget() -> i64 {
    DEFAULT_BUDGET
}
fn default_lat() -> f64 {
    DEFAULT_LAT
}
fn default_lon() -> f64 {
    DEFAULT_LON
}
fn default_radius_km() -> f64 {
    DEFAULT_RADIUS_KM
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PredictRequest {
    /// Disease name exactly as it appears in the cost table.
    #[serde(alias = "disease_name")]
    pub penyakit: String,
    /// User budget in Rupiah.
    #[serde(default = "default_budget")]
    pub budget: i64,
    #[serde(default = "default_lat")]
    pub lat: f64,
    #[serde(default = "default_lon")]
    pub lon: f64,
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
    #[serde(default)]
    pub geom_method: GeomMethod,
}

impl PredictRequest {
    pub fn example(penyakit: &str) -> Self {
        Self {
            penyakit: penyakit.to_string(),
            budget: DEFAULT_BUDGET,
            lat: DEFAULT_LAT,
            lon: DEFAULT_LON,
            radius_km: DEFAULT_RADIUS_KM,
            geom_method: GeomMethod::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if !self.radius_km.is_finite() || self.radius_km < MIN_RADIUS_KM {
            return Err(ApiError::InvalidRequest(format!(
                "radius_km must be a finite number >= {MIN_RADIUS_KM}, got {}",
                self.radius_km
            )));
        }
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lon) {
            return Err(ApiError::InvalidRequest(format!(
                "lat/lon out of range: ({}, {})",
                self.lat, self.lon
            )));
        }
        Ok(())
    }

    fn user(&self) -> LatLon {
        LatLon {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalOut {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub distance_km: f64,
    pub google_maps_directions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub penyakit: String,
    pub predicted_cost: f64,
    pub budget: i64,
    pub budget_ok: bool,
    pub radius_km: f64,
    pub hospitals_in_radius: Vec<HospitalOut>,
    pub count_in_radius: usize,
    pub nearest_hospital: HospitalOut,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataResponse {
    pub penyakit_list: Vec<String>,
    pub kategori_list: Vec<String>,
    pub tindakan_list: Vec<String>,
    pub example_request: PredictRequest,
}

pub fn metadata(ctx: &AppContext) -> MetadataResponse {
    MetadataResponse {
        penyakit_list: ctx.costs.distinct(COL_PENYAKIT),
        kategori_list: ctx.costs.distinct(COL_KATEGORI),
        tindakan_list: ctx.costs.distinct(COL_TINDAKAN),
        example_request: PredictRequest::example(&ctx.costs.first().penyakit),
    }
}

pub fn predict_nearby(ctx: &AppContext, req: &PredictRequest) -> Result<PredictResponse, ApiError> {
    req.validate()?;

    let record = ctx
        .costs
        .find_disease(&req.penyakit)
        .ok_or_else(|| ApiError::UnknownDisease(req.penyakit.clone()))?;

    let predicted_cost = ctx.model.predict(record)?;
    let budget_ok = predicted_cost <= req.budget as f64;

    let user = req.user();
    let ranking = rank_hospitals(
        &ctx.hospitals.hospitals,
        user,
        req.radius_km,
        req.geom_method,
    );
    let note = (!ranking.within_radius).then(|| {
        format!(
            "Tidak ada RS dalam radius {:?} km. Mengembalikan RS terdekat secara global.",
            req.radius_km
        )
    });

    let hospitals_out: Vec<HospitalOut> = ranking
        .hospitals
        .iter()
        .map(|h| hospital_out(user, h))
        .collect();
    // HospitalTable::from_geojson refuses an empty hospital set.
    let nearest_hospital = hospitals_out
        .first()
        .cloned()
        .ok_or(ApiError::NotReady)?;
    let count_in_radius = if ranking.within_radius {
        hospitals_out.len()
    } else {
        0
    };

    tracing::debug!(
        penyakit = %req.penyakit,
        predicted_cost,
        returned = hospitals_out.len(),
        within_radius = ranking.within_radius,
        "predict-nearby"
    );

    Ok(PredictResponse {
        penyakit: req.penyakit.clone(),
        predicted_cost: round_to(predicted_cost, 2),
        budget: req.budget,
        budget_ok,
        radius_km: req.radius_km,
        hospitals_in_radius: hospitals_out,
        count_in_radius,
        nearest_hospital,
        note,
    })
}

fn hospital_out(user: LatLon, ranked: &RankedHospital<'_>) -> HospitalOut {
    HospitalOut {
        name: ranked.hospital.name.clone(),
        lat: ranked.point.lat,
        lon: ranked.point.lon,
        distance_km: round_to(ranked.distance_km, 4),
        google_maps_directions: directions_url(user, ranked.point),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{fixture_context, test_params, write_fixture};

    fn request(penyakit: &str) -> PredictRequest {
        PredictRequest::example(penyakit)
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let req: PredictRequest = serde_json::from_str(r#"{"penyakit":"Tifus"}"#).unwrap();
        assert_eq!(req.budget, 5_000_000);
        assert_eq!(req.lat, -6.2);
        assert_eq!(req.lon, 106.8);
        assert_eq!(req.radius_km, 10.0);
        assert_eq!(req.geom_method, GeomMethod::RepresentativePoint);

        let req: PredictRequest =
            serde_json::from_str(r#"{"disease_name":"Tifus","geom_method":"Centroid"}"#).unwrap();
        assert_eq!(req.penyakit, "Tifus");
        assert_eq!(req.geom_method, GeomMethod::Centroid);
    }

    #[test]
    fn small_radius_is_rejected() {
        let mut req = request("Tifus");
        req.radius_km = 0.5;
        assert!(matches!(req.validate(), Err(ApiError::InvalidRequest(_))));
        req.radius_km = f64::NAN;
        assert!(matches!(req.validate(), Err(ApiError::InvalidRequest(_))));
        req.radius_km = 1.0;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn budget_flag_matches_prediction() {
        let ctx = fixture_context();
        for record in ctx.costs.records() {
            for budget in [0, 6_000_000, 1_000_000_000] {
                let mut req = request(&record.penyakit);
                req.budget = budget;
                let resp = predict_nearby(&ctx, &req).unwrap();
                assert!(resp.predicted_cost >= 0.0);
                let raw = ctx.model.predict(record).unwrap();
                assert_eq!(resp.budget_ok, raw <= budget as f64);
            }
        }
    }

    #[test]
    fn unknown_disease_names_it() {
        let ctx = fixture_context();
        let err = predict_nearby(&ctx, &request("Flu Burung")).unwrap_err();
        assert!(matches!(err, ApiError::UnknownDisease(_)));
        assert!(err.to_string().contains("Flu Burung"));
    }

    #[test]
    fn hospitals_inside_radius_are_sorted() {
        let ctx = fixture_context();
        let mut req = request("Tifus");
        // Next to RSCM; Persahabatan is ~4.3 km east, Fatmawati ~12 km south.
        req.lat = -6.195;
        req.lon = 106.847;
        req.radius_km = 5.0;
        let resp = predict_nearby(&ctx, &req).unwrap();
        assert!(resp.note.is_none());
        assert_eq!(resp.count_in_radius, 2);
        assert_eq!(resp.hospitals_in_radius.len(), 2);
        assert_eq!(
            resp.nearest_hospital.name,
            "Rumah Sakit Cipto Mangunkusumo"
        );
        assert_eq!(resp.hospitals_in_radius[1].name, "Rumah Sakit Persahabatan");
        assert!(
            resp.hospitals_in_radius
                .windows(2)
                .all(|w| w[0].distance_km <= w[1].distance_km)
        );
        for h in &resp.hospitals_in_radius {
            assert!(h.distance_km >= 0.0);
            assert_eq!(round_to(h.distance_km, 4), h.distance_km);
            assert!(h.google_maps_directions.starts_with(
                "https://www.google.com/maps/dir/-6.195,106.847/"
            ));
        }
    }

    #[test]
    fn empty_radius_returns_global_nearest_with_note() {
        let ctx = fixture_context();
        let mut req = request("Caesar");
        // Bandung, well outside 10 km of any fixture hospital.
        req.lat = -6.9175;
        req.lon = 107.6191;
        let resp = predict_nearby(&ctx, &req).unwrap();
        assert_eq!(resp.count_in_radius, 0);
        assert_eq!(resp.hospitals_in_radius.len(), 3);
        assert_eq!(
            resp.note.as_deref(),
            Some("Tidak ada RS dalam radius 10.0 km. Mengembalikan RS terdekat secara global.")
        );
        assert_eq!(resp.nearest_hospital, resp.hospitals_in_radius[0]);
    }

    #[test]
    fn projected_hospitals_get_finite_distances() {
        const UTM_48S: &str = r#"{
  "type": "FeatureCollection",
  "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32748"}},
  "features": [
    {"type": "Feature", "properties": {"NAMOBJ": "Rumah Sakit A"},
     "geometry": {"type": "Point", "coordinates": [704000.0, 9315000.0]}},
    {"type": "Feature", "properties": {"NAMOBJ": "Rumah Sakit B"},
     "geometry": {"type": "Point", "coordinates": [690000.0, 9310000.0]}}
  ]
}"#;
        let dir = tempfile::tempdir().unwrap();
        let files = write_fixture(dir.path());
        std::fs::write(&files.hospitals, UTM_48S).unwrap();
        let ctx = AppContext::load(&files, &test_params()).unwrap();

        let resp = predict_nearby(&ctx, &request("Tifus")).unwrap();
        assert!(resp.count_in_radius >= 1);
        assert_eq!(resp.nearest_hospital.name, "Rumah Sakit A");
        for h in &resp.hospitals_in_radius {
            assert!(h.distance_km.is_finite() && h.distance_km >= 0.0);
            assert!((-7.0..-6.0).contains(&h.lat), "lat {}", h.lat);
            assert!((106.0..107.0).contains(&h.lon), "lon {}", h.lon);
        }
    }

    #[test]
    fn metadata_lists_are_sorted_and_distinct() {
        let ctx = fixture_context();
        let meta = metadata(&ctx);
        assert_eq!(meta.penyakit_list.len(), 8);
        assert_eq!(meta.kategori_list.len(), 5);
        assert!(meta.kategori_list.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(meta.tindakan_list.len(), 6);
        assert_eq!(meta.example_request.penyakit, "Demam Berdarah");
        assert_eq!(meta.example_request.geom_method, GeomMethod::RepresentativePoint);
    }
}
