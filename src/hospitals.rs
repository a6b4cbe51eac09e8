use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use geo::{Centroid, Coord, CoordsIter, Geometry, InteriorPoint, MapCoords, Point};
use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use serde::Serialize;

use crate::error::StartupError;

pub const NAME_ATTRIBUTE: &str = "NAMOBJ";
pub const KEYWORD_ATTRIBUTES: [&str; 3] = [NAME_ATTRIBUTE, "REMARK", "TIPSHT"];
pub const HOSPITAL_KEYWORD: &str = "Rumah Sakit";

const WEB_MERCATOR_EPSG: u16 = 3857;
const WGS84_PROJ: &str = "+proj=longlat +ellps=WGS84 +datum=WGS84 +no_defs";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn is_valid(&self) -> bool {
        in_bounds(self.lat, self.lon)
    }
}

impl From<Point<f64>> for LatLon {
    fn from(p: Point<f64>) -> Self {
        Self {
            lat: p.y(),
            lon: p.x(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HospitalFeature {
    pub name: String,
    pub centroid: LatLon,
    pub representative_point: LatLon,
}

/// What happened to the source coordinates on the way to WGS84.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrsHandling {
    /// No `crs` member; coordinates taken as WGS84.
    AssumedWgs84,
    Wgs84,
    Reprojected { from: String },
    /// Unrecognised CRS or failed reprojection; coordinates kept as they were.
    UsedAsIs { crs: String },
}

/// Hospitals kept after filtering, with their precomputed points.
#[derive(Debug, Clone)]
pub struct HospitalTable {
    pub hospitals: Vec<HospitalFeature>,
    pub crs: CrsHandling,
    pub total_features: usize,
    /// True when no feature mentioned the keyword and every feature was kept.
    pub keyword_fallback: bool,
    pub skipped_geometry: usize,
    /// Kept features whose points are not valid WGS84 lat/lon.
    pub out_of_range: usize,
}

#[derive(Debug, Clone)]
struct RawFeature {
    name: String,
    keyword_values: Vec<String>,
    geometry: Option<Geometry<f64>>,
}

impl RawFeature {
    fn mentions_hospital(&self) -> bool {
        let needle = HOSPITAL_KEYWORD.to_lowercase();
        self.keyword_values
            .iter()
            .any(|v| v.to_lowercase().contains(&needle))
    }
}

pub fn load_hospitals(path: &Path) -> anyhow::Result<HospitalTable> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let geojson: GeoJson = text
        .parse()
        .with_context(|| format!("parse GeoJSON {}", path.display()))?;
    let table = HospitalTable::from_geojson(geojson)
        .with_context(|| format!("prepare hospitals from {}", path.display()))?;
    Ok(table)
}

impl HospitalTable {
    pub fn from_geojson(geojson: GeoJson) -> Result<Self, StartupError> {
        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            GeoJson::Feature(f) => FeatureCollection {
                bbox: None,
                features: vec![f],
                foreign_members: None,
            },
            GeoJson::Geometry(_) => return Err(StartupError::NotAFeatureCollection),
        };

        let declared = declared_crs(collection.foreign_members.as_ref());
        let mut raw = raw_features(&collection)?;
        let total_features = raw.len();
        let crs = normalize_crs(&mut raw, declared);

        let (kept, keyword_fallback) = filter_hospitals(raw);
        if keyword_fallback {
            tracing::warn!(
                "no feature mentions '{}' in {:?}; using all {} features",
                HOSPITAL_KEYWORD,
                KEYWORD_ATTRIBUTES,
                total_features
            );
        }

        let mut hospitals = Vec::with_capacity(kept.len());
        let mut skipped_geometry = 0;
        let mut out_of_range = 0;
        for feature in kept {
            let Some((centroid, representative_point)) =
                feature.geometry.as_ref().and_then(representative_points)
            else {
                skipped_geometry += 1;
                tracing::warn!("skipping '{}': no usable geometry", feature.name);
                continue;
            };
            if !centroid.is_valid() || !representative_point.is_valid() {
                out_of_range += 1;
                tracing::warn!(
                    "skipping '{}': ({}, {}) is not a WGS84 lat/lon",
                    feature.name,
                    centroid.lat,
                    centroid.lon
                );
                continue;
            }
            hospitals.push(HospitalFeature {
                name: feature.name,
                centroid,
                representative_point,
            });
        }
        if hospitals.is_empty() {
            return Err(StartupError::NoUsableFeatures);
        }

        Ok(Self {
            hospitals,
            crs,
            total_features,
            keyword_fallback,
            skipped_geometry,
            out_of_range,
        })
    }
}

/// Keeps features naming a hospital in any keyword attribute. When none do,
/// the whole set is returned and the flag is set.
fn filter_hospitals(mut features: Vec<RawFeature>) -> (Vec<RawFeature>, bool) {
    if features.iter().any(RawFeature::mentions_hospital) {
        features.retain(RawFeature::mentions_hospital);
        (features, false)
    } else {
        (features, true)
    }
}

fn raw_features(collection: &FeatureCollection) -> Result<Vec<RawFeature>, StartupError> {
    let mut out = Vec::with_capacity(collection.features.len());
    let mut unnamed = 0;
    for feature in &collection.features {
        let props = feature.properties.as_ref();
        let Some(name) = props.and_then(|p| p.get(NAME_ATTRIBUTE)) else {
            unnamed += 1;
            continue;
        };
        let keyword_values = KEYWORD_ATTRIBUTES
            .iter()
            .filter_map(|attr| props.and_then(|p| p.get(*attr)).and_then(property_text))
            .collect();
        let geometry = feature
            .geometry
            .clone()
            .and_then(|g| Geometry::<f64>::try_from(g).ok());
        out.push(RawFeature {
            name: property_text(name).unwrap_or_default(),
            keyword_values,
            geometry,
        });
    }

    if unnamed > 0 {
        if out.is_empty() {
            let present: BTreeSet<String> = collection
                .features
                .iter()
                .filter_map(|f| f.properties.as_ref())
                .flat_map(|p| p.keys().cloned())
                .collect();
            return Err(StartupError::MissingNameAttribute {
                attribute: NAME_ATTRIBUTE,
                present: present.into_iter().collect(),
            });
        }
        return Err(StartupError::UnnamedFeatures {
            attribute: NAME_ATTRIBUTE,
            missing: unnamed,
            total: collection.features.len(),
        });
    }
    Ok(out)
}

fn property_text(v: &JsonValue) -> Option<String> {
    match v {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn representative_points(geometry: &Geometry<f64>) -> Option<(LatLon, LatLon)> {
    let centroid = geometry.centroid()?;
    let interior = geometry.interior_point()?;
    Some((centroid.into(), interior.into()))
}

#[derive(Debug, Clone, PartialEq)]
enum DeclaredCrs {
    Missing,
    Wgs84,
    Epsg(u16),
    Other(String),
}

/// Reads the legacy GeoJSON `crs` member (`{"type": "name", "properties":
/// {"name": "urn:ogc:def:crs:EPSG::32748"}}` or `{"type": "EPSG", ...}`).
fn declared_crs(foreign: Option<&JsonObject>) -> DeclaredCrs {
    let Some(crs) = foreign.and_then(|m| m.get("crs")) else {
        return DeclaredCrs::Missing;
    };
    let props = crs.get("properties");
    let name = props
        .and_then(|p| p.get("name"))
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .or_else(|| {
            props
                .and_then(|p| p.get("code"))
                .map(|c| match c.as_str() {
                    Some(code) => format!("EPSG:{code}"),
                    None => format!("EPSG:{c}"),
                })
        });
    let Some(name) = name else {
        return DeclaredCrs::Other(crs.to_string());
    };

    let upper = name.to_ascii_uppercase();
    let code = upper.rsplit(':').next().unwrap_or("").trim();
    match code {
        "4326" | "CRS84" => DeclaredCrs::Wgs84,
        // Legacy and ESRI aliases of Web Mercator.
        "3785" | "900913" | "102100" | "102113" => DeclaredCrs::Epsg(WEB_MERCATOR_EPSG),
        _ => match code.parse::<u16>() {
            Ok(epsg) => DeclaredCrs::Epsg(epsg),
            Err(_) => DeclaredCrs::Other(name),
        },
    }
}

fn normalize_crs(features: &mut [RawFeature], declared: DeclaredCrs) -> CrsHandling {
    match declared {
        DeclaredCrs::Missing => {
            tracing::info!("GeoJSON has no crs member; assuming WGS84");
            CrsHandling::AssumedWgs84
        }
        DeclaredCrs::Wgs84 => CrsHandling::Wgs84,
        DeclaredCrs::Epsg(code) => {
            let crs = format!("EPSG:{code}");
            match reproject_from_epsg(features, code) {
                Ok(()) => {
                    tracing::info!("reprojected {} features from {crs} to WGS84", features.len());
                    CrsHandling::Reprojected { from: crs }
                }
                Err(e) => {
                    tracing::warn!("reprojection from {crs} failed ({e}); using coordinates as-is");
                    CrsHandling::UsedAsIs { crs }
                }
            }
        }
        DeclaredCrs::Other(crs) => {
            tracing::warn!("unrecognised crs {crs}; using coordinates as-is");
            CrsHandling::UsedAsIs { crs }
        }
    }
}

fn reproject_from_epsg(features: &mut [RawFeature], code: u16) -> Result<(), String> {
    let src = Proj::from_epsg_code(code).map_err(|e| format!("EPSG:{code}: {e}"))?;
    let dst = Proj::from_proj_string(WGS84_PROJ).map_err(|e| e.to_string())?;
    let src_degrees = src.is_latlong();
    reproject_all(features, |c| {
        let mut p = if src_degrees {
            (c.x.to_radians(), c.y.to_radians(), 0.0)
        } else {
            (c.x, c.y, 0.0)
        };
        transform(&src, &dst, &mut p).map_err(|e| e.to_string())?;
        Ok(Coord {
            x: p.0.to_degrees(),
            y: p.1.to_degrees(),
        })
    })
}

/// All-or-nothing: either every geometry is reprojected or none is touched.
fn reproject_all(
    features: &mut [RawFeature],
    transform: impl Fn(Coord<f64>) -> Result<Coord<f64>, String> + Copy,
) -> Result<(), String> {
    let mut projected = Vec::with_capacity(features.len());
    for feature in features.iter() {
        let Some(g) = feature.geometry.as_ref() else {
            projected.push(None);
            continue;
        };
        let out = g
            .try_map_coords(transform)
            .map_err(|e| format!("'{}': {e}", feature.name))?;
        if let Some(bad) = out.coords_iter().find(|c| !in_bounds(c.y, c.x)) {
            return Err(format!(
                "'{}' lands outside lat/lon bounds at ({}, {})",
                feature.name, bad.y, bad.x
            ));
        }
        projected.push(Some(out));
    }
    for (feature, g) in features.iter_mut().zip(projected) {
        feature.geometry = g;
    }
    Ok(())
}

fn in_bounds(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}
