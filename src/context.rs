use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::Context;
use serde::Serialize;

use crate::dataset::{CATEGORICAL_COLUMNS, COL_PENYAKIT, CostTable};
use crate::hospitals::{CrsHandling, HospitalTable, load_hospitals};
use crate::model::CostModel;
use crate::model::forest::ForestParams;
use crate::storage::{SourceFiles, file_present_nonempty};

/// Everything the handlers read: built once by [`AppContext::load`], never
/// mutated afterwards.
#[derive(Debug)]
pub struct AppContext {
    pub costs: CostTable,
    pub model: CostModel,
    pub hospitals: HospitalTable,
}

#[derive(Debug, Serialize)]
pub struct ContextSummary {
    pub cost_rows: usize,
    pub diseases: usize,
    pub trees: usize,
    /// Distinct values the encoder learned per categorical column.
    pub encoded_classes: BTreeMap<String, usize>,
    pub geojson_features: usize,
    pub hospitals: usize,
    pub keyword_fallback: bool,
    pub skipped_geometry: usize,
    pub out_of_range: usize,
    pub crs: CrsHandling,
}

impl AppContext {
    pub fn load(files: &SourceFiles, params: &ForestParams) -> anyhow::Result<Self> {
        for path in [&files.costs, &files.hospitals] {
            if !file_present_nonempty(path) {
                anyhow::bail!("input file missing or empty: {}", path.display());
            }
        }

        tracing::info!("Step 1/3: load cost table {}", files.costs.display());
        let t0 = Instant::now();
        let costs = CostTable::load(&files.costs)?;
        tracing::info!(
            "Cost table ready in {:.1}s: rows={} diseases={} columns={:?}",
            t0.elapsed().as_secs_f64(),
            costs.len(),
            costs.distinct(COL_PENYAKIT).len(),
            costs.columns()
        );

        tracing::info!(
            "Step 2/3: fit encoders + forest (trees={} seed={})",
            params.n_trees,
            params.seed
        );
        let t1 = Instant::now();
        let model = CostModel::train(&costs, params).context("train cost model")?;
        tracing::info!("Model trained in {:.1}s", t1.elapsed().as_secs_f64());

        tracing::info!("Step 3/3: load hospitals {}", files.hospitals.display());
        let t2 = Instant::now();
        let hospitals = load_hospitals(&files.hospitals)?;
        tracing::info!(
            "Hospitals ready in {:.1}s: kept={} of {} features (keyword_fallback={}, crs={:?})",
            t2.elapsed().as_secs_f64(),
            hospitals.hospitals.len(),
            hospitals.total_features,
            hospitals.keyword_fallback,
            hospitals.crs
        );

        Ok(Self {
            costs,
            model,
            hospitals,
        })
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            cost_rows: self.costs.len(),
            diseases: self.costs.distinct(COL_PENYAKIT).len(),
            trees: self.model.n_trees(),
            encoded_classes: CATEGORICAL_COLUMNS
                .iter()
                .filter_map(|&col| {
                    let n = self.model.encoders().get(col)?.classes().len();
                    Some((col.to_string(), n))
                })
                .collect(),
            geojson_features: self.hospitals.total_features,
            hospitals: self.hospitals.hospitals.len(),
            keyword_fallback: self.hospitals.keyword_fallback,
            skipped_geometry: self.hospitals.skipped_geometry,
            out_of_range: self.hospitals.out_of_range,
            crs: self.hospitals.crs.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::Path;

    pub(crate) const COSTS_CSV: &str = "\
Kategori,Penyakit,Tindakan Medis Utama,Estimasi Min (Rp),Estimasi Max (Rp)
Infeksi,Demam Berdarah,Rawat Inap,3000000,7000000
Infeksi,Tifus,Rawat Inap,2500000,6000000
Pernapasan,Pneumonia,Rawat Inap,5000000,15000000
Jantung,Serangan Jantung,Kateterisasi,40000000,90000000
Jantung,Operasi Bypass,Bedah Jantung,150000000,300000000
Kandungan,Persalinan Normal,Persalinan,2000000,5000000
Kandungan,Caesar,Operasi Caesar,10000000,25000000
Bedah,Usus Buntu,Apendektomi,8000000,20000000
";

    /// Hospitals around Jakarta plus one non-hospital feature.
    pub(crate) const HOSPITALS_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"NAMOBJ": "Rumah Sakit Cipto Mangunkusumo", "REMARK": "Rumah Sakit Umum"},
     "geometry": {"type": "Polygon", "coordinates": [[[106.845, -6.197], [106.849, -6.197], [106.849, -6.193], [106.845, -6.193], [106.845, -6.197]]]}},
    {"type": "Feature", "properties": {"NAMOBJ": "RSUP Fatmawati", "TIPSHT": "Rumah Sakit"},
     "geometry": {"type": "Point", "coordinates": [106.7955, -6.2925]}},
    {"type": "Feature", "properties": {"NAMOBJ": "Rumah Sakit Persahabatan"},
     "geometry": {"type": "Point", "coordinates": [106.8858, -6.2003]}},
    {"type": "Feature", "properties": {"NAMOBJ": "Puskesmas Menteng", "REMARK": "Puskesmas"},
     "geometry": {"type": "Point", "coordinates": [106.8300, -6.1960]}}
  ]
}"#;

    pub(crate) fn write_fixture(dir: &Path) -> SourceFiles {
        let files = SourceFiles {
            costs: dir.join("estimasi_biaya.csv"),
            hospitals: dir.join("rumah_sakit.geojson"),
        };
        std::fs::write(&files.costs, COSTS_CSV).unwrap();
        std::fs::write(&files.hospitals, HOSPITALS_GEOJSON).unwrap();
        files
    }

    pub(crate) fn test_params() -> ForestParams {
        ForestParams {
            n_trees: 25,
            ..ForestParams::default()
        }
    }

    pub(crate) fn fixture_context() -> AppContext {
        let dir = tempfile::tempdir().unwrap();
        let files = write_fixture(dir.path());
        AppContext::load(&files, &test_params()).unwrap()
    }

    #[test]
    fn loads_fixture_inputs() {
        let ctx = fixture_context();
        let s = ctx.summary();
        assert_eq!(s.cost_rows, 8);
        assert_eq!(s.diseases, 8);
        assert_eq!(s.trees, 25);
        assert_eq!(s.encoded_classes["Kategori"], 5);
        assert_eq!(s.encoded_classes["Tindakan Medis Utama"], 6);
        assert_eq!(s.geojson_features, 4);
        assert_eq!(s.hospitals, 3);
        assert!(!s.keyword_fallback);
        assert_eq!(s.crs, CrsHandling::AssumedWgs84);
        assert_eq!(s.out_of_range, 0);
    }

    #[test]
    fn missing_input_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let files = SourceFiles::new(dir.path());
        let err = AppContext::load(&files, &test_params()).unwrap_err();
        assert!(err.to_string().contains("input file missing"));
    }

    #[test]
    fn missing_columns_abort_startup() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_fixture(dir.path());
        std::fs::write(
            &files.costs,
            "Kategori,Penyakit,Estimasi Min (Rp)\nInfeksi,Tifus,1000\n",
        )
        .unwrap();
        let err = AppContext::load(&files, &test_params()).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("Tindakan Medis Utama"), "{msg}");
        assert!(msg.contains("Estimasi Max (Rp)"), "{msg}");
    }
}
