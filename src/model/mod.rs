pub mod encoder;
pub mod forest;

use crate::dataset::{COL_KATEGORI, COL_PENYAKIT, COL_TINDAKAN, CostRecord, CostTable};
use crate::error::EncodeError;
use encoder::EncoderBank;
use forest::{CostForest, Features, FitError, ForestParams};

/// Encoders plus the forest fitted on their codes.
#[derive(Debug)]
pub struct CostModel {
    encoders: EncoderBank,
    forest: CostForest,
}

impl CostModel {
    pub fn train(table: &CostTable, params: &ForestParams) -> Result<Self, FitError> {
        let encoders = EncoderBank::fit(table);
        let (x, y) = training_matrix(&encoders, table)?;
        let forest = CostForest::fit(&x, &y, params)?;
        Ok(Self { encoders, forest })
    }

    pub fn encoders(&self) -> &EncoderBank {
        &self.encoders
    }

    pub fn n_trees(&self) -> usize {
        self.forest.n_trees()
    }

    pub fn predict(&self, record: &CostRecord) -> Result<f64, PredictError> {
        let row = features(&self.encoders, record)?;
        Ok(self.forest.predict(&row)?)
    }
}

/// Feature rows and midpoint targets for every record of the table.
fn training_matrix(
    encoders: &EncoderBank,
    table: &CostTable,
) -> Result<(Vec<Features>, Vec<f64>), FitError> {
    let mut x = Vec::with_capacity(table.len());
    let mut y = Vec::with_capacity(table.len());
    for (row, record) in table.records().iter().enumerate() {
        let encoded =
            features(encoders, record).map_err(|source| FitError::Encode { row, source })?;
        x.push(encoded);
        y.push(record.target());
    }
    Ok((x, y))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Forest(#[from] FitError),
}

/// `[Kategori code, Penyakit code, Tindakan code, min, max]`
pub fn features(encoders: &EncoderBank, record: &CostRecord) -> Result<Features, EncodeError> {
    Ok([
        encoders.encode(COL_KATEGORI, &record.kategori)? as f64,
        encoders.encode(COL_PENYAKIT, &record.penyakit)? as f64,
        encoders.encode(COL_TINDAKAN, &record.tindakan)? as f64,
        record.estimasi_min,
        record.estimasi_max,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::{header, row, sample_table};

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 40,
            ..ForestParams::default()
        }
    }

    #[test]
    fn predicts_non_negative_costs_for_every_row() {
        let table = sample_table();
        let model = CostModel::train(&table, &small_params()).unwrap();
        for record in table.records() {
            let cost = model.predict(record).unwrap();
            assert!(cost >= 0.0, "{} -> {cost}", record.penyakit);
        }
    }

    #[test]
    fn expensive_procedures_predict_higher() {
        let table = sample_table();
        let model = CostModel::train(&table, &small_params()).unwrap();
        let ring = model
            .predict(table.find_disease("Pemasangan Ring").unwrap())
            .unwrap();
        let normal = model
            .predict(table.find_disease("Persalinan Normal").unwrap())
            .unwrap();
        assert!(ring > normal);
    }

    #[test]
    fn feature_vector_layout() {
        let table = sample_table();
        let model = CostModel::train(&table, &small_params()).unwrap();
        let record = table.find_disease("Caesar").unwrap();
        let row = features(model.encoders(), record).unwrap();
        // Kategori sorted: Bedah, Infeksi, Jantung, Kandungan
        assert_eq!(row[0], 3.0);
        assert_eq!(row[3], 10_000_000.0);
        assert_eq!(row[4], 25_000_000.0);
    }

    #[test]
    fn unseen_record_fails_to_encode() {
        let table = sample_table();
        let model = CostModel::train(&table, &small_params()).unwrap();
        let mut record = table.first().clone();
        record.tindakan = "Kemoterapi".to_string();
        assert!(matches!(
            model.predict(&record),
            Err(PredictError::Encode(EncodeError::UnseenCategory { .. }))
        ));
    }

    #[test]
    fn training_rows_outside_the_encoders_are_an_error() {
        let table = sample_table();
        let fitted_on = CostTable::from_rows(
            header(),
            vec![row("Infeksi", "Tifus", "Rawat Inap", 1.0, 2.0)],
        )
        .unwrap();
        let encoders = EncoderBank::fit(&fitted_on);
        match training_matrix(&encoders, &table).unwrap_err() {
            FitError::Encode { row, source } => {
                assert_eq!(row, 0);
                assert!(matches!(source, EncodeError::UnseenCategory { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        let (x, y) = training_matrix(&EncoderBank::fit(&table), &table).unwrap();
        assert_eq!(x.len(), table.len());
        assert_eq!(y[0], 5_000_000.0);
    }

    #[test]
    fn same_seed_predicts_the_same_costs() {
        let table = sample_table();
        let a = CostModel::train(&table, &small_params()).unwrap();
        let b = CostModel::train(&table, &small_params()).unwrap();
        for record in table.records() {
            assert_eq!(a.predict(record).unwrap(), b.predict(record).unwrap());
        }
    }
}
