//! Random-forest regression on the encoded cost features, fitted with
//! smartcore. Every tree considers all features at each split and the
//! bootstrap draws come from a fixed seed, so a restart predicts the same
//! costs.

use std::fmt;

use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::EncodeError;

pub const N_FEATURES: usize = 5;

pub type Features = [f64; N_FEATURES];

#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_trees: u16,
    pub seed: u64,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 250,
            seed: 42,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("cannot fit a forest on zero samples")]
    NoSamples,
    #[error("forest needs at least one tree")]
    NoTrees,
    #[error("non-finite value in training data at row {0}")]
    NonFinite(usize),
    #[error("cannot encode training row {row}: {source}")]
    Encode { row: usize, source: EncodeError },
    #[error("random forest fit failed: {0}")]
    Backend(String),
}

type Inner = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

pub struct CostForest {
    inner: Inner,
    n_trees: u16,
}

impl fmt::Debug for CostForest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostForest")
            .field("n_trees", &self.n_trees)
            .finish_non_exhaustive()
    }
}

impl CostForest {
    pub fn fit(x: &[Features], y: &[f64], params: &ForestParams) -> Result<Self, FitError> {
        if x.is_empty() {
            return Err(FitError::NoSamples);
        }
        if params.n_trees == 0 {
            return Err(FitError::NoTrees);
        }
        if let Some(row) = x
            .iter()
            .zip(y)
            .position(|(r, t)| !t.is_finite() || r.iter().any(|v| !v.is_finite()))
        {
            return Err(FitError::NonFinite(row));
        }

        let matrix = DenseMatrix::from_2d_vec(&x.iter().map(|r| r.to_vec()).collect());
        let parameters = RandomForestRegressorParameters::default()
            .with_n_trees(params.n_trees.into())
            .with_m(N_FEATURES)
            .with_min_samples_split(params.min_samples_split)
            .with_min_samples_leaf(params.min_samples_leaf)
            .with_seed(params.seed);
        let inner = RandomForestRegressor::fit(&matrix, &y.to_vec(), parameters)
            .map_err(|e| FitError::Backend(e.to_string()))?;

        Ok(Self {
            inner,
            n_trees: params.n_trees,
        })
    }

    /// Mean of the per-tree predictions for one row.
    pub fn predict(&self, row: &Features) -> Result<f64, FitError> {
        let matrix = DenseMatrix::from_2d_vec(&vec![row.to_vec()]);
        let out = self
            .inner
            .predict(&matrix)
            .map_err(|e| FitError::Backend(e.to_string()))?;
        out.first()
            .copied()
            .ok_or_else(|| FitError::Backend("empty prediction".to_string()))
    }

    pub fn n_trees(&self) -> usize {
        usize::from(self.n_trees)
    }
}
