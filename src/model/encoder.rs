use std::collections::{BTreeSet, HashMap};

use crate::dataset::{CATEGORICAL_COLUMNS, CostTable};
use crate::error::EncodeError;

/// String <-> integer code table for one column. Codes follow the sorted
/// order of the distinct values seen at fit time.
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    classes: Vec<String>,
    codes: HashMap<String, usize>,
}

impl LabelEncoder {
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let classes: Vec<String> = values
            .into_iter()
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let codes = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self { classes, codes }
    }

    pub fn transform(&self, value: &str) -> Option<usize> {
        self.codes.get(value).copied()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// One fitted encoder per categorical column of the cost table.
#[derive(Debug, Clone)]
pub struct EncoderBank {
    encoders: HashMap<&'static str, LabelEncoder>,
}

impl EncoderBank {
    pub fn fit(table: &CostTable) -> Self {
        let encoders = CATEGORICAL_COLUMNS
            .iter()
            .map(|&col| {
                let values = table.records().iter().filter_map(|r| r.categorical(col));
                (col, LabelEncoder::fit(values))
            })
            .collect();
        Self { encoders }
    }

    pub fn get(&self, column: &str) -> Option<&LabelEncoder> {
        self.encoders.get(column)
    }

    pub fn encode(&self, column: &str, value: &str) -> Result<usize, EncodeError> {
        let encoder = self
            .get(column)
            .ok_or_else(|| EncodeError::UnknownColumn(column.to_string()))?;
        encoder
            .transform(value)
            .ok_or_else(|| EncodeError::UnseenCategory {
                column: column.to_string(),
                value: value.to_string(),
            })
    }
}
