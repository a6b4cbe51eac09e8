use std::path::{Path, PathBuf};

use crate::cli::SourceArgs;

pub const COSTS_FILE_NAME: &str = "estimasi_biaya.xlsx";
pub const COSTS_CSV_FILE_NAME: &str = "estimasi_biaya.csv";
pub const HOSPITALS_FILE_NAME: &str = "rumah_sakit.geojson";

#[derive(Debug, Clone)]
pub struct SourceFiles {
    pub costs: PathBuf,
    pub hospitals: PathBuf,
}

impl SourceFiles {
    /// The spreadsheet is preferred; a CSV export next to it is used when the
    /// spreadsheet is absent.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir: PathBuf = data_dir.into();
        let xlsx = data_dir.join(COSTS_FILE_NAME);
        let csv = data_dir.join(COSTS_CSV_FILE_NAME);
        let costs = if !file_present_nonempty(&xlsx) && file_present_nonempty(&csv) {
            csv
        } else {
            xlsx
        };
        Self {
            costs,
            hospitals: data_dir.join(HOSPITALS_FILE_NAME),
        }
    }

    pub fn from_args(args: &SourceArgs) -> Self {
        let mut files = Self::new(&args.data_dir);
        if let Some(p) = args.costs_file.as_ref() {
            files.costs = PathBuf::from(p);
        }
        if let Some(p) = args.hospitals_file.as_ref() {
            files.hospitals = PathBuf::from(p);
        }
        files
    }
}

pub fn file_present_nonempty(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(m) => m.is_file() && m.len() > 0,
        Err(_) => false,
    }
}

pub fn extension_lower(path: &Path) -> String {
    path.extension()
        .and_then(|x| x.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}
