use clap::{Parser, Subcommand};

use crate::model::forest::ForestParams;

const DEFAULT_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data");

#[derive(Parser, Debug)]
#[command(name = "berapaya-backend")]
#[command(about = "BerapaYa backend (treatment cost prediction + nearby hospitals)", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API. Inputs are loaded and the model trained in the background.
    Serve(ServeArgs),
    /// Run the startup pipeline once, print a summary and exit.
    Check(CheckArgs),
}

/// Where the cost spreadsheet and hospital GeoJSON live.
#[derive(clap::Args, Debug, Clone)]
pub struct SourceArgs {
    /// Directory holding estimasi_biaya.xlsx and rumah_sakit.geojson.
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    /// Cost spreadsheet (.xlsx/.xls/.ods or .csv). Overrides <data-dir>/estimasi_biaya.xlsx.
    #[arg(long)]
    pub costs_file: Option<String>,

    /// Hospital GeoJSON. Overrides <data-dir>/rumah_sakit.geojson.
    #[arg(long)]
    pub hospitals_file: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ModelArgs {
    /// Number of trees in the cost forest.
    #[arg(long, default_value_t = 250)]
    pub trees: u16,

    /// Seed for bootstrap sampling; fixed so restarts predict the same costs.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl ModelArgs {
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.trees,
            seed: self.seed,
            ..ForestParams::default()
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    #[command(flatten)]
    pub model: ModelArgs,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Shared secret expected in the X-API-Key header.
    #[arg(long, env = "BERAPAYA_API_KEY", default_value = "berapaya", hide_env_values = true)]
    pub api_key: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CheckArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    #[command(flatten)]
    pub model: ModelArgs,
}
