use anyhow::Context;

use crate::cli::CheckArgs;
use crate::context::AppContext;
use crate::storage::SourceFiles;

/// Runs the startup pipeline once and prints what a server would load.
pub async fn run(opts: CheckArgs) -> anyhow::Result<()> {
    let files = SourceFiles::from_args(&opts.sources);
    let params = opts.model.forest_params();
    tracing::info!(
        "costs={} hospitals={}",
        files.costs.display(),
        files.hospitals.display()
    );

    let ctx = tokio::task::spawn_blocking(move || AppContext::load(&files, &params))
        .await
        .context("startup pipeline panicked")??;

    let summary = serde_json::to_string_pretty(&ctx.summary()).context("serialize summary")?;
    println!("{summary}");
    Ok(())
}
