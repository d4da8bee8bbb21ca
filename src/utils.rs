use indicatif::ProgressStyle;

/// Installs the global `tracing` subscriber.
///
/// The filter is read from `EPIFLOW_LOG` (same syntax as `RUST_LOG`) and
/// defaults to `info`. Log lines go to stderr through the progress bar
/// writer, so they never tear the bars drawn by the engine.
#[cfg(feature = "logging")]
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_indicatif::IndicatifLayer;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let indicatif = IndicatifLayer::new();
    let filter = EnvFilter::try_from_env("EPIFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(indicatif.get_stderr_writer()),
        )
        .with(indicatif)
        .try_init()?;

    Ok(())
}

/// Style of the bar attached to the root span of a run.
pub(crate) fn style_run() -> Option<ProgressStyle> {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .ok()
        .map(|style| style.progress_chars("=>-"))
}

/// Style of the spinner attached to each running task.
pub(crate) fn style_task() -> Option<ProgressStyle> {
    ProgressStyle::default_spinner()
        .template("{spinner:.blue} {msg}")
        .ok()
}
