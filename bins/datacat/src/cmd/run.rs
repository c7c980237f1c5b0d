use tokio_util::sync::CancellationToken;

use pipeline::{Pipeline, RunSummary};

use super::config::Effective;
use super::error::DatacatError;

// ═══════════════════════════════════════════════════════════════
//  Main dispatch
// ═══════════════════════════════════════════════════════════════

pub async fn run(eff: Effective) -> Result<RunSummary, DatacatError> {
    // Все стадии разрешаются до любого I/O
    let pipeline = Pipeline::from_config(&eff.config, eff.path.as_deref())?;
    tracing::debug!(?pipeline, "pipeline resolved");

    let token = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_ctrl_c(token.clone()));

    let result = pipeline.run(token).await;
    watcher.abort();
    let summary = result?;

    if summary.cancelled {
        tracing::warn!(
            delivered = summary.delivered,
            loaded = summary.loaded,
            elapsed_s = summary.elapsed.as_secs_f64(),
            cancelled = true,
            "replay interrupted before the end"
        );
    } else {
        tracing::info!(
            delivered = summary.delivered,
            loaded = summary.loaded,
            elapsed_s = summary.elapsed.as_secs_f64(),
            rate = summary.rate(),
            "replay finished"
        );
    }
    Ok(summary)
}

/// Код выхода: прерванный по Ctrl-C прогон не выдаётся за успех.
pub fn exit_code(summary: &RunSummary) -> i32 {
    if summary.cancelled { INTERRUPTED } else { 0 }
}

/// 128 + SIGINT
const INTERRUPTED: i32 = 130;

async fn cancel_on_ctrl_c(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("interrupt received, stopping");
            token.cancel();
        }
        Err(e) => tracing::warn!(error = %e, "cannot listen for ctrl-c"),
    }
}
