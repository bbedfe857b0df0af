use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use fdwatch_shared::logging::LogCategory;
use fdwatch_shared::{log_info, RunConfig};

use crate::inspector::ProcessInspector;
use crate::plot::{series_label, Visualizer};
use crate::sampler::{Sampler, StopReason};

/// 1回の実行の結果
#[derive(Debug)]
pub struct SessionSummary {
    pub stop_reason: StopReason,
    pub samples: usize,
    pub plot_path: Option<PathBuf>,
}

/// サンプリング開始から終了時フラッシュまでの一連の実行
///
/// 停止理由ごとのフラッシュ規則：
/// - 対象消滅 → 無条件にプロット（消滅直前までを記録する）
/// - キャンセル → no_plot でなければプロット（部分データも空データも有効）
/// プロットの呼び出しは常に高々1回。
pub async fn run_session(
    config: RunConfig,
    inspector: Arc<dyn ProcessInspector>,
    visualizer: &dyn Visualizer,
    shutdown: watch::Receiver<bool>,
) -> Result<SessionSummary> {
    config.validate().context("Invalid run configuration")?;

    let session_start = chrono::Utc::now();
    let mut sampler = Sampler::new(config.clone(), inspector);
    let stop_reason = sampler.run(shutdown).await?;
    let series = sampler.into_series();

    log_info!(
        LogCategory::System,
        "Sampling stopped ({stop_reason:?}) with {} samples",
        series.len()
    );

    let should_plot = match stop_reason {
        StopReason::TargetExited => true,
        StopReason::Cancelled => !config.no_plot,
    };

    let plot_path = if should_plot {
        let label = series_label(
            &config.targets,
            series.started_at().unwrap_or(session_start),
        );
        Some(visualizer.render(&series, &label)?)
    } else {
        None
    };

    if let Some(dump_path) = &config.dump_path {
        series.write_json(dump_path)?;
    }

    Ok(SessionSummary {
        stop_reason,
        samples: series.len(),
        plot_path,
    })
}
