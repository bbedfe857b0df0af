use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use plotters::prelude::*;
use std::path::{Path, PathBuf};

use fdwatch_shared::SeriesBuffer;
use fdwatch_shared::{log_debug, log_plot};

/// 終了時にサンプル列を画像へ描画する協力者
///
/// 空・1点だけの系列でも失敗しないこと（キャンセルは最初のサンプルより
/// 前に来ることがある）
pub trait Visualizer: Send + Sync {
    fn render(&self, series: &SeriesBuffer, label: &str) -> Result<PathBuf>;
}

/// プロット画像のファイル名ラベル
///
/// 対象PIDと実行開始時刻から決定的に生成する（衝突しにくい命名）
pub fn series_label(targets: &[u32], started_at: DateTime<Utc>) -> String {
    let stamp = started_at.format("%Y%m%d-%H%M%S");
    match targets {
        [] => format!("empty-{stamp}"),
        [single] => format!("{single}-{stamp}"),
        [first, rest @ ..] => format!("{first}-etal{}-{stamp}", rest.len()),
    }
}

/// plotters による PNG 出力
///
/// 接続数とファイル数を経過秒に対する2本の折れ線として描く。
/// 元ツール同様にY軸は対数スケール（0 は 1 に切り上げて描画）。
pub struct PngPlotter {
    out_dir: PathBuf,
    size: (u32, u32),
}

impl PngPlotter {
    pub fn new<P: AsRef<Path>>(out_dir: P) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
            size: (1024, 768),
        }
    }
}

impl Visualizer for PngPlotter {
    fn render(&self, series: &SeriesBuffer, label: &str) -> Result<PathBuf> {
        let path = self.out_dir.join(format!("{label}.png"));

        log_plot!(
            debug,
            "Rendering {} samples to {}",
            series.len(),
            path.display()
        );

        let points = series.elapsed_points();
        let x_max = points.last().map(|(t, _)| *t).unwrap_or(0.0).max(1.0);
        let y_max = points
            .iter()
            .map(|(_, c)| c.connections.max(c.files))
            .max()
            .unwrap_or(0)
            .max(10) as f64;

        let backend_path = path.clone();
        let root = BitMapBackend::new(&backend_path, self.size).into_drawing_area();
        root.fill(&WHITE)
            .map_err(|e| anyhow!("Failed to fill plot background: {e}"))?;

        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .build_cartesian_2d(0f64..x_max, (1f64..y_max).log_scale())
            .map_err(|e| anyhow!("Failed to build chart: {e}"))?;

        chart
            .draw_series(LineSeries::new(
                points
                    .iter()
                    .map(|(t, c)| (*t, c.connections.max(1) as f64)),
                &RED,
            ))
            .map_err(|e| anyhow!("Failed to draw connections series: {e}"))?;

        chart
            .draw_series(LineSeries::new(
                points.iter().map(|(t, c)| (*t, c.files.max(1) as f64)),
                &BLUE,
            ))
            .map_err(|e| anyhow!("Failed to draw files series: {e}"))?;

        root.present()
            .map_err(|e| anyhow!("Failed to write plot image: {e}"))?;

        Ok(path)
    }
}
