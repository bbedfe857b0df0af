use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 1回の計測で得られたオープンリソース数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenCounts {
    /// TCP/UDP 接続の数
    pub connections: u64,
    /// 接続以外のオープンファイルの数
    pub files: u64,
}

impl OpenCounts {
    pub fn new(connections: u64, files: u64) -> Self {
        Self { connections, files }
    }

    pub fn total(&self) -> u64 {
        self.connections + self.files
    }
}

/// タイムスタンプ付きの計測値
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub counts: OpenCounts,
}

/// 1回の実行で収集したサンプル列（追記専用）
///
/// サンプリングループだけが書き込み、終了時にプロット側が一度だけ読む。
/// タイムスタンプは追記順に厳密増加する。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeriesBuffer {
    samples: Vec<Sample>,
}

impl SeriesBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 現在時刻でサンプルを追記
    pub fn append(&mut self, counts: OpenCounts) {
        self.append_at(Utc::now(), counts);
    }

    /// 指定時刻でサンプルを追記
    ///
    /// 時刻が前回から進んでいない場合は 1µs だけ進める（厳密増加の維持）
    pub fn append_at(&mut self, timestamp: DateTime<Utc>, counts: OpenCounts) {
        let timestamp = match self.samples.last() {
            Some(last) if timestamp <= last.timestamp => {
                last.timestamp + Duration::microseconds(1)
            }
            _ => timestamp,
        };
        self.samples.push(Sample { timestamp, counts });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// 最初のサンプルの時刻（プロットの原点）
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.samples.first().map(|s| s.timestamp)
    }

    /// 経過秒に変換したサンプル列 (elapsed_secs, counts)
    pub fn elapsed_points(&self) -> Vec<(f64, OpenCounts)> {
        let Some(start) = self.started_at() else {
            return Vec::new();
        };
        self.samples
            .iter()
            .map(|s| {
                let elapsed = (s.timestamp - start)
                    .num_microseconds()
                    .unwrap_or(i64::MAX) as f64
                    / 1_000_000.0;
                (elapsed, s.counts)
            })
            .collect()
    }

    /// サンプル列を JSON ファイルに書き出し
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json =
            serde_json::to_string_pretty(&self.samples).context("Failed to serialize samples")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write dump file: {}", path.as_ref().display()))?;
        Ok(())
    }
}
