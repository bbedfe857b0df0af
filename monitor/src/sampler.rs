use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use fdwatch_shared::{log_debug, log_info, log_sampler};
use fdwatch_shared::{OpenCounts, RunConfig, SeriesBuffer};

use crate::inspector::{InspectError, ProcessInspector};

/// ループ終了の理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 対象プロセスが消えた
    TargetExited,
    /// 操作者によるキャンセル（Ctrl+C）
    Cancelled,
}

/// 次のtick開始までの残り時間（負にはならない）
pub fn remaining_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// サンプリングループ
///
/// SeriesBuffer の唯一の書き手。tick ごとに inspect → 追記 → 残り時間だけ
/// sleep を繰り返し、対象消滅かキャンセルで停止する。
pub struct Sampler {
    config: RunConfig,
    inspector: Arc<dyn ProcessInspector>,
    series: SeriesBuffer,
}

impl Sampler {
    pub fn new(config: RunConfig, inspector: Arc<dyn ProcessInspector>) -> Self {
        Self {
            config,
            inspector,
            series: SeriesBuffer::new(),
        }
    }

    pub fn series(&self) -> &SeriesBuffer {
        &self.series
    }

    pub fn into_series(self) -> SeriesBuffer {
        self.series
    }

    /// 対象が消えるかキャンセルされるまでサンプリングを続ける
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<StopReason> {
        let interval = Duration::from_secs_f64(self.config.delay);

        log_sampler!(
            debug,
            "Starting loop: targets={:?} interval={:?}",
            self.config.targets,
            interval
        );

        loop {
            // tick 開始前にキャンセル確認（要求済みなら新しい tick は始めない）
            if *shutdown.borrow() {
                return Ok(StopReason::Cancelled);
            }

            let tick_start = Instant::now();

            // 外部ツールの呼び出し自体は中断しない
            match self.inspector.inspect(&self.config.targets).await {
                Ok(counts) => self.record(counts),
                Err(InspectError::TargetGone) => {
                    println!(
                        "\x1b[93mProcess {:?} finished, doesn't exist, or holds no matching resources\x1b[0m",
                        self.config.targets
                    );
                    log_sampler!(info, "Target gone after {} samples", self.series.len());
                    return Ok(StopReason::TargetExited);
                }
                Err(InspectError::Failed(e)) => {
                    return Err(e.context("Inspection failed"));
                }
            }

            // 経過時間を差し引いた残りだけ眠る（追い付きのための連続実行はしない）
            let sleep_for = remaining_delay(interval, tick_start.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = wait_for_cancel(&mut shutdown) => {
                    return Ok(StopReason::Cancelled);
                }
            }
        }
    }

    fn record(&mut self, counts: OpenCounts) {
        let now = chrono::Utc::now();
        self.series.append_at(now, counts);

        if !self.config.quiet {
            println!(
                "{} connections={} files={}",
                now.format("%Y-%m-%d %H:%M:%S%.3f"),
                counts.connections,
                counts.files
            );
        }

        log_sampler!(
            debug,
            "Sample #{}: connections={} files={}",
            self.series.len(),
            counts.connections,
            counts.files
        );
    }
}

/// キャンセル要求（true の受信）まで待つ
///
/// 送信側が消えた場合はキャンセル不能とみなして永久に待つ
async fn wait_for_cancel(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tokio_test::assert_ok;

    /// 決まった応答を順に返し、尽きたら TargetGone を返すインスペクタ
    struct ScriptedInspector {
        responses: Mutex<VecDeque<OpenCounts>>,
    }

    impl ScriptedInspector {
        fn new(counts: Vec<OpenCounts>) -> Self {
            Self {
                responses: Mutex::new(counts.into()),
            }
        }
    }

    #[async_trait]
    impl ProcessInspector for ScriptedInspector {
        async fn inspect(&self, _pids: &[u32]) -> Result<OpenCounts, InspectError> {
            match self.responses.lock().unwrap().pop_front() {
                Some(counts) => Ok(counts),
                None => Err(InspectError::TargetGone),
            }
        }
    }

    fn test_config(delay: f64) -> RunConfig {
        RunConfig {
            targets: vec![100],
            delay,
            quiet: true,
            no_plot: false,
            output_dir: PathBuf::from("."),
            dump_path: None,
        }
    }

    #[test]
    fn test_remaining_delay() {
        // 0.2s間隔・計測0.05s → 残り0.15s
        assert_eq!(
            remaining_delay(Duration::from_millis(200), Duration::from_millis(50)),
            Duration::from_millis(150)
        );

        // 計測が間隔を超えたら0（負にはならない）
        assert_eq!(
            remaining_delay(Duration::from_millis(200), Duration::from_millis(250)),
            Duration::ZERO
        );
    }

    #[tokio::test]
    async fn test_run_until_target_gone() {
        let inspector = Arc::new(ScriptedInspector::new(vec![OpenCounts::new(3, 10); 5]));
        let mut sampler = Sampler::new(test_config(0.001), inspector);

        let (_tx, rx) = watch::channel(false);
        let reason = tokio_test::assert_ok!(sampler.run(rx).await);

        assert_eq!(reason, StopReason::TargetExited);
        assert_eq!(sampler.series().len(), 5);

        // タイムスタンプの厳密増加
        for pair in sampler.series().samples().windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_cancel_before_first_tick() {
        let inspector = Arc::new(ScriptedInspector::new(vec![OpenCounts::new(1, 1); 100]));
        let mut sampler = Sampler::new(test_config(0.001), inspector);

        // 実行前にキャンセル要求済み → tick は一度も走らない
        let (tx, rx) = watch::channel(true);
        let reason = sampler.run(rx).await.unwrap();
        drop(tx);

        assert_eq!(reason, StopReason::Cancelled);
        assert!(sampler.series().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let inspector = Arc::new(ScriptedInspector::new(vec![OpenCounts::new(2, 5); 100]));
        // 長い間隔：キャンセルが sleep を中断することの確認
        let mut sampler = Sampler::new(test_config(30.0), inspector);

        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let reason = tokio::time::timeout(Duration::from_secs(5), sampler.run(rx))
            .await
            .expect("cancel should interrupt the sleep")
            .unwrap();

        assert_eq!(reason, StopReason::Cancelled);
        assert_eq!(sampler.series().len(), 1);
    }

    #[tokio::test]
    async fn test_fatal_inspection_error_propagates() {
        struct FailingInspector;

        #[async_trait]
        impl ProcessInspector for FailingInspector {
            async fn inspect(&self, _pids: &[u32]) -> Result<OpenCounts, InspectError> {
                Err(InspectError::Failed(anyhow::anyhow!("permission denied")))
            }
        }

        let mut sampler = Sampler::new(test_config(0.001), Arc::new(FailingInspector));
        let (_tx, rx) = watch::channel(false);

        let result = sampler.run(rx).await;
        assert!(result.is_err());
    }
}
