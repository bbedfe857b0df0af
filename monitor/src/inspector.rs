use async_trait::async_trait;
use std::fmt;
use tokio::process::Command;

use fdwatch_shared::OpenCounts;
use fdwatch_shared::{log_debug, log_inspector};

/// 検査の失敗
#[derive(Debug)]
pub enum InspectError {
    /// 外部ツールが非ゼロ終了 = 対象プロセスがもう存在しない（ループ終了の合図）
    TargetGone,
    /// それ以外の失敗（致命的・リトライしない）
    Failed(anyhow::Error),
}

impl fmt::Display for InspectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InspectError::TargetGone => write!(f, "target process(es) no longer exist"),
            InspectError::Failed(e) => write!(f, "inspection failed: {e}"),
        }
    }
}

impl std::error::Error for InspectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InspectError::TargetGone => None,
            InspectError::Failed(e) => Some(e.as_ref()),
        }
    }
}

/// プロセスのオープンリソースを数える協力者
///
/// lsof 出力のスクレイピングをこの境界の裏に隔離する（テストでは差し替え可能）
#[async_trait]
pub trait ProcessInspector: Send + Sync {
    /// 指定PID群のオープン接続数・ファイル数を返す
    async fn inspect(&self, pids: &[u32]) -> Result<OpenCounts, InspectError>;
}

/// lsof 出力の1行ずつを接続（TCP/UDPマーカーあり）かファイルかに分類
///
/// 空行とCOMMANDヘッダ行は数えない
pub fn classify_lines(output: &str) -> OpenCounts {
    let mut counts = OpenCounts::default();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("COMMAND") {
            continue;
        }
        if line.contains("TCP") || line.contains("UDP") {
            counts.connections += 1;
        } else {
            counts.files += 1;
        }
    }
    counts
}

/// lsof を呼び出す実装
pub struct LsofInspector {
    command: String,
}

impl LsofInspector {
    pub fn new() -> Self {
        Self {
            command: "lsof".to_string(),
        }
    }

    /// 呼び出すコマンドを差し替える（テスト用）
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for LsofInspector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessInspector for LsofInspector {
    async fn inspect(&self, pids: &[u32]) -> Result<OpenCounts, InspectError> {
        let pid_list = pids
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",");

        log_inspector!(debug, "Running {} -nl -p {pid_list}", self.command);

        // タイムアウトは設けない：外部ツールの滞留はそのままサンプラーを止める
        let output = Command::new(&self.command)
            .args(["-nl", "-p", &pid_list])
            .output()
            .await
            .map_err(|e| {
                InspectError::Failed(
                    anyhow::Error::new(e)
                        .context(format!("Failed to invoke '{}'", self.command)),
                )
            })?;

        // 非ゼロ終了は「対象が存在しない／該当リソースを持たない」の合図
        if !output.status.success() {
            return Err(InspectError::TargetGone);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(classify_lines(&stdout))
    }
}
