use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// メインの設定構造体（設定ファイル由来）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// サンプリング設定
    #[serde(default)]
    pub sampling: SamplingSettings,

    /// 出力設定
    #[serde(default)]
    pub output: OutputSettings,

    /// ログ設定
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// サンプリング関連の設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingSettings {
    /// 計測間隔（秒）
    #[serde(default = "default_delay")]
    pub delay: f64,
}

/// 出力関連の設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// プロット画像の出力先ディレクトリ
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// 終了時のプロット生成をスキップするか
    #[serde(default)]
    pub no_plot: bool,
}

/// ログ関連の設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingSettings {
    /// 詳細ログを有効にするか
    #[serde(default)]
    pub verbose: bool,

    /// サンプルごとのコンソール出力を抑制するか
    #[serde(default)]
    pub quiet: bool,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            delay: default_delay(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            no_plot: false,
        }
    }
}

// デフォルト値関数
fn default_delay() -> f64 {
    0.2
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Config {
    /// 設定ファイルから読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// 設定ファイルパスの候補を取得（優先順位順）
    pub fn config_path_candidates() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. カレントディレクトリの .fdwatch/config.toml
        if let Ok(current_dir) = std::env::current_dir() {
            paths.push(current_dir.join(".fdwatch").join("config.toml"));
        }

        // 2. ホームディレクトリの .fdwatch/config.toml
        if let Some(home_dir) = home::home_dir() {
            paths.push(home_dir.join(".fdwatch").join("config.toml"));
        }

        // 3. XDG規格に従った設定ディレクトリ（Linux/Unix）
        if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(
                PathBuf::from(xdg_config_home)
                    .join("fdwatch")
                    .join("config.toml"),
            );
        } else if let Some(home_dir) = home::home_dir() {
            paths.push(home_dir.join(".config").join("fdwatch").join("config.toml"));
        }

        paths
    }

    /// 設定ファイルを自動検出して読み込み
    pub fn load_auto() -> Result<Option<(Self, PathBuf)>> {
        for path in Self::config_path_candidates() {
            if path.exists() {
                let config = Self::from_file(&path)?;
                return Ok(Some((config, path)));
            }
        }
        Ok(None)
    }

    /// 環境変数で設定を上書き
    pub fn apply_env_overrides(&mut self) {
        if let Ok(delay) = std::env::var("FDWATCH_DELAY") {
            if let Ok(delay) = delay.parse::<f64>() {
                self.sampling.delay = delay;
            }
        }

        if let Ok(dir) = std::env::var("FDWATCH_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }

        if let Ok(no_plot) = std::env::var("FDWATCH_NO_PLOT") {
            self.output.no_plot = no_plot == "1" || no_plot.to_lowercase() == "true";
        }

        if let Ok(quiet) = std::env::var("FDWATCH_QUIET") {
            self.logging.quiet = quiet == "1" || quiet.to_lowercase() == "true";
        }

        if let Ok(verbose) = std::env::var("FDWATCH_VERBOSE") {
            self.logging.verbose = verbose == "1" || verbose.to_lowercase() == "true";
        }
    }
}

/// 実行時設定（起動時に確定し、以後不変）
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// 監視対象のプロセスID（空でない・すべて正）
    pub targets: Vec<u32>,
    /// 計測間隔（秒）
    pub delay: f64,
    /// サンプルごとのコンソール出力を抑制
    pub quiet: bool,
    /// 終了時のプロット生成をスキップ
    pub no_plot: bool,
    /// プロット画像の出力先ディレクトリ
    pub output_dir: PathBuf,
    /// サンプル列のJSONダンプ先（任意）
    pub dump_path: Option<PathBuf>,
}

impl RunConfig {
    /// 対象・間隔の検証
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            bail!("No target pids given");
        }
        if self.targets.contains(&0) {
            bail!("Target pid must be a positive integer");
        }
        if !self.delay.is_finite() || self.delay < 0.0 {
            bail!("Invalid delay: {}", self.delay);
        }
        Ok(())
    }
}

/// PIDリストファイルの読み込み（1行1PID、空行は無視）
pub fn read_targets_file<P: AsRef<Path>>(path: P) -> Result<Vec<u32>> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read pid file: {}", path.as_ref().display()))?;

    let mut targets = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let pid: u32 = line
            .parse()
            .with_context(|| format!("Invalid pid in {}: {line:?}", path.as_ref().display()))?;
        targets.push(pid);
    }

    Ok(targets)
}
