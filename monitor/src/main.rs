use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use fdwatch_monitor::inspector::LsofInspector;
use fdwatch_monitor::plot::PngPlotter;
use fdwatch_monitor::sampler::StopReason;
use fdwatch_monitor::session::run_session;
use fdwatch_shared::logging::{set_log_level, LogLevel};
use fdwatch_shared::{read_targets_file, Config, RunConfig};

#[derive(Parser)]
#[command(name = "fdwatch")]
#[command(about = "Monitor open files for a process -- produces a plot upon exit")]
struct Cli {
    /// pid of process to monitor
    #[arg(required_unless_present = "file")]
    pid: Option<u32>,

    /// Skip making the plot at the end
    #[arg(long)]
    no_plot: bool,

    /// Do not print samples to console
    #[arg(long)]
    quiet: bool,

    /// Delay between measurements in seconds
    #[arg(long)]
    delay: Option<f64>,

    /// Filename to use for reading a list of pids, one per line
    #[arg(long)]
    file: Option<PathBuf>,

    /// Directory to write the plot image to
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Write the collected samples as JSON to this path on exit
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 設定ファイル → 環境変数 → CLI の順で上書き
    let mut file_config = Config::load_auto()?.map(|(c, _)| c).unwrap_or_default();
    file_config.apply_env_overrides();

    let verbose = cli.verbose || file_config.logging.verbose;
    set_log_level(if verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });

    // --file 指定時は単一PIDを全面的に置き換える
    let targets = match &cli.file {
        Some(path) => read_targets_file(path)?,
        None => match cli.pid {
            Some(pid) => vec![pid],
            None => anyhow::bail!("pid is required when --file is not given"),
        },
    };

    let config = RunConfig {
        targets,
        delay: cli.delay.unwrap_or(file_config.sampling.delay),
        quiet: cli.quiet || file_config.logging.quiet,
        no_plot: cli.no_plot || file_config.output.no_plot,
        output_dir: cli.output_dir.unwrap_or(file_config.output.dir),
        dump_path: cli.dump,
    };
    config.validate()?;

    // 起動バナー
    let target_desc = config
        .targets
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    println!("\x1b[1m📡 Collecting data for pid {target_desc} -- press ctrl+c to exit\x1b[0m");

    // Ctrl+C を明示的なキャンセルトークンへ変換（ループは tick 境界で確認する）
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let inspector = Arc::new(LsofInspector::new());
    let plotter = PngPlotter::new(&config.output_dir);

    let summary = run_session(config, inspector, &plotter, shutdown_rx).await?;

    match summary.stop_reason {
        StopReason::TargetExited => {
            if verbose {
                println!("✅ Target exited after {} samples", summary.samples);
            }
        }
        StopReason::Cancelled => {
            println!("\n🛑 Cancelled after {} samples", summary.samples);
        }
    }

    if let Some(path) = &summary.plot_path {
        println!("📈 Plot written to {}", path.display());
    }

    Ok(())
}
