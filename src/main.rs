use anyhow::{Context, Result};
use clap::Parser;
use ftpsync_lib::config::LogSettings;
use ftpsync_lib::logging::SizeRotatingWriter;
use ftpsync_lib::storage::create_storages;
use ftpsync_lib::{Direction, Settings, SyncEngine, SyncReport};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 运行中至少一个动作失败
const EXIT_FAILED_ACTIONS: u8 = 1;
/// 配置错误或运行被中止
const EXIT_FATAL: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "ftpsync",
    version,
    about = "Keep a local directory and an FTP directory in sync, in one direction"
)]
struct Cli {
    /// Settings file (JSON); connection values may also come from the environment or .env
    settings: Option<PathBuf>,

    /// Override the local directory
    #[arg(long, value_name = "DIR")]
    local: Option<String>,

    /// Override the remote directory on the FTP server
    #[arg(long, value_name = "DIR")]
    remote: Option<String>,

    /// Override the sync direction
    #[arg(long, value_enum)]
    direction: Option<Direction>,

    /// Override the number of parallel transfers
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Compute and print the plan without touching either side
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// 初始化日志系统
fn init_logging(config: &LogSettings, verbose: u8, quiet: bool) -> Result<()> {
    let level = match (quiet, verbose) {
        (true, _) => tracing::Level::WARN,
        (false, 0) => config.tracing_level(),
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    };

    let env_filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("opendal=warn".parse()?)
        .add_directive("suppaftp=warn".parse()?);

    // 终端输出到 stderr，stdout 留给报告
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    // 文件日志层 - 仅在配置了目录时启用
    let file_layer = match (&config.dir, config.enabled) {
        (Some(dir), true) => {
            let writer = SizeRotatingWriter::new(Path::new(dir), config.max_size_mb)
                .with_context(|| format!("cannot open log directory {}", dir))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;
    Ok(())
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    // .env 不存在时忽略
    dotenvy::dotenv().ok();

    let mut settings = Settings::load(cli.settings.as_deref())?;
    if let Some(local) = &cli.local {
        settings.local_directory = Some(local.clone());
    }
    if let Some(remote) = &cli.remote {
        settings.ftp.directory = Some(remote.clone());
    }
    if let Some(direction) = cli.direction {
        settings.direction = direction;
    }
    if let Some(concurrency) = cli.concurrency {
        settings.concurrency = concurrency;
    }
    settings.apply_env();
    settings.validate()?;
    Ok(settings)
}

fn print_report(report: &SyncReport) {
    let verb = if report.dry_run { "planned" } else { "done" };
    println!(
        "ftpsync {} ({}): {} -> {}",
        report.direction, verb, report.source_root, report.destination_root
    );
    if report.dry_run {
        println!("  create dirs  {}", report.planned.create_count);
        println!(
            "  transfer     {} ({} bytes)",
            report.planned.transfer_count, report.planned.transfer_bytes
        );
        println!("  quarantine   {}", report.planned.quarantine_count);
    } else {
        println!("  created      {}", report.created);
        println!(
            "  transferred  {} ({} bytes)",
            report.transferred, report.bytes_transferred
        );
        println!("  quarantined  {}", report.quarantined);
    }
    println!("  unchanged    {}", report.skipped);

    if !report.failed.is_empty() {
        println!("  failed       {}", report.failed.len());
        for failure in &report.failed {
            println!("    {}: {}", failure.path, failure.error);
        }
    }
}

async fn run(cli: &Cli, settings: &Settings) -> Result<SyncReport> {
    let (local, remote) = create_storages(settings).await?;
    let engine = SyncEngine::new(settings.sync_config(cli.dry_run));
    let report = engine.run(local, remote).await?;
    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ftpsync: {:#}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    if let Err(e) = init_logging(&settings.log, cli.verbose, cli.quiet) {
        eprintln!("ftpsync: failed to initialize logging: {:#}", e);
    }

    let report = match run(&cli, &settings).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("同步中止: {:#}", e);
            eprintln!("ftpsync: {:#}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("ftpsync: cannot serialize report: {}", e);
                return ExitCode::from(EXIT_FATAL);
            }
        }
    } else {
        print_report(&report);
    }

    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED_ACTIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_overrides() {
        let cli = Cli::try_parse_from([
            "ftpsync",
            "sync.json",
            "--local",
            "/tmp/l",
            "--direction",
            "up",
            "-j",
            "4",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.settings.as_deref(), Some(Path::new("sync.json")));
        assert_eq!(cli.direction, Some(Direction::Up));
        assert_eq!(cli.concurrency, Some(4));
        assert!(cli.dry_run);
    }
}
