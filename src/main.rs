use anyhow::{Context, Result};
use clap::Parser;
use rowcheck::presentation::cli_summary::{print_perf_summary, print_summary};
use rowcheck::presentation::writers::{all_writers, write_fix_file, write_to_file, writer_for};
use rowcheck::{init_tracing, AppConfig, LogLevel};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(
    name = "rowcheck",
    version,
    about = "rowcheck: reconcile migrated SQL tables against their source, row by row."
)]
struct Cli {
    /// Config file. Defaults to ./rowcheck.toml, then the user config directory.
    #[arg(short, long)]
    config: Option<String>,

    /// Print the summary only, write no files.
    #[arg(long)]
    dry_run: bool,

    /// Output to write: json (run report), sql (fix file) or all.
    #[arg(short, long, default_value = "all")]
    format: String,

    /// Only reconcile this table (repeatable).
    #[arg(short, long = "table", value_name = "NAME")]
    tables: Vec<String>,

    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(if cli.verbose {
        LogLevel::Debug
    } else if cli.quiet {
        LogLevel::Error
    } else {
        LogLevel::Info
    });

    let cfg = AppConfig::load(cli.config.as_deref())?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping at the next chunk boundary");
            on_signal.cancel();
        }
    });

    let (report, perf) = rowcheck::run_filtered(&cfg, &cli.tables, &cancel).await?;

    print_summary(&report);
    if !cli.quiet {
        print_perf_summary(&perf);
    }

    if !cli.dry_run {
        let writers = match cli.format.as_str() {
            "all" => all_writers(),
            fmt => vec![writer_for(fmt).ok_or_else(|| anyhow::anyhow!("Unknown format: {}", fmt))?],
        };
        for writer in writers {
            if writer.extension() == "sql" {
                // The fix file lives at its configured path, not under output.dir
                if !cfg.fix.enabled {
                    continue;
                }
                let path = write_fix_file(&report, &cfg.fix.path)?;
                println!("Fix statements written to {}", path.display());
            } else {
                let path = write_to_file(&*writer, &report, &cfg.output.dir)
                    .with_context(|| format!("Failed to write {} report", writer.extension()))?;
                println!("Report written to {}", path.display());
            }
        }
    }

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}
