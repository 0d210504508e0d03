use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use logscout::discover;
use logscout::events::{FileStatus, ScanEvent, TotalsSnapshot};
use logscout::notify::{Notifier, WebhookNotifier};
use logscout::pattern::LinePattern;
use logscout::pause::PauseController;
use logscout::pipeline::{self, ScanOptions};
use logscout::ScanConfig;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Pattern to match against each line (literal or regex)
    #[arg(short, long)]
    pattern: Option<String>,

    /// Glob patterns naming the files to scan
    #[arg(value_name = "GLOB")]
    paths: Vec<String>,

    /// Number of scan workers (default: CPU cores)
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Interval between progress snapshots (e.g. 200ms, 1s)
    #[arg(long, value_parser = humantime::parse_duration)]
    tick: Option<Duration>,

    /// Longest line to buffer, in bytes
    #[arg(long)]
    max_line_len: Option<usize>,

    /// Webhook URL notified on every match
    #[arg(long)]
    webhook: Option<String>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show only per-file results and the final summary, not match lines
    #[arg(short, long)]
    stats: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config = ScanConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;

    let mut cli_config = ScanConfig::default();
    if let Some(pattern) = cli.pattern.clone() {
        cli_config.pattern = pattern;
    }
    if !cli.paths.is_empty() {
        cli_config.paths = cli.paths.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        cli_config.concurrency = concurrency;
    }
    if let Some(tick) = cli.tick {
        cli_config.tick_interval_ms = tick.as_millis() as u64;
    }
    if let Some(max_line_len) = cli.max_line_len {
        cli_config.max_line_len = max_line_len;
    }
    cli_config.webhook_url = cli.webhook.clone();
    if let Some(log_level) = cli.log_level.clone() {
        cli_config.log_level = log_level;
    }
    let config = file_config.merge_with_cli(cli_config);

    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let pattern = LinePattern::compile(&config.pattern)
        .with_context(|| format!("cannot compile pattern '{}'", config.pattern))?;
    let files = discover::expand_patterns(&config.paths)?;
    if files.is_empty() {
        bail!("no files matched {:?}", config.paths);
    }
    tracing::debug!(
        "Resolved {} file(s), {} worker(s), tick {:?}",
        files.len(),
        config.concurrency,
        config.tick_interval()
    );

    let notifier = config
        .webhook_url
        .as_ref()
        .map(|url| Arc::new(WebhookNotifier::new(url.clone())) as Arc<dyn Notifier>);

    let (events, handle) = pipeline::start(ScanOptions {
        files,
        pattern,
        concurrency: config.concurrency,
        tick_interval: config.tick_interval(),
        max_line_len: config.max_line_len,
        notifier,
    });

    // Pause/resume from stdin while the scan runs: 'p' + Enter pauses,
    // 'r' + Enter resumes. The thread ends on EOF, so piped stdin is fine.
    spawn_pause_control(handle.pause_controller());

    let mut failures: Vec<(PathBuf, String)> = Vec::new();
    let mut final_totals: Option<TotalsSnapshot> = None;
    let mut progress_shown = false;

    for event in events {
        match event {
            ScanEvent::Match(m) => {
                if !cli.stats {
                    clear_progress(&mut progress_shown);
                    println!(
                        "{} {} {}",
                        format!("{:>6}", m.seq).dimmed(),
                        format!("{}:", m.path.display()).cyan(),
                        m.line
                    );
                }
            }
            ScanEvent::File(update) => match update.status {
                FileStatus::Wait => {}
                FileStatus::Done => {
                    clear_progress(&mut progress_shown);
                    println!(
                        "{} {} ({} lines, {} matches)",
                        "DONE".green().bold(),
                        update.path.display(),
                        update.lines,
                        update.matches
                    );
                }
                FileStatus::Fail => {
                    clear_progress(&mut progress_shown);
                    let reason = update.err.unwrap_or_else(|| "unknown error".to_string());
                    println!(
                        "{} {} ({})",
                        "FAIL".red().bold(),
                        update.path.display(),
                        reason
                    );
                    failures.push((update.path, reason));
                }
            },
            ScanEvent::Totals(snapshot) => {
                if snapshot.done {
                    final_totals = Some(snapshot);
                } else {
                    show_progress(&snapshot, &mut progress_shown);
                }
            }
        }
    }
    clear_progress(&mut progress_shown);
    handle.join();

    if let Some(totals) = final_totals {
        print_summary(&totals, &failures);
        if let Some(err) = totals.err {
            bail!(err);
        }
    }
    Ok(())
}

fn spawn_pause_control(pause: Arc<PauseController>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "p" | "pause" => {
                    pause.set_paused(true);
                    eprintln!("{}", "scan paused ('r' + Enter to resume)".yellow());
                }
                "r" | "resume" => {
                    pause.set_paused(false);
                    eprintln!("{}", "scan resumed".yellow());
                }
                _ => {}
            }
        }
    });
}

fn show_progress(snapshot: &TotalsSnapshot, progress_shown: &mut bool) {
    eprint!(
        "\r{} {}/{} files, {} lines, {} matches",
        "scanning".dimmed(),
        snapshot.files_done,
        snapshot.files_total,
        snapshot.lines_total,
        snapshot.matches_total
    );
    let _ = std::io::stderr().flush();
    *progress_shown = true;
}

fn clear_progress(progress_shown: &mut bool) {
    if *progress_shown {
        eprint!("\r{:<70}\r", "");
        let _ = std::io::stderr().flush();
        *progress_shown = false;
    }
}

fn print_summary(totals: &TotalsSnapshot, failures: &[(PathBuf, String)]) {
    let ok = totals.files_done.saturating_sub(failures.len());
    println!();
    println!(
        "{} {} files ({} ok, {} failed)",
        "scanned".bold(),
        totals.files_total,
        ok,
        failures.len()
    );
    println!("total lines:   {}", totals.lines_total);
    println!("total matches: {}", totals.matches_total);
}
