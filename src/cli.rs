use crate::{
    browser::Browser,
    config::Config,
    dates::{Clock, FixedClock, SystemClock},
    extract,
    fetch::HttpFetcher,
    filter,
    paginate,
    report::RunReport,
    session::Session,
    sink::JsonDirSink,
    util::{ensure_dir, now_rfc3339},
    workflow::{AbortFlag, BatchOutcome, CaptureWorkflow, HaltReason},
};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Iso8601;
use time::Date;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "ecourts-capture")]
#[command(about = "Capture eCourts cause-list cases listed for today or tomorrow")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./ecourts-capture.toml (or the example file) when present, else built-in defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a browser session, load the portal and report what was found.
    Doctor {},
    /// Extract listing rows from a saved cause-list page.
    Rows {
        #[arg(long)]
        input: PathBuf,
        /// Reference date (YYYY-MM-DD) for the hearing filter.
        #[arg(long, value_parser = parse_date)]
        today: Option<Date>,
    },
    /// Extract case fields and attachment links from a saved detail page.
    Extract {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Full capture run against the live portal.
    Run {
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long, value_parser = parse_date)]
        today: Option<Date>,
    },
}

fn parse_date(s: &str) -> std::result::Result<Date, String> {
    Date::parse(s.trim(), &Iso8601::DATE).map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

pub async fn dispatch(args: Args) -> Result<()> {
    let cfg = load_config(args.config.as_deref())?;

    match &args.cmd {
        Command::Doctor {} => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            doctor(&cfg).await
        }
        Command::Rows { input, today } => {
            let _guard = init_logging(&args, &cfg, None)?;
            rows(&cfg, input, *today)
        }
        Command::Extract { input, base_url } => {
            let _guard = init_logging(&args, &cfg, None)?;
            extract_detail(input, base_url.as_deref())
        }
        Command::Run { out_dir, today } => run(&args, &cfg, out_dir.as_deref(), *today).await,
    }
}

fn load_config(user: Option<&Path>) -> Result<Config> {
    // An explicit --config must exist; the default locations are optional.
    if let Some(p) = user {
        return Config::load(p);
    }
    let candidates = [
        PathBuf::from("ecourts-capture.toml"),
        PathBuf::from("ecourts-capture.example.toml"),
    ];
    let (cfg, _) = Config::load_first(&candidates)?;
    Ok(cfg)
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

async fn doctor(cfg: &Config) -> Result<()> {
    let download_dir = PathBuf::from(&cfg.paths.download_dir);
    ensure_dir(&download_dir)?;
    let session = Session::open(cfg, &download_dir).await?;
    let check = match session.load_portal(cfg).await {
        Ok(()) => session.inspect(cfg).await,
        Err(e) => Err(e),
    };
    session.close().await;
    println!("{}", serde_json::to_string_pretty(&check?)?);
    Ok(())
}

fn rows(cfg: &Config, input: &Path, today: Option<Date>) -> Result<()> {
    let html = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let today = today.unwrap_or_else(|| clock_for(cfg).today());
    let rows = extract::listing_rows(&html);
    let in_scope = filter::in_scope(&rows, today);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "today": today,
            "rows": rows,
            "in_scope": in_scope,
        }))?
    );
    Ok(())
}

fn extract_detail(input: &Path, base_url: Option<&str>) -> Result<()> {
    let html = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let text = extract::page_text(&html);
    let detail = extract::case_detail(&text);
    let links = extract::document_links(&html, base_url.unwrap_or_default());
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "detail": detail,
            "document_links": links,
        }))?
    );
    Ok(())
}

fn clock_for(cfg: &Config) -> SystemClock {
    SystemClock::with_offset_minutes(cfg.schedule.utc_offset_minutes)
}

async fn run(args: &Args, cfg: &Config, out_override: Option<&Path>, today: Option<Date>) -> Result<()> {
    let out_root = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    let run_id = format!("run_{}", time::OffsetDateTime::now_utc().unix_timestamp());
    let run_dir = out_root.join(&run_id);
    ensure_dir(&run_dir)?;
    ensure_dir(&run_dir.join("logs"))?;

    let log_path = resolve_log_path(cfg, Some(&run_dir));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    info!("run_id={run_id} out={}", run_dir.display());

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(run_dir.join("effective-config.toml"), raw)?;
    }

    let download_dir = PathBuf::from(&cfg.paths.download_dir);
    ensure_dir(&download_dir)?;

    let today = match today {
        Some(d) => FixedClock(d).today(),
        None => clock_for(cfg).today(),
    };
    let fetcher = HttpFetcher::new(&cfg.browser.user_agent)?;

    let abort = AbortFlag::default();
    {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; stopping at the next safe point");
                abort.request();
            }
        });
    }

    let started = now_rfc3339();
    let session = Session::open(cfg, &download_dir).await?;
    let result = drive(cfg, &session, &fetcher, &run_dir, &download_dir, today, abort).await;
    session.close().await;

    let (pages, rows_seen, rows_in_scope, batch) = result?;
    let report = RunReport::new(
        started,
        now_rfc3339(),
        today,
        pages,
        rows_seen,
        rows_in_scope,
        batch,
    );

    if cfg.output.write_report_json {
        std::fs::write(
            run_dir.join(&cfg.output.report_filename),
            serde_json::to_string_pretty(&report)?,
        )?;
    }

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "run_id": run_id,
                "run_dir": run_dir,
                "rows_seen": report.rows_seen,
                "rows_in_scope": report.rows_in_scope,
                "completed": report.completed,
                "failed_no_action": report.failed_no_action,
                "unattempted": report.unattempted.len(),
                "halted": report.halted,
            }))?
        );
    }

    if let Some(HaltReason::SessionLost(msg)) = &report.halted {
        bail!("browser session lost mid-batch: {msg}");
    }
    Ok(())
}

type Driven = (u32, usize, usize, BatchOutcome);

async fn drive<B: Browser>(
    cfg: &Config,
    session: &Session<B>,
    fetcher: &HttpFetcher,
    run_dir: &Path,
    download_dir: &Path,
    today: Date,
    abort: AbortFlag,
) -> Result<Driven> {
    session.load_portal(cfg).await?;

    let Some(answer) = solve_captcha(cfg, session, fetcher, run_dir, &abort).await? else {
        warn!("aborted at the CAPTCHA prompt");
        return Ok(aborted_early());
    };
    session.submit_captcha(cfg, &answer).await?;
    if abort.is_requested() {
        warn!("aborted before reading the listing");
        return Ok(aborted_early());
    }

    let listing = paginate::collect_rows(
        session.browser(),
        cfg.limits.max_pages,
        cfg.timing.after_page_ms,
    )
    .await
    .with_context(|| "paginating results")?;
    let in_scope = filter::in_scope(&listing.rows, today);
    info!(
        "{} rows over {} pages; {} listed for {today} or the next day",
        listing.rows.len(),
        listing.pages,
        in_scope.len()
    );
    if in_scope.is_empty() {
        warn!("no cases with a next hearing today or tomorrow");
    }

    let mut sink = JsonDirSink::new(&run_dir.join("cases"))?;
    let rows_in_scope = in_scope.len();
    let batch = CaptureWorkflow::new(cfg, session.browser(), fetcher, &mut sink, download_dir)
        .with_abort(abort)
        .with_debug_dir(Some(run_dir.join("debug")))
        .with_page_index(listing.index.clone())
        .run(in_scope)
        .await;

    Ok((listing.pages, listing.rows.len(), rows_in_scope, batch))
}

fn aborted_early() -> Driven {
    let batch = BatchOutcome {
        halted: Some(HaltReason::Aborted),
        ..BatchOutcome::default()
    };
    (0, 0, 0, batch)
}

/// Show the CAPTCHA as a file and read the answer from stdin. An empty line
/// fetches a fresh image. `None` when the run was aborted while waiting.
async fn solve_captcha<B: Browser>(
    cfg: &Config,
    session: &Session<B>,
    fetcher: &HttpFetcher,
    run_dir: &Path,
    abort: &AbortFlag,
) -> Result<Option<String>> {
    let image_path = run_dir.join("captcha.png");
    let mut lines = stdin_lines();
    loop {
        let challenge = session.captcha_challenge(cfg, fetcher).await?;
        std::fs::write(&image_path, &challenge.image)
            .with_context(|| format!("writing {}", image_path.display()))?;
        eprintln!(
            "CAPTCHA saved to {}. Type the answer and press Enter (empty line for a new image):",
            image_path.display()
        );
        let Some(read) = abort.until_abort(lines.recv()).await else {
            return Ok(None);
        };
        let Some(line) = read else {
            bail!("stdin closed before a CAPTCHA answer was given");
        };
        let line = line.with_context(|| "reading stdin")?;
        let answer = line.trim();
        if !answer.is_empty() {
            return Ok(Some(answer.to_string()));
        }
        info!("refreshing captcha");
    }
}

/// Stdin lines from a detached thread, so an abandoned read never holds up
/// runtime shutdown.
fn stdin_lines() -> mpsc::UnboundedReceiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn resolve_log_path(cfg: &Config, run_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    if let Some(run_dir) = run_dir {
        return Some(run_dir.join("logs").join("ecourts-capture.log"));
    }

    Some(PathBuf::from(&cfg.paths.out_dir).join("ecourts-capture.log"))
}
