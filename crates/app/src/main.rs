use std::fmt;
use std::io::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use olympiad_core::model::SessionId;
use services::{Clock, HttpSessionApi, PageData, SessionTimer, TimerConfig, TimerFrame, TimerView};
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt as log_fmt};
use url::Url;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    MissingSessionId,
    InvalidSessionId { raw: String },
    InvalidMinutes { raw: String },
    InvalidTimestamp { flag: &'static str, raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::MissingSessionId => write!(f, "--session-id or --page is required"),
            ArgsError::InvalidSessionId { raw } => write!(f, "invalid --session-id value: {raw}"),
            ArgsError::InvalidMinutes { raw } => {
                write!(f, "invalid --remaining-minutes value: {raw}")
            }
            ArgsError::InvalidTimestamp { flag, raw } => {
                write!(f, "invalid {flag} value (expected RFC 3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- --session-id <id> --remaining-minutes <m> [options]");
    eprintln!("  cargo run -p app -- --page <page.json> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --base-url <url>          server root (default http://localhost:8000/)");
    eprintln!("  --starts-at <rfc3339>     session start");
    eprintln!("  --ends-at <rfc3339>       session end, overrides --remaining-minutes");
    eprintln!("  --csrf-token <token>      value of the csrfmiddlewaretoken field");
    eprintln!("  --cookie <header>         raw Cookie header, used for csrftoken fallback");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  OLYMPIAD_BASE_URL, OLYMPIAD_SESSION_ID, OLYMPIAD_CSRF_TOKEN,");
    eprintln!("  OLYMPIAD_TICK_MS, OLYMPIAD_RECONCILE_SECS, OLYMPIAD_DRIFT_TOLERANCE_SECS,");
    eprintln!("  OLYMPIAD_GRACE_SECS, OLYMPIAD_FINISH_ATTEMPTS, RUST_LOG");
}

struct Args {
    base_url: Option<String>,
    page: PageData,
}

fn parse_timestamp(flag: &'static str, raw: String) -> Result<DateTime<Utc>, ArgsError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| ArgsError::InvalidTimestamp { flag, raw })
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut base_url = None;
        let mut page_path = None;
        let mut session_id = std::env::var("OLYMPIAD_SESSION_ID").ok();
        let mut remaining_minutes = None;
        let mut starts_at = None;
        let mut ends_at = None;
        let mut csrf_token = std::env::var("OLYMPIAD_CSRF_TOKEN").ok();
        let mut cookie = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--base-url" => base_url = Some(require_value(args, "--base-url")?),
                "--page" => page_path = Some(require_value(args, "--page")?),
                "--session-id" => session_id = Some(require_value(args, "--session-id")?),
                "--remaining-minutes" => {
                    let value = require_value(args, "--remaining-minutes")?;
                    let minutes: f64 = value
                        .trim()
                        .parse()
                        .map_err(|_| ArgsError::InvalidMinutes { raw: value.clone() })?;
                    remaining_minutes = Some(minutes);
                }
                "--starts-at" => {
                    let value = require_value(args, "--starts-at")?;
                    starts_at = Some(parse_timestamp("--starts-at", value)?);
                }
                "--ends-at" => {
                    let value = require_value(args, "--ends-at")?;
                    ends_at = Some(parse_timestamp("--ends-at", value)?);
                }
                "--csrf-token" => csrf_token = Some(require_value(args, "--csrf-token")?),
                "--cookie" => cookie = Some(require_value(args, "--cookie")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg).into()),
            }
        }

        if let Some(path) = page_path {
            let raw = std::fs::read_to_string(&path)?;
            return Ok(Self {
                base_url,
                page: PageData::from_json(&raw)?,
            });
        }

        let raw_id = session_id.ok_or(ArgsError::MissingSessionId)?;
        let id: SessionId = raw_id
            .parse()
            .map_err(|_| ArgsError::InvalidSessionId { raw: raw_id.clone() })?;

        let mut page = PageData::new(id);
        page.remaining_minutes = remaining_minutes;
        page.starts_at = starts_at;
        page.ends_at = ends_at;
        page.csrf_token = csrf_token;
        page.cookie = cookie;

        Ok(Self { base_url, page })
    }
}

/// Draws the countdown on a single terminal line.
#[derive(Default)]
struct TerminalView;

impl TimerView for TerminalView {
    fn render(&self, frame: &TimerFrame) {
        let mut out = std::io::stdout().lock();
        let pulse = if frame.pulse_started { " !" } else { "" };
        // Best effort: a closed stdout must not stop the countdown.
        let _ = write!(
            out,
            "\r{} {} [{:>5.1}%] {:?}{pulse}   ",
            frame.phase.label(),
            frame.text,
            frame.progress_percent(),
            frame.urgency,
        );
        let _ = out.flush();
    }

    fn show_terminal_message(&self, message: &str) {
        println!();
        println!("{message}");
    }

    fn navigate(&self, url: &Url) {
        println!("Results: {url}");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                warn!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let mut config = TimerConfig::from_env()?;
    if let Some(raw) = parsed.base_url.as_deref() {
        config = config.with_base_url(raw)?;
    }

    let api = Arc::new(HttpSessionApi::new(&config)?);
    let view = Arc::new(TerminalView);
    let Some(timer) = SessionTimer::mount(&parsed.page, Clock::system(), config, api, view)? else {
        info!("page has no timer mount; nothing to do");
        return Ok(());
    };

    timer.start();
    tokio::select! {
        () = timer.join() => {}
        () = shutdown_signal() => timer.dispose(),
    }
    timer.join().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    log_fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
