// src/bin/throttle_cli.rs

use chrono::{TimeZone, Utc};
use prettytable::{row, Table};
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::time;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use throttle::config::{InMemoryConfig, RedisConfig};
use throttle::storage::{EventStore, MemoryEventStore, RedisEventStore};
use throttle::{Decision, RateLimit, RateLimitSet, Throttle};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "throttle_cli",
    about = "Replays request patterns against a sliding-window throttle"
)]
struct Opt {
    /// Event store to record into
    #[structopt(short, long, possible_values = &["memory", "redis"], default_value = "memory")]
    storage: String,

    /// Redis URL; falls back to THROTTLE_REDIS_URL
    #[structopt(long)]
    redis_url: Option<String>,

    /// Identity of the caller being throttled
    #[structopt(short, long, default_value = "default_user")]
    requestor: String,

    /// Name of the throttle policy
    #[structopt(short, long, default_value = "default")]
    throttle: String,

    /// Rate limit as <window_seconds>:<max_requests>; repeat for several rules
    #[structopt(short = "l", long = "rule", default_value = "60:10")]
    rules: Vec<RateLimit>,

    /// Simulation mode
    #[structopt(
        long,
        possible_values = &["burst", "steady", "interactive"],
        default_value = "burst"
    )]
    simulation: String,

    /// Number of requests to simulate
    #[structopt(short = "n", long, default_value = "20")]
    num_requests: usize,

    /// Time between requests in milliseconds (steady mode)
    #[structopt(short = "i", long, default_value = "500")]
    request_interval_ms: u64,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Disable logs
    #[structopt(long)]
    disable_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();

    let log_level = match (opt.disable_logs, opt.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!(
            "throttle_cli={},throttle={}",
            log_level, log_level
        )))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let rules = RateLimitSet::from(opt.rules.clone());
    info!(
        storage = %opt.storage,
        throttle_id = %opt.throttle,
        requestor_id = %opt.requestor,
        rules = ?rules.as_slice(),
        "Starting throttle CLI"
    );

    match opt.storage.as_str() {
        "memory" => {
            let store = MemoryEventStore::new(InMemoryConfig::default());
            run_simulation(&opt, Throttle::new(store), &rules).await
        }
        "redis" => {
            let config = match &opt.redis_url {
                Some(url) => RedisConfig::new(url.clone()),
                None => RedisConfig::from_env()?,
            };
            let store = RedisEventStore::new(config).await.map_err(|e| {
                error!("Failed to connect to Redis: {}", e);
                e
            })?;
            run_simulation(&opt, Throttle::new(store), &rules).await
        }
        other => {
            error!("Unknown storage backend: {}", other);
            Err(format!("Unknown storage backend: {}", other).into())
        }
    }
}

struct Tally {
    table: Table,
    admitted: usize,
    denied: usize,
    started: Instant,
}

impl Tally {
    fn new() -> Self {
        let mut table = Table::new();
        table.add_row(row!["#", "Recorded at (UTC)", "Decision", "Violated rules"]);
        Self {
            table,
            admitted: 0,
            denied: 0,
            started: Instant::now(),
        }
    }

    fn add(&mut self, request: usize, decision: &Decision) {
        let when = Utc
            .timestamp_opt(decision.recorded_at as i64, 0)
            .single()
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| decision.recorded_at.to_string());

        let violated = decision
            .violated
            .iter()
            .map(|rule| rule.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        if decision.admitted() {
            self.admitted += 1;
            info!("Request {}: ADMITTED", request);
            self.table.add_row(row![request, when, "admitted", "-"]);
        } else {
            self.denied += 1;
            warn!("Request {}: DENIED ({})", request, violated);
            self.table.add_row(row![request, when, "denied", violated]);
        }
    }

    fn print(&self, title: &str) {
        println!("\n{}", title);
        self.table.printstd();

        let mut summary = Table::new();
        summary.add_row(row!["Total", self.admitted + self.denied]);
        summary.add_row(row!["Admitted", self.admitted]);
        summary.add_row(row!["Denied", self.denied]);
        summary.add_row(row!["Elapsed", format!("{:?}", self.started.elapsed())]);
        summary.printstd();
    }
}

async fn run_simulation<S>(
    opt: &Opt,
    throttle: Throttle<S>,
    rules: &RateLimitSet,
) -> Result<(), Box<dyn std::error::Error>>
where
    S: EventStore,
{
    match opt.simulation.as_str() {
        "burst" => simulate_burst(opt, &throttle, rules).await,
        "steady" => simulate_steady(opt, &throttle, rules).await,
        "interactive" => simulate_interactive(opt, &throttle, rules).await,
        other => {
            error!("Unknown simulation mode: {}", other);
            Err("Unknown simulation mode".into())
        }
    }
}

// Fire every request back to back
async fn simulate_burst<S: EventStore>(
    opt: &Opt,
    throttle: &Throttle<S>,
    rules: &RateLimitSet,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut tally = Tally::new();

    for i in 1..=opt.num_requests {
        let decision = throttle.check(&opt.requestor, &opt.throttle, rules).await?;
        tally.add(i, &decision);
    }

    tally.print("Burst Simulation Results");
    Ok(())
}

// One request every `request_interval_ms`
async fn simulate_steady<S: EventStore>(
    opt: &Opt,
    throttle: &Throttle<S>,
    rules: &RateLimitSet,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut tally = Tally::new();
    let mut interval = time::interval(Duration::from_millis(opt.request_interval_ms.max(1)));

    for i in 1..=opt.num_requests {
        interval.tick().await;
        let decision = throttle.check(&opt.requestor, &opt.throttle, rules).await?;
        tally.add(i, &decision);
    }

    tally.print("Steady Simulation Results");
    Ok(())
}

// One request per Enter key press
async fn simulate_interactive<S: EventStore>(
    opt: &Opt,
    throttle: &Throttle<S>,
    rules: &RateLimitSet,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Press Enter to make a request, or type 'quit' to exit");

    let mut tally = Tally::new();
    let mut input_buffer = String::new();
    let mut request = 0;

    loop {
        input_buffer.clear();
        if std::io::stdin().read_line(&mut input_buffer)? == 0 {
            break;
        }

        let trimmed = input_buffer.trim();
        if trimmed == "quit" || trimmed == "exit" || trimmed == "q" {
            break;
        }

        request += 1;
        let decision = throttle.check(&opt.requestor, &opt.throttle, rules).await?;
        if decision.admitted() {
            println!("ADMITTED");
        } else {
            println!("DENIED by {:?}", decision.violated.as_slice());
        }
        tally.add(request, &decision);
    }

    tally.print("Interactive Simulation Results");
    Ok(())
}
