// src/bin/throttle_bench.rs

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::sync::{Barrier, Semaphore};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use throttle::config::{InMemoryConfig, RedisConfig};
use throttle::resilience::{ResilienceConfig, ResilientStore};
use throttle::storage::{EventStore, MemoryEventStore, RedisEventStore};
use throttle::{RateLimit, RateLimitSet, Throttle};

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "throttle_bench",
    about = "Load-tests a throttle and reports over-admission from racing callers"
)]
struct Opt {
    /// Event store to benchmark
    #[structopt(short, long, possible_values = &["memory", "redis"], default_value = "memory")]
    storage: String,

    /// Redis URL (when using Redis storage)
    #[structopt(long, default_value = "redis://localhost:6379")]
    redis_url: String,

    /// Wrap the store with a circuit breaker and retries
    #[structopt(long)]
    resilient: bool,

    /// Allowed requests per window for every simulated user
    #[structopt(short, long, default_value = "100")]
    max_requests: u64,

    /// Window duration in seconds
    #[structopt(short, long, default_value = "60")]
    window_seconds: u64,

    /// Number of concurrent users to simulate
    #[structopt(short = "u", long, default_value = "10")]
    num_users: usize,

    /// Number of requests per user
    #[structopt(short = "r", long, default_value = "200")]
    requests_per_user: usize,

    /// Maximum number of in-flight requests
    #[structopt(short = "c", long, default_value = "100")]
    concurrency: usize,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Disable logs
    #[structopt(long)]
    disable_logs: bool,
}

#[derive(Debug, Default)]
struct UserResult {
    admitted: u64,
    denied: u64,
    errors: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();

    let log_level = match (opt.disable_logs, opt.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        _ => "debug",
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!(
            "throttle_bench={},throttle={}",
            log_level, log_level
        )))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })?;
    }

    match opt.storage.as_str() {
        "memory" => {
            let store = MemoryEventStore::new(InMemoryConfig {
                max_events: opt.num_users * opt.requests_per_user + 1,
                ..InMemoryConfig::default()
            });
            with_store(store, opt, stop).await
        }
        "redis" => {
            let mut config = RedisConfig::new(opt.redis_url.clone());
            config.pool_size = 20;
            config.connection_timeout = Duration::from_secs(5);
            let store = RedisEventStore::new(config).await?;
            with_store(store, opt, stop).await
        }
        other => Err(format!("Unknown storage backend: {}", other).into()),
    }
}

async fn with_store<S>(
    store: S,
    opt: Opt,
    stop: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>>
where
    S: EventStore + 'static,
{
    if opt.resilient {
        let store = ResilientStore::new(store, ResilienceConfig::default());
        run_benchmark(Throttle::new(store), opt, stop).await
    } else {
        run_benchmark(Throttle::new(store), opt, stop).await
    }
}

async fn run_benchmark<S>(
    throttle: Throttle<S>,
    opt: Opt,
    stop: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>>
where
    S: EventStore + 'static,
{
    let rules = Arc::new(RateLimitSet::from(vec![RateLimit::new(
        opt.window_seconds,
        opt.max_requests,
    )]));
    let throttle = Arc::new(throttle);
    // Fresh throttle id per run so old events never leak into the numbers
    let throttle_id = Arc::new(format!("bench-{}", uuid::Uuid::new_v4()));

    let total = (opt.num_users * opt.requests_per_user) as u64;
    let progress = ProgressBar::new(total);
    let style =
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {per_sec}")?;
    progress.set_style(style);

    info!(
        users = opt.num_users,
        requests_per_user = opt.requests_per_user,
        rule = %rules.as_slice()[0],
        "Starting benchmark"
    );

    let barrier = Arc::new(Barrier::new(opt.num_users));
    let semaphore = Arc::new(Semaphore::new(opt.concurrency.max(1)));
    let started = Instant::now();
    let mut handles = Vec::with_capacity(opt.num_users);

    for user in 0..opt.num_users {
        let throttle = Arc::clone(&throttle);
        let rules = Arc::clone(&rules);
        let throttle_id = Arc::clone(&throttle_id);
        let barrier = Arc::clone(&barrier);
        let semaphore = Arc::clone(&semaphore);
        let stop = Arc::clone(&stop);
        let progress = progress.clone();
        let requests = opt.requests_per_user;

        handles.push(tokio::spawn(async move {
            let requestor_id = format!("user_{}", user);
            let mut result = UserResult::default();
            barrier.wait().await;

            // Each request holds a permit, so in-flight calls race each other
            let mut in_flight = Vec::with_capacity(requests);
            for _ in 0..requests {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let throttle = Arc::clone(&throttle);
                let rules = Arc::clone(&rules);
                let throttle_id = Arc::clone(&throttle_id);
                let requestor_id = requestor_id.clone();
                let progress = progress.clone();
                in_flight.push(tokio::spawn(async move {
                    let outcome = throttle.process(&requestor_id, &throttle_id, &rules).await;
                    progress.inc(1);
                    drop(permit);
                    outcome
                }));
            }

            for outcome in futures::future::join_all(in_flight).await {
                match outcome {
                    Ok(Ok(violated)) if violated.is_empty() => result.admitted += 1,
                    Ok(Ok(_)) => result.denied += 1,
                    Ok(Err(e)) => {
                        warn!("Throttle error: {}", e);
                        result.errors += 1;
                    }
                    Err(e) => {
                        warn!("Request task failed: {}", e);
                        result.errors += 1;
                    }
                }
            }

            result
        }));
    }

    let mut admitted = 0;
    let mut denied = 0;
    let mut errors = 0;
    let mut over_admitted = 0;
    for handle in futures::future::join_all(handles).await {
        let result = handle?;
        admitted += result.admitted;
        denied += result.denied;
        errors += result.errors;
        over_admitted += result.admitted.saturating_sub(opt.max_requests);
    }
    progress.finish();

    let elapsed = started.elapsed();
    let completed = admitted + denied + errors;

    if stop.load(Ordering::SeqCst) {
        println!("\nInterrupted; partial results:");
    }
    println!("\nBenchmark Results ({} store):", opt.storage);
    println!("  Requests:       {}", completed);
    println!("  Admitted:       {}", admitted);
    println!("  Denied:         {}", denied);
    println!("  Errors:         {}", errors);
    println!("  Over-admitted:  {}", over_admitted);
    println!("  Elapsed:        {:?}", elapsed);
    println!(
        "  Throughput:     {:.2} requests/second",
        completed as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    Ok(())
}
