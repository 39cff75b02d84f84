use log::{LevelFilter, SetLoggerError, Level};
use env_logger::{Builder, Target};
use std::env;
use std::io::Write;

fn parse_level(value: &str) -> LevelFilter {
    match value.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

pub fn init_logging() -> Result<(), SetLoggerError> {
    let env = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let log_level = parse_level(&env);

    let mut builder = Builder::from_default_env();

    builder.format(|buf, record| {
        let timestamp = buf.timestamp();
        let target = record.target();
        let file = record.file().unwrap_or("unknown");
        let line = record.line().unwrap_or(0);

        match record.level() {
            Level::Info => {
                writeln!(buf, "{} [INFO] [{}]: {}", timestamp, target, record.args())
            }
            level => {
                writeln!(buf,
                    "{} [{}] [{}:{}] {}: {}",
                    timestamp, level, file, line, target, record.args()
                )
            }
        }
    });

    // Filter out noisy modules in production
    if env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string()) == "production" {
        builder.filter_module("reqwest", LevelFilter::Warn);
        builder.filter_module("hyper", LevelFilter::Warn);
        builder.filter_module("tokio", LevelFilter::Info);
        builder.filter_module("sqlx", LevelFilter::Warn);
    }

    builder.filter_level(log_level)
           .target(Target::Stdout)
           .try_init()
}

pub fn log_fetch(kind: &str, id: &str, count: usize, duration_ms: u64) {
    log::info!("[Fetch] Loaded {} {} for '{}' in {}ms", count, kind, id, duration_ms);
}

pub fn log_cache_hit(kind: &str, id: &str) {
    log::debug!("[Cache] Fresh {} for '{}', skipping network", kind, id);
}

pub fn log_mutation(operation: &str, kind: &str, id: &str) {
    log::info!("[Mutation] {} {} '{}'", operation, kind, id);
}

pub fn log_persistence(operation: &str, timestamp: i64, duration_ms: u64) {
    log::debug!("[Storage] {} snapshot {} took {}ms", operation, timestamp, duration_ms);
}
