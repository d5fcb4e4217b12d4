use clap::{Parser, ValueEnum};
use pkg_allocation::RetryPolicy;
use pkg_api::server::{ServerConfig, start_server};
use pkg_constants::network::{DEFAULT_API_PORT, DEFAULT_JOIN_TOKEN};
use pkg_constants::paths::{DEFAULT_SERVER_CONFIG, DEFAULT_SERVER_DATA_DIR};
use pkg_constants::pool::{CLAIM_RECONCILE_INTERVAL_SECS, POOL_RECONCILE_INTERVAL_SECS};
use pkg_types::config::{ServerConfigFile, load_config_file};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "poolrs-server", about = "poolrs resource pool server")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_SERVER_CONFIG)]
    config: String,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Directory for SlateDB state storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Bearer token required by the API
    #[arg(long)]
    token: Option<String>,

    /// Identity used for leader election (random when unset)
    #[arg(long)]
    server_id: Option<String>,

    /// Keep all state in memory
    #[arg(long)]
    in_memory: bool,

    /// Pool controller resync interval in seconds
    #[arg(long)]
    pool_resync_secs: Option<u64>,

    /// Claim controller resync interval in seconds
    #[arg(long)]
    claim_resync_secs: Option<u64>,

    /// Attempts per compare-and-swap loop
    #[arg(long)]
    conflict_retry_attempts: Option<u32>,

    /// First conflict backoff in milliseconds
    #[arg(long)]
    conflict_retry_backoff_ms: Option<u64>,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    // Load config file (returns defaults if file not found)
    let file_cfg: ServerConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);

    // Merge: CLI args > config file > defaults
    let port = cli.port.or(file_cfg.port).unwrap_or(DEFAULT_API_PORT);
    let data_dir = cli
        .data_dir
        .or(file_cfg.data_dir)
        .unwrap_or_else(|| DEFAULT_SERVER_DATA_DIR.to_string());
    let token = cli
        .token
        .or(file_cfg.token)
        .unwrap_or_else(|| DEFAULT_JOIN_TOKEN.to_string());
    let server_id = cli
        .server_id
        .or(file_cfg.server_id)
        .unwrap_or_else(|| format!("poolrs-{}", uuid::Uuid::new_v4()));
    let in_memory = cli.in_memory || file_cfg.in_memory.unwrap_or(false);
    let pool_resync = cli
        .pool_resync_secs
        .or(file_cfg.pool_resync_secs)
        .unwrap_or(POOL_RECONCILE_INTERVAL_SECS);
    let claim_resync = cli
        .claim_resync_secs
        .or(file_cfg.claim_resync_secs)
        .unwrap_or(CLAIM_RECONCILE_INTERVAL_SECS);

    let mut retry = RetryPolicy::default();
    if let Some(attempts) = cli.conflict_retry_attempts.or(file_cfg.conflict_retry_attempts) {
        retry = retry.with_attempts(attempts);
    }
    if let Some(ms) = cli
        .conflict_retry_backoff_ms
        .or(file_cfg.conflict_retry_backoff_ms)
    {
        retry = retry.with_initial_backoff(Duration::from_millis(ms));
    }

    info!("Starting poolrs-server");
    info!("  Port:      {}", port);
    info!("  Data dir:  {}", if in_memory { "<memory>" } else { data_dir.as_str() });
    info!("  Server id: {}", server_id);
    info!("  Token:     {}***", token.chars().take(4).collect::<String>());
    info!("  Resync:    pools {}s, claims {}s", pool_resync, claim_resync);

    let config = ServerConfig {
        addr: SocketAddr::from(([0, 0, 0, 0], port)),
        data_dir,
        join_token: token,
        server_id,
        in_memory,
        pool_resync: Duration::from_secs(pool_resync),
        claim_resync: Duration::from_secs(claim_resync),
        retry,
    };

    start_server(config).await?;

    Ok(())
}
