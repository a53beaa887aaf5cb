use clap::{Parser, ValueEnum, builder::BoolishValueParser};
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tse_core::PipelineConfig;
use tse_core::config::{
    DEFAULT_CALL_TIMEOUT,
    DEFAULT_DISAMBIGUATION_THRESHOLD,
    DEFAULT_HISTORY_DAYS,
    DEFAULT_MAX_HISTORY_SPAN_DAYS,
    DEFAULT_REFRESH_INTERVAL,
    DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SEARCH_LIMIT,
};
use tse_core::fetcher::RetryPolicy;
use tse_mcp::server::McpHttpServerConfig;
use tse_store::schema::{DEFAULT_UPSTREAM_BASE_URL, PATH_LISTING};

const DEFAULT_MCP_HTTP_ADDR: &str = "127.0.0.1:4020";
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 250;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 4_000;

/// How the daemon talks MCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Stdio,
    Http,
}

/// Log line encoding written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "tse-mcpd", version, about = "Tehran Stock Exchange MCP daemon.")]
struct CliArgs {
    #[arg(long, env = "TSE_TRANSPORT", value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    #[arg(long, env = "TSE_MCP_HTTP_ADDR", default_value = DEFAULT_MCP_HTTP_ADDR)]
    mcp_http_addr: SocketAddr,

    #[arg(
        long,
        env = "TSE_MCP_STATEFUL",
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    mcp_stateful: bool,

    #[arg(long, env = "TSE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[arg(long, env = "TSE_UPSTREAM_BASE_URL", default_value = DEFAULT_UPSTREAM_BASE_URL)]
    upstream_base_url: String,

    #[arg(long, env = "TSE_LISTING_PATH", default_value = PATH_LISTING)]
    listing_path: String,

    #[arg(long, env = "TSE_REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    request_timeout_secs: u64,

    #[arg(long, env = "TSE_RETRY_MAX_ATTEMPTS", default_value_t = DEFAULT_RETRY_MAX_ATTEMPTS)]
    retry_max_attempts: u32,

    #[arg(long, env = "TSE_RETRY_BASE_DELAY_MS", default_value_t = DEFAULT_RETRY_BASE_DELAY_MS)]
    retry_base_delay_ms: u64,

    #[arg(long, env = "TSE_RETRY_MAX_DELAY_MS", default_value_t = DEFAULT_RETRY_MAX_DELAY_MS)]
    retry_max_delay_ms: u64,

    #[arg(
        long,
        env = "TSE_RETRY_JITTER",
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    retry_jitter: bool,

    /// Catalog refresh period; 0 disables periodic refresh.
    #[arg(long, env = "TSE_REFRESH_INTERVAL_SECS", default_value_t = DEFAULT_REFRESH_INTERVAL.as_secs())]
    refresh_interval_secs: u64,

    #[arg(long, env = "TSE_CALL_TIMEOUT_SECS", default_value_t = DEFAULT_CALL_TIMEOUT.as_secs())]
    call_timeout_secs: u64,

    #[arg(long, env = "TSE_MAX_HISTORY_SPAN_DAYS", default_value_t = DEFAULT_MAX_HISTORY_SPAN_DAYS)]
    max_history_span_days: u32,

    #[arg(long, env = "TSE_DEFAULT_HISTORY_DAYS", default_value_t = DEFAULT_HISTORY_DAYS)]
    default_history_days: u32,

    #[arg(
        long,
        env = "TSE_DISAMBIGUATION_THRESHOLD",
        default_value_t = DEFAULT_DISAMBIGUATION_THRESHOLD
    )]
    disambiguation_threshold: f64,

    #[arg(long, env = "TSE_DEFAULT_SEARCH_LIMIT", default_value_t = DEFAULT_SEARCH_LIMIT)]
    default_search_limit: usize,

    #[arg(
        long,
        env = "TSE_REMOTE_SEARCH_FALLBACK",
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    remote_search_fallback: bool,
}

/// Runtime configuration loaded from CLI arguments and environment variables.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub transport: Transport,
    pub http: McpHttpServerConfig,
    pub log_format: LogFormat,
    pub pipeline: PipelineConfig,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidSetting { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value}")
            }
        }
    }
}

impl Error for ConfigError {}

impl From<tse_core::ConfigError> for ConfigError {
    fn from(err: tse_core::ConfigError) -> Self {
        match err {
            tse_core::ConfigError::InvalidSetting { name, value } => {
                Self::InvalidSetting { name, value }
            }
        }
    }
}

impl DaemonConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::try_from(args)
    }
}

impl TryFrom<CliArgs> for DaemonConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.retry_base_delay_ms > args.retry_max_delay_ms {
            return Err(ConfigError::InvalidSetting {
                name: "TSE_RETRY_BASE_DELAY_MS",
                value: args.retry_base_delay_ms.to_string(),
            });
        }

        let retry = RetryPolicy::new(args.retry_max_attempts)
            .with_base_delay(Duration::from_millis(args.retry_base_delay_ms))
            .with_max_delay(Duration::from_millis(args.retry_max_delay_ms))
            .with_jitter(args.retry_jitter);

        let refresh_interval = if args.refresh_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(args.refresh_interval_secs))
        };

        let pipeline = PipelineConfig::default()
            .with_base_url(args.upstream_base_url.trim().trim_end_matches('/'))
            .with_listing_path(args.listing_path.trim())
            .with_request_timeout(Duration::from_secs(args.request_timeout_secs))
            .with_retry(retry)
            .with_refresh_interval(refresh_interval)
            .with_call_timeout(Duration::from_secs(args.call_timeout_secs))
            .with_max_history_span_days(args.max_history_span_days)
            .with_default_history_days(args.default_history_days)
            .with_disambiguation_threshold(args.disambiguation_threshold)
            .with_default_search_limit(args.default_search_limit)
            .with_remote_search_fallback(args.remote_search_fallback);
        pipeline.validate()?;

        let http =
            McpHttpServerConfig::new(args.mcp_http_addr).with_stateful_mode(args.mcp_stateful);

        Ok(Self {
            transport: args.transport,
            http,
            log_format: args.log_format,
            pipeline,
        })
    }
}
