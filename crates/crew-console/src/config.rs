use anyhow::{Context, Result};
use clap::Parser;
use crew_client::config::{
    ClientConfig, DEFAULT_HEARTBEAT, DEFAULT_MAX_RECONNECTS, DEFAULT_RECONNECT_BASE,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SERVER_URL,
};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LOG_DIR: &str = ".crew/logs";

#[derive(Parser, Debug, Default)]
#[command(name = "crew-console", about = "Terminal console for a feature-development crew")]
pub struct Args {
    /// Crew server base URL (CREW_SERVER_URL).
    #[arg(long, default_value = "")]
    pub server_url: String,
    #[arg(long)]
    pub heartbeat_secs: Option<u64>,
    #[arg(long)]
    pub reconnect_base_ms: Option<u64>,
    #[arg(long)]
    pub max_reconnects: Option<u32>,
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,
    /// Where exported artifacts are written (CREW_EXPORT_DIR).
    #[arg(long, default_value = "")]
    pub export_dir: String,
    #[arg(long, default_value = "")]
    pub log_dir: String,
    /// Print server health and status as JSON, then exit.
    #[arg(long)]
    pub probe: bool,
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub client: ClientConfig,
    pub export_dir: PathBuf,
    pub log_dir: String,
    pub log_stdout: bool,
    pub probe: bool,
}

pub fn load_config(args: Args) -> Result<RuntimeConfig> {
    let server_url = resolve_text(&args.server_url, "CREW_SERVER_URL", DEFAULT_SERVER_URL);
    let mut client = ClientConfig::from_server_url(&server_url)
        .with_context(|| format!("server url {server_url}"))?;

    client.connection.heartbeat_interval = Duration::from_secs(resolve_number(
        args.heartbeat_secs,
        "CREW_HEARTBEAT_SECS",
        DEFAULT_HEARTBEAT.as_secs(),
    ));
    client.connection.reconnect_base = Duration::from_millis(resolve_number(
        args.reconnect_base_ms,
        "CREW_RECONNECT_BASE_MS",
        DEFAULT_RECONNECT_BASE.as_millis() as u64,
    ));
    client.connection.max_reconnect_attempts = resolve_number(
        args.max_reconnects,
        "CREW_MAX_RECONNECTS",
        DEFAULT_MAX_RECONNECTS,
    );
    client.request_timeout = Duration::from_secs(resolve_number(
        args.request_timeout_secs,
        "CREW_REQUEST_TIMEOUT_SECS",
        DEFAULT_REQUEST_TIMEOUT.as_secs(),
    ));

    Ok(RuntimeConfig {
        client,
        export_dir: PathBuf::from(resolve_text(&args.export_dir, "CREW_EXPORT_DIR", ".")),
        log_dir: resolve_text(&args.log_dir, "CREW_LOG_DIR", DEFAULT_LOG_DIR),
        log_stdout: resolve_log_stdout(),
        probe: args.probe,
    })
}

fn resolve_text(flag: &str, var: &str, default: &str) -> String {
    pick_text(flag, env::var(var).ok(), default)
}

fn resolve_number<T: std::str::FromStr>(flag: Option<T>, var: &str, default: T) -> T {
    pick_number(flag, env::var(var).ok(), default)
}

fn resolve_log_stdout() -> bool {
    env::var("CREW_LOG_STDOUT")
        .ok()
        .and_then(|value| parse_bool_env(&value))
        .unwrap_or(false)
}

fn pick_text(flag: &str, env_value: Option<String>, default: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.trim().to_string();
    }
    match env_value {
        Some(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

fn pick_number<T: std::str::FromStr>(flag: Option<T>, env_value: Option<String>, default: T) -> T {
    if let Some(value) = flag {
        return value;
    }
    env_value
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

pub fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" | "off" | "OFF" => Some(false),
        _ => None,
    }
}
