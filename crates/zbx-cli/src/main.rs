use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use serde_json::Value;
use zbx_core::api::requires_auth;
use zbx_core::{ZabbixApi, ZabbixApiBuilder, ZabbixMetric, ZabbixSender};

#[derive(Parser, Debug)]
#[clap(name = "zbx", version = "0.1.0", about = "Zabbix API and sender client")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Push metric values to a Zabbix trapper port
    Send {
        #[clap(long, default_value = "127.0.0.1", conflicts_with = "config")]
        server: String,

        #[clap(long, default_value_t = 10051)]
        port: u16,

        /// Take targets from a zabbix_agentd.conf (ServerActive) instead
        #[clap(long)]
        config: Option<PathBuf>,

        /// Host of a single metric
        #[clap(long, requires = "key", requires = "value")]
        host: Option<String>,

        /// Item key of a single metric
        #[clap(long)]
        key: Option<String>,

        /// Value of a single metric
        #[clap(long)]
        value: Option<String>,

        /// Unix timestamp for the single metric
        #[clap(long, requires = "host")]
        clock: Option<i64>,

        /// File with one "<host> <key> <value>" per line
        #[clap(long, short)]
        input: Option<PathBuf>,
    },
    /// Invoke an arbitrary API method and print its result as JSON
    Api {
        /// Method name, e.g. host.get
        method: String,

        /// Method parameters as a JSON document
        params: Option<String>,

        #[clap(long)]
        url: Option<String>,

        #[clap(long)]
        user: Option<String>,

        #[clap(long, requires = "user")]
        password: Option<String>,

        /// Skip TLS certificate verification
        #[clap(long)]
        insecure: bool,
    },
    /// Print the server's API version
    Version {
        #[clap(long)]
        url: Option<String>,

        /// Skip TLS certificate verification
        #[clap(long)]
        insecure: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    match cli.command {
        Commands::Send {
            server,
            port,
            config,
            host,
            key,
            value,
            clock,
            input,
        } => run_send(server, port, config, host, key, value, clock, input).await,
        Commands::Api {
            method,
            params,
            url,
            user,
            password,
            insecure,
        } => run_api(method, params, url, user, password, insecure).await,
        Commands::Version { url, insecure } => run_version(url, insecure).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_send(
    server: String,
    port: u16,
    config: Option<PathBuf>,
    host: Option<String>,
    key: Option<String>,
    value: Option<String>,
    clock: Option<i64>,
    input: Option<PathBuf>,
) -> Result<()> {
    let sender = match config {
        Some(path) => ZabbixSender::from_agent_config(&path)
            .with_context(|| format!("cannot use agent config {}", path.display()))?,
        None => ZabbixSender::new(server, port),
    };

    let mut metrics = Vec::new();
    if let Some(path) = input {
        metrics.extend(read_input_file(&path)?);
    }
    if let (Some(host), Some(key), Some(value)) = (host, key, value) {
        let mut metric = ZabbixMetric::new(host, key, value);
        if let Some(clock) = clock {
            metric = metric.with_clock(clock);
        }
        metrics.push(metric);
    }
    if metrics.is_empty() {
        bail!("nothing to send: pass --host/--key/--value or --input");
    }

    let response = sender.send(&metrics).await?;
    println!("{response}");
    if response.failed > 0 {
        bail!("{} of {} values failed", response.failed, response.total);
    }
    Ok(())
}

fn read_input_file(path: &Path) -> Result<Vec<ZabbixMetric>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;

    let mut metrics = Vec::new();
    for (number, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let metric = parse_input_line(line).with_context(|| {
            format!("{}:{}: expected \"<host> <key> <value>\"", path.display(), number + 1)
        })?;
        metrics.push(metric);
    }
    Ok(metrics)
}

fn parse_input_line(line: &str) -> Option<ZabbixMetric> {
    let mut parts = line.splitn(3, char::is_whitespace);
    let host = parts.next()?;
    let key = parts.next()?;
    let value = parts.next()?.trim();
    if host.is_empty() || key.is_empty() || value.is_empty() {
        return None;
    }
    Some(ZabbixMetric::new(host, key, value))
}

fn api_builder(url: Option<String>, insecure: bool) -> ZabbixApiBuilder {
    let mut builder = ZabbixApi::builder().accept_invalid_certs(insecure);
    if let Some(url) = url {
        builder = builder.url(url);
    }
    builder
}

async fn run_api(
    method: String,
    params: Option<String>,
    url: Option<String>,
    user: Option<String>,
    password: Option<String>,
    insecure: bool,
) -> Result<()> {
    let params: Option<Value> = params
        .map(|p| serde_json::from_str(&p))
        .transpose()
        .context("params must be a valid JSON document")?;

    let mut builder = api_builder(url, insecure);
    if let (Some(user), Some(password)) = (user, password) {
        builder = builder.credentials(user, password);
    }
    let mut api = builder.build()?;

    if requires_auth(&method) {
        api.login().await?;
    }
    let result = api.call(&method, params).await;
    let logout = api.logout().await;

    let result = result?;
    logout?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_version(url: Option<String>, insecure: bool) -> Result<()> {
    let api = api_builder(url, insecure).build()?;
    println!("{}", api.api_version().await?);
    Ok(())
}
