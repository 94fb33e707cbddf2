use anyhow::{Context, Result};
use clap::Parser;
use dk_relay::config::Config;
use dk_relay::resolver::{Relay, ResourceRequest};
use dk_relay::server::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dk-relay", about = "DraftKings odds relay with host fallback", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Resolve one request, print the body and exit instead of serving.
    #[arg(long, num_args = 0..=2, value_names = ["SITE", "GROUP"])]
    once: Option<Vec<String>>,
}

impl Cli {
    fn once_request(&self) -> Option<ResourceRequest> {
        self.once
            .as_ref()
            .map(|rest| ResourceRequest::new(rest.first().cloned(), rest.get(1).cloned()))
    }
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("invalid logging.filter")?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match &config.logging.file {
        Some(path) => {
            let log_file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path))?;
            builder.with_writer(log_file).with_ansi(false).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Real env vars take precedence over .env
    Config::load_env_file();
    let mut config = Config::load(&cli.config)?;
    config.apply_env_overrides()?;
    init_logging(&config)?;

    let relay = Arc::new(Relay::from_config(&config.upstream)?);

    if let Some(request) = cli.once_request() {
        let body = server::relay_body(&relay, request).await;
        println!("{}", body.to_pretty_json());
        if !body.ok {
            std::process::exit(1);
        }
        return Ok(());
    }

    server::serve(&config.server.bind, AppState { relay }).await
}
