use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use coinboard::api::{self, AppState, DEFAULT_PAGE, DEFAULT_PER_PAGE};
use coinboard::client::MarketsClient;
use coinboard::config::Settings;
use coinboard::market_data::adapters::coingecko::CoinGeckoClient;
use coinboard::market_data::clock::{SystemClock, TokioSleeper};
use coinboard::market_data::ProxyCache;
use coinboard::telemetry;

#[derive(Debug, Parser)]
#[command(name = "coinboard", version, about = "Caching proxy for crypto market listings")]
struct Cli {
    /// TOML settings file (defaults to ./coinboard.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP proxy (default)
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print one page of markets from a running proxy
    Markets {
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server: String,
        #[arg(long, default_value_t = DEFAULT_PAGE)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
        per_page: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    telemetry::init_tracing(&settings.telemetry.log_filter);

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                settings.server.bind = bind;
            }
            serve(settings).await
        }
        Command::Markets { server, page, per_page } => print_markets(&server, page, per_page).await,
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    telemetry::init_metrics(&settings.telemetry.metrics_bind)?;

    let upstream = CoinGeckoClient::new(&settings.upstream.base_url, settings.upstream_timeout())
        .context("building upstream HTTP client")?;
    info!(upstream = upstream.base_url(), "using market data provider");

    let cache = ProxyCache::new(
        Arc::new(upstream),
        Arc::new(SystemClock),
        Arc::new(TokioSleeper),
        settings.cache_policy(),
    );
    let app = api::router(AppState::new(Arc::new(cache)));

    let listener = tokio::net::TcpListener::bind(&settings.server.bind)
        .await
        .with_context(|| format!("binding {}", settings.server.bind))?;
    info!(addr = %listener.local_addr()?, "coinboard listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

async fn print_markets(server: &str, page: u32, per_page: u32) -> anyhow::Result<()> {
    let client = MarketsClient::new(server);
    let coins = match client.fetch_market_coins(page, per_page).await {
        Ok(coins) => coins,
        Err(e) if e.is_empty_page() => {
            println!("{}", e);
            return Ok(());
        }
        Err(e) if e.is_rate_limited() => {
            anyhow::bail!("rate limited by market data provider, try again shortly");
        }
        Err(e) => return Err(e.into()),
    };

    println!("{:>5}  {:<8} {:<24} {:>16}", "rank", "symbol", "name", "price (usd)");
    for coin in &coins {
        let rank = coin.market_cap_rank().map(|r| r.to_string()).unwrap_or_else(|| "-".into());
        let price = coin
            .current_price()
            .map(|p| format!("{:.4}", p))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:>5}  {:<8} {:<24} {:>16}",
            rank,
            coin.symbol().unwrap_or("?").to_uppercase(),
            coin.name().unwrap_or("?"),
            price
        );
    }
    Ok(())
}
