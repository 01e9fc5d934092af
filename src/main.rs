use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sayso_fetch::executor::execute_with_timeout;
use sayso_fetch::{
    BusinessFetcher, CacheConfig, ClientConfig, ClientFactory, ClientPool, QueryCache, RequestContext,
};

#[derive(Parser)]
#[command(name = "sayso-fetch")]
#[command(about = "Query the sayso data API through the caching fetch layer", long_about = None)]
struct Cli {
    /// User access token forwarded instead of the anon key
    #[arg(long, env = "SAYSO_ACCESS_TOKEN")]
    access_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one business with stats, reviews, images and profiles
    Business {
        /// Business id
        id: String,

        /// Fetch twice to show the second read being served from cache
        #[arg(long)]
        twice: bool,

        /// Bypass the cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Fetch several businesses without related data
    Businesses {
        /// Business ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Call a stored procedure
    Rpc {
        /// Procedure name
        name: String,

        /// JSON object of parameters
        #[arg(short, long, default_value = "{}")]
        params: String,

        /// Give up waiting after this many milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sayso_fetch=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = ClientConfig::from_env().context("loading collaborator configuration")?;
    let pool = Arc::new(ClientPool::postgrest(&config)?);
    let cache = Arc::new(QueryCache::new(CacheConfig::default())?);

    let mut ctx = RequestContext::new();
    if let Some(token) = cli.access_token {
        ctx = ctx.with_access_token(token);
    }

    match cli.command {
        Commands::Business { id, twice, no_cache } => {
            let fetcher = BusinessFetcher::new(cache.clone(), pool);
            let business = fetcher
                .fetch_business_with_context(&ctx, &id, !no_cache)
                .await?;

            if twice {
                fetcher
                    .fetch_business_with_context(&ctx, &id, !no_cache)
                    .await?;
            }

            println!("{}", serde_json::to_string_pretty(&business)?);
            eprintln!("{}", cache.stats().await);
        }

        Commands::Businesses { ids } => {
            let fetcher = BusinessFetcher::new(cache, pool);
            let businesses = fetcher
                .fetch_businesses_with_context(&ctx, &ids, true)
                .await?;
            println!("{}", serde_json::to_string_pretty(&businesses)?);
        }

        Commands::Rpc {
            name,
            params,
            timeout_ms,
        } => {
            let params: serde_json::Value =
                serde_json::from_str(&params).context("--params must be valid JSON")?;
            let client = pool.acquire(&ctx).await?;

            let result = execute_with_timeout(
                move || async move { client.call_procedure(&name, &params, &ctx).await },
                Duration::from_millis(timeout_ms),
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
