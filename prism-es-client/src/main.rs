use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prism_es_client::cli::QueryArgs;
use prism_es_client::{logging, Config, HttpEngine};
use prism_es_query::SearchIndex;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "prism-esq")]
#[command(about = "Prism Elasticsearch query tool")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PRISM_ES_CONFIG", default_value = "prism-es.toml")]
    config: PathBuf,

    /// Elasticsearch URL, overrides the configuration file
    #[arg(long, env = "PRISM_ES_URL")]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every matching document
    Search {
        index: String,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Print the number of matching documents
    Count {
        index: String,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Print group-by buckets and stats
    Aggregate {
        index: String,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Print one search-after page
    Cursor {
        index: String,

        /// Page size
        #[arg(long, default_value = "100")]
        size: usize,

        /// JSON array of sort values from the previous page's "next"
        #[arg(long)]
        after: Option<String>,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Print the lowest and highest value of a field
    MinMax {
        index: String,
        field: String,

        /// Report formatted date values
        #[arg(long)]
        date: bool,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Print a single document by id
    Get { index: String, id: String },
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(Some(&cli.config))
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.apply_url_override(cli.url.clone());
    logging::init(&config.logging);

    tracing::debug!(url = %config.connection.url, "Using Elasticsearch");
    let engine = Arc::new(HttpEngine::new(&config.connection)?);

    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let open = |index: &str| {
        SearchIndex::new(engine.clone(), index)
            .with_config(config.execution.clone())
            .with_refresh(config.connection.refresh)
            .with_cancellation(token.clone())
    };

    match cli.command {
        Commands::Search { index, query } => {
            let docs: Vec<Value> = open(&index).get(&query.to_builder()?).await?;
            print(&docs)?;
        }
        Commands::Count { index, query } => {
            let count = open(&index).count(&query.to_builder()?).await?;
            print(&json!({ "count": count }))?;
        }
        Commands::Aggregate { index, query } => {
            let output = open(&index).aggregate(&query.to_builder()?).await?;
            print(&output)?;
        }
        Commands::Cursor {
            index,
            size,
            after,
            query,
        } => {
            let after: Option<Vec<Value>> = after
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("--after must be a JSON array")?;
            let page = open(&index)
                .cursor::<Value>(&query.to_builder()?, size, after)
                .await?;
            print(&json!({ "items": page.items, "next": page.next }))?;
        }
        Commands::MinMax {
            index,
            field,
            date,
            query,
        } => {
            let bounds = open(&index)
                .min_max(&query.to_builder()?, &field, date)
                .await?;
            print(&bounds)?;
        }
        Commands::Get { index, id } => {
            let doc: Value = open(&index).find(&id).await?;
            print(&doc)?;
        }
    }

    Ok(())
}
