use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use matjip::config::Config;
use matjip::embedding::EmbeddingProvider;
use matjip::embedding::openai::OpenAIEmbeddingProvider;
use matjip::entities::SearchRequest;
use matjip::logging;
use matjip::search::SearchOrchestrator;
use matjip::server::RestaurantSearchService;
use matjip::store::elasticsearch::ElasticsearchStore;
use matjip::store::retry::{RetryPolicy, RetryingStore};
use matjip::store::{CoordinateLookup, DocumentStore};
use rmcp::ServiceExt;

#[derive(Parser)]
#[command(name = "matjip", version, about = "Hybrid keyword + vector restaurant retrieval server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one search and print the ranked results as JSON
    Search {
        /// NLU payload: {"intent", "entities", "negation_entities", "suggested_queries"}
        #[arg(long)]
        request: String,
    },
    /// Print the keyword and vector queries a request would issue, without searching
    Explain {
        /// NLU payload: {"intent", "entities", "negation_entities", "suggested_queries"}
        #[arg(long)]
        request: String,
    },
}

/// Create the embedding provider based on configuration.
fn create_embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    if config.embedding.api_key.is_none() {
        anyhow::bail!(
            "Embedding API key required. \
             Set MATJIP_EMBEDDING__API_KEY or embedding.api_key in matjip.toml"
        );
    }
    Ok(Arc::new(OpenAIEmbeddingProvider::new(&config.embedding)?))
}

/// Build the orchestrator around one shared store client.
fn create_orchestrator(config: &Config) -> Result<SearchOrchestrator> {
    let client = ElasticsearchStore::new(&config.store)?;
    let store = Arc::new(RetryingStore::new(client, RetryPolicy::from(&config.retry)));
    tracing::info!(
        url = %config.store.url,
        index = %config.store.restaurant_index,
        max_attempts = config.retry.max_attempts,
        "Document store client initialized"
    );

    let embedder = create_embedding_provider(config)?;
    tracing::info!(
        model = embedder.model_name(),
        dimension = embedder.dimension(),
        "Embedding provider initialized"
    );

    Ok(SearchOrchestrator::new(
        store.clone() as Arc<dyn DocumentStore>,
        store as Arc<dyn CoordinateLookup>,
        embedder,
        config,
    ))
}

fn parse_request(raw: &str) -> Result<SearchRequest> {
    serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("Invalid --request JSON: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args
    let cli = Cli::parse();

    // 2. Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Config error (using defaults): {}", e);
        Config::default()
    });

    // 3. Initialize logging FIRST (before any other output)
    // CRITICAL: logging goes to stderr only, stdout is reserved for JSON-RPC
    logging::init_logging(&config);

    // 4. Handle subcommands
    match cli.command {
        Some(Commands::Search { request }) => {
            let request = parse_request(&request)?;
            let search = create_orchestrator(&config)?;
            let outcome = search.search(request).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Some(Commands::Explain { request }) => {
            let request = parse_request(&request)?;
            let search = create_orchestrator(&config)?;
            let plan = search.explain(request).await;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }

        None => {
            // Default: start the MCP server
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                "matjip server starting"
            );

            let search = create_orchestrator(&config)?;
            let service = RestaurantSearchService::new(search);

            // Serve via stdio transport
            let (stdin, stdout) = rmcp::transport::io::stdio();
            let server = service.serve((stdin, stdout)).await?;

            tracing::info!("matjip server running, awaiting tool calls via stdio");

            // Wait for shutdown (client disconnects or signal)
            server.waiting().await?;

            tracing::info!("matjip server stopped");
        }
    }

    Ok(())
}
