use clap::{Args as ClapArgs, Parser, Subcommand};
use semdex_api::{AppState, RestApi};
use semdex_core::{pipeline, DocumentId, ModelHandle, PipelineConfig};
use semdex_storage::{read_documents_file, ArtifactStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Semantic search and topic clustering for short incident descriptions
#[derive(Parser, Debug)]
#[command(name = "semdex")]
#[command(about = "Semantic search and clustering of incident texts", long_about = None)]
struct Args {
    /// Directory holding the fitted model artifacts
    #[arg(short, long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit a model on a CSV export or JSON-Lines corpus and save it to the data directory
    Fit(FitArgs),
    /// Find the fitted documents most similar to a text
    Search {
        text: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Streets/zips to list in the location summary
        #[arg(long, default_value_t = 10)]
        top_locations: usize,
    },
    /// Print the cluster report
    Clusters {
        #[arg(long, default_value_t = 5)]
        representatives: usize,
        #[arg(long, default_value_t = 10)]
        top_terms: usize,
    },
    /// Show the cluster of a fitted document, or the nearest cluster for a text
    Assign {
        #[arg(long, conflicts_with = "text", required_unless_present = "text")]
        id: Option<String>,
        #[arg(long)]
        text: Option<String>,
    },
    /// Serve the query API over HTTP
    Serve {
        #[arg(long, default_value_t = 6333)]
        http_port: u16,
    },
}

#[derive(ClapArgs, Debug)]
struct FitArgs {
    /// Corpus file: `.csv` export or JSON-Lines
    #[arg(short, long)]
    input: PathBuf,

    /// JSON pipeline config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    max_features: Option<usize>,

    #[arg(long)]
    min_df: Option<usize>,

    #[arg(long)]
    components: Option<usize>,

    #[arg(long)]
    clusters: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    max_iterations: Option<usize>,

    #[arg(long)]
    num_init: Option<usize>,
}

impl FitArgs {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(v) = self.max_features {
            config.max_features = v;
        }
        if let Some(v) = self.min_df {
            config.min_document_frequency = v;
        }
        if let Some(v) = self.components {
            config.num_components = v;
        }
        if let Some(v) = self.clusters {
            config.num_clusters = v;
        }
        if let Some(v) = self.seed {
            config.random_seed = v;
        }
        if let Some(v) = self.max_iterations {
            config.max_iterations = v;
        }
        if let Some(v) = self.num_init {
            config.num_init = v;
        }
        config.validate()?;
        Ok(config)
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("semdex v{}", env!("CARGO_PKG_VERSION"));
    let store = ArtifactStore::open(&args.data_dir)?;

    match args.command {
        Command::Fit(fit_args) => {
            let config = fit_args.pipeline_config()?;
            let report = read_documents_file(&fit_args.input)?;
            let state = pipeline::fit(report.documents, &config)?;
            let manifest = store.save_state(&state)?;
            print_json(&manifest)?;
        }
        Command::Search {
            text,
            limit,
            top_locations,
        } => {
            let state = store.load_state()?;
            let hits = state.similarity_search(&text, limit)?;
            let locations = semdex_core::location_summary(&hits, top_locations);
            print_json(&serde_json::json!({ "hits": hits, "locations": locations }))?;
        }
        Command::Clusters {
            representatives,
            top_terms,
        } => {
            let state = store.load_state()?;
            print_json(&state.cluster_report(representatives, top_terms)?)?;
        }
        Command::Assign { id, text } => {
            let state = store.load_state()?;
            let cluster_id = match (id, text) {
                (Some(id), _) => state.assign_cluster(&DocumentId::from(id))?,
                (None, Some(text)) => state.predict_cluster(&text)?,
                (None, None) => anyhow::bail!("either --id or --text is required"),
            };
            print_json(&serde_json::json!({ "cluster_id": cluster_id }))?;
        }
        Command::Serve { http_port } => serve(store, http_port).await?,
    }

    Ok(())
}

async fn serve(store: ArtifactStore, http_port: u16) -> anyhow::Result<()> {
    let handle = Arc::new(ModelHandle::new());
    if store.exists() {
        handle.publish(store.load_state()?);
    } else {
        warn!(
            "No saved model in {:?}; queries return 503 until POST /reload",
            store.dir()
        );
    }

    let state = AppState {
        handle,
        store: Some(store),
    };
    let http_handle = std::thread::spawn(move || {
        info!("Starting HTTP server on port {}", http_port);
        let sys = actix_web::rt::System::new();
        sys.block_on(async {
            if let Err(e) = RestApi::start(state, http_port).await {
                eprintln!("HTTP server error: {}", e);
            }
        })
    });

    info!("HTTP API: http://localhost:{}/", http_port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    info!("Shutting down...");
    Ok(())
}
