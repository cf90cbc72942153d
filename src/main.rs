use docweave::config::{Config, DocType};
use docweave::llm::HttpBackend;
use docweave::orchestrate;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("Docweave\n");

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <repository-path> [output-dir]", args[0]);
        eprintln!("\nExamples:");
        eprintln!("  {} ./myproject", args[0]);
        eprintln!("  {} /abs/path/to/repo ./docs", args[0]);
        eprintln!("\nEnvironment: OPENAI_API_KEY, OPENAI_BASE_URL, OPENAI_MODEL,");
        eprintln!("             CLUSTER_MODEL, FALLBACK_MODELS (comma-separated)");
        std::process::exit(1);
    }

    let repo = match std::fs::canonicalize(&args[1]) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Repository path {} is not usable: {}", args[1], e);
            std::process::exit(1);
        }
    };
    let output = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("output"));
    if let Err(e) = std::fs::create_dir_all(&output) {
        eprintln!("Cannot create output directory {:?}: {}", output, e);
        std::process::exit(1);
    }
    let output = match std::fs::canonicalize(&output) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Output directory {:?} is not usable: {}", output, e);
            std::process::exit(1);
        }
    };

    let mut config = Config::from_env(repo, output);
    if let Ok(doc_type) = env::var("DOC_TYPE") {
        match serde_json::from_value::<DocType>(serde_json::Value::String(doc_type.clone())) {
            Ok(parsed) => config.doc_type = parsed,
            Err(_) => eprintln!("Unknown DOC_TYPE '{}', keeping default", doc_type),
        }
    }
    if let Ok(instructions) = env::var("CUSTOM_INSTRUCTIONS") {
        config.custom_instructions = Some(instructions);
    }

    println!("Repository: {:?}", config.repository_root);
    println!("Output:     {:?}", config.output_dir);
    println!("Models:     {} (cluster: {})\n", config.main_model, config.cluster_model);

    let backend = Arc::new(HttpBackend::new(
        config.llm_base_url.clone(),
        config.llm_api_key.clone(),
    ));

    println!("Phase 1-4: analyze, cluster, and document...");
    match orchestrate::run_pipeline(&config, backend).await {
        Ok(()) => {
            println!("\nDocumentation generation complete!");
            println!("   Artifacts: {:?}", config.output_dir);
        }
        Err(e) => {
            eprintln!("\nDocumentation generation failed: {}", e);
            std::process::exit(1);
        }
    }
}
