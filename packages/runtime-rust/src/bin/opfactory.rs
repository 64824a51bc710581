//! `opfactory` command line: generates factory plans from declared surfaces.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use opfactory_core::render::render_source;
use opfactory_core::{Catalog, GeneratedFactory, Generator, GeneratorConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "opfactory")]
#[command(about = "Factory generation for marker-annotated domain types", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level used when `RUST_LOG` is not set
    #[arg(long, global = true, env = "OPFACTORY_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "OPFACTORY_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate factories for the surfaces declared in FILES
    Generate {
        /// Surface files: `.rs` trait declarations or `.json` catalogs
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Generate only this type
        #[arg(short, long = "type")]
        type_name: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Rust)]
        format: Format,

        /// Generator configuration (JSON); missing keys keep their defaults
        #[arg(short, long, env = "OPFACTORY_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Rendered Rust source
    Rust,
    /// The factory plan as JSON
    Json,
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GeneratorConfig> {
    let Some(path) = path else {
        return Ok(GeneratorConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn load_catalog(files: &[PathBuf], config: &GeneratorConfig) -> anyhow::Result<Catalog> {
    let mut catalog = Catalog::new();
    for file in files {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("reading {}", file.display()))?;
        let count = match file.extension().and_then(|e| e.to_str()) {
            Some("json") => catalog.extend_from_json(&text),
            _ => catalog.extend_from_source(&text, config),
        }
        .with_context(|| format!("loading surfaces from {}", file.display()))?;
        tracing::info!(file = %file.display(), surfaces = count, "surfaces loaded");
    }
    Ok(catalog)
}

fn generate(
    files: &[PathBuf],
    type_name: Option<&str>,
    format: Format,
    config: GeneratorConfig,
) -> anyhow::Result<ExitCode> {
    let catalog = load_catalog(files, &config)?;
    let generator = Generator::new(config);
    let generated = match type_name {
        Some(name) => vec![generator.generate(&catalog, name)],
        None => generator.generate_all(&catalog),
    };

    let mut inert = 0usize;
    let mut plans = Vec::new();
    for factory in generated {
        match factory {
            GeneratedFactory::Ready(plan) => plans.push(plan),
            GeneratedFactory::Inert { type_name, error } => {
                tracing::error!(type_name = %type_name, error = %error, "no factory generated");
                inert += 1;
            }
        }
    }

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&plans)?),
        Format::Rust => {
            for plan in &plans {
                println!("{}", render_source(plan));
            }
        }
    }

    Ok(if inert == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match cli.command {
        Commands::Generate {
            files,
            type_name,
            format,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            generate(&files, type_name.as_deref(), format, config)
        }
    }
}
