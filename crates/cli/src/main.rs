// ABOUTME: CLI for sightsound: resolve page URLs to their best image, or send an image to Vision.
// ABOUTME: Prints plain URLs or JSON on stdout; logs go to stderr via tracing.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use sightsound_resolver::{
    Analyzer, ImageSource, Outcome, Resolver, ResolverBuilder, VisionConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sightsound")]
#[command(about = "Find the real photo on a web page and analyze it with Azure Vision", long_about = None)]
struct Cli {
    /// Log resolver decisions to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve page URLs to the URL of their best image
    Resolve {
        /// Page URLs to resolve
        #[arg(required = true)]
        urls: Vec<String>,

        /// Output a JSON array instead of one URL per line
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        resolver: ResolverArgs,
    },
    /// Analyze an image URL, page URL, or local image file with Vision
    Analyze {
        /// Image or page URL to analyze
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        image_url: Option<String>,

        /// Local image file to upload
        #[arg(long)]
        file: Option<PathBuf>,

        /// Comma-separated Vision features (default: caption,objects,read)
        #[arg(long)]
        features: Option<String>,

        /// Vision resource endpoint
        #[arg(long, env = "VISION_ENDPOINT", hide_env_values = true)]
        endpoint: String,

        /// Vision subscription key
        #[arg(long, env = "VISION_KEY", hide_env_values = true)]
        key: String,

        /// Output compact JSON instead of pretty
        #[arg(long)]
        compact: bool,

        #[command(flatten)]
        resolver: ResolverArgs,
    },
}

#[derive(Args, Debug)]
struct ResolverArgs {
    /// Allow fetching from private/local networks
    #[arg(long)]
    allow_private_networks: bool,

    /// Timeout for each image probe, in milliseconds
    #[arg(long, default_value_t = 3000)]
    probe_timeout_ms: u64,

    /// Maximum number of candidates to probe
    #[arg(long, default_value_t = 12)]
    max_probes: usize,
}

impl ResolverArgs {
    fn builder(&self) -> ResolverBuilder {
        Resolver::builder()
            .allow_private_networks(self.allow_private_networks)
            .probe_timeout(Duration::from_millis(self.probe_timeout_ms))
            .max_probes(self.max_probes)
    }
}

#[derive(Serialize, Debug)]
struct ResolveLine {
    input: String,
    image_url: String,
    outcome: Outcome,
    score: Option<f64>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "warn,sightsound_resolver=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_resolve(urls: &[String], json: bool, args: &ResolverArgs) -> Result<()> {
    let resolver = args.builder().build();

    let mut lines = Vec::with_capacity(urls.len());
    for url in urls {
        let resolution = resolver.resolve(url).await;
        let outcome = resolution.outcome();
        let score = resolution.score();
        lines.push(ResolveLine {
            input: url.clone(),
            image_url: resolution.url_or(url),
            outcome,
            score,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&lines)?);
    } else {
        for line in &lines {
            println!("{}", line.image_url);
        }
    }
    Ok(())
}

struct AnalyzeArgs<'a> {
    image_url: Option<&'a str>,
    file: Option<&'a PathBuf>,
    features: Option<&'a str>,
    endpoint: &'a str,
    key: &'a str,
    compact: bool,
    resolver: &'a ResolverArgs,
}

async fn run_analyze(args: AnalyzeArgs<'_>) -> Result<bool> {
    let config = VisionConfig::new(args.endpoint, args.key)?;
    let analyzer = Analyzer::new(config, args.resolver.builder().build());

    let source = match (args.image_url, args.file) {
        (Some(url), _) => ImageSource::Url(url.to_string()),
        (None, Some(path)) => {
            let bytes =
                fs::read(path).with_context(|| format!("reading image file {:?}", path))?;
            ImageSource::Bytes(bytes.into())
        }
        (None, None) => bail!("provide --image-url or --file"),
    };

    let response = analyzer.analyze(source, args.features).await?;
    let body: &Value = &response.body;
    if args.compact {
        println!("{}", serde_json::to_string(body)?);
    } else {
        println!("{}", serde_json::to_string_pretty(body)?);
    }

    if !response.is_success() {
        eprintln!("error: Vision returned HTTP {}", response.status);
    }
    Ok(response.is_success())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match &cli.command {
        Command::Resolve {
            urls,
            json,
            resolver,
        } => run_resolve(urls, *json, resolver).await.map(|_| true),
        Command::Analyze {
            image_url,
            file,
            features,
            endpoint,
            key,
            compact,
            resolver,
        } => {
            run_analyze(AnalyzeArgs {
                image_url: image_url.as_deref(),
                file: file.as_ref(),
                features: features.as_deref(),
                endpoint,
                key,
                compact: *compact,
                resolver,
            })
            .await
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(1)
        }
    }
}
