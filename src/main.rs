use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bibcluster::cache::{CacheBackend, DedupCache, InMemoryBackend, RedisBackend};
use bibcluster::classify::{ClassifyPipeline, InMemoryRecordStore, CLASSIFY_TIMEOUT};
use bibcluster::clock::SystemClock;
use bibcluster::cluster::ClusteringEngine;
use bibcluster::config::{AppConfig, CliConfig, FileConfig};
use bibcluster::catalog::CatalogClient;
use bibcluster::oauth::{ScopeCredentials, TokenCache};
use bibcluster::queue::LogPublisher;
use bibcluster::record::{BibRecord, RawRecord};
use bibcluster::transport::HttpTransport;
use bibcluster::ClassifyClient;

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file; its values override CLI arguments.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Deployment label prefixed onto cache keys.
    #[clap(long)]
    pub environment: Option<String>,

    /// Redis connection URL for the dedup cache and rate counters.
    #[clap(long)]
    pub redis_url: Option<String>,

    /// Base URL of the classification service.
    #[clap(long)]
    pub classify_base_url: Option<String>,

    /// Classification service API key (or set CLASSIFY_API_KEY).
    #[clap(long)]
    pub classify_api_key: Option<String>,

    /// Dedup cache entry lifetime in seconds.
    #[clap(long)]
    pub entry_ttl_secs: Option<u64>,

    /// Maximum classification queries per identifier per day.
    #[clap(long)]
    pub daily_query_ceiling: Option<i64>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify pending records from a JSONL file and write them back out.
    Classify {
        /// Input records, one JSON object per line.
        input: PathBuf,

        /// Output path; stdout when omitted.
        #[clap(long)]
        output: Option<PathBuf>,

        /// Maximum records to process in this run.
        #[clap(long, default_value_t = 1000)]
        limit: usize,

        /// Label under which this run's query volume is counted.
        #[clap(long, default_value = "default")]
        rate_label: String,
    },
    /// Cluster one work's edition records from a JSONL file into editions.
    Cluster {
        /// Input records, one JSON object per line.
        input: PathBuf,

        /// Output path; stdout when omitted.
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Fetch one catalog bib record by its control number.
    Lookup {
        oclc_number: String,

        /// Also list related physical editions of the record's work.
        #[clap(long)]
        editions: bool,
    },
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config = CliConfig {
        environment: cli_args.environment.clone(),
        redis_url: cli_args.redis_url.clone(),
        classify_base_url: cli_args.classify_base_url.clone(),
        classify_api_key: cli_args.classify_api_key.clone(),
        search_client_id: None,
        metadata_client_id: None,
        entry_ttl_secs: cli_args.entry_ttl_secs,
        daily_query_ceiling: cli_args.daily_query_ceiling,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    match cli_args.command {
        Command::Classify {
            input,
            output,
            limit,
            rate_label,
        } => run_classify(&config, &input, output.as_deref(), limit, &rate_label),
        Command::Cluster { input, output } => run_cluster(&input, output.as_deref()),
        Command::Lookup {
            oclc_number,
            editions,
        } => run_lookup(&config, &oclc_number, editions),
    }
}

fn run_lookup(config: &AppConfig, oclc_number: &str, editions: bool) -> Result<()> {
    let (search_id, search_secret) = config.oauth.search.credentials()?;
    let (metadata_id, metadata_secret) = config.oauth.metadata.credentials()?;

    let transport = HttpTransport::new(CLASSIFY_TIMEOUT)?;
    let clock = SystemClock;
    let tokens = TokenCache::new(
        &transport,
        &clock,
        ScopeCredentials {
            token_url: config.oauth.search.token_url.clone(),
            client_id: search_id,
            client_secret: search_secret,
        },
        ScopeCredentials {
            token_url: config.oauth.metadata.token_url.clone(),
            client_id: metadata_id,
            client_secret: metadata_secret,
        },
    );
    let catalog = CatalogClient::new(
        &transport,
        &tokens,
        config.catalog.bib_base_url.clone(),
        config.catalog.search_base_url.clone(),
    );

    match catalog.query_catalog(oclc_number) {
        Some(bib) => println!("{}", serde_json::to_string(&bib)?),
        None => bail!("catalog record {oclc_number} could not be fetched"),
    }
    if editions {
        for bib in catalog.related_editions(oclc_number) {
            println!("{}", serde_json::to_string(&bib)?);
        }
    }
    Ok(())
}

fn run_classify(
    config: &AppConfig,
    input: &std::path::Path,
    output: Option<&std::path::Path>,
    limit: usize,
    rate_label: &str,
) -> Result<()> {
    let Some(api_key) = config.classify.api_key.clone() else {
        bail!("classification API key must be set via --classify-api-key, config file or CLASSIFY_API_KEY");
    };

    let records = read_records(input)?;
    info!(count = records.len(), "loaded records from {:?}", input);

    let backend: Box<dyn CacheBackend> = match &config.redis_url {
        Some(url) => {
            info!("connecting to redis at {url}");
            Box::new(RedisBackend::connect(url)?)
        }
        None => {
            warn!("no redis_url configured, dedup state will not persist across runs");
            Box::new(InMemoryBackend::new())
        }
    };
    let clock = SystemClock;
    let cache = DedupCache::new(
        &*backend,
        &clock,
        config.environment.clone(),
        config.cache.daily_query_ceiling,
    );

    let transport = HttpTransport::new(CLASSIFY_TIMEOUT)?;
    let client = ClassifyClient::new(&transport, config.classify.base_url.clone(), api_key);
    let queue = LogPublisher;
    let pipeline = ClassifyPipeline::new(&client, &cache, &queue, rate_label)
        .with_entry_ttl(config.cache.entry_ttl);

    let store = InMemoryRecordStore::new(records);
    let outcome = pipeline.run_batch(&store, limit)?;
    info!(
        processed = outcome.processed,
        skipped = outcome.skipped,
        failed = outcome.failed,
        rate_limited = outcome.rate_limited,
        "classify run finished"
    );

    write_lines(
        output,
        store
            .records()
            .iter()
            .map(RawRecord::from_record)
            .map(|raw| serde_json::to_string(&raw).map_err(Into::into)),
    )
}

fn run_cluster(input: &std::path::Path, output: Option<&std::path::Path>) -> Result<()> {
    let records = read_records(input)?;
    info!(count = records.len(), "loaded records from {:?}", input);

    let engine = ClusteringEngine::default();
    let clusters = engine.cluster_editions(&records);

    write_lines(
        output,
        clusters
            .iter()
            .map(|cluster| serde_json::to_string(cluster).map_err(Into::into)),
    )
}

fn read_records(path: &std::path::Path) -> Result<Vec<BibRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open input file: {:?}", path))?;
    let mut records = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawRecord = serde_json::from_str(&line)
            .with_context(|| format!("Malformed record on line {}", number + 1))?;
        records.push(raw.into_record());
    }
    Ok(records)
}

fn write_lines(
    output: Option<&std::path::Path>,
    lines: impl Iterator<Item = Result<String>>,
) -> Result<()> {
    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {:?}", path))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    for line in lines {
        writeln!(writer, "{}", line?)?;
    }
    Ok(())
}
