use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use search_core::{IndexConfig, IndexPaths, IndexRouter, Ingested, RawDocument, SkipReason};
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and extend the sharded inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest stored crawl records (one JSON document per .json file, or .jsonl lines)
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Index directory
        #[arg(long, default_value = "./index")]
        index: String,
        /// Start from an empty index instead of extending the persisted one
        #[arg(long, default_value_t = false)]
        rebuild: bool,
        /// Number of shards for a new index
        #[arg(long)]
        shards: Option<usize>,
        /// Outlink host suffix that earns popularity votes (repeatable, replaces the defaults)
        #[arg(long = "allow-domain")]
        allow_domains: Vec<String>,
        /// Remove stopwords before counting tokens
        #[arg(long, default_value_t = false)]
        drop_stopwords: bool,
    },
}

#[derive(Debug, Default)]
struct BatchStats {
    indexed: usize,
    malformed: usize,
    skipped: BTreeMap<String, usize>,
}

impl BatchStats {
    fn record(&mut self, outcome: Ingested) {
        match outcome {
            Ingested::Indexed(_) => self.indexed += 1,
            Ingested::Skipped(reason) => *self.skipped.entry(reason.to_string()).or_insert(0) += 1,
        }
    }

    fn skipped(&self, reason: SkipReason) -> usize {
        self.skipped.get(&reason.to_string()).copied().unwrap_or(0)
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, index, rebuild, shards, allow_domains, drop_stopwords } => {
            let mut config = IndexConfig::default();
            if let Some(n) = shards {
                config = config.with_shard_count(n);
            }
            if !allow_domains.is_empty() {
                config.allowed_domains = allow_domains;
            }
            config.drop_stopwords = drop_stopwords;
            build_index(Path::new(&input), &index, config, rebuild)
        }
    }
}

fn discover(input_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }
    files
}

fn build_index(input: &Path, index: &str, config: IndexConfig, rebuild: bool) -> Result<()> {
    let paths = IndexPaths::new(index);
    fs::create_dir_all(&paths.root).with_context(|| format!("creating {}", paths.root.display()))?;
    let mut router = IndexRouter::open(paths.clone(), config, rebuild)?;
    tracing::info!(
        index,
        rebuild,
        shards = router.shard_count(),
        documents = router.documents().len(),
        "index opened"
    );

    let files = discover(input);
    tracing::info!(files = files.len(), input = %input.display(), "discovered input files");

    let mut stats = BatchStats::default();
    for file in &files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            index_jsonl(file, &mut router, &mut stats)?;
        } else {
            index_json(file, &mut router, &mut stats)?;
        }
    }

    let written = router.save_index()?;
    let disk = paths.disk_usage()?;
    tracing::info!(
        indexed = stats.indexed,
        malformed = stats.malformed,
        not_html = stats.skipped(SkipReason::NotHtml),
        duplicate_url = stats.skipped(SkipReason::DuplicateUrl),
        near_duplicate = stats.skipped(SkipReason::NearDuplicate),
        low_information = stats.skipped(SkipReason::LowInformation),
        bytes_written = written,
        "index build complete"
    );

    println!("Indexed documents: {}", router.documents().len());
    println!("Distinct tokens: {}", router.distinct_tokens());
    println!("Index size: {} kB", disk / 1024);
    Ok(())
}

fn ingest(record: &str, origin: &Path, router: &mut IndexRouter, stats: &mut BatchStats) -> Result<()> {
    let doc: RawDocument = match serde_json::from_str(record) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(file = %origin.display(), error = %e, "malformed document, skipping");
            stats.malformed += 1;
            return Ok(());
        }
    };
    let outcome = router.add_document(&doc)?;
    stats.record(outcome);
    Ok(())
}

fn index_jsonl(file: &Path, router: &mut IndexRouter, stats: &mut BatchStats) -> Result<()> {
    let reader = BufReader::new(File::open(file).with_context(|| format!("opening {}", file.display()))?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        ingest(&line, file, router, stats)?;
    }
    Ok(())
}

fn index_json(file: &Path, router: &mut IndexRouter, stats: &mut BatchStats) -> Result<()> {
    let record = match fs::read_to_string(file) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(file = %file.display(), error = %e, "unreadable document, skipping");
            stats.malformed += 1;
            return Ok(());
        }
    };
    ingest(&record, file, router, stats)
}
