use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use serde::Deserialize;
use serde_json::Map;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use remez_service::{
	AnalyzeOptions, AnalyzeRequest, QueueStatus, Service, SyncQueue, VectorIndex,
};
use remez_store::{
	db::Db,
	docs::PgDocStore,
	models::FindingRecord,
	qdrant::QdrantIndex,
};

#[derive(Debug, Parser)]
#[command(version, rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Analyze a document and persist its findings.
	Analyze {
		file: PathBuf,
		/// Reviewer identity whose precedents apply to this run.
		#[arg(long)]
		identity: Option<String>,
		/// One generative call per chunk instead of scan-then-verify.
		#[arg(long)]
		single_pass: bool,
		/// Print the cost estimate and exit without any provider call.
		#[arg(long)]
		dry_run: bool,
	},
	/// Print the projected provider usage for a document.
	Estimate {
		file: PathBuf,
		#[arg(long)]
		single_pass: bool,
	},
	/// Index canonical passages from a JSON file into a namespace.
	Index {
		file: PathBuf,
		#[arg(long)]
		namespace: String,
	},
}

#[derive(Debug, Deserialize)]
struct PassageEntry {
	id: String,
	text: String,
	#[serde(default)]
	metadata: Map<String, serde_json::Value>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = remez_config::load(&args.config)?;

	init_tracing();

	match args.command {
		Command::Analyze { file, identity, single_pass, dry_run } =>
			analyze(config, &file, identity, single_pass, dry_run).await,
		Command::Estimate { file, single_pass } => estimate(config, &file, single_pass),
		Command::Index { file, namespace } => index(config, &file, &namespace).await,
	}
}

async fn analyze(
	config: remez_config::Config,
	file: &PathBuf,
	identity: Option<String>,
	single_pass: bool,
	dry_run: bool,
) -> color_eyre::Result<()> {
	let text = std::fs::read_to_string(file)?;
	let document_id = document_id(file);
	let index: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::new(&config.storage.qdrant)?);
	let sync_policy = config.sync.clone();
	let postgres = config.storage.postgres.clone();
	let service = Service::new(config, index);

	service.events().subscribe(|progress| {
		tracing::info!(
			chunk = progress.chunk_index,
			of = progress.chunk_count,
			chars = progress.chars_processed,
			phase = ?progress.phase,
			"Analysis progress."
		);
	});

	if dry_run {
		let estimate = service.estimate_cost(&text, Some(!single_pass));

		println!("{}", estimate_json(&estimate));

		return Ok(());
	}

	let request = AnalyzeRequest { document_id: document_id.clone(), text };
	let options = AnalyzeOptions {
		two_pass: Some(!single_pass),
		identity,
		dry_run: false,
	};
	let findings = service.analyze(&request, &options).await?;

	println!("{}", serde_json::to_string_pretty(&findings)?);

	if findings.is_empty() {
		return Ok(());
	}

	let db = Db::connect(&postgres).await?;

	db.ensure_schema().await?;

	let store = Arc::new(PgDocStore::new(db));
	let queue = SyncQueue::new(store, sync_policy);
	let now = OffsetDateTime::now_utc();

	for finding in &findings {
		let record = FindingRecord {
			id: finding.id,
			document_id: document_id.clone(),
			source: finding.source.clone(),
			snippet: finding.snippet.clone(),
			justification: finding.justification.clone(),
			confidence: finding.confidence,
			implicit: finding.implicit,
			start_offset: finding.start_offset,
			end_offset: finding.end_offset,
			method: method_name(finding.method),
			created_at: now,
		};

		queue.enqueue_set(
			&format!("finding {}", finding.id),
			"findings",
			&finding.id.to_string(),
			serde_json::to_value(&record)?,
		);
	}

	wait_until_drained(&queue).await
}

fn estimate(
	config: remez_config::Config,
	file: &PathBuf,
	single_pass: bool,
) -> color_eyre::Result<()> {
	let text = std::fs::read_to_string(file)?;
	let index: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::new(&config.storage.qdrant)?);
	let service = Service::new(config, index);
	let estimate = service.estimate_cost(&text, Some(!single_pass));

	println!("{}", estimate_json(&estimate));

	Ok(())
}

async fn index(
	config: remez_config::Config,
	file: &PathBuf,
	namespace: &str,
) -> color_eyre::Result<()> {
	let raw = std::fs::read_to_string(file)?;
	let passages: Vec<PassageEntry> = serde_json::from_str(&raw)?;
	let store = QdrantIndex::new(&config.storage.qdrant)?;
	let texts: Vec<String> = passages.iter().map(|passage| passage.text.clone()).collect();
	let vectors = remez_providers::embed(&config.providers.embedding, &texts).await?;

	if vectors.len() != passages.len() {
		return Err(eyre::eyre!(
			"Embedding provider returned {} vectors for {} passages.",
			vectors.len(),
			passages.len()
		));
	}

	for (passage, vector) in passages.into_iter().zip(vectors) {
		store
			.upsert(namespace, &passage.id, vector, &passage.text, passage.metadata)
			.await?;
		tracing::info!(id = %passage.id, %namespace, "Indexed passage.");
	}

	Ok(())
}

async fn wait_until_drained(queue: &SyncQueue) -> color_eyre::Result<()> {
	let mut status = queue.subscribe();
	let mut started = false;

	loop {
		match status.borrow_and_update().clone() {
			QueueStatus::Saving { .. } => started = true,
			QueueStatus::Success => return Ok(()),
			// Idle before the first write means the worker has not picked the
			// queue up yet; Idle afterwards means it drained.
			QueueStatus::Idle if started => return Ok(()),
			QueueStatus::Idle => {},
			QueueStatus::Error { name, message } =>
				return Err(eyre::eyre!("Failed to persist {name}: {message}")),
		}

		status.changed().await.map_err(|_| eyre::eyre!("Sync queue worker stopped."))?;
	}
}

fn estimate_json(estimate: &remez_service::CostEstimate) -> String {
	serde_json::json!({
		"chunks": estimate.chunks,
		"generative_calls": estimate.generative_calls,
		"estimated_tokens": estimate.estimated_tokens,
		"estimated_seconds": estimate.estimated_seconds,
	})
	.to_string()
}

fn document_id(file: &PathBuf) -> String {
	file.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_else(|| "document".to_string())
}

fn method_name(method: remez_domain::finding::DetectionMethod) -> String {
	serde_json::to_value(method)
		.ok()
		.and_then(|value| value.as_str().map(str::to_string))
		.unwrap_or_else(|| "generative".to_string())
}

fn init_tracing() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();
}
