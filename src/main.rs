use clap::{Parser, Subcommand};
use scan_state_sync::remote::{LocalOnlyRemote, RemoteStore, RestRemoteConfig, RestRemoteStore};
use scan_state_sync::scan::engine::{ScanOrchestrator, ScanOutcome, ScanServices};
use scan_state_sync::scan::hashing::compute_file_hash;
use scan_state_sync::scan::{FileSource, ScanError, ScanSource};
use scan_state_sync::storage::{FileCheckpointStore, FileStateSnapshotStore};
use scan_state_sync::utils::{format_gigabytes, format_percent};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "scan-state-sync", about = "Resumable balance scanner for large binary files")]
struct Cli {
	/// Directory for checkpoints and the state snapshot
	#[arg(long, env = "SCAN_DATA_DIR", default_value = ".scan-state", global = true)]
	data_dir: PathBuf,

	/// Base URL of the REST store; local-only when absent
	#[arg(long, env = "SCAN_REMOTE_URL", global = true)]
	remote_url: Option<String>,

	#[arg(long, env = "SCAN_REMOTE_KEY", default_value = "", global = true)]
	remote_key: String,

	#[arg(long, env = "SCAN_USER_ID", global = true)]
	user_id: Option<String>,

	/// Storage quota in bytes used for usage reporting
	#[arg(long, global = true)]
	quota: Option<u64>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Scan a file, resuming from the last checkpoint when one exists
	Scan {
		file: PathBuf,
		/// Start at this byte offset instead of the recovered one
		#[arg(long, default_value_t = 0)]
		resume_from: u64,
	},
	/// Show the stored state and storage usage
	Status { file: Option<PathBuf> },
	/// Clear the current state, and the file's checkpoints when a file is given
	Clear {
		file: Option<PathBuf>,
		/// Also wipe every checkpoint, metadata entry and cached chunk
		#[arg(long)]
		all: bool,
	},
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let cli = Cli::parse();
	if let Err(e) = run(cli).await {
		error!("{}", e);
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> Result<(), ScanError> {
	let orchestrator = build_orchestrator(&cli)?;

	match cli.command {
		Command::Scan { file, resume_from } => {
			let source: Arc<dyn ScanSource> = Arc::new(FileSource::open(&file).await?);
			scan(&orchestrator, source, resume_from).await
		}
		Command::Status { file } => status(&orchestrator, file).await,
		Command::Clear { file, all } => {
			orchestrator.load_state().await;
			orchestrator.clear_state().await;
			if let Some(file) = file {
				let source = FileSource::open(&file).await?;
				let file_hash = compute_file_hash(&source).await;
				orchestrator.forget_file(&file_hash).await?;
				info!("Removed checkpoints for {}", source.name());
			}
			if all {
				orchestrator.clear_storage().await?;
			}
			Ok(())
		}
	}
}

fn build_orchestrator(cli: &Cli) -> Result<Arc<ScanOrchestrator>, ScanError> {
	let mut checkpoints = FileCheckpointStore::new(&cli.data_dir);
	if let Some(quota) = cli.quota {
		checkpoints = checkpoints.with_quota(quota);
	}

	let remote: Arc<dyn RemoteStore> = match &cli.remote_url {
		Some(url) => {
			let mut config = RestRemoteConfig::new(url, &cli.remote_key);
			if let Some(user_id) = &cli.user_id {
				config = config.with_user(user_id);
			}
			info!("Remote sync enabled against {}", url);
			Arc::new(RestRemoteStore::new(config)?)
		}
		None => {
			info!("No remote configured, running local-only");
			Arc::new(LocalOnlyRemote)
		}
	};

	Ok(ScanOrchestrator::with_defaults(ScanServices {
		checkpoints: Arc::new(checkpoints),
		snapshots: Arc::new(FileStateSnapshotStore::new(&cli.data_dir)),
		remote,
	}))
}

async fn scan(
	orchestrator: &Arc<ScanOrchestrator>,
	source: Arc<dyn ScanSource>,
	resume_from: u64,
) -> Result<(), ScanError> {
	let run = orchestrator.start_global_processing(source, resume_from);
	tokio::pin!(run);

	let outcome = tokio::select! {
		outcome = &mut run => outcome,
		_ = tokio::signal::ctrl_c() => {
			warn!("Interrupt received, stopping scan");
			orchestrator.stop_processing().await;
			run.await
		}
	};
	orchestrator.shutdown().await;

	match outcome {
		ScanOutcome::Completed(state) => {
			info!("Scan of {} completed", state.file_name);
			for balance in &state.balances {
				info!(
					"{} {}: total {:.2} across {} transactions (avg {:.2}, max {:.2})",
					balance.currency,
					balance.account_name,
					balance.total_amount,
					balance.transaction_count,
					balance.average_transaction,
					balance.largest_transaction
				);
			}
			Ok(())
		}
		ScanOutcome::Stopped { bytes_processed } => {
			info!("Scan stopped at byte {}, run again to resume", bytes_processed);
			Ok(())
		}
		ScanOutcome::Failed { message } => {
			error!("Scan failed: {}", message);
			Ok(())
		}
		ScanOutcome::Rejected => Err(ScanError::AlreadyActive),
	}
}

async fn status(orchestrator: &ScanOrchestrator, file: Option<PathBuf>) -> Result<(), ScanError> {
	match orchestrator.load_state().await {
		Some(state) => info!(
			status = ?state.status,
			sync = ?state.sync_status,
			"{}: {} of {} ({}), {} currencies",
			state.file_name,
			format_gigabytes(state.bytes_processed()),
			format_gigabytes(state.file_size),
			format_percent(state.progress()),
			state.balances.len()
		),
		None => info!("No processing state stored"),
	}

	if let Some(file) = file {
		let source = FileSource::open(&file).await?;
		let file_hash = compute_file_hash(&source).await;
		match orchestrator.get_last_checkpoint(&file_hash).await? {
			Some(checkpoint) => info!(
				"Last checkpoint {} at {} ({})",
				checkpoint.id,
				format_gigabytes(checkpoint.bytes_processed),
				format_percent(checkpoint.progress)
			),
			None => info!("No checkpoints for {}", source.name()),
		}
		for balance in orchestrator.file_balances(&file_hash).await? {
			info!(
				"{}: total {:.2} across {} transactions",
				balance.currency, balance.total_amount, balance.transaction_count
			);
		}
	}

	let stats = orchestrator.persistent_storage_stats().await?;
	info!(
		"Storage: {} files, {} checkpoints, {} chunks, {} used ({}% of quota)",
		stats.total_files,
		stats.total_checkpoints,
		stats.total_chunks,
		format_gigabytes(stats.storage_usage.used),
		stats.storage_usage.percentage
	);
	Ok(())
}
