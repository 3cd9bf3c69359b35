//! SDB Import - hourly snapshot import into the time-series store
//!
//! The main entry point for sdb-import, handling:
//! - One-shot catalog passes and explicit imports
//! - The polling daemon
//! - Ledger inspection and reconciliation
//! - Offline decode and encode tools
//! - Configuration and diagnostic bundle inspection

use clap::{Args, Parser, Subcommand};
use sdb_bundle::BundleReader;
use sdb_common::{SnapshotFile, SCHEMA_VERSION};
use sdb_config::{load_config, ConfigError, DaemonMode, ImportConfig, LoadedConfig};
use sdb_core::converter::CommandConverter;
use sdb_core::daemon::{run_daemon, DaemonOptions};
use sdb_core::decode::{open_snapshot, ByteOrder, DecodeError, DecodeMode, RecordDecoder, DEFAULT_RECORD_COUNT};
use sdb_core::dictionary::{file_type_id, DatumDictionary, FileTypeId};
use sdb_core::encode::{encode, parse_csv_file, DEFAULT_DATABASE, DEFAULT_MEASUREMENT};
use sdb_core::exit_codes::ExitCode;
use sdb_core::ledger::ImportLedger;
use sdb_core::logging::{event_names, generate_run_id, init_logging, LogConfig, LogFormat, LogLevel};
use sdb_core::pipeline::{Importer, PipelineSettings};
use sdb_core::store::InfluxStore;
use sdb_core::ImportError;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info};

/// SDB Import - load hourly telemetry snapshots into the time-series store
#[derive(Parser)]
#[command(name = "sdb-import")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to sdb-import.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one catalog-wide import pass
    Run(RunArgs),

    /// Import explicit snapshot files
    Import(ImportArgs),

    /// Poll the snapshot directory and import new files
    Watch(WatchArgs),

    /// List snapshots not yet in the ledger, newest first
    Pending(RootArgs),

    /// Record snapshots whose hour already has data in the store
    Reconcile(RootArgs),

    /// Print decoded snapshot records as TSV
    Decode(DecodeArgs),

    /// Encode a converter CSV file to line protocol on stdout
    Encode(EncodeArgs),

    /// Inspect the import ledger
    Ledger(LedgerArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Diagnostic bundle tools
    Bundle(BundleArgs),
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct RootArgs {
    /// Snapshot root (defaults to paths.sdb_dir)
    #[arg(long)]
    root: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    root: RootArgs,

    /// Ignore snapshots older than this two-digit year
    #[arg(long)]
    min_year: Option<u8>,

    /// Stage immediately instead of waiting for the settle delay
    #[arg(long)]
    no_settle: bool,

    /// Override pipeline.max_parallel
    #[arg(long)]
    max_parallel: Option<usize>,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Snapshot files (`YYMMDDHH.sdb.gz`)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Stage immediately instead of waiting for the settle delay
    #[arg(long)]
    no_settle: bool,
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[command(flatten)]
    root: RootArgs,

    /// Which pending snapshots each poll imports (latest, all)
    #[arg(long)]
    mode: Option<DaemonMode>,

    /// Stop after this many polls
    #[arg(long)]
    max_polls: Option<u64>,

    /// Override daemon.poll_interval_secs
    #[arg(long)]
    interval: Option<u64>,

    /// Stage immediately instead of waiting for the settle delay
    #[arg(long)]
    no_settle: bool,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Raw snapshot (gzip is detected by the `.gz` extension)
    file: PathBuf,

    /// Number of records to read
    #[arg(long, default_value_t = DEFAULT_RECORD_COUNT, conflicts_with = "all")]
    count: usize,

    /// Read records until end of file
    #[arg(long)]
    all: bool,

    /// Integer byte order (native, little, big)
    #[arg(long, default_value = "native")]
    byte_order: ByteOrder,
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Converter CSV output
    #[arg(long)]
    csv: PathBuf,

    /// Datum dictionary (`datums{N}.lst`)
    #[arg(long)]
    dictionary: PathBuf,

    #[arg(long, default_value = DEFAULT_MEASUREMENT)]
    measurement: String,

    #[arg(long, default_value = DEFAULT_DATABASE)]
    database: String,
}

#[derive(Args, Debug)]
struct LedgerArgs {
    #[command(subcommand)]
    command: LedgerCommands,
}

#[derive(Subcommand, Debug)]
enum LedgerCommands {
    /// Print every ledger entry
    List,
    /// Report whether a snapshot is recorded
    Check {
        /// Snapshot path or name
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the resolved configuration
    Show,
    /// Print the configuration JSON schema
    Schema,
    /// Load and validate the configuration
    Check,
}

#[derive(Args, Debug)]
struct BundleArgs {
    #[command(subcommand)]
    command: BundleCommands,
}

#[derive(Subcommand, Debug)]
enum BundleCommands {
    /// Print a bundle manifest and verify file checksums
    Inspect {
        path: PathBuf,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Clean
            };
            let _ = e.print();
            std::process::exit(code.as_i32());
        }
    };

    init_logging(&log_config(&cli.global));

    let run_id = generate_run_id();
    let span = tracing::info_span!("run", run_id = %run_id);
    let _guard = span.enter();

    let exit_code = match &cli.command {
        Commands::Run(args) => cmd_run(&cli.global, &run_id, args),
        Commands::Import(args) => cmd_import(&cli.global, &run_id, args),
        Commands::Watch(args) => cmd_watch(&cli.global, &run_id, args),
        Commands::Pending(args) => cmd_pending(&cli.global, &run_id, args),
        Commands::Reconcile(args) => cmd_reconcile(&cli.global, &run_id, args),
        Commands::Decode(args) => cmd_decode(args),
        Commands::Encode(args) => cmd_encode(args),
        Commands::Ledger(args) => cmd_ledger(&cli.global, args),
        Commands::Config(args) => cmd_config(&cli.global, args),
        Commands::Bundle(args) => cmd_bundle(args),
    };

    std::process::exit(exit_code.as_i32());
}

fn log_config(global: &GlobalOpts) -> LogConfig {
    let mut config = LogConfig::from_env(global.log_level, global.log_format);
    if global.log_level.is_none() && (global.verbose > 0 || global.quiet) {
        let mut level = config.level;
        for _ in 0..global.verbose {
            level = level.louder();
        }
        if global.quiet {
            level = level.max(LogLevel::Error);
        }
        config = config.with_level(level);
    }
    config
}

// ============================================================================
// Shared helpers
// ============================================================================

fn print_json<T: Serialize>(value: &T) -> Result<(), ExitCode> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        error!(target: event_names::INTERNAL_ERROR, error = %e, "Failed to serialize output");
        ExitCode::InternalError
    })?;
    println!("{text}");
    Ok(())
}

fn load(global: &GlobalOpts) -> Result<LoadedConfig, ExitCode> {
    match load_config(global.config.as_deref()) {
        Ok(loaded) => {
            match &loaded.path {
                Some(path) => info!(
                    target: event_names::CONFIG_LOADED,
                    path = %path.display(),
                    source = %loaded.source,
                    "Configuration loaded"
                ),
                None => info!(target: event_names::CONFIG_DEFAULT_USED, "No config file found; using defaults"),
            }
            Ok(loaded)
        }
        Err(e) => Err(output_config_error(&e)),
    }
}

/// Report a config error on stderr.
fn output_config_error(error: &ConfigError) -> ExitCode {
    error!(target: event_names::CONFIG_ERROR, code = error.code(), error = %error, "Configuration error");

    let response = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "status": "error",
        "error": {
            "code": error.code(),
            "message": error.to_string(),
        }
    });
    eprintln!("{response:#}");
    ExitCode::ConfigError
}

fn exit_for(error: &ImportError) -> ExitCode {
    match error {
        ImportError::Io(_)
        | ImportError::Ledger(_)
        | ImportError::Workspace(_)
        | ImportError::Bundle(_)
        | ImportError::Query(_)
        | ImportError::Write(_) => ExitCode::IoError,
        _ => ExitCode::InternalError,
    }
}

type CliImporter = Importer<CommandConverter, InfluxStore>;

fn build_importer(config: &ImportConfig, run_id: &str) -> CliImporter {
    let settings = PipelineSettings::from_config(config);
    let store = InfluxStore::from_config(&config.store, settings.measurement.clone());
    let importer = Importer::new(
        settings,
        ImportLedger::new(&config.paths.ledger),
        CommandConverter::from_config(&config.converter),
        store,
        run_id,
    );
    let shutdown = importer.shutdown_handle();
    install_shutdown_handler(shutdown);
    importer
}

fn install_shutdown_handler(flag: Arc<AtomicBool>) {
    #[cfg(unix)]
    {
        use std::sync::atomic::Ordering;
        use std::sync::OnceLock;

        static SHUTDOWN: OnceLock<Arc<AtomicBool>> = OnceLock::new();

        extern "C" fn on_signal(_signal: libc::c_int) {
            if let Some(flag) = SHUTDOWN.get() {
                flag.store(true, Ordering::SeqCst);
            }
        }

        if SHUTDOWN.set(flag).is_ok() {
            // SAFETY: the handler only performs an atomic store.
            unsafe {
                libc::signal(libc::SIGINT, on_signal as libc::sighandler_t);
                libc::signal(libc::SIGTERM, on_signal as libc::sighandler_t);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = flag;
}

fn root_or_default(root: &RootArgs, config: &ImportConfig) -> PathBuf {
    root.root.clone().unwrap_or_else(|| config.paths.sdb_dir.clone())
}

// ============================================================================
// Import commands
// ============================================================================

fn cmd_run(global: &GlobalOpts, run_id: &str, args: &RunArgs) -> ExitCode {
    let mut config = match load(global) {
        Ok(loaded) => loaded.config,
        Err(code) => return code,
    };
    if args.min_year.is_some() {
        config.pipeline.min_year = args.min_year;
    }
    if let Some(max_parallel) = args.max_parallel {
        config.pipeline.max_parallel = max_parallel.max(1);
    }
    if args.no_settle {
        config.pipeline.settle_delay_secs = 0;
    }

    let root = root_or_default(&args.root, &config);
    let importer = build_importer(&config, run_id);
    info!(target: event_names::RUN_STARTED, command = "run", root = %root.display(), "Starting import run");

    let report = match importer.run_pass(&root) {
        Ok(report) => report,
        Err(e) => {
            error!(target: event_names::INTERNAL_ERROR, error = %e, "Import pass aborted");
            return ExitCode::IoError;
        }
    };

    let code = report.exit_code();
    info!(target: event_names::RUN_FINISHED, exit_code = %code, "Import run finished");
    print_json(&report).err().unwrap_or(code)
}

fn cmd_import(global: &GlobalOpts, run_id: &str, args: &ImportArgs) -> ExitCode {
    let mut config = match load(global) {
        Ok(loaded) => loaded.config,
        Err(code) => return code,
    };
    if args.no_settle {
        config.pipeline.settle_delay_secs = 0;
    }

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        match SnapshotFile::from_path(path) {
            Ok(file) => files.push(file),
            Err(e) => {
                eprintln!("sdb-import: {}: {e}", path.display());
                return ExitCode::ArgsError;
            }
        }
    }

    let importer = build_importer(&config, run_id);
    info!(target: event_names::RUN_STARTED, command = "import", files = files.len(), "Starting import run");
    let report = importer.import_files(files);

    let code = report.exit_code();
    info!(target: event_names::RUN_FINISHED, exit_code = %code, "Import run finished");
    print_json(&report).err().unwrap_or(code)
}

fn cmd_watch(global: &GlobalOpts, run_id: &str, args: &WatchArgs) -> ExitCode {
    let mut config = match load(global) {
        Ok(loaded) => loaded.config,
        Err(code) => return code,
    };
    if let Some(interval) = args.interval {
        config.daemon.poll_interval_secs = interval;
    }
    if args.no_settle {
        config.pipeline.settle_delay_secs = 0;
    }

    let mut options = DaemonOptions::from_config(&config.daemon).with_max_polls(args.max_polls);
    if let Some(mode) = args.mode {
        options = options.with_mode(mode);
    }

    let root = root_or_default(&args.root, &config);
    let importer = build_importer(&config, run_id);
    let state = run_daemon(&importer, &root, &options);

    let code = if state.failure_count > 0 {
        ExitCode::PartialFail
    } else if state.import_count > 0 {
        ExitCode::Imported
    } else {
        ExitCode::Clean
    };
    print_json(&state).err().unwrap_or(code)
}

#[derive(Serialize)]
struct PendingEntry {
    date: String,
    path: PathBuf,
}

fn cmd_pending(global: &GlobalOpts, run_id: &str, args: &RootArgs) -> ExitCode {
    let config = match load(global) {
        Ok(loaded) => loaded.config,
        Err(code) => return code,
    };
    let root = root_or_default(args, &config);
    let importer = build_importer(&config, run_id);

    let pending = match importer.pending_files(&root) {
        Ok(files) => files,
        Err(e) => {
            error!(error = %e, "Failed to read ledger");
            return ExitCode::IoError;
        }
    };
    let entries: Vec<PendingEntry> = pending
        .iter()
        .map(|file| PendingEntry {
            date: file.date(),
            path: file.path().to_path_buf(),
        })
        .collect();

    let response = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "root": root,
        "count": entries.len(),
        "pending": entries,
    });
    print_json(&response).err().unwrap_or(ExitCode::Clean)
}

fn cmd_reconcile(global: &GlobalOpts, run_id: &str, args: &RootArgs) -> ExitCode {
    let config = match load(global) {
        Ok(loaded) => loaded.config,
        Err(code) => return code,
    };
    let root = root_or_default(args, &config);
    let importer = build_importer(&config, run_id);

    let report = match importer.reconcile(&root) {
        Ok(report) => report,
        Err(e) => {
            error!(code = e.code(), error = %e, "Reconcile aborted");
            return exit_for(&e);
        }
    };

    let code = if !report.errors.is_empty() {
        ExitCode::PartialFail
    } else if !report.committed.is_empty() {
        ExitCode::Imported
    } else {
        ExitCode::Clean
    };
    print_json(&report).err().unwrap_or(code)
}

// ============================================================================
// Offline tools
// ============================================================================

fn cmd_decode(args: &DecodeArgs) -> ExitCode {
    let mode = if args.all {
        DecodeMode::UntilEof
    } else {
        DecodeMode::Fixed(args.count)
    };

    let result = open_snapshot(&args.file)
        .and_then(|reader| RecordDecoder::new(reader, mode, args.byte_order))
        .and_then(|decoder| {
            let stdout = std::io::stdout();
            let mut out = std::io::BufWriter::new(stdout.lock());
            for record in decoder {
                let record = record?;
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    record.source(),
                    record.datum(),
                    record.absolute_time_nanos(),
                    record.value
                )?;
            }
            out.flush()?;
            Ok(())
        });

    match result {
        Ok(()) => ExitCode::Clean,
        Err(e) => {
            eprintln!("sdb-import: {}: {e}", args.file.display());
            match e {
                DecodeError::Io(_) => ExitCode::IoError,
                _ => ExitCode::InternalError,
            }
        }
    }
}

fn cmd_encode(args: &EncodeArgs) -> ExitCode {
    match encode_file(args) {
        Ok(rendered) => {
            print!("{rendered}");
            ExitCode::Clean
        }
        Err(e) => {
            eprintln!("sdb-import: {e}");
            exit_for(&e)
        }
    }
}

fn encode_file(args: &EncodeArgs) -> Result<String, ImportError> {
    let content = std::fs::read_to_string(&args.dictionary)?;
    let id = args
        .dictionary
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(file_type_id)
        .unwrap_or_else(|| FileTypeId::from("0"));
    let dictionary = DatumDictionary::parse(id, &content, &args.dictionary)?;
    let rows = parse_csv_file(&args.csv, dictionary.len())?;
    Ok(encode(&rows, &dictionary, &args.measurement).render(&args.database))
}

// ============================================================================
// Ledger, config and bundle commands
// ============================================================================

fn cmd_ledger(global: &GlobalOpts, args: &LedgerArgs) -> ExitCode {
    let config = match load(global) {
        Ok(loaded) => loaded.config,
        Err(code) => return code,
    };
    let ledger = ImportLedger::new(&config.paths.ledger);

    match &args.command {
        LedgerCommands::List => match ledger.entries() {
            Ok(entries) => {
                let response = serde_json::json!({
                    "ledger": ledger.path(),
                    "count": entries.len(),
                    "entries": entries,
                });
                print_json(&response).err().unwrap_or(ExitCode::Clean)
            }
            Err(e) => {
                error!(error = %e, "Failed to read ledger");
                ExitCode::IoError
            }
        },
        LedgerCommands::Check { file } => {
            let snapshot = match SnapshotFile::from_path(file) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    eprintln!("sdb-import: {}: {e}", file.display());
                    return ExitCode::ArgsError;
                }
            };
            match ledger.seen(&snapshot) {
                Ok(imported) => {
                    let response = serde_json::json!({
                        "file": snapshot.path(),
                        "canonical_name": snapshot.canonical_name(),
                        "imported": imported,
                    });
                    print_json(&response).err().unwrap_or(ExitCode::Clean)
                }
                Err(e) => {
                    error!(error = %e, "Failed to read ledger");
                    ExitCode::IoError
                }
            }
        }
    }
}

fn cmd_config(global: &GlobalOpts, args: &ConfigArgs) -> ExitCode {
    match &args.command {
        ConfigCommands::Schema => print_json(&ImportConfig::json_schema()).err().unwrap_or(ExitCode::Clean),
        ConfigCommands::Show => match load(global) {
            Ok(loaded) => {
                let response = serde_json::json!({
                    "schema_version": SCHEMA_VERSION,
                    "source": loaded.source.to_string(),
                    "path": loaded.path,
                    "hash": loaded.hash,
                    "config": loaded.config,
                });
                print_json(&response).err().unwrap_or(ExitCode::Clean)
            }
            Err(code) => code,
        },
        ConfigCommands::Check => match load(global) {
            Ok(loaded) => {
                let response = serde_json::json!({
                    "schema_version": SCHEMA_VERSION,
                    "status": "valid",
                    "source": loaded.source.to_string(),
                    "path": loaded.path,
                });
                print_json(&response).err().unwrap_or(ExitCode::Clean)
            }
            Err(code) => code,
        },
    }
}

fn cmd_bundle(args: &BundleArgs) -> ExitCode {
    match &args.command {
        BundleCommands::Inspect { path } => inspect_bundle(path),
    }
}

fn inspect_bundle(path: &Path) -> ExitCode {
    let mut reader = match BundleReader::open(path) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("sdb-import: {}: {e} (code {})", path.display(), e.code());
            return ExitCode::IoError;
        }
    };

    let failures = reader.verify_all();
    let response = serde_json::json!({
        "path": path,
        "verified": failures.is_empty(),
        "failures": failures,
        "manifest": reader.manifest(),
    });
    let code = if failures.is_empty() {
        ExitCode::Clean
    } else {
        ExitCode::PartialFail
    };
    print_json(&response).err().unwrap_or(code)
}
