//! LedgerKV Inspection Tool
//!
//! Offline maintenance for a LedgerKV data directory: dump the manifest,
//! verify on-disk integrity, or force a full compaction pass.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use ledgerkv::recovery::WAL_DIR;
use ledgerkv::store::{segment, ManifestFile, SegmentReader, MANIFEST_FILENAME, SEGMENT_DIR};
use ledgerkv::wal::{self, WalReadOutcome, WalReader};
use ledgerkv::{Config, Engine};

/// LedgerKV inspection and maintenance tool
#[derive(Parser, Debug)]
#[command(name = "ledgerkv-inspect")]
#[command(about = "Inspect and maintain a LedgerKV data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./ledgerkv_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the manifest: live segments and the flush checkpoint
    Manifest,

    /// Re-validate every segment checksum and check the WAL tail
    Verify,

    /// Open the engine and run compaction until quiescent
    Compact,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ledgerkv=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let result = match args.command {
        Command::Manifest => dump_manifest(&args.data_dir),
        Command::Verify => verify(&args.data_dir),
        Command::Compact => compact(&args.data_dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn dump_manifest(data_dir: &std::path::Path) -> ledgerkv::Result<()> {
    let manifest = ManifestFile::load_or_default(&data_dir.join(MANIFEST_FILENAME))?;
    let data = manifest.data();

    println!("format_version:        {}", data.format_version);
    println!("last_flushed_sequence: {}", data.last_flushed_sequence);
    println!("next_segment_id:       {}", data.next_segment_id);
    println!("segments ({}):", data.segments.len());
    for meta in &data.segments {
        println!(
            "  id={:06} level={} entries={} bytes={} seq=[{}, {}] keys=[{}, {}]",
            meta.id,
            meta.level,
            meta.entry_count,
            meta.file_size,
            meta.min_seq,
            meta.max_seq,
            String::from_utf8_lossy(&meta.min_key),
            String::from_utf8_lossy(&meta.max_key),
        );
    }
    Ok(())
}

fn verify(data_dir: &std::path::Path) -> ledgerkv::Result<()> {
    let manifest = ManifestFile::load_or_default(&data_dir.join(MANIFEST_FILENAME))?;
    let segments_dir = data_dir.join(SEGMENT_DIR);

    let mut corrupt = 0usize;
    for meta in &manifest.data().segments {
        let path = segment::segment_path(&segments_dir, meta.id);
        match SegmentReader::open(&path) {
            Ok(reader) => {
                println!("segment {:06}: ok ({} entries)", meta.id, reader.entry_count());
            }
            Err(e) => {
                corrupt += 1;
                println!("segment {:06}: CORRUPT ({})", meta.id, e);
            }
        }
    }

    for (wal_id, path) in wal::list_wal_files(&data_dir.join(WAL_DIR))? {
        let mut reader = WalReader::open(&path)?;
        while reader.next_entry()?.is_some() {}
        match reader.outcome() {
            Some(WalReadOutcome::EndOfFile) | None => {
                println!("wal {:010}: ok ({} records)", wal_id, reader.records_read());
            }
            Some(outcome) => {
                println!(
                    "wal {:010}: {:?} after {} records (crash boundary, recoverable)",
                    wal_id,
                    outcome,
                    reader.records_read()
                );
            }
        }
    }

    if corrupt > 0 {
        return Err(ledgerkv::EngineError::Corruption(format!(
            "{} corrupt segment(s); restore from backup",
            corrupt
        )));
    }
    Ok(())
}

fn compact(data_dir: &std::path::Path) -> ledgerkv::Result<()> {
    let engine = Engine::open(Config::builder().data_dir(data_dir).build())?;
    engine.compact()?;
    println!(
        "compaction complete: {} merge(s), {} segment(s) live",
        engine.compaction_count(),
        engine.segment_count()
    );
    engine.close()
}
