use std::fs::File;
use std::sync::Arc;
use clap::Parser;
use fs2::FileExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use chronicle::cache::ReadCache;
use chronicle::chain::{Chain, DiskChain};
use chronicle::checkpoint::load_checkpoint;
use chronicle::codec::Codec;
use chronicle::config::{expand_path, load_config};
use chronicle::error::ArchiveError;
use chronicle::index_reader::IndexReader;
use chronicle::index_writer::{open_index, ArchiveWriter};
use chronicle::mapper::Mapper;
use chronicle::ops::ReaderOps;
use chronicle::registers::RegisterStore;
use chronicle::server;
use chronicle::telemetry::init_tracing;
use chronicle::trie::Trie;
use chronicle::types::Height;
use chronicle::wal::SegmentFeeder;

#[derive(Parser, Debug)]
#[command(name = "chronicle", about = "Execution-state archive and indexer")]
struct Args {
    /// Auxiliary index directory
    #[arg(long, default_value = "index")]
    index: String,

    /// Register payload database directory
    #[arg(long, default_value = "payload.db")]
    data: String,

    /// Trie-update write-ahead log directory
    #[arg(long)]
    trie: String,

    /// Protocol-state database of the execution node
    #[arg(long)]
    chain: String,

    /// Root state checkpoint file
    #[arg(long)]
    checkpoint: Option<String>,

    /// Pretrained Zstandard dictionary for index values
    #[arg(long)]
    dictionary: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    level: String,

    /// Override the bootstrap root height reported by the chain
    #[arg(long)]
    height: Option<u64>,

    /// Configuration file (defaults to config.toml when present)
    #[arg(long)]
    config: Option<String>,
}

/// Chain wrapper applying the --height root override.
struct RootOverride<C: Chain> {
    inner: C,
    root: Height,
}

impl<C: Chain> Chain for RootOverride<C> {
    fn root_height(&self) -> Result<Height, ArchiveError> {
        Ok(self.root)
    }

    fn header(&self, height: Height) -> Result<chronicle::types::Header, ArchiveError> {
        self.inner.header(height)
    }

    fn commit(
        &self,
        height: Height,
    ) -> Result<chronicle::types::StateCommitment, ArchiveError> {
        self.inner.commit(height)
    }

    fn events(&self, height: Height) -> Result<Vec<chronicle::types::Event>, ArchiveError> {
        self.inner.events(height)
    }

    fn collections(
        &self,
        height: Height,
    ) -> Result<Vec<chronicle::types::Collection>, ArchiveError> {
        self.inner.collections(height)
    }

    fn guarantees(
        &self,
        height: Height,
    ) -> Result<Vec<chronicle::types::Guarantee>, ArchiveError> {
        self.inner.guarantees(height)
    }

    fn transactions(
        &self,
        height: Height,
    ) -> Result<Vec<chronicle::types::Transaction>, ArchiveError> {
        self.inner.transactions(height)
    }

    fn results(
        &self,
        height: Height,
    ) -> Result<Vec<chronicle::types::ExecutionResult>, ArchiveError> {
        self.inner.results(height)
    }

    fn seals(&self, height: Height) -> Result<Vec<chronicle::types::Seal>, ArchiveError> {
        self.inner.seals(height)
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref())?;

    let index_dir = expand_path(&args.index);
    let data_dir = expand_path(&args.data);
    let wal_dir = expand_path(&args.trie);
    let chain_dir = expand_path(&args.chain);

    // Single-writer guard: one archive process per index directory.
    std::fs::create_dir_all(&index_dir)?;
    let lock_file = File::create(format!("{}/LOCK", index_dir))?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| format!("another instance holds the lock on {}", index_dir))?;

    // The compression dictionary is loaded once here and shared
    // immutably; components receive it by construction.
    let level = config.get_int("codec.level")? as i32;
    let codec = match &args.dictionary {
        Some(path) => {
            let dict = std::fs::read(expand_path(path))?;
            Arc::new(Codec::with_dictionary(&dict, level))
        }
        None => Arc::new(Codec::plain()),
    };

    let registers = Arc::new(RegisterStore::open(&data_dir)?);
    let index_db = open_index(&index_dir)?;
    let chain = DiskChain::open(&chain_dir)?;

    let cache = ReadCache::with_capacities(
        config.get_int("cache.headers")? as usize,
        config.get_int("cache.events")? as usize,
    );
    let reader = Arc::new(IndexReader::with_cache(
        Arc::clone(&index_db),
        Arc::clone(&codec),
        Arc::clone(&registers),
        cache,
    ));
    let writer = ArchiveWriter::new(Arc::clone(&registers), Arc::clone(&index_db), codec);

    let trie = match &args.checkpoint {
        Some(path) => {
            let path = expand_path(path);
            info!(checkpoint = %path, "loading root checkpoint");
            load_checkpoint(&path)?
        }
        None => Trie::empty(),
    };

    let feeder = SegmentFeeder::open(&wal_dir)?;
    let resume_from = reader.last().ok();
    if let Some(last) = resume_from {
        info!(last, "resuming over existing archive");
    }

    let cancel = CancellationToken::new();

    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    let bind = config.get_string("server.bind")?;
    let server_token = cancel.clone();
    let server_reader = Arc::clone(&reader);
    let server_task = tokio::spawn(async move {
        if let Err(err) = server::serve(&bind, server_reader, server_token).await {
            error!(error = %err, "query server failed");
        }
    });

    let result = match args.height {
        Some(root) => {
            let chain = RootOverride { inner: chain, root };
            Mapper::new(chain, feeder, writer, trie, resume_from)
                .run(cancel.clone())
                .await
        }
        None => {
            Mapper::new(chain, feeder, writer, trie, resume_from)
                .run(cancel.clone())
                .await
        }
    };

    cancel.cancel();
    let _ = server_task.await;

    match result {
        Ok(()) | Err(ArchiveError::Canceled) => Ok(()),
        Err(err) => Err(Box::new(err) as Box<dyn std::error::Error>),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // The guard keeps the background log writer alive until exit so
    // file output flushes.
    let _log_guard = init_tracing(&args.level);

    if let Err(err) = run(args).await {
        error!(error = %err, "archive terminated with error");
        std::process::exit(1);
    }
}
