use clap::Parser;

use chronicle::checkpoint::export_checkpoint;
use chronicle::index_writer::open_index;
use chronicle::registers::RegisterStore;

/// Snapshot both store directories into a backup target. Run while
/// the archive process is stopped; the tool takes the primary handles.
#[derive(Parser, Debug)]
#[command(name = "export-checkpoint", about = "Export a consistent snapshot of both stores")]
struct Args {
    /// Auxiliary index directory
    #[arg(long, default_value = "index")]
    index: String,

    /// Register payload database directory
    #[arg(long, default_value = "payload.db")]
    data: String,

    /// Target directory for the snapshot
    #[arg(long)]
    target: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let registers = RegisterStore::open(&args.data)?;
    let index = open_index(&args.index)?;

    export_checkpoint(
        &[
            (registers.db().as_ref(), "payload.db"),
            (index.as_ref(), "index"),
        ],
        &args.target,
    )?;

    println!("snapshot written to {}", args.target);
    Ok(())
}
