use std::collections::BTreeMap;
use clap::Parser;
use rocksdb::IteratorMode;

use chronicle::index_writer::open_index_read_only;
use chronicle::keys;

#[derive(Parser, Debug)]
#[command(name = "inspect-index", about = "Dump auxiliary index state")]
struct Args {
    /// Auxiliary index directory
    #[arg(long, default_value = "index")]
    index: String,
}

fn tag_name(tag: u8) -> &'static str {
    match tag {
        keys::FIRST => "FIRST",
        keys::LAST => "LAST",
        keys::BLOCK_TO_HEIGHT => "BLOCK_TO_HEIGHT",
        keys::HEIGHT_TO_COMMIT => "HEIGHT_TO_COMMIT",
        keys::COMMIT_TO_HEIGHT => "COMMIT_TO_HEIGHT",
        keys::HEADER => "HEADER",
        keys::EVENT_BUCKET => "EVENT_BUCKET",
        keys::COLLECTION => "COLLECTION",
        keys::TRANSACTION => "TRANSACTION",
        keys::TRANSACTION_TO_HEIGHT => "TRANSACTION_TO_HEIGHT",
        keys::COLLECTIONS_AT_HEIGHT => "COLLECTIONS_AT_HEIGHT",
        keys::TRANSACTIONS_AT_HEIGHT => "TRANSACTIONS_AT_HEIGHT",
        keys::RESULT => "RESULT",
        keys::SEAL => "SEAL",
        keys::SEALS_AT_HEIGHT => "SEALS_AT_HEIGHT",
        keys::GUARANTEE => "GUARANTEE",
        _ => "UNKNOWN",
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let db = open_index_read_only(&args.index)?;

    println!("=== BOUNDARY MARKERS ===");
    match db.get(keys::marker(keys::FIRST))? {
        Some(bytes) => match keys::decode_height(&bytes) {
            Some(height) => println!("first: {}", height),
            None => println!("first: CORRUPT ({} bytes)", bytes.len()),
        },
        None => println!("first: not set"),
    }
    let last = match db.get(keys::marker(keys::LAST))? {
        Some(bytes) => {
            let height = keys::decode_height(&bytes);
            match height {
                Some(height) => println!("last: {}", height),
                None => println!("last: CORRUPT ({} bytes)", bytes.len()),
            }
            height
        }
        None => {
            println!("last: not set");
            None
        }
    };

    println!("\n=== RECORD COUNTS BY TAG ===");
    let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
    for item in db.iterator(IteratorMode::Start) {
        let (key, _value) = item?;
        if let Some(tag) = key.first() {
            *counts.entry(*tag).or_default() += 1;
        }
    }
    for (tag, count) in &counts {
        println!("{:24} {}", tag_name(*tag), count);
    }

    // Spot-check per-height completeness near the tip.
    if let Some(last) = last {
        println!("\n=== TIP COMPLETENESS (last 5 heights) ===");
        let start = last.saturating_sub(4);
        for height in start..=last {
            let header = db.get(keys::by_height(keys::HEADER, height))?.is_some();
            let commit = db
                .get(keys::by_height(keys::HEIGHT_TO_COMMIT, height))?
                .is_some();
            let txs = db
                .get(keys::by_height(keys::TRANSACTIONS_AT_HEIGHT, height))?
                .is_some();
            println!(
                "height {}: header={} commit={} transactions={}",
                height, header, commit, txs
            );
        }
    }

    Ok(())
}
