use clap::Parser;
use rocksdb::ReadOptions;

use chronicle::registers::{decode_key, RegisterStore, MVCC_SUFFIX_LEN};

#[derive(Parser, Debug)]
#[command(name = "check-store", about = "Validate register store key encoding")]
struct Args {
    /// Register payload database directory
    #[arg(long, default_value = "payload.db")]
    data: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let store = RegisterStore::open_read_only(&args.data)?;

    let mut read_opts = ReadOptions::default();
    read_opts.set_total_order_seek(true);
    let mut iter = store.db().raw_iterator_opt(read_opts);
    iter.seek_to_first();

    let mut total: u64 = 0;
    let mut registers: u64 = 0;
    let mut violations: u64 = 0;
    let mut prev: Option<(Vec<u8>, u64)> = None;

    while iter.valid() {
        let key = iter.key().expect("valid iterator has a key").to_vec();
        total += 1;

        match decode_key(&key) {
            Ok((_owner, _reg_key, height)) => {
                let prefix = key[..key.len() - MVCC_SUFFIX_LEN].to_vec();
                match &prev {
                    Some((prev_prefix, prev_height)) if *prev_prefix == prefix => {
                        // Within one register group, iteration order
                        // must be strictly descending in height.
                        if height >= *prev_height {
                            violations += 1;
                            eprintln!(
                                "ordering violation: height {} follows {} in one group",
                                height, prev_height
                            );
                        }
                    }
                    _ => registers += 1,
                }
                prev = Some((prefix, height));
            }
            Err(err) => {
                violations += 1;
                eprintln!("undecodable key ({} bytes): {}", key.len(), err);
            }
        }

        iter.next();
    }

    println!("total versions:    {}", total);
    println!("distinct registers: {}", registers);
    println!("violations:        {}", violations);

    if violations > 0 {
        return Err(format!("{} violations found", violations).into());
    }
    Ok(())
}
