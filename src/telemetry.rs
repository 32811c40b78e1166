/// Logging Setup and Log Helpers
///
/// Installs the global tracing subscriber and provides the two
/// helpers the indexing pipeline logs with: abbreviated 32-byte ids
/// for per-height lines, and sampled progress summaries for the
/// mapper's apply loop, which can run through millions of trie
/// updates during a catch-up.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the tracing subscriber. The level comes from the --level
/// flag; a set RUST_LOG wins over it. CHRONICLE_LOG_FORMAT=json
/// switches to JSON output, and CHRONICLE_LOG_DIR, when set, sends
/// output to a daily-rotated `chronicle.log` in that directory
/// instead of the console.
///
/// The returned guard owns the background log writer; the caller
/// keeps it alive for the process lifetime so file output flushes on
/// shutdown. Console-only setups return None.
pub fn init_tracing(level: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = std::env::var("CHRONICLE_LOG_FORMAT")
        .map(|format| format == "json")
        .unwrap_or(false);

    match std::env::var("CHRONICLE_LOG_DIR") {
        Ok(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(rolling::daily(dir, "chronicle.log"));
            if json {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json().with_writer(writer))
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_target(false).with_ansi(false).with_writer(writer))
                    .init();
            }
            Some(guard)
        }
        Err(_) => {
            if json {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_target(false))
                    .init();
            }
            None
        }
    }
}

/// Abbreviate a 32-byte identifier or commitment for a log line:
/// the first eight bytes as hex. Full values stay in the index and in
/// error messages, where they are needed for correlation.
pub fn short_hex(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(8)])
}

/// Totals reported by [`ApplyProgress`] at each sampling point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    /// Trie updates applied since the mapper started.
    pub updates: u64,
    /// Register writes carried by those updates.
    pub registers: u64,
}

/// Sampled progress for the mapper's apply loop. Counts every applied
/// trie update and the register writes it carried, and yields a
/// summary once per `interval` updates so a long WAL replay stays
/// visible without logging per record.
pub struct ApplyProgress {
    interval: u64,
    updates: u64,
    registers: u64,
}

impl ApplyProgress {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            updates: 0,
            registers: 0,
        }
    }

    /// Count one applied update carrying `registers` writes. Returns
    /// the running totals at every `interval`-th update.
    pub fn record(&mut self, registers: usize) -> Option<ApplyStats> {
        self.updates += 1;
        self.registers += registers as u64;
        if self.updates % self.interval == 0 {
            Some(ApplyStats {
                updates: self.updates,
                registers: self.registers,
            })
        } else {
            None
        }
    }
}
