/// Mapper - The Central Indexing State Machine
///
/// Reconciles two independent streams into atomic per-height batches:
/// sealed commitments from the chain source, and trie deltas from the
/// write-ahead log. Per height the machine cycles
///
///     Loading -> Applying -> Matched -> Indexing -> Loading
///
/// with terminal Finished (either stream exhausted) and Failed (root
/// mismatch, corruption, or write failure). A height is only made
/// durable once the in-memory trie root equals the sealed commitment,
/// so the archive can never contain a state the chain did not seal.
///
/// The mapper exclusively owns the trie and the pending-delta buffer.
/// Cancellation is checked between transitions and between record
/// applications; a canceled height leaves no partial state behind.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chain::Chain;
use crate::error::ArchiveError;
use crate::metrics;
use crate::ops::WriterOps;
use crate::telemetry::{short_hex, ApplyProgress};
use crate::trie::Trie;
use crate::types::{BlockBatch, Delta, Height, StateCommitment};
use crate::wal::Feeder;

/// Maximum attempts for transient chain-source failures.
const MAX_RETRIES: u32 = 8;
/// Initial retry backoff; doubles per attempt up to the cap.
const RETRY_BASE: Duration = Duration::from_millis(100);
const RETRY_CAP: Duration = Duration::from_secs(5);

/// Observable machine state, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Loading,
    Applying,
    Matched,
    Indexing,
    Finished,
    Failed,
}

pub struct Mapper<C: Chain, F: Feeder, W: WriterOps> {
    chain: C,
    feeder: F,
    writer: W,
    trie: Trie,
    pending: Vec<Delta>,
    height: Height,
    status: Status,
    /// Resume target: the last height already durable in the index.
    /// The mapper replays the WAL up to its commitment before
    /// indexing anything new.
    resume_from: Option<Height>,
    applied: ApplyProgress,
}

impl<C: Chain, F: Feeder, W: WriterOps> Mapper<C, F, W> {
    /// `trie` is the bootstrap state: empty, or rebuilt from a
    /// checkpoint whose root equals the chain's commitment at the
    /// root height. `resume_from` carries the index's last height
    /// when restarting over an existing archive.
    pub fn new(chain: C, feeder: F, writer: W, trie: Trie, resume_from: Option<Height>) -> Self {
        Self {
            chain,
            feeder,
            writer,
            trie,
            pending: Vec::new(),
            height: 0,
            status: Status::Loading,
            resume_from,
            applied: ApplyProgress::new(10_000),
        }
    }

    /// Drive the machine until the chain or the WAL is exhausted.
    /// Returns Ok on Finished, Err(Canceled) on cooperative stop, and
    /// any other error marks the Failed terminal state.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ArchiveError> {
        let result = self.drive(&cancel).await;
        match &result {
            Ok(()) => {
                self.status = Status::Finished;
                info!(height = self.height, "indexing finished");
            }
            Err(ArchiveError::Canceled) => {
                info!(height = self.height, "indexing canceled");
            }
            Err(err) => {
                self.status = Status::Failed;
                warn!(height = self.height, error = %err, "indexing failed");
            }
        }
        result
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<(), ArchiveError> {
        let root_height = self
            .retry("root height", |chain| chain.root_height())
            .await?;

        match self.resume_from {
            Some(last) => {
                if last < root_height {
                    return Err(ArchiveError::mismatch(format!(
                        "index last height {} below chain root height {}",
                        last, root_height
                    )));
                }
                self.catch_up(last, cancel).await?;
                self.height = last + 1;
            }
            None => {
                self.height = root_height;
            }
        }

        loop {
            if cancel.is_cancelled() {
                return Err(ArchiveError::Canceled);
            }

            self.transition(Status::Loading);
            let height = self.height;
            let header = match self.retry("header", |chain| chain.header(height)).await {
                Ok(header) => header,
                Err(ArchiveError::Finished) => return Ok(()),
                Err(err) => return Err(err),
            };
            let target = self.retry("commit", |chain| chain.commit(height)).await?;
            let events = self.retry("events", |chain| chain.events(height)).await?;
            let collections = self
                .retry("collections", |chain| chain.collections(height))
                .await?;
            let guarantees = self
                .retry("guarantees", |chain| chain.guarantees(height))
                .await?;
            let transactions = self
                .retry("transactions", |chain| chain.transactions(height))
                .await?;
            let results = self.retry("results", |chain| chain.results(height)).await?;
            let seals = self.retry("seals", |chain| chain.seals(height)).await?;

            if header.height != height {
                return Err(ArchiveError::mismatch(format!(
                    "chain returned header for height {} when asked for {}",
                    header.height, height
                )));
            }

            self.transition(Status::Applying);
            if !self.apply_until(target, cancel).await? {
                // WAL exhausted before this height sealed; nothing
                // partial is kept.
                self.pending.clear();
                return Ok(());
            }

            self.transition(Status::Matched);
            let batch = BlockBatch {
                height,
                block_id: header.block_id,
                commit: target,
                header,
                deltas: std::mem::take(&mut self.pending),
                events,
                collections,
                guarantees,
                transactions,
                results,
                seals,
            };

            self.transition(Status::Indexing);
            let registers = batch.register_entries().len() as u64;
            self.writer.index_batch(&batch).await?;

            metrics::HEIGHTS_INDEXED.inc();
            metrics::REGISTERS_WRITTEN.inc_by(registers);
            metrics::LAST_INDEXED_HEIGHT.set(batch.height as i64);
            info!(
                height = batch.height,
                block = %short_hex(batch.block_id.as_bytes()),
                registers,
                "indexed height"
            );

            self.height += 1;
            tokio::task::yield_now().await;
        }
    }

    /// Apply WAL updates until the trie root equals `target`. Returns
    /// false when the feeder ran out first.
    async fn apply_until(
        &mut self,
        target: StateCommitment,
        cancel: &CancellationToken,
    ) -> Result<bool, ArchiveError> {
        while self.trie.root() != target {
            if cancel.is_cancelled() {
                return Err(ArchiveError::Canceled);
            }

            let update = match self.feeder.next_update()? {
                Some(update) => update,
                None => return Ok(false),
            };

            let current = self.trie.root();
            if update.root_before != current {
                return Err(ArchiveError::mismatch(format!(
                    "trie update expects root {} but trie is at {}",
                    update.root_before, current
                )));
            }

            let delta = update.delta();
            let next = self.trie.apply(&delta);
            if next.root() != update.root_after {
                return Err(ArchiveError::mismatch(format!(
                    "applied delta yields root {} but record claims {}",
                    next.root(),
                    update.root_after
                )));
            }

            let changed = delta.len();
            self.trie = next;
            self.pending.push(delta);

            metrics::UPDATES_APPLIED.inc();
            if let Some(stats) = self.applied.record(changed) {
                debug!(
                    updates = stats.updates,
                    registers = stats.registers,
                    "applying trie updates"
                );
            }
        }
        Ok(true)
    }

    /// Replay the WAL against the bootstrap trie until it reaches the
    /// commitment of the already-indexed `last` height. Nothing is
    /// written; the store already has this range.
    async fn catch_up(
        &mut self,
        last: Height,
        cancel: &CancellationToken,
    ) -> Result<(), ArchiveError> {
        let target = self.retry("resume commit", |chain| chain.commit(last)).await?;
        info!(height = last, commit = %short_hex(target.as_bytes()), "replaying log to resume point");

        while self.trie.root() != target {
            if cancel.is_cancelled() {
                return Err(ArchiveError::Canceled);
            }
            let update = match self.feeder.next_update()? {
                Some(update) => update,
                None => {
                    return Err(ArchiveError::mismatch(format!(
                        "log exhausted before reaching resume commit {}",
                        target
                    )))
                }
            };
            if update.root_before != self.trie.root() {
                return Err(ArchiveError::mismatch(format!(
                    "trie update expects root {} but trie is at {} during resume",
                    update.root_before,
                    self.trie.root()
                )));
            }
            self.trie = self.trie.apply(&update.delta());
        }

        info!(height = last, "resume point reached");
        Ok(())
    }

    fn transition(&mut self, next: Status) {
        if self.status != next {
            debug!(from = ?self.status, to = ?next, height = self.height, "mapper transition");
            self.status = next;
        }
    }

    /// Bounded exponential backoff around one chain-source call.
    /// Only transient I/O errors retry; everything else surfaces
    /// immediately.
    async fn retry<T>(
        &self,
        what: &str,
        op: impl Fn(&C) -> Result<T, ArchiveError>,
    ) -> Result<T, ArchiveError> {
        let mut delay = RETRY_BASE;
        let mut attempt = 0;
        loop {
            match op(&self.chain) {
                Err(err) if err.is_transient() => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES {
                        warn!(what, attempts = attempt, error = %err, "retries exhausted");
                        return Err(err);
                    }
                    warn!(what, attempt, error = %err, "transient chain error, backing off");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(RETRY_CAP);
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use crate::chain::mock::MockChain;
    use crate::types::{
        Collection, Event, ExecutionResult, Guarantee, Header, Identifier, Seal, Transaction,
    };

    /// Chain wrapper that fails the first N calls with a transient
    /// error before delegating.
    struct FlakyChain {
        inner: MockChain,
        failures: AtomicU32,
    }

    impl FlakyChain {
        fn take_failure(&self) -> bool {
            loop {
                let left = self.failures.load(Ordering::SeqCst);
                if left == 0 {
                    return false;
                }
                if self
                    .failures
                    .compare_exchange(left, left - 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return true;
                }
            }
        }
    }

    impl Chain for FlakyChain {
        fn root_height(&self) -> Result<Height, ArchiveError> {
            if self.take_failure() {
                return Err(ArchiveError::Io("transient".into()));
            }
            self.inner.root_height()
        }

        fn header(&self, height: Height) -> Result<Header, ArchiveError> {
            self.inner.header(height)
        }

        fn commit(&self, height: Height) -> Result<StateCommitment, ArchiveError> {
            self.inner.commit(height)
        }

        fn events(&self, height: Height) -> Result<Vec<Event>, ArchiveError> {
            self.inner.events(height)
        }

        fn collections(&self, height: Height) -> Result<Vec<Collection>, ArchiveError> {
            self.inner.collections(height)
        }

        fn guarantees(&self, height: Height) -> Result<Vec<Guarantee>, ArchiveError> {
            self.inner.guarantees(height)
        }

        fn transactions(&self, height: Height) -> Result<Vec<Transaction>, ArchiveError> {
            self.inner.transactions(height)
        }

        fn results(&self, height: Height) -> Result<Vec<ExecutionResult>, ArchiveError> {
            self.inner.results(height)
        }

        fn seals(&self, height: Height) -> Result<Vec<Seal>, ArchiveError> {
            self.inner.seals(height)
        }
    }

    struct NullWriter;

    impl WriterOps for NullWriter {
        async fn index_batch(&self, _batch: &BlockBatch) -> Result<(), ArchiveError> {
            Ok(())
        }
    }

    struct EmptyFeeder;

    impl Feeder for EmptyFeeder {
        fn next_update(&mut self) -> Result<Option<crate::types::TrieUpdate>, ArchiveError> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_root_height_errors_are_retried() {
        let chain = FlakyChain {
            inner: MockChain::new(3),
            failures: AtomicU32::new(3),
        };
        let mapper = Mapper::new(chain, EmptyFeeder, NullWriter, Trie::empty(), None);

        // Root height succeeds after retries; with an empty chain at
        // height 3 the header lookup then reports Finished.
        let result = mapper.run(CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail() {
        let chain = FlakyChain {
            inner: MockChain::new(3),
            failures: AtomicU32::new(u32::MAX),
        };
        let mapper = Mapper::new(chain, EmptyFeeder, NullWriter, Trie::empty(), None);

        let result = mapper.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(ArchiveError::Io(_))));
    }

    #[tokio::test]
    async fn test_pre_canceled_token_stops_before_loading() {
        let mut chain = MockChain::new(0);
        chain.seal_block(
            Header {
                chain_id: "archive-test".into(),
                block_id: Identifier([1; 32]),
                parent_id: Identifier([0; 32]),
                height: 0,
                timestamp: 0,
            },
            Trie::empty().root(),
        );
        let mapper = Mapper::new(chain, EmptyFeeder, NullWriter, Trie::empty(), None);

        let token = CancellationToken::new();
        token.cancel();
        let result = mapper.run(token).await;
        assert!(matches!(result, Err(ArchiveError::Canceled)));
    }
}
