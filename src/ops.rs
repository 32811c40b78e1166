/// Read/Write Operation Surface
///
/// The strongly-typed seams between the core and its collaborators.
/// The mapper writes through WriterOps; query services read through
/// ReaderOps; PayloadOps is the leaf register lookup both sides rely
/// on. The concrete store types implement these directly; there is no
/// deeper interface pyramid.

use crate::error::ArchiveError;
use crate::types::{
    BlockBatch, Collection, Event, ExecutionResult, Guarantee, Header, Height, Identifier,
    RegisterId, RegisterValue, Seal, StateCommitment, Transaction,
};

/// Point-in-time register lookup. None means the register was never
/// written at or before the given height; a zero-length value is a
/// live tombstone.
pub trait PayloadOps: Send + Sync {
    fn get_register(
        &self,
        height: Height,
        reg: &RegisterId,
    ) -> Result<Option<RegisterValue>, ArchiveError>;
}

/// The writer side: one call per height, atomic per namespace. After
/// a successful return every per-height record and every register
/// write of the batch is durable; after a failure none of the index
/// records for that height are observable.
pub trait WriterOps: Send + Sync {
    fn index_batch(
        &self,
        batch: &BlockBatch,
    ) -> impl std::future::Future<Output = Result<(), ArchiveError>> + Send;
}

/// The reader contract served to query services. Height-parameterized
/// lookups return Unavailable outside [first, last]; id lookups
/// return NotFound for entities that were never indexed.
pub trait ReaderOps: Send + Sync {
    fn first(&self) -> Result<Height, ArchiveError>;
    fn last(&self) -> Result<Height, ArchiveError>;

    fn header(&self, height: Height) -> Result<Header, ArchiveError>;
    fn commit(&self, height: Height) -> Result<StateCommitment, ArchiveError>;

    fn height_for_block(&self, id: &Identifier) -> Result<Height, ArchiveError>;
    fn height_for_commit(&self, commit: &StateCommitment) -> Result<Height, ArchiveError>;
    fn height_for_transaction(&self, id: &Identifier) -> Result<Height, ArchiveError>;

    /// Events at one height, filtered by type. An empty filter means
    /// all types. Original per-type emission order is preserved.
    fn events(&self, height: Height, kinds: &[String]) -> Result<Vec<Event>, ArchiveError>;

    /// Register values at one height, one result per requested
    /// register, in request order. Registers never written resolve to
    /// an empty byte slice.
    fn values(
        &self,
        height: Height,
        regs: &[RegisterId],
    ) -> Result<Vec<RegisterValue>, ArchiveError>;

    fn collection(&self, id: &Identifier) -> Result<Collection, ArchiveError>;
    fn guarantee(&self, id: &Identifier) -> Result<Guarantee, ArchiveError>;
    fn transaction(&self, id: &Identifier) -> Result<Transaction, ArchiveError>;
    fn seal(&self, id: &Identifier) -> Result<Seal, ArchiveError>;
    fn result(&self, id: &Identifier) -> Result<ExecutionResult, ArchiveError>;

    fn collections_by_height(&self, height: Height) -> Result<Vec<Identifier>, ArchiveError>;
    fn transactions_by_height(&self, height: Height) -> Result<Vec<Identifier>, ArchiveError>;
    fn seals_by_height(&self, height: Height) -> Result<Vec<Identifier>, ArchiveError>;
}
