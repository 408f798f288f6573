//! Provenance ledger.
//!
//! The ledger is the single source of truth for which frames have been
//! seen and which master products have been built. All engine workers
//! share one [`Ledger`], and every mutation is serialized through it,
//! so readiness decisions and build claims are race-free.

mod sqlite;
mod store;

pub use sqlite::SqliteLedger;
pub use store::{
    EntryKind, Ledger, LedgerEntry, LedgerError, LedgerFilter, NewFrameRecord, NewProductRecord,
};
