//! Progress events reported during transfers

/// One progress update. Callbacks observe progress only; they cannot
/// affect the transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferProgress {
    /// Bytes copied so far out of `total`
    Bytes { copied: u64, total: u64 },
    /// A table finished, `index` counting from 1
    Table {
        name: String,
        index: usize,
        count: usize,
        rows: u64,
    },
}
