/// Outcome of one lock/submit/unlock round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferResult {
    /// The transaction was mined successfully.
    Success,
    /// The chain call failed. The caller backs off before retrying.
    Failed,
    /// Another transaction for the sender is in flight. Retry immediately.
    NonceBlocked,
}

impl TransferResult {
    /// Whether the round succeeded.
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}
