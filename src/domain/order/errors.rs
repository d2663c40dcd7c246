// ============================================================================
// Order Acceptance Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("order_uid is required")]
    MissingOrderUid,

    #[error("track_number is required")]
    MissingTrackNumber,

    #[error("payment transaction is required")]
    MissingTransaction,
}

impl ValidationError {
    /// Short label used in metrics and dead-letter records.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::MissingOrderUid => "missing_order_uid",
            ValidationError::MissingTrackNumber => "missing_track_number",
            ValidationError::MissingTransaction => "missing_transaction",
        }
    }
}
