use super::aggregate::Order;
use super::errors::ValidationError;

/// Acceptance gate applied to a freshly decoded order before any side effect.
///
/// Rules are checked in order and the first failure wins.
pub fn validate(order: &Order) -> Result<(), ValidationError> {
    if order.order_uid.is_empty() {
        return Err(ValidationError::MissingOrderUid);
    }
    if order.track_number.is_empty() {
        return Err(ValidationError::MissingTrackNumber);
    }
    if order.payment.transaction.is_empty() {
        return Err(ValidationError::MissingTransaction);
    }
    Ok(())
}
