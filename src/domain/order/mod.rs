// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (Delivery, Payment, Item)
// - Aggregate (Order)
// - Errors (ValidationError)
// - Validation gate
// - Wire decoding helpers (null as zero value, timestamps)
//
// ============================================================================

pub mod value_objects;
pub mod aggregate;
pub mod errors;
pub mod validation;
mod wire;

// Re-export for convenience
pub use value_objects::*;
pub use aggregate::*;
pub use errors::*;
pub use validation::*;
pub use wire::zero_time;
