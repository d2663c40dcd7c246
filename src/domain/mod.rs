// ============================================================================
// Domain Layer
// ============================================================================
//
// The order aggregate and its acceptance rules. Nothing in here performs
// I/O; persistence, caching and messaging live in their own modules.
//
// ============================================================================

pub mod order;
