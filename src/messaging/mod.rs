pub mod dead_letter;
pub mod policy;
pub mod redpanda;
pub mod subscriber;

pub use dead_letter::{DeadLetterPublisher, DeadLetterRecord};
pub use policy::{Disposition, FailurePolicy};
pub use redpanda::{PublishError, RedpandaClient};
pub use subscriber::OrderSubscriber;
