pub mod agent;
pub mod classifier;
pub mod jetstream;
pub mod manager;
pub mod processor;
pub mod transport;

pub use agent::RegistrationConsumer;
pub use classifier::OutcomeClassifier;
pub use jetstream::JetStreamTransport;
pub use manager::ConsumerManager;
pub use processor::RegistrationProcessor;
pub use transport::{DeadLetterRecord, Delivery, InMemoryTransport, QueueTransport};
