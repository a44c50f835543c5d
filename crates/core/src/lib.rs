pub mod config;
pub mod error;
pub mod event_bus;
pub mod outcome;
pub mod provider;
pub mod types;

pub use config::AppConfig;
pub use error::{RegistrationError, RegistrationResult};
pub use outcome::{ProcessingOutcome, RejectionReason};
pub use provider::{
    FailureCategory, ProviderKind, ProviderRequest, ProviderResponse, SubmissionFailure,
    SubmissionResult,
};
pub use types::{NormalizedProfile, RawMessage, SchoolDetails};
