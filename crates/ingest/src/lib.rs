//! Registration ingest: alias normalization and the eligibility gate that
//! every message passes before a provider is chosen.

pub mod eligibility;
pub mod normalize;

pub use eligibility::EligibilityValidator;
pub use normalize::ProfileNormalizer;
