//! Downstream mobile-marketing providers: the service contract, the Mobile
//! Commons implementation and its HTTP client, and provider selection.

pub mod client;
pub mod mobile_commons;
pub mod selector;
pub mod service;

pub use client::MobileCommonsClient;
pub use mobile_commons::MobileCommonsService;
pub use selector::ProviderSelector;
pub use service::{ProviderHttpClient, ProviderService};
