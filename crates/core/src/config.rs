use crate::provider::ProviderKind;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `REGISTRATION_MOBILE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default = "default_consumers_per_node")]
    pub consumers_per_node: usize,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub eligibility: EligibilityConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub mobile_commons: MobileCommonsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "default_nats_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_stream_name")]
    pub stream_name: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_durable_name")]
    pub durable_name: String,
    #[serde(default = "default_dead_letter_stream")]
    pub dead_letter_stream: String,
    #[serde(default = "default_dead_letter_subject")]
    pub dead_letter_subject: String,
    #[serde(default = "default_ack_wait_secs")]
    pub ack_wait_secs: u64,
    #[serde(default = "default_nats_max_reconnects")]
    pub max_reconnects: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EligibilityConfig {
    #[serde(default = "default_supported_applications")]
    pub supported_applications: Vec<String>,
    #[serde(default = "default_supported_countries")]
    pub supported_countries: Vec<String>,
}

/// Copies named source fields into a profile's campaign fields for one
/// application code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CampaignFieldMapping {
    pub application_code: String,
    /// source field -> provider key
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NormalizerConfig {
    #[serde(default = "default_campaign_fields")]
    pub campaign_fields: Vec<CampaignFieldMapping>,
}

/// One entry of the provider lookup table. A route without `user_country`
/// matches any country for its application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderRoute {
    pub application_id: String,
    #[serde(default)]
    pub user_country: Option<String>,
    pub provider: ProviderKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_routes")]
    pub routes: Vec<ProviderRoute>,
}

/// What to do when a provider answers but rejects the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftErrorPolicy {
    #[default]
    Acknowledge,
    DeadLetter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_delay_secs")]
    pub delay_secs: u64,
    /// Deliveries allowed before a transient failure is dead-lettered.
    /// Zero disables the ceiling.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub soft_error_policy: SoftErrorPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MobileCommonsCredentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub company_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MobileCommonsConfig {
    #[serde(default = "default_mobile_commons_url")]
    pub base_url: String,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_provider_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Campaign field keys the provider accepts as custom profile fields.
    #[serde(default = "default_custom_profile_fields")]
    pub custom_profile_fields: Vec<String>,
    /// Credentials keyed by affiliate (application id).
    #[serde(default)]
    pub affiliates: HashMap<String, MobileCommonsCredentials>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_host")]
    pub host: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_consumers_per_node() -> usize {
    1
}
fn default_nats_urls() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}
fn default_stream_name() -> String {
    "registrations".to_string()
}
fn default_subject() -> String {
    "registration.mobile".to_string()
}
fn default_durable_name() -> String {
    "registration-mobile".to_string()
}
fn default_dead_letter_stream() -> String {
    "registrations-dead-letter".to_string()
}
fn default_dead_letter_subject() -> String {
    "registration.mobile.dead_letter".to_string()
}
fn default_ack_wait_secs() -> u64 {
    60
}
fn default_nats_max_reconnects() -> usize {
    60
}
fn default_supported_applications() -> Vec<String> {
    ["US", "CA", "CGG", "AGG", "FLF", "MUI"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_supported_countries() -> Vec<String> {
    ["US", "CA", "MX", "BR"].iter().map(|s| s.to_string()).collect()
}
fn default_campaign_fields() -> Vec<CampaignFieldMapping> {
    vec![
        CampaignFieldMapping {
            application_code: "CGG".to_string(),
            fields: BTreeMap::from([(
                "candidate_name".to_string(),
                "CGG2015_1st_vote".to_string(),
            )]),
        },
        CampaignFieldMapping {
            application_code: "AGG".to_string(),
            fields: BTreeMap::from([
                ("candidate_name".to_string(), "AGG2015_1st_vote".to_string()),
                ("candidate_id".to_string(), "AGG2015_1st_vote_id".to_string()),
                (
                    "candidate_gender".to_string(),
                    "AGG2015_1st_vote_gender".to_string(),
                ),
            ]),
        },
    ]
}
fn default_routes() -> Vec<ProviderRoute> {
    default_supported_applications()
        .into_iter()
        .map(|application_id| ProviderRoute {
            application_id,
            user_country: None,
            provider: ProviderKind::MobileCommons,
        })
        .collect()
}
fn default_retry_delay_secs() -> u64 {
    20
}
fn default_max_attempts() -> u32 {
    10
}
fn default_mobile_commons_url() -> String {
    "https://secure.mobilecommons.com/api/".to_string()
}
fn default_provider_timeout_ms() -> u64 {
    10_000
}
fn default_provider_connect_timeout_ms() -> u64 {
    5_000
}
fn default_custom_profile_fields() -> Vec<String> {
    default_campaign_fields()
        .into_iter()
        .flat_map(|m| m.fields.into_values())
        .collect()
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_host() -> String {
    "0.0.0.0".to_string()
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            urls: default_nats_urls(),
            stream_name: default_stream_name(),
            subject: default_subject(),
            durable_name: default_durable_name(),
            dead_letter_stream: default_dead_letter_stream(),
            dead_letter_subject: default_dead_letter_subject(),
            ack_wait_secs: default_ack_wait_secs(),
            max_reconnects: default_nats_max_reconnects(),
        }
    }
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            supported_applications: default_supported_applications(),
            supported_countries: default_supported_countries(),
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            campaign_fields: default_campaign_fields(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            routes: default_routes(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_retry_delay_secs(),
            max_attempts: default_max_attempts(),
            soft_error_policy: SoftErrorPolicy::default(),
        }
    }
}

impl Default for MobileCommonsConfig {
    fn default() -> Self {
        Self {
            base_url: default_mobile_commons_url(),
            timeout_ms: default_provider_timeout_ms(),
            connect_timeout_ms: default_provider_connect_timeout_ms(),
            custom_profile_fields: default_custom_profile_fields(),
            affiliates: HashMap::new(),
        }
    }
}

impl MobileCommonsConfig {
    /// Credentials for an affiliate. Matching is case-insensitive because
    /// environment-sourced keys arrive lowercased.
    pub fn credentials_for(&self, affiliate: &str) -> Option<&MobileCommonsCredentials> {
        self.affiliates
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(affiliate))
            .map(|(_, creds)| creds)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            host: default_metrics_host(),
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            consumers_per_node: default_consumers_per_node(),
            nats: NatsConfig::default(),
            eligibility: EligibilityConfig::default(),
            normalizer: NormalizerConfig::default(),
            routing: RoutingConfig::default(),
            retry: RetryConfig::default(),
            mobile_commons: MobileCommonsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables only.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from an optional TOML file, then environment
    /// variables, which take precedence.
    pub fn load_from(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let builder = builder.add_source(
            config::Environment::with_prefix("REGISTRATION_MOBILE")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("nats.urls")
                .with_list_parse_key("eligibility.supported_applications")
                .with_list_parse_key("eligibility.supported_countries")
                .with_list_parse_key("mobile_commons.custom_profile_fields"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
