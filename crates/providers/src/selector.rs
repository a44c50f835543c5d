//! Provider selection by application id and user country.
//!
//! Routes are a lookup table rather than branching. A country-specific route
//! wins over the application's wildcard route. Selection fails closed: a
//! profile with no route, or a route whose provider has no configured
//! instance for the affiliate, comes back as a distinct rejection so that
//! configuration defects are never confused with an unreachable provider.

use crate::client::MobileCommonsClient;
use crate::mobile_commons::MobileCommonsService;
use crate::service::ProviderService;
use regmobile_core::config::{MobileCommonsConfig, ProviderRoute};
use regmobile_core::error::RegistrationResult;
use regmobile_core::outcome::RejectionReason;
use regmobile_core::provider::ProviderKind;
use regmobile_core::types::NormalizedProfile;
use regmobile_core::AppConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ProviderSelector {
    routes: Vec<ProviderRoute>,
    /// (provider, affiliate) -> service instance
    services: HashMap<(ProviderKind, String), Arc<dyn ProviderService>>,
}

impl ProviderSelector {
    pub fn new(routes: Vec<ProviderRoute>) -> Self {
        Self {
            routes,
            services: HashMap::new(),
        }
    }

    /// Build the selector with one Mobile Commons client per affiliate that
    /// has credentials. Routes without credentials stay in the table and
    /// surface as `provider_not_configured` at selection time.
    pub fn from_config(config: &AppConfig) -> RegistrationResult<Self> {
        let mut selector = Self::new(config.routing.routes.clone());

        for route in &config.routing.routes {
            let affiliate = route.application_id.as_str();
            if selector.services.contains_key(&(route.provider, affiliate.to_string())) {
                continue;
            }
            match route.provider {
                ProviderKind::MobileCommons => {
                    match build_mobile_commons(&config.mobile_commons, affiliate)? {
                        Some(service) => selector.register(affiliate, service),
                        None => {
                            warn!(affiliate = %affiliate, "No Mobile Commons credentials for affiliate");
                        }
                    }
                }
            }
        }

        info!(
            routes = selector.routes.len(),
            services = selector.services.len(),
            "Provider selector initialized"
        );
        Ok(selector)
    }

    /// Register a provider instance for an affiliate, replacing any previous one.
    pub fn register(&mut self, affiliate: &str, service: Arc<dyn ProviderService>) {
        self.services
            .insert((service.kind(), affiliate.to_string()), service);
    }

    /// Resolve the provider kind for a profile from the route table.
    pub fn route(&self, profile: &NormalizedProfile) -> Result<ProviderKind, RejectionReason> {
        let application_id = profile
            .application_id()
            .ok_or(RejectionReason::MissingApplicationId)?;
        let country = profile.user_country.as_deref();

        let candidates = self
            .routes
            .iter()
            .filter(|r| r.application_id == application_id);

        let mut wildcard = None;
        for route in candidates {
            match route.user_country.as_deref() {
                Some(c) if Some(c) == country => return Ok(route.provider),
                None if wildcard.is_none() => wildcard = Some(route.provider),
                _ => {}
            }
        }

        wildcard.ok_or_else(|| RejectionReason::NoProviderRoute {
            application_id: application_id.to_string(),
            user_country: profile.user_country.clone(),
        })
    }

    /// Pick the provider instance that handles this profile.
    pub fn select(
        &self,
        profile: &NormalizedProfile,
    ) -> Result<Arc<dyn ProviderService>, RejectionReason> {
        let provider = self.route(profile)?;
        let affiliate = profile.application_id().unwrap_or_default();

        self.services
            .get(&(provider, affiliate.to_string()))
            .cloned()
            .ok_or_else(|| RejectionReason::ProviderNotConfigured {
                provider: provider.label().to_string(),
                affiliate: affiliate.to_string(),
            })
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

fn build_mobile_commons(
    config: &MobileCommonsConfig,
    affiliate: &str,
) -> RegistrationResult<Option<Arc<dyn ProviderService>>> {
    let Some(credentials) = config.credentials_for(affiliate) else {
        return Ok(None);
    };
    let client = MobileCommonsClient::new(config, credentials.clone())?;
    Ok(Some(Arc::new(MobileCommonsService::new(
        Arc::new(client),
        config,
    ))))
}
