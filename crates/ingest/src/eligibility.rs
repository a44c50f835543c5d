//! Eligibility policy applied before any provider is chosen.
//!
//! A rejected message is acknowledged and dropped: replaying it cannot
//! change its validity.

use regmobile_core::config::EligibilityConfig;
use regmobile_core::outcome::RejectionReason;
use regmobile_core::types::NormalizedProfile;
use std::collections::HashSet;
use tracing::warn;

/// Supported-application / supported-country gate.
pub struct EligibilityValidator {
    supported_applications: HashSet<String>,
    supported_countries: HashSet<String>,
}

impl EligibilityValidator {
    pub fn new(config: &EligibilityConfig) -> Self {
        Self {
            supported_applications: config.supported_applications.iter().cloned().collect(),
            supported_countries: config.supported_countries.iter().cloned().collect(),
        }
    }

    /// Decide whether a profile may proceed to provider selection.
    pub fn can_process(&self, profile: &NormalizedProfile) -> Result<(), RejectionReason> {
        let application_id = profile
            .application_id()
            .ok_or(RejectionReason::MissingApplicationId)?;

        if !self.supported_applications.contains(application_id) {
            return Err(RejectionReason::UnsupportedApplication(
                application_id.to_string(),
            ));
        }

        match profile.user_country.as_deref() {
            Some(country) if !self.supported_countries.contains(country) => {
                return Err(RejectionReason::UnsupportedCountry(country.to_string()));
            }
            Some(_) => {}
            None => {
                warn!(application_id = %application_id, "user_country not set");
                metrics::counter!("registration.missing_user_country").increment(1);
            }
        }

        if profile.mobile().is_none() {
            return Err(RejectionReason::MissingMobile);
        }

        Ok(())
    }
}
