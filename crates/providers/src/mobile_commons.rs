//! Mobile Commons SMS provider: validates North American mobile numbers and
//! submits `profile_update` requests.

use crate::service::{ProviderHttpClient, ProviderService};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use regmobile_core::config::MobileCommonsConfig;
use regmobile_core::outcome::RejectionReason;
use regmobile_core::provider::{ProviderKind, ProviderRequest, SubmissionResult};
use regmobile_core::types::NormalizedProfile;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// North American Numbering Plan: optional leading country digit, area code
/// with optional separators or brackets, then exchange and subscriber number.
/// ASCII only: `\d` and `\s` must not match other scripts' digits or spaces.
static NANP_PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?-u)^(\d[\s-]?)?[\(\[\s-]{0,2}?\d{3}[\)\]\s-]{0,2}?\d{3}[\s-]?\d{4}$")
        .expect("NANP phone pattern is valid")
});

/// Whether `mobile` looks like a North American phone number.
pub fn is_nanp_phone(mobile: &str) -> bool {
    NANP_PHONE.is_match(mobile)
}

pub struct MobileCommonsService {
    client: Arc<dyn ProviderHttpClient>,
    custom_profile_fields: HashSet<String>,
}

impl MobileCommonsService {
    pub fn new(client: Arc<dyn ProviderHttpClient>, config: &MobileCommonsConfig) -> Self {
        Self {
            client,
            custom_profile_fields: config.custom_profile_fields.iter().cloned().collect(),
        }
    }
}

#[async_trait]
impl ProviderService for MobileCommonsService {
    fn kind(&self) -> ProviderKind {
        ProviderKind::MobileCommons
    }

    fn can_process(&self, profile: &NormalizedProfile) -> Result<(), RejectionReason> {
        let mobile = profile.mobile().ok_or(RejectionReason::MissingMobile)?;

        if !is_nanp_phone(mobile) {
            warn!(mobile = %mobile, "Invalid phone number for the North American Numbering Plan");
            return Err(RejectionReason::InvalidMobile(mobile.to_string()));
        }

        if profile.service_path_id.is_none() {
            warn!(mobile = %mobile, "Mobile Commons requires service_path_id (opt-in path)");
            return Err(RejectionReason::MissingServicePath(mobile.to_string()));
        }

        Ok(())
    }

    fn build_request(&self, profile: &NormalizedProfile) -> ProviderRequest {
        let mut request = ProviderRequest::new(ProviderKind::MobileCommons);

        request.set_opt("phone_number", profile.mobile.as_deref());
        request.set_opt("opt_in_path_id", profile.service_path_id.as_deref());
        request.set_opt("email", profile.email.as_deref());
        request.set_opt("first_name", profile.first_name.as_deref());
        request.set_opt("last_name", profile.last_name.as_deref());
        request.set_opt("street1", profile.address1.as_deref());
        request.set_opt("street2", profile.address2.as_deref());
        request.set_opt("city", profile.city.as_deref());
        request.set_opt("state", profile.state.as_deref());
        request.set_opt("country", profile.country.as_deref());
        request.set_opt("postal_code", profile.postal_code.as_deref());
        request.set_opt("birthdate", profile.birthdate.as_deref());
        if let Some(year) = profile.birth_year {
            request.set("BirthYear", year.to_string());
        }
        request.set_opt("source", profile.source.as_deref());

        // user import custom profile fields
        request.set_opt("hs_name", profile.school.hs_name.as_deref());
        request.set_opt("school_name", profile.school.school_name.as_deref());
        request.set_opt("afterschool_optin", profile.school.afterschool_optin.as_deref());

        for (key, value) in &profile.campaign_fields {
            if self.custom_profile_fields.contains(key) {
                request.set(key.clone(), value.clone());
            } else {
                debug!(field = %key, "Campaign field not recognized by Mobile Commons, dropped");
            }
        }

        request
    }

    async fn submit(&self, request: &ProviderRequest) -> SubmissionResult {
        let result = self
            .client
            .submit(ProviderKind::MobileCommons.display_name(), request)
            .await;

        match &result {
            Ok(response) if !response.is_soft_error() => {
                metrics::counter!("mobile_commons.profile_update", "status" => "success").increment(1);
            }
            Ok(_) => {
                metrics::counter!("mobile_commons.profile_update", "status" => "rejected").increment(1);
            }
            Err(failure) => {
                metrics::counter!(
                    "mobile_commons.profile_update",
                    "status" => failure.category.label()
                )
                .increment(1);
            }
        }

        result
    }
}
