//! Profile normalization: collapses the field aliases used by different
//! registration producers into one [`NormalizedProfile`].
//!
//! Alias resolution is first-match-wins in the order listed per field.
//! `null` counts as absent; an empty string counts as present.
//!
//! | canonical         | raw keys (priority order)                       |
//! |-------------------|-------------------------------------------------|
//! | `mobile`          | `mobile`, `mobile_number`, `phone_number`       |
//! | `service_path_id` | `mc_opt_in_path_id`, `mobile_opt_in_path_id`   |
//! | `first_name`      | `merge_vars.FNAME`, `first_name`                |
//! | `last_name`       | `merge_vars.LNAME`, `last_name`                 |
//! | `address1`        | `street1`, `address1`                           |
//! | `address2`        | `street2`, `address2`                           |
//! | `state`           | `state`, `province`                             |
//! | `country`         | `country`, `country_code`                       |
//! | `postal_code`     | `zip`, `postal_code`                            |
//! | `birthdate`       | `birthdate_timestamp`, digit-only `birthdate`   |
//! | `school_name`     | `school_name`, `hs_name`                        |

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regmobile_core::config::{CampaignFieldMapping, NormalizerConfig};
use regmobile_core::types::{NormalizedProfile, RawMessage, SchoolDetails};
use serde_json::Value;

const MOBILE_KEYS: &[&str] = &["mobile", "mobile_number", "phone_number"];
const SERVICE_PATH_KEYS: &[&str] = &["mc_opt_in_path_id", "mobile_opt_in_path_id"];
const ADDRESS1_KEYS: &[&str] = &["street1", "address1"];
const ADDRESS2_KEYS: &[&str] = &["street2", "address2"];
const STATE_KEYS: &[&str] = &["state", "province"];
const COUNTRY_KEYS: &[&str] = &["country", "country_code"];
const POSTAL_CODE_KEYS: &[&str] = &["zip", "postal_code"];
const SCHOOL_NAME_KEYS: &[&str] = &["school_name", "hs_name"];

const MERGE_VARS: &str = "merge_vars";

/// Maps raw registration messages onto the canonical profile shape.
#[derive(Debug, Clone, Default)]
pub struct ProfileNormalizer {
    campaign_fields: Vec<CampaignFieldMapping>,
}

impl ProfileNormalizer {
    pub fn new(config: &NormalizerConfig) -> Self {
        Self::with_mappings(config.campaign_fields.clone())
    }

    pub fn with_mappings(campaign_fields: Vec<CampaignFieldMapping>) -> Self {
        Self { campaign_fields }
    }

    /// Normalize a raw message. Never fails: missing fields stay unset.
    pub fn normalize(&self, raw: &RawMessage) -> NormalizedProfile {
        let application_id = raw.get_str("application_id");
        let birth = birth_timestamp(raw).and_then(render_birth);

        let campaign_fields = application_id
            .as_deref()
            .and_then(|app| self.mapping_for(app))
            .map(|mapping| {
                mapping
                    .fields
                    .iter()
                    .filter_map(|(source, target)| {
                        raw.get_str(source).map(|value| (target.clone(), value))
                    })
                    .collect()
            })
            .unwrap_or_default();

        NormalizedProfile {
            application_id,
            user_country: raw.get_str("user_country"),
            campaign_country: raw.get_str("campaign_country"),
            northstar_id: raw.get_str("northstar_id").filter(|id| !id.is_empty()),
            source: raw.get_str("source"),
            activity: raw.get_str("activity"),
            mobile: first_of(raw, MOBILE_KEYS),
            email: raw.get_str("email"),
            service_path_id: first_of(raw, SERVICE_PATH_KEYS),
            first_name: raw
                .get_nested_str(MERGE_VARS, "FNAME")
                .or_else(|| raw.get_str("first_name")),
            last_name: raw
                .get_nested_str(MERGE_VARS, "LNAME")
                .or_else(|| raw.get_str("last_name")),
            address1: first_of(raw, ADDRESS1_KEYS),
            address2: first_of(raw, ADDRESS2_KEYS),
            city: raw.get_str("city"),
            state: first_of(raw, STATE_KEYS),
            country: first_of(raw, COUNTRY_KEYS),
            postal_code: first_of(raw, POSTAL_CODE_KEYS),
            birthdate: birth.as_ref().map(|(date, _)| date.clone()),
            birth_year: birth.map(|(_, year)| year),
            school: SchoolDetails {
                hs_name: raw.get_str("hs_name"),
                school_name: first_of(raw, SCHOOL_NAME_KEYS),
                afterschool_optin: raw.get_str("afterschool_optin"),
            },
            campaign_fields,
        }
    }

    /// Render a profile back into canonical raw keys, such that
    /// `normalize(to_raw(p)) == p` for any profile this normalizer produced.
    pub fn to_raw(&self, profile: &NormalizedProfile) -> RawMessage {
        let mut raw = RawMessage::new();
        let mut put = |key: &str, value: &Option<String>| {
            if let Some(v) = value {
                raw.insert(key, v.clone());
            }
        };

        put("application_id", &profile.application_id);
        put("user_country", &profile.user_country);
        put("campaign_country", &profile.campaign_country);
        put("northstar_id", &profile.northstar_id);
        put("source", &profile.source);
        put("activity", &profile.activity);
        put("mobile", &profile.mobile);
        put("email", &profile.email);
        put("mc_opt_in_path_id", &profile.service_path_id);
        put("first_name", &profile.first_name);
        put("last_name", &profile.last_name);
        put("address1", &profile.address1);
        put("address2", &profile.address2);
        put("city", &profile.city);
        put("state", &profile.state);
        put("country", &profile.country);
        put("zip", &profile.postal_code);
        put("hs_name", &profile.school.hs_name);
        put("school_name", &profile.school.school_name);
        put("afterschool_optin", &profile.school.afterschool_optin);

        if let Some(ts) = profile.birthdate.as_deref().and_then(midnight_timestamp) {
            raw.insert("birthdate_timestamp", ts);
        }

        if let Some(mapping) = profile
            .application_id
            .as_deref()
            .and_then(|app| self.mapping_for(app))
        {
            for (source, target) in &mapping.fields {
                if let Some(value) = profile.campaign_fields.get(target) {
                    raw.insert(source.clone(), value.clone());
                }
            }
        }

        raw
    }

    fn mapping_for(&self, application_id: &str) -> Option<&CampaignFieldMapping> {
        self.campaign_fields
            .iter()
            .find(|m| m.application_code.eq_ignore_ascii_case(application_id))
    }
}

fn first_of(raw: &RawMessage, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| raw.get_str(key))
}

/// Unix seconds for the birthdate. `birthdate` only counts when it is an
/// integer or an all-digit string; `birthdate_timestamp` overrides it.
fn birth_timestamp(raw: &RawMessage) -> Option<i64> {
    let from_birthdate = match raw.get("birthdate") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse().ok()
        }
        _ => None,
    };
    raw.get_i64("birthdate_timestamp").or(from_birthdate)
}

fn render_birth(timestamp: i64) -> Option<(String, i32)> {
    let dt: DateTime<Utc> = DateTime::from_timestamp(timestamp, 0)?;
    Some((dt.format("%Y-%m-%d").to_string(), dt.year()))
}

fn midnight_timestamp(date: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalizer() -> ProfileNormalizer {
        ProfileNormalizer::new(&NormalizerConfig::default())
    }

    #[test]
    fn test_mobile_alias_priority() {
        let n = normalizer();
        let raw = RawMessage::new()
            .with("mobile", "2125550100")
            .with("mobile_number", "3125550100")
            .with("phone_number", "4155550100");
        assert_eq!(n.normalize(&raw).mobile.as_deref(), Some("2125550100"));

        let raw = RawMessage::new()
            .with("mobile_number", "3125550100")
            .with("phone_number", "4155550100");
        assert_eq!(n.normalize(&raw).mobile.as_deref(), Some("3125550100"));

        let raw = RawMessage::new().with("phone_number", "4155550100");
        assert_eq!(n.normalize(&raw).mobile.as_deref(), Some("4155550100"));
    }

    #[test]
    fn test_null_alias_falls_through() {
        let raw = RawMessage::new()
            .with("mobile", Value::Null)
            .with("mobile_number", "3125550100");
        assert_eq!(
            normalizer().normalize(&raw).mobile.as_deref(),
            Some("3125550100")
        );
    }

    #[test]
    fn test_service_path_alias_priority() {
        let n = normalizer();
        let raw = RawMessage::new()
            .with("mc_opt_in_path_id", "42")
            .with("mobile_opt_in_path_id", "99");
        assert_eq!(n.normalize(&raw).service_path_id.as_deref(), Some("42"));

        let raw = RawMessage::new().with("mobile_opt_in_path_id", 99);
        assert_eq!(n.normalize(&raw).service_path_id.as_deref(), Some("99"));
    }

    #[test]
    fn test_merge_vars_names_take_priority() {
        let raw = RawMessage::new()
            .with("merge_vars", json!({"FNAME": "Alex", "LNAME": "Rivera"}))
            .with("first_name", "Alice")
            .with("last_name", "Smith");
        let profile = normalizer().normalize(&raw);
        assert_eq!(profile.first_name.as_deref(), Some("Alex"));
        assert_eq!(profile.last_name.as_deref(), Some("Rivera"));

        let raw = RawMessage::new()
            .with("merge_vars", json!({"FNAME": "Alex"}))
            .with("last_name", "Smith");
        let profile = normalizer().normalize(&raw);
        assert_eq!(profile.last_name.as_deref(), Some("Smith"));
    }

    #[test]
    fn test_address_aliases() {
        let raw = RawMessage::new()
            .with("street1", "1 Main St")
            .with("address1", "2 Side St")
            .with("address2", "Apt 4")
            .with("province", "ON")
            .with("country_code", "CA")
            .with("zip", "M5V 2T6")
            .with("postal_code", "ignored");
        let profile = normalizer().normalize(&raw);
        assert_eq!(profile.address1.as_deref(), Some("1 Main St"));
        assert_eq!(profile.address2.as_deref(), Some("Apt 4"));
        assert_eq!(profile.state.as_deref(), Some("ON"));
        assert_eq!(profile.country.as_deref(), Some("CA"));
        assert_eq!(profile.postal_code.as_deref(), Some("M5V 2T6"));

        let raw = RawMessage::new()
            .with("country", "US")
            .with("country_code", "CA")
            .with("state", "NY")
            .with("province", "ON");
        let profile = normalizer().normalize(&raw);
        assert_eq!(profile.country.as_deref(), Some("US"));
        assert_eq!(profile.state.as_deref(), Some("NY"));
    }

    #[test]
    fn test_birthdate_from_timestamp_in_utc() {
        // 2000-01-01T00:30:00Z: off by one day in any zone west of UTC
        let raw = RawMessage::new().with("birthdate_timestamp", 946_686_600);
        let profile = normalizer().normalize(&raw);
        assert_eq!(profile.birthdate.as_deref(), Some("2000-01-01"));
        assert_eq!(profile.birth_year, Some(2000));
    }

    #[test]
    fn test_birthdate_field_rules() {
        let n = normalizer();

        let raw = RawMessage::new().with("birthdate", "946684800");
        assert_eq!(n.normalize(&raw).birthdate.as_deref(), Some("2000-01-01"));

        // ISO strings are not timestamps
        let raw = RawMessage::new().with("birthdate", "2000-01-01");
        assert_eq!(n.normalize(&raw).birthdate, None);

        // birthdate_timestamp overrides birthdate
        let raw = RawMessage::new()
            .with("birthdate", 946_684_800)
            .with("birthdate_timestamp", 0);
        let profile = n.normalize(&raw);
        assert_eq!(profile.birthdate.as_deref(), Some("1970-01-01"));
        assert_eq!(profile.birth_year, Some(1970));

        // born before the epoch
        let raw = RawMessage::new().with("birthdate_timestamp", -86_400);
        assert_eq!(n.normalize(&raw).birthdate.as_deref(), Some("1969-12-31"));
    }

    #[test]
    fn test_campaign_fields_for_recognized_application() {
        let raw = RawMessage::new()
            .with("application_id", "agg")
            .with("candidate_name", "Jordan")
            .with("candidate_id", 17)
            .with("candidate_gender", "F");
        let profile = normalizer().normalize(&raw);
        assert_eq!(profile.campaign_fields.len(), 3);
        assert_eq!(profile.campaign_fields["AGG2015_1st_vote"], "Jordan");
        assert_eq!(profile.campaign_fields["AGG2015_1st_vote_id"], "17");
        assert_eq!(profile.campaign_fields["AGG2015_1st_vote_gender"], "F");

        let raw = RawMessage::new()
            .with("application_id", "CGG")
            .with("candidate_name", "Sam");
        let profile = normalizer().normalize(&raw);
        assert_eq!(profile.campaign_fields.len(), 1);
        assert_eq!(profile.campaign_fields["CGG2015_1st_vote"], "Sam");
    }

    #[test]
    fn test_campaign_fields_empty_for_unrecognized_application() {
        let raw = RawMessage::new()
            .with("application_id", "US")
            .with("candidate_name", "Jordan");
        assert!(normalizer().normalize(&raw).campaign_fields.is_empty());

        let raw = RawMessage::new().with("candidate_name", "Jordan");
        assert!(normalizer().normalize(&raw).campaign_fields.is_empty());
    }

    #[test]
    fn test_school_fields() {
        let raw = RawMessage::new()
            .with("hs_name", "Central High")
            .with("afterschool_optin", "1");
        let profile = normalizer().normalize(&raw);
        assert_eq!(profile.school.hs_name.as_deref(), Some("Central High"));
        assert_eq!(profile.school.school_name.as_deref(), Some("Central High"));
        assert_eq!(profile.school.afterschool_optin.as_deref(), Some("1"));

        let raw = RawMessage::new()
            .with("hs_name", "Central High")
            .with("school_name", "Central Academy");
        let profile = normalizer().normalize(&raw);
        assert_eq!(profile.school.school_name.as_deref(), Some("Central Academy"));
    }

    #[test]
    fn test_empty_northstar_id_is_ignored() {
        let raw = RawMessage::new().with("northstar_id", "");
        assert_eq!(normalizer().normalize(&raw).northstar_id, None);
    }

    #[test]
    fn test_normalize_is_total() {
        let raw = RawMessage::new()
            .with("mobile", json!(["not", "a", "scalar"]))
            .with("merge_vars", "not an object")
            .with("birthdate_timestamp", "garbage")
            .with("application_id", json!({"nested": true}));
        let profile = normalizer().normalize(&raw);
        assert_eq!(profile, NormalizedProfile::default());

        assert_eq!(
            normalizer().normalize(&RawMessage::new()),
            NormalizedProfile::default()
        );
    }

    #[test]
    fn test_normalize_is_idempotent_through_to_raw() {
        let n = normalizer();
        let fixtures = vec![
            RawMessage::new()
                .with("application_id", "US")
                .with("mobile", "2125550100")
                .with("mc_opt_in_path_id", "42"),
            RawMessage::new()
                .with("application_id", "AGG")
                .with("user_country", "US")
                .with("campaign_country", "US")
                .with("northstar_id", "5430e850dt8hbc541c37tt3d")
                .with("source", "niche")
                .with("activity", "user_register")
                .with("phone_number", "(212) 555-0100")
                .with("email", "alex@example.org")
                .with("mobile_opt_in_path_id", 170071)
                .with("merge_vars", json!({"FNAME": "Alex", "LNAME": "Rivera"}))
                .with("street1", "1 Main St")
                .with("street2", "Apt 4")
                .with("city", "Brooklyn")
                .with("province", "NY")
                .with("country_code", "US")
                .with("zip", "11201")
                .with("birthdate_timestamp", 946_686_600)
                .with("hs_name", "Central High")
                .with("afterschool_optin", "1")
                .with("candidate_name", "Jordan")
                .with("candidate_id", "17")
                .with("candidate_gender", "F"),
            RawMessage::new().with("birthdate_timestamp", -86_400),
        ];

        for raw in fixtures {
            let once = n.normalize(&raw);
            let twice = n.normalize(&n.to_raw(&once));
            assert_eq!(once, twice);
        }
    }
}
