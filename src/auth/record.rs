use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Treat a token as expired once less than this remains before `expires_on`,
/// so we never race the provider's own clock.
pub const EXPIRY_MARGIN_SECS: i64 = 300;

pub fn expiry_margin() -> Duration {
    Duration::seconds(EXPIRY_MARGIN_SECS)
}

/// The persisted unit of truth for the single managed identity.
///
/// All fields are individually optional: an empty record means
/// unauthenticated, a record with only `refresh_token` means a silent
/// refresh is possible. An `access_token` without `expires_on` is never
/// treated as usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(
        rename = "accessToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub access_token: Option<String>,
    #[serde(
        rename = "refreshToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<String>,
    #[serde(rename = "expiresOn", default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    /// Return the access token if it is present and has at least the safety
    /// margin remaining before expiry.
    pub fn usable_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.access_token.as_deref()?;
        let expires_on = self.expires_on?;
        if now + expiry_margin() < expires_on {
            Some(token)
        } else {
            None
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.expires_on.is_none()
    }

    /// Replace this record from an acquisition result. The record is never
    /// merged field-by-field, with one exception: a refresh response that
    /// omits the refresh token keeps the previously known one (the provider
    /// omits it when unchanged).
    pub fn apply(&mut self, result: AuthorizationResult) {
        let carried = self.refresh_token.take();
        *self = CredentialRecord {
            access_token: Some(result.access_token),
            refresh_token: result.refresh_token.or(carried),
            expires_on: Some(result.expires_on),
        };
    }
}

/// Transient output of a single token-endpoint exchange.
#[derive(Debug, Clone)]
pub struct AuthorizationResult {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_on: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_secs(secs: i64) -> DateTime<Utc> {
        Utc::now() + Duration::seconds(secs)
    }

    #[test]
    fn empty_record_has_no_usable_token() {
        let record = CredentialRecord::default();
        assert!(record.is_empty());
        assert!(record.usable_access_token(Utc::now()).is_none());
        assert!(!record.can_refresh());
    }

    #[test]
    fn token_without_expiry_is_not_usable() {
        let record = CredentialRecord {
            access_token: Some("A1".into()),
            refresh_token: None,
            expires_on: None,
        };
        assert!(record.usable_access_token(Utc::now()).is_none());
    }

    #[test]
    fn token_well_before_expiry_is_usable() {
        let record = CredentialRecord {
            access_token: Some("A1".into()),
            refresh_token: None,
            expires_on: Some(in_secs(3600)),
        };
        assert_eq!(record.usable_access_token(Utc::now()), Some("A1"));
    }

    #[test]
    fn token_exactly_at_margin_needs_refresh() {
        let now = Utc::now();
        let record = CredentialRecord {
            access_token: Some("A1".into()),
            refresh_token: None,
            expires_on: Some(now + expiry_margin()),
        };
        assert!(record.usable_access_token(now).is_none());
    }

    #[test]
    fn token_one_second_inside_margin_needs_refresh() {
        let now = Utc::now();
        let record = CredentialRecord {
            access_token: Some("A1".into()),
            refresh_token: None,
            expires_on: Some(now + expiry_margin() - Duration::seconds(1)),
        };
        assert!(record.usable_access_token(now).is_none());
    }

    #[test]
    fn token_one_second_past_margin_is_usable() {
        let now = Utc::now();
        let record = CredentialRecord {
            access_token: Some("A1".into()),
            refresh_token: None,
            expires_on: Some(now + expiry_margin() + Duration::seconds(1)),
        };
        assert_eq!(record.usable_access_token(now), Some("A1"));
    }

    #[test]
    fn apply_replaces_whole_record() {
        let mut record = CredentialRecord {
            access_token: Some("old".into()),
            refresh_token: Some("R1".into()),
            expires_on: Some(in_secs(10)),
        };
        let expires = in_secs(3600);
        record.apply(AuthorizationResult {
            access_token: "new".into(),
            refresh_token: Some("R2".into()),
            expires_on: expires,
        });
        assert_eq!(record.access_token.as_deref(), Some("new"));
        assert_eq!(record.refresh_token.as_deref(), Some("R2"));
        assert_eq!(record.expires_on, Some(expires));
    }

    #[test]
    fn apply_carries_forward_missing_refresh_token() {
        let mut record = CredentialRecord {
            access_token: Some("old".into()),
            refresh_token: Some("R1".into()),
            expires_on: Some(in_secs(10)),
        };
        record.apply(AuthorizationResult {
            access_token: "new".into(),
            refresh_token: None,
            expires_on: in_secs(3600),
        });
        assert_eq!(record.refresh_token.as_deref(), Some("R1"));
    }

    #[test]
    fn serialization_uses_wire_field_names() {
        let record = CredentialRecord {
            access_token: Some("A1".into()),
            refresh_token: Some("R1".into()),
            expires_on: Some(in_secs(3600)),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("accessToken").is_some());
        assert!(json.get("refreshToken").is_some());
        assert!(json.get("expiresOn").is_some());
    }

    #[test]
    fn absent_fields_are_omitted_from_serialization() {
        let record = CredentialRecord {
            access_token: None,
            refresh_token: Some("R1".into()),
            expires_on: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("accessToken"));
        assert!(!json.contains("expiresOn"));
    }

    #[test]
    fn deserializes_empty_object() {
        let record: CredentialRecord = serde_json::from_str("{}").unwrap();
        assert!(record.is_empty());
    }
}
