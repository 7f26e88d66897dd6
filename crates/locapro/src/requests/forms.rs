//! Inbound payloads for the request workflow.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use super::domain::PriceRangeId;
use crate::accounts::ProviderId;

pub const MAX_PHOTOS: usize = 10;
pub const MAX_NOTE_LENGTH: usize = 500;

/// Photo descriptor accompanying a new request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestForm {
    #[serde(alias = "provider_choice")]
    pub provider_id: Option<ProviderId>,
    pub provider_name: Option<String>,
    pub description: String,
    pub date_time: Option<String>,
    pub price_range: Option<PriceRangeId>,
    pub offered_price: Option<f64>,
    pub urgent: bool,
    pub photos: Vec<PhotoUpload>,
}

/// Partial edit of a pending request by its creator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestEdit {
    pub description: Option<String>,
    pub date_time: Option<String>,
    pub price_range: Option<PriceRangeId>,
    pub offered_price: Option<f64>,
    pub urgent: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AcceptForm {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeclineForm {
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// Fields posted from the emailed decision page; both naming schemes are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DecisionForm {
    pub decline_reason: Option<String>,
    pub rejection_reason: Option<String>,
    pub decline_message: Option<String>,
    pub rejection_description: Option<String>,
}

impl DecisionForm {
    pub fn reason(&self) -> Option<&str> {
        self.decline_reason
            .as_deref()
            .or(self.rejection_reason.as_deref())
    }

    pub fn message(&self) -> Option<&str> {
        self.decline_message
            .as_deref()
            .or(self.rejection_description.as_deref())
    }
}

/// RFC 3339, or a naive date-time / date read as UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_browser_and_iso_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 20, 10, 30, 0).unwrap();
        assert_eq!(parse_datetime("2024-01-20T10:30"), Some(expected));
        assert_eq!(parse_datetime("2024-01-20T10:30:00Z"), Some(expected));
        assert_eq!(parse_datetime("2024-01-20 10:30"), Some(expected));
        assert_eq!(
            parse_datetime("2024-01-20"),
            Some(Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_datetime("next tuesday"), None);
    }

    #[test]
    fn decision_form_prefers_decline_fields() {
        let form = DecisionForm {
            decline_reason: Some("price".to_string()),
            rejection_reason: Some("time".to_string()),
            decline_message: None,
            rejection_description: Some("Booked solid".to_string()),
        };
        assert_eq!(form.reason(), Some("price"));
        assert_eq!(form.message(), Some("Booked solid"));
    }
}
