//! CSV and printable HTML exports of service requests.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, NaiveTime, Utc};
use serde::Deserialize;

use super::domain::{RequestStatus, ServiceRequest};
use super::forms::parse_datetime;
use crate::email::templates::escape_html;

pub const MAX_EXPORT_ROWS: usize = 1000;
pub const EMPTY_EXPORT_MESSAGE: &str = "No requests found matching the selected filters.";
const DESCRIPTION_LIMIT: usize = 200;
const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const CSV_HEADERS: [&str; 10] = [
    "Request ID",
    "Service Type",
    "User Name",
    "Provider Name",
    "Status",
    "Date Created",
    "Distance (miles)",
    "Price Range",
    "Urgent",
    "Description",
];

/// Raw query-string filters; values that do not parse are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExportFilters {
    pub status: Option<String>,
    pub service_type: Option<String>,
    pub urgent: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl ExportFilters {
    fn status(&self) -> Option<RequestStatus> {
        self.status.as_deref().and_then(RequestStatus::from_code)
    }

    fn service_type(&self) -> Option<String> {
        self.service_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_lowercase)
    }

    fn urgent_only(&self) -> bool {
        self.urgent
            .as_deref()
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false)
    }

    fn date_from(&self) -> Option<DateTime<Utc>> {
        self.date_from.as_deref().and_then(parse_datetime)
    }

    /// Inclusive through the last second of the given day.
    fn date_to(&self) -> Option<DateTime<Utc>> {
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)?;
        self.date_to
            .as_deref()
            .and_then(parse_datetime)
            .map(|moment| moment.date_naive().and_time(end_of_day).and_utc())
    }

    /// Narrow a newest-first list and cap it.
    pub fn apply(&self, requests: Vec<ServiceRequest>) -> Vec<ServiceRequest> {
        let status = self.status();
        let service = self.service_type();
        let urgent_only = self.urgent_only();
        let from = self.date_from();
        let to = self.date_to();

        requests
            .into_iter()
            .filter(|request| status.map_or(true, |wanted| request.status == wanted))
            .filter(|request| {
                service
                    .as_ref()
                    .map_or(true, |needle| request.provider_name.to_lowercase().contains(needle))
            })
            .filter(|request| !urgent_only || request.urgent)
            .filter(|request| from.map_or(true, |from| request.created_at >= from))
            .filter(|request| to.map_or(true, |to| request.created_at <= to))
            .take(MAX_EXPORT_ROWS)
            .collect()
    }
}

/// One flattened export line.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub request_id: u64,
    pub service_type: String,
    pub user_name: String,
    pub provider_name: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub distance_miles: Option<f64>,
    pub price_range: String,
    pub urgent: bool,
    pub description: String,
}

impl ExportRow {
    fn cells(&self) -> [String; 10] {
        [
            self.request_id.to_string(),
            self.service_type.clone(),
            self.user_name.clone(),
            self.provider_name.clone(),
            self.status.label().to_string(),
            self.created_at.format(CREATED_FORMAT).to_string(),
            self.distance_miles
                .map(|miles| format!("{miles:.1}"))
                .unwrap_or_default(),
            self.price_range.clone(),
            if self.urgent { "Yes" } else { "No" }.to_string(),
            truncate_chars(&self.description, DESCRIPTION_LIMIT),
        ]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv export failed: {0}")]
    Io(#[from] std::io::Error),
}

pub fn write_csv(rows: &[ExportRow]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADERS)?;
    for row in rows {
        writer.write_record(row.cells())?;
    }
    writer
        .into_inner()
        .map_err(|err| ExportError::Io(err.into_error()))
}

/// Self-contained printable HTML with per-status totals.
pub fn render_report(rows: &[ExportRow], generated_at: DateTime<Utc>) -> String {
    let mut totals: BTreeMap<&'static str, usize> = BTreeMap::new();
    for row in rows {
        *totals.entry(row.status.label()).or_default() += 1;
    }

    let mut html = String::new();
    writeln!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Service Requests Report</title>"
    )
    .expect("report head");
    writeln!(
        html,
        "<style>body{{font-family:sans-serif;font-size:12px}}table{{border-collapse:collapse;width:100%}}th,td{{border:1px solid #ccc;padding:4px;text-align:left}}th{{background:#f0f0f0}}@media print{{.no-print{{display:none}}}}</style>\n</head>\n<body>"
    )
    .expect("report style");
    writeln!(html, "<h1>Service Requests Report</h1>").expect("report title");
    writeln!(
        html,
        "<p>Generated {}</p>",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
    .expect("generated at");

    writeln!(html, "<h2>Summary</h2>\n<ul>").expect("summary open");
    writeln!(html, "<li>Total requests: {}</li>", rows.len()).expect("total");
    for (label, count) in &totals {
        writeln!(html, "<li>{label}: {count}</li>").expect("status total");
    }
    writeln!(html, "</ul>").expect("summary close");

    writeln!(html, "<table>\n<thead><tr>").expect("table open");
    for header in CSV_HEADERS {
        writeln!(html, "<th>{}</th>", escape_html(header)).expect("header cell");
    }
    writeln!(html, "</tr></thead>\n<tbody>").expect("body open");
    for row in rows {
        write!(html, "<tr>").expect("row open");
        for cell in row.cells() {
            write!(html, "<td>{}</td>", escape_html(&cell)).expect("cell");
        }
        writeln!(html, "</tr>").expect("row close");
    }
    writeln!(html, "</tbody>\n</table>\n</body>\n</html>").expect("report tail");
    html
}

pub fn export_filename(now: DateTime<Utc>, extension: &str) -> String {
    format!("service_requests_{}.{extension}", now.format("%Y-%m-%d"))
}

fn truncate_chars(value: &str, limit: usize) -> String {
    value.chars().take(limit).collect()
}
