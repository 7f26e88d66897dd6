//! Plain-text and HTML bodies for workflow notifications.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

const DATE_FORMAT: &str = "%B %-d, %Y at %H:%M UTC";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Everything a provider needs to decide on a new request.
#[derive(Debug, Clone)]
pub struct ProviderNotification {
    pub request_id: u64,
    pub provider_name: String,
    pub company_name: Option<String>,
    pub service_type: Option<&'static str>,
    pub customer_name: String,
    pub customer_email: String,
    pub description: String,
    pub date_time: Option<DateTime<Utc>>,
    pub price_range: Option<String>,
    pub offered_price: Option<f64>,
    pub urgent: bool,
    pub distance_miles: Option<f64>,
    pub customer_address: Option<String>,
    pub provider_address: Option<String>,
    pub accept_link: String,
    pub decline_link: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CustomerConfirmation {
    pub request_id: u64,
    pub customer_name: String,
    pub provider_name: String,
    pub description: String,
    pub date_time: Option<DateTime<Utc>>,
    pub price_range: Option<String>,
    pub offered_price: Option<f64>,
    pub urgent: bool,
    pub requests_link: String,
}

#[derive(Debug, Clone)]
pub struct AcceptanceNotice {
    pub request_id: u64,
    pub customer_name: String,
    pub provider_name: String,
    pub description: String,
    pub date_time: Option<DateTime<Utc>>,
    pub accepted_at: DateTime<Utc>,
    pub provider_phone: Option<String>,
    pub provider_email: Option<String>,
    pub acceptance_notes: Option<String>,
    pub request_link: String,
}

#[derive(Debug, Clone)]
pub struct DeclineNotice {
    pub request_id: u64,
    pub customer_name: String,
    pub provider_name: String,
    pub description: String,
    pub reason_display: &'static str,
    pub reason_text: &'static str,
    pub decline_message: Option<String>,
    pub declined_at: DateTime<Utc>,
    pub browse_link: String,
}

#[derive(Debug, Clone)]
pub struct ConfigurationTest {
    pub backend: &'static str,
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub sent_at: DateTime<Utc>,
}

pub fn provider_notification(ctx: &ProviderNotification) -> RenderedEmail {
    let mut text = String::new();
    writeln!(text, "Hello {},", ctx.provider_name).expect("greeting");
    writeln!(text).expect("blank");
    writeln!(
        text,
        "You have received a new service request (#{}) on LocaProConnect.",
        ctx.request_id
    )
    .expect("intro");
    writeln!(text).expect("blank");
    for (label, value) in provider_details(ctx) {
        writeln!(text, "{label}: {value}").expect("detail line");
    }
    writeln!(text).expect("blank");
    writeln!(text, "Description:\n{}", ctx.description).expect("description");
    writeln!(text).expect("blank");
    writeln!(text, "Accept this request: {}", ctx.accept_link).expect("accept link");
    writeln!(text, "Decline this request: {}", ctx.decline_link).expect("decline link");
    writeln!(
        text,
        "These links can be used once and expire on {}.",
        ctx.expires_at.format(DATE_FORMAT)
    )
    .expect("expiry");

    let mut html = String::new();
    html_open(&mut html, "New Service Request");
    writeln!(
        html,
        "<p>Hello {},</p>\n<p>You have received a new service request (#{}).</p>",
        escape_html(&ctx.provider_name),
        ctx.request_id
    )
    .expect("intro");
    if ctx.urgent {
        writeln!(html, "<p><strong>This request is marked urgent.</strong></p>").expect("urgent");
    }
    html_table(&mut html, &provider_details(ctx));
    writeln!(
        html,
        "<h2>Description</h2>\n<p>{}</p>",
        escape_html(&ctx.description)
    )
    .expect("description");
    writeln!(
        html,
        "<p><a href=\"{}\">Accept request</a> | <a href=\"{}\">Decline request</a></p>",
        escape_html(&ctx.accept_link),
        escape_html(&ctx.decline_link)
    )
    .expect("links");
    writeln!(
        html,
        "<p><small>These links can be used once and expire on {}.</small></p>",
        ctx.expires_at.format(DATE_FORMAT)
    )
    .expect("expiry");
    html_close(&mut html);

    RenderedEmail {
        subject: format!("New Service Request - {}", ctx.provider_name),
        text,
        html,
    }
}

fn provider_details(ctx: &ProviderNotification) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("Request", format!("#{}", ctx.request_id)),
        ("Customer", ctx.customer_name.clone()),
    ];
    if !ctx.customer_email.is_empty() {
        rows.push(("Customer email", ctx.customer_email.clone()));
    }
    if let Some(company) = ctx.company_name.as_ref().filter(|c| !c.is_empty()) {
        rows.push(("Company", company.clone()));
    }
    if let Some(service) = ctx.service_type {
        rows.push(("Service", service.to_string()));
    }
    rows.push(("Preferred time", format_when(ctx.date_time)));
    if let Some(range) = &ctx.price_range {
        rows.push(("Price range", range.clone()));
    }
    if let Some(price) = ctx.offered_price {
        rows.push(("Offered price", format!("${price:.2}")));
    }
    rows.push(("Urgent", yes_no(ctx.urgent).to_string()));
    if let Some(distance) = ctx.distance_miles {
        rows.push(("Approximate distance", format!("{distance:.1} miles")));
    }
    if let Some(address) = &ctx.customer_address {
        rows.push(("Customer address", address.clone()));
    }
    if let Some(address) = &ctx.provider_address {
        rows.push(("Your address", address.clone()));
    }
    rows
}

pub fn customer_confirmation(ctx: &CustomerConfirmation) -> RenderedEmail {
    let mut rows = vec![
        ("Request", format!("#{}", ctx.request_id)),
        ("Provider", ctx.provider_name.clone()),
        ("Preferred time", format_when(ctx.date_time)),
        ("Urgent", yes_no(ctx.urgent).to_string()),
    ];
    if let Some(range) = &ctx.price_range {
        rows.push(("Price range", range.clone()));
    }
    if let Some(price) = ctx.offered_price {
        rows.push(("Offered price", format!("${price:.2}")));
    }

    let mut text = String::new();
    writeln!(text, "Hello {},", ctx.customer_name).expect("greeting");
    writeln!(text).expect("blank");
    writeln!(
        text,
        "Your service request has been submitted and sent to {}.",
        ctx.provider_name
    )
    .expect("intro");
    writeln!(text).expect("blank");
    for (label, value) in &rows {
        writeln!(text, "{label}: {value}").expect("detail line");
    }
    writeln!(text, "\nDescription:\n{}", ctx.description).expect("description");
    writeln!(
        text,
        "\nWe will email you as soon as the provider responds. Track your requests at {}",
        ctx.requests_link
    )
    .expect("footer");

    let mut html = String::new();
    html_open(&mut html, "Request Submitted");
    writeln!(
        html,
        "<p>Hello {},</p>\n<p>Your service request has been submitted and sent to {}.</p>",
        escape_html(&ctx.customer_name),
        escape_html(&ctx.provider_name)
    )
    .expect("intro");
    html_table(&mut html, &rows);
    writeln!(html, "<p>{}</p>", escape_html(&ctx.description)).expect("description");
    writeln!(
        html,
        "<p><a href=\"{}\">View my requests</a></p>",
        escape_html(&ctx.requests_link)
    )
    .expect("footer");
    html_close(&mut html);

    RenderedEmail {
        subject: "Request Submitted Successfully".to_string(),
        text,
        html,
    }
}

pub fn request_accepted(ctx: &AcceptanceNotice) -> RenderedEmail {
    let mut rows = vec![
        ("Request", format!("#{}", ctx.request_id)),
        ("Provider", ctx.provider_name.clone()),
        ("Preferred time", format_when(ctx.date_time)),
        ("Accepted", ctx.accepted_at.format(DATE_FORMAT).to_string()),
    ];
    if let Some(phone) = ctx.provider_phone.as_ref().filter(|p| !p.is_empty()) {
        rows.push(("Provider phone", phone.clone()));
    }
    if let Some(email) = ctx.provider_email.as_ref().filter(|e| !e.is_empty()) {
        rows.push(("Provider email", email.clone()));
    }

    let mut text = String::new();
    writeln!(text, "Hello {},", ctx.customer_name).expect("greeting");
    writeln!(
        text,
        "\nGood news! {} has accepted your service request.\n",
        ctx.provider_name
    )
    .expect("intro");
    for (label, value) in &rows {
        writeln!(text, "{label}: {value}").expect("detail line");
    }
    if let Some(notes) = &ctx.acceptance_notes {
        writeln!(text, "\nNotes from the provider:\n{notes}").expect("notes");
    }
    writeln!(text, "\nDescription:\n{}", ctx.description).expect("description");
    writeln!(text, "\nView the request: {}", ctx.request_link).expect("link");

    let mut html = String::new();
    html_open(&mut html, "Request Accepted");
    writeln!(
        html,
        "<p>Hello {},</p>\n<p>Good news! {} has accepted your service request.</p>",
        escape_html(&ctx.customer_name),
        escape_html(&ctx.provider_name)
    )
    .expect("intro");
    html_table(&mut html, &rows);
    if let Some(notes) = &ctx.acceptance_notes {
        writeln!(
            html,
            "<h2>Notes from the provider</h2>\n<p>{}</p>",
            escape_html(notes)
        )
        .expect("notes");
    }
    writeln!(
        html,
        "<p><a href=\"{}\">View the request</a></p>",
        escape_html(&ctx.request_link)
    )
    .expect("link");
    html_close(&mut html);

    RenderedEmail {
        subject: "Service Request Accepted".to_string(),
        text,
        html,
    }
}

pub fn request_declined(ctx: &DeclineNotice) -> RenderedEmail {
    let rows = vec![
        ("Request", format!("#{}", ctx.request_id)),
        ("Provider", ctx.provider_name.clone()),
        ("Reason", format!("{} ({})", ctx.reason_display, ctx.reason_text)),
        ("Declined", ctx.declined_at.format(DATE_FORMAT).to_string()),
    ];

    let mut text = String::new();
    writeln!(text, "Hello {},", ctx.customer_name).expect("greeting");
    writeln!(
        text,
        "\nUnfortunately {} is unable to take on your service request.\n",
        ctx.provider_name
    )
    .expect("intro");
    for (label, value) in &rows {
        writeln!(text, "{label}: {value}").expect("detail line");
    }
    if let Some(message) = &ctx.decline_message {
        writeln!(text, "\nMessage from the provider:\n{message}").expect("message");
    }
    writeln!(
        text,
        "\nOther professionals may be available. Browse them at {}",
        ctx.browse_link
    )
    .expect("browse");

    let mut html = String::new();
    html_open(&mut html, "Request Update");
    writeln!(
        html,
        "<p>Hello {},</p>\n<p>Unfortunately {} is unable to take on your service request.</p>",
        escape_html(&ctx.customer_name),
        escape_html(&ctx.provider_name)
    )
    .expect("intro");
    html_table(&mut html, &rows);
    if let Some(message) = &ctx.decline_message {
        writeln!(
            html,
            "<h2>Message from the provider</h2>\n<p>{}</p>",
            escape_html(message)
        )
        .expect("message");
    }
    writeln!(
        html,
        "<p><a href=\"{}\">Browse other professionals</a></p>",
        escape_html(&ctx.browse_link)
    )
    .expect("browse");
    html_close(&mut html);

    RenderedEmail {
        subject: "Service Request Update".to_string(),
        text,
        html,
    }
}

pub fn configuration_test(ctx: &ConfigurationTest) -> RenderedEmail {
    let rows = vec![
        ("Backend", ctx.backend.to_string()),
        ("Host", ctx.host.clone()),
        ("Port", ctx.port.to_string()),
        ("TLS", yes_no(ctx.use_tls).to_string()),
        ("Sent", ctx.sent_at.format(DATE_FORMAT).to_string()),
    ];

    let mut text = String::from("This is a test email from LocaProConnect.\n\n");
    for (label, value) in &rows {
        writeln!(text, "{label}: {value}").expect("detail line");
    }

    let mut html = String::new();
    html_open(&mut html, "Email Configuration Test");
    writeln!(html, "<p>This is a test email from LocaProConnect.</p>").expect("intro");
    html_table(&mut html, &rows);
    html_close(&mut html);

    RenderedEmail {
        subject: "LocaProConnect Email Configuration Test".to_string(),
        text,
        html,
    }
}

fn format_when(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|when| when.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| "Flexible".to_string())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn html_open(html: &mut String, title: &str) {
    writeln!(
        html,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{0}</title></head>\n<body>\n<h1>{0}</h1>",
        escape_html(title)
    )
    .expect("html head");
}

fn html_close(html: &mut String) {
    writeln!(
        html,
        "<p><small>LocaProConnect</small></p>\n</body>\n</html>"
    )
    .expect("html tail");
}

fn html_table(html: &mut String, rows: &[(&str, String)]) {
    writeln!(html, "<table>").expect("table open");
    for (label, value) in rows {
        writeln!(
            html,
            "<tr><th align=\"left\">{}</th><td>{}</td></tr>",
            escape_html(label),
            escape_html(value)
        )
        .expect("table row");
    }
    writeln!(html, "</table>").expect("table close");
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
