//! Minimal HTML pages served to providers following emailed decision links.

use std::fmt::Write as _;

use super::domain::{DecisionAction, DeclineReason, RequestStatus};
use super::service::DecisionPreview;
use crate::email::templates::escape_html;

const PAGE_STYLE: &str = "body{font-family:sans-serif;max-width:640px;margin:2rem auto;padding:0 1rem}dl{display:grid;grid-template-columns:max-content auto;gap:.25rem 1rem}dt{font-weight:bold}.error{color:#a00}";

fn open(html: &mut String, title: &str) {
    writeln!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<meta name=\"robots\" content=\"noindex\">\n<title>{}</title>\n<style>{PAGE_STYLE}</style>\n</head>\n<body>\n<h1>{}</h1>",
        escape_html(title),
        escape_html(title)
    )
    .expect("page head");
}

fn close(html: &mut String) {
    writeln!(html, "</body>\n</html>").expect("page tail");
}

/// Summary of the request plus a form that posts the decision back to the same link.
pub fn confirmation_page(preview: &DecisionPreview, form_action: &str) -> String {
    let view = &preview.view;
    let request = &view.request;
    let title = match preview.action {
        DecisionAction::Accept => "Accept Service Request",
        DecisionAction::Decline => "Decline Service Request",
    };

    let mut html = String::new();
    open(&mut html, title);
    writeln!(html, "<dl>").expect("details open");
    let mut detail = |label: &str, value: &str| {
        writeln!(
            html,
            "<dt>{}</dt><dd>{}</dd>",
            escape_html(label),
            escape_html(value)
        )
        .expect("detail row");
    };
    detail("Request", &format!("#{}", request.id));
    detail("Customer", &view.customer_name);
    detail("Description", &request.description);
    if let Some(date_time) = request.date_time {
        detail("Requested for", &date_time.format("%Y-%m-%d %H:%M UTC").to_string());
    }
    if let Some(label) = &view.price_range_label {
        detail("Price range", label);
    }
    if let Some(offered) = request.offered_price {
        detail("Offered price", &format!("${offered:.2}"));
    }
    if let Some(miles) = view.distance_miles {
        detail("Distance", &format!("{miles:.1} miles"));
    }
    detail("Urgent", if request.urgent { "Yes" } else { "No" });
    detail(
        "Link expires",
        &preview.expires_at.format("%Y-%m-%d %H:%M UTC").to_string(),
    );
    writeln!(html, "</dl>").expect("details close");

    writeln!(
        html,
        "<form method=\"post\" action=\"{}\">",
        escape_html(form_action)
    )
    .expect("form open");
    if preview.action == DecisionAction::Decline {
        writeln!(html, "<p><label for=\"decline_reason\">Reason</label>\n<select id=\"decline_reason\" name=\"decline_reason\">").expect("select open");
        for reason in DeclineReason::ALL {
            writeln!(
                html,
                "<option value=\"{}\">{}</option>",
                reason.code(),
                reason.label()
            )
            .expect("reason option");
        }
        writeln!(html, "</select></p>").expect("select close");
        writeln!(html, "<p><label for=\"decline_message\">Message for the customer (optional)</label><br>\n<textarea id=\"decline_message\" name=\"decline_message\" maxlength=\"500\" rows=\"4\" cols=\"50\"></textarea></p>").expect("message");
    }
    let button = match preview.action {
        DecisionAction::Accept => "Confirm acceptance",
        DecisionAction::Decline => "Confirm decline",
    };
    writeln!(html, "<button type=\"submit\">{button}</button>\n</form>").expect("form close");
    close(&mut html);
    html
}

pub fn success_page(status: RequestStatus) -> String {
    let message = match status {
        RequestStatus::Accepted => "Request accepted successfully!",
        RequestStatus::Declined => "Request declined. Thank you for letting us know.",
        RequestStatus::Pending => "Request is still pending.",
    };
    let mut html = String::new();
    open(&mut html, "Decision recorded");
    writeln!(html, "<p>{}</p>", escape_html(message)).expect("success message");
    close(&mut html);
    html
}

pub fn error_page(message: &str) -> String {
    let mut html = String::new();
    open(&mut html, "Unable to process this link");
    writeln!(html, "<p class=\"error\">{}</p>", escape_html(message)).expect("error message");
    close(&mut html);
    html
}
