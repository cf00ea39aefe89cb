use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{CustomerAggregate, RawMovementRecord, SaleDateValue};
use crate::normalize::parse_sale_date;

const NOT_AVAILABLE: &str = "N/A";

/// Prefix of the element id holding a customer's movement details. The map
/// page's delegated click handler resolves `data-target-id` against it.
pub const MOVEMENT_DETAILS_PREFIX: &str = "movements-";

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
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

pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn or_na(value: Option<&str>) -> String {
    value.map(escape_html).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn movement_date(value: Option<&SaleDateValue>) -> String {
    match value {
        None => NOT_AVAILABLE.to_string(),
        Some(raw) => match parse_sale_date(raw) {
            Ok(date) => format_date(date),
            Err(_) => match raw {
                SaleDateValue::Text(text) => escape_html(text),
                _ => NOT_AVAILABLE.to_string(),
            },
        },
    }
}

/// Builds the popup markup for one customer: basic info followed by the
/// movement block. Holds no script; the toggle button only carries a
/// `data-target-id`.
pub fn render_popup(customer: &CustomerAggregate, movements: &[RawMovementRecord]) -> String {
    let mut html = String::new();
    let attributes = &customer.attributes;

    let _ = write!(html, "<div class='popup-content'>");
    let _ = write!(
        html,
        "<h4>{} ({})</h4>",
        escape_html(&customer.customer_name),
        customer.customer_id
    );

    let last_sale = customer
        .latest_reference_date
        .map(format_date)
        .unwrap_or_else(|| "No reference sale recorded.".to_string());
    let _ = write!(html, "<p><strong>Last reference sale:</strong> {last_sale}</p>");
    let _ = write!(
        html,
        "<p><strong>Salesperson:</strong> {}</p>",
        or_na(attributes.salesperson_name.as_deref())
    );
    let _ = write!(
        html,
        "<p><strong>Brand (last sale):</strong> {}</p>",
        or_na(attributes.brand_name.as_deref())
    );
    let _ = write!(
        html,
        "<p><strong>Category:</strong> {}</p>",
        or_na(attributes.category_name.as_deref())
    );
    let _ = write!(
        html,
        "<p><strong>Department:</strong> {}</p>",
        or_na(attributes.department_name.as_deref())
    );
    let _ = write!(
        html,
        "<p><strong>City:</strong> {}</p>",
        or_na(attributes.city_name.as_deref())
    );

    let _ = write!(html, "<hr><p><b>Merchandise in transit / scheduled:</b></p>");

    if movements.is_empty() {
        let _ = write!(
            html,
            "<p class='no-movements'>Nothing in transit or scheduled for this customer.</p>"
        );
    } else {
        let target_id = format!("{MOVEMENT_DETAILS_PREFIX}{}", customer.customer_id);
        let _ = write!(
            html,
            "<button type='button' class='toggle-button' data-target-id='{target_id}'>\
             Show merchandise details ({})</button>",
            movements.len()
        );
        let _ = write!(html, "<div class='hidden-content' id='{target_id}'>");
        for movement in movements {
            let kind = movement
                .kind
                .map(|kind| kind.label())
                .unwrap_or(NOT_AVAILABLE);
            let quantity = movement
                .quantity
                .map(|quantity| quantity.to_string())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string());
            let _ = write!(
                html,
                "<p><strong>Brand:</strong> {}</p><p>{kind}:</p><ul><li>{}: {quantity}</li></ul>",
                or_na(movement.brand_name.as_deref()),
                movement_date(movement.event_date.as_ref()),
            );
        }
        let _ = write!(html, "</div>");
    }

    let _ = write!(html, "</div>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MovementKind, SaleAttributes};

    fn customer(date: Option<NaiveDate>) -> CustomerAggregate {
        CustomerAggregate {
            customer_id: 42,
            customer_name: "Kiosco <Don> Pepe".to_string(),
            latitude: -25.3,
            longitude: -57.6,
            latest_reference_date: date,
            attributes: SaleAttributes {
                salesperson_name: Some("Ana Lopez".to_string()),
                brand_name: Some("Alfa".to_string()),
                ..SaleAttributes::default()
            },
        }
    }

    #[test]
    fn basic_block_formats_date_and_escapes_names() {
        let html = render_popup(&customer(NaiveDate::from_ymd_opt(2024, 1, 10)), &[]);
        assert!(html.contains("Kiosco &lt;Don&gt; Pepe (42)"));
        assert!(html.contains("10/01/2024"));
        assert!(html.contains("<strong>Category:</strong> N/A"));
        assert!(html.contains("Nothing in transit or scheduled"));
        assert!(!html.contains("toggle-button"));
    }

    #[test]
    fn missing_sale_date_has_explicit_marker() {
        let html = render_popup(&customer(None), &[]);
        assert!(html.contains("No reference sale recorded."));
    }

    #[test]
    fn movement_block_lists_records_in_order() {
        let movements = vec![
            RawMovementRecord {
                customer_id: Some(42),
                event_date: Some(SaleDateValue::Text("2024-02-01 08:00:00".to_string())),
                kind: Some(MovementKind::InTransit),
                brand_name: Some("Alfa".to_string()),
                quantity: Some(12),
                ..RawMovementRecord::default()
            },
            RawMovementRecord {
                customer_id: Some(42),
                event_date: Some(SaleDateValue::Text("next week".to_string())),
                kind: Some(MovementKind::Scheduled),
                brand_name: Some("Beta".to_string()),
                quantity: Some(3),
                ..RawMovementRecord::default()
            },
        ];
        let html = render_popup(&customer(None), &movements);

        assert!(html.contains("data-target-id='movements-42'"));
        assert!(html.contains("id='movements-42'"));
        assert!(html.contains("<li>01/02/2024: 12</li>"));
        assert!(html.contains("<li>next week: 3</li>"));
        let alfa = html.find("Alfa</p><p>In transit").unwrap();
        let beta = html.find("Beta</p><p>Scheduled").unwrap();
        assert!(alfa < beta);
        assert!(!html.contains("onclick"));
        assert!(!html.contains("<script"));
    }
}
