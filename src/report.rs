use std::fmt::Write;

use chrono::NaiveDate;

use crate::classify::ClassificationPass;
use crate::models::{Color, FilterSelection, Shape};

pub fn describe_filters(filters: &FilterSelection) -> String {
    if filters.is_empty() {
        return "all customers".to_string();
    }

    let mut parts = Vec::new();
    if let Some(id) = filters.category_id {
        parts.push(format!("category {id}"));
    }
    if let Some(id) = filters.brand_id {
        parts.push(format!("brand {id}"));
    }
    if let Some(name) = &filters.salesperson_name {
        parts.push(format!("salesperson {name}"));
    }
    if let Some(id) = filters.department_id {
        parts.push(format!("department {id}"));
    }
    if let Some(id) = filters.city_id {
        parts.push(format!("city {id}"));
    }
    parts.join(", ")
}

pub fn build_summary(filters: &FilterSelection, today: NaiveDate, pass: &ClassificationPass) -> String {
    let stats = &pass.statistics;
    let report = &pass.report;
    let mut output = String::new();

    let _ = writeln!(output, "# Sales Point Summary");
    let _ = writeln!(
        output,
        "Generated for {} (recency measured on {})",
        describe_filters(filters),
        today
    );
    let _ = writeln!(output);

    if pass.is_empty() {
        let _ = writeln!(output, "No data for these filters.");
    } else {
        let _ = writeln!(output, "Total customers: {}", stats.total_customers);
        for (shape, title, total) in [
            (Shape::Circle, "Circles (nothing in transit)", stats.total_circles),
            (Shape::Diamond, "Diamonds (merchandise in transit)", stats.total_diamonds),
        ] {
            let _ = writeln!(output);
            let _ = writeln!(output, "## {title}: {total}");
            for color in Color::ALL {
                let _ = writeln!(output, "- {}: {}", color.as_str(), stats.count(shape, color));
            }
        }
    }

    let skipped = report.skipped_records + report.dropped_movements + report.skipped_customers;
    if skipped > 0 {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Skipped");
        let _ = writeln!(
            output,
            "- {} of {} reference records",
            report.skipped_records, report.reference_records
        );
        let _ = writeln!(
            output,
            "- {} of {} movement records without a customer",
            report.dropped_movements, report.movement_records
        );
        let _ = writeln!(output, "- {} customers during classification", report.skipped_customers);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::run_pass;
    use crate::models::{RawSaleRecord, SaleDateValue};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 5).unwrap()
    }

    #[test]
    fn empty_pass_reports_no_data() {
        let pass = run_pass(&[], &[], today());
        let summary = build_summary(&FilterSelection::default(), today(), &pass);
        assert!(summary.contains("all customers"));
        assert!(summary.contains("No data for these filters."));
        assert!(!summary.contains("## Skipped"));
    }

    #[test]
    fn summary_lists_buckets_and_skips() {
        let reference = vec![
            RawSaleRecord {
                customer_id: Some(1),
                customer_name: Some("Despensa".to_string()),
                latitude: Some("-25.3".to_string()),
                longitude: Some("-57.6".to_string()),
                sale_date: Some(SaleDateValue::Text("2023-10-01".to_string())),
                ..RawSaleRecord::default()
            },
            RawSaleRecord::default(),
        ];
        let pass = run_pass(&reference, &[], today());
        let filters = FilterSelection {
            brand_id: Some(3),
            salesperson_name: Some("Ana".to_string()),
            ..FilterSelection::default()
        };
        let summary = build_summary(&filters, today(), &pass);

        assert!(summary.contains("brand 3, salesperson Ana"));
        assert!(summary.contains("## Circles (nothing in transit): 1"));
        assert!(summary.contains("- black: 1"));
        assert!(summary.contains("- 1 of 2 reference records"));
    }
}
