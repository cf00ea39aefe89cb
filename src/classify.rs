use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{error, info};

use crate::aggregate::{aggregate_reference_sales, MovementIndex};
use crate::error::ClassifyError;
use crate::models::{
    ClassifiedPoint, Color, CustomerAggregate, RawMovementRecord, RawSaleRecord, Shape,
    StatisticsSummary,
};
use crate::popup::render_popup;
use crate::stats::summarize;

pub const UNKNOWN_LABEL: char = '?';

/// Counts of everything a pass left out, for partial-success reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub reference_records: usize,
    pub skipped_records: usize,
    pub movement_records: usize,
    pub dropped_movements: usize,
    pub customers_with_movements: usize,
    pub skipped_customers: usize,
}

#[derive(Debug, Clone)]
pub struct ClassificationPass {
    pub points: Vec<ClassifiedPoint>,
    pub statistics: StatisticsSummary,
    pub report: PassReport,
}

impl ClassificationPass {
    /// No plottable customer survived; callers render "no data", not an error.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

pub fn color_for_days(days_since_sale: i64) -> Color {
    match days_since_sale {
        i64::MIN..=30 => Color::Green,
        31..=60 => Color::Orange,
        61..=90 => Color::Red,
        _ => Color::Black,
    }
}

pub fn color_for(latest_reference_date: Option<NaiveDate>, today: NaiveDate) -> Color {
    match latest_reference_date {
        Some(date) => color_for_days((today - date).num_days()),
        None => Color::Black,
    }
}

pub fn shape_for(customer_id: i64, movements: &MovementIndex) -> Shape {
    if movements.has_movements(customer_id) {
        Shape::Diamond
    } else {
        Shape::Circle
    }
}

pub fn label_letter(salesperson_name: Option<&str>) -> char {
    salesperson_name
        .and_then(|name| name.trim().chars().next())
        .and_then(|first| first.to_uppercase().next())
        .unwrap_or(UNKNOWN_LABEL)
}

pub fn classify_customer(
    customer: &CustomerAggregate,
    movements: &MovementIndex,
    today: NaiveDate,
) -> Result<ClassifiedPoint, ClassifyError> {
    if !(-90.0..=90.0).contains(&customer.latitude)
        || !(-180.0..=180.0).contains(&customer.longitude)
    {
        return Err(ClassifyError::CoordinatesOutOfRange {
            latitude: customer.latitude,
            longitude: customer.longitude,
        });
    }

    let customer_movements = movements.movements_for(customer.customer_id);

    Ok(ClassifiedPoint {
        customer_id: customer.customer_id,
        customer_name: customer.customer_name.clone(),
        latitude: customer.latitude,
        longitude: customer.longitude,
        latest_reference_date: customer.latest_reference_date,
        attributes: customer.attributes.clone(),
        color: color_for(customer.latest_reference_date, today),
        shape: shape_for(customer.customer_id, movements),
        label_letter: label_letter(customer.attributes.salesperson_name.as_deref()),
        popup_html: render_popup(customer, customer_movements),
    })
}

/// Classifies every aggregated customer. Customers that only appear in the
/// movement feed never produce a point.
pub fn classify_points(
    customers: &BTreeMap<i64, CustomerAggregate>,
    movements: &MovementIndex,
    today: NaiveDate,
) -> (Vec<ClassifiedPoint>, usize) {
    let mut points = Vec::with_capacity(customers.len());
    let mut skipped = 0usize;

    for (customer_id, customer) in customers {
        match classify_customer(customer, movements, today) {
            Ok(point) => points.push(point),
            Err(err) => {
                error!(customer_id, error = %err, "skipping customer during classification");
                skipped += 1;
            }
        }
    }

    (points, skipped)
}

/// One full pass: fold both feeds, classify, summarize.
pub fn run_pass(
    reference: &[RawSaleRecord],
    movements: &[RawMovementRecord],
    today: NaiveDate,
) -> ClassificationPass {
    let fold = aggregate_reference_sales(reference);
    let index = MovementIndex::build(movements);
    let (points, skipped_customers) = classify_points(&fold.customers, &index, today);
    let statistics = summarize(&points);

    let report = PassReport {
        reference_records: reference.len(),
        skipped_records: fold.skipped_records,
        movement_records: movements.len(),
        dropped_movements: index.dropped(),
        customers_with_movements: index.customer_count(),
        skipped_customers,
    };

    info!(
        points = points.len(),
        customers = fold.customers.len(),
        skipped_records = report.skipped_records,
        skipped_customers,
        "classification pass complete"
    );

    ClassificationPass {
        points,
        statistics,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MovementKind, SaleAttributes, SaleDateValue};
    use assert_matches::assert_matches;
    use chrono::Duration;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn sale(customer_id: i64, date: Option<&str>, salesperson: Option<&str>) -> RawSaleRecord {
        RawSaleRecord {
            customer_id: Some(customer_id),
            customer_name: Some(format!("Customer {customer_id}")),
            latitude: Some("-25.28".to_string()),
            longitude: Some("-57.63".to_string()),
            sale_date: date.map(|value| SaleDateValue::Text(value.to_string())),
            attributes: SaleAttributes {
                salesperson_name: salesperson.map(str::to_string),
                ..SaleAttributes::default()
            },
        }
    }

    fn movement(customer_id: i64) -> RawMovementRecord {
        RawMovementRecord {
            customer_id: Some(customer_id),
            event_date: Some(SaleDateValue::Date(ymd(2024, 2, 10))),
            kind: Some(MovementKind::Scheduled),
            brand_name: Some("Alfa".to_string()),
            quantity: Some(5),
            ..RawMovementRecord::default()
        }
    }

    #[test]
    fn color_buckets_have_exact_boundaries() {
        assert_eq!(color_for_days(-15), Color::Green);
        assert_eq!(color_for_days(0), Color::Green);
        assert_eq!(color_for_days(30), Color::Green);
        assert_eq!(color_for_days(31), Color::Orange);
        assert_eq!(color_for_days(60), Color::Orange);
        assert_eq!(color_for_days(61), Color::Red);
        assert_eq!(color_for_days(90), Color::Red);
        assert_eq!(color_for_days(91), Color::Black);
        assert_eq!(color_for_days(i64::MAX), Color::Black);
    }

    #[test]
    fn color_buckets_partition_the_integer_line() {
        for days in -400..=400 {
            let expected = if days <= 30 {
                Color::Green
            } else if days <= 60 {
                Color::Orange
            } else if days <= 90 {
                Color::Red
            } else {
                Color::Black
            };
            assert_eq!(color_for_days(days), expected, "days = {days}");
        }
    }

    #[test]
    fn future_dated_sale_is_green() {
        let today = ymd(2024, 2, 5);
        assert_eq!(color_for(Some(today + Duration::days(10)), today), Color::Green);
    }

    #[test]
    fn missing_sale_date_is_black() {
        assert_eq!(color_for(None, ymd(2024, 2, 5)), Color::Black);
    }

    #[test]
    fn label_uses_trimmed_uppercased_initial() {
        assert_eq!(label_letter(Some("  ana lopez")), 'A');
        assert_eq!(label_letter(Some("   ")), UNKNOWN_LABEL);
        assert_eq!(label_letter(None), UNKNOWN_LABEL);
    }

    #[test]
    fn latest_sale_drives_color_and_label() {
        let reference = vec![
            sale(1, Some("2024-01-10"), Some("Ana Lopez")),
            sale(1, Some("2024-01-05"), Some("Ana Lopez")),
        ];
        let pass = run_pass(&reference, &[], ymd(2024, 2, 5));

        assert_eq!(pass.points.len(), 1);
        let point = &pass.points[0];
        assert_eq!(point.latest_reference_date, Some(ymd(2024, 1, 10)));
        assert_eq!(point.color, Color::Green);
        assert_eq!(point.label_letter, 'A');
        assert_eq!(point.shape, Shape::Circle);
    }

    #[test]
    fn movement_presence_sets_diamond_shape() {
        let reference = vec![
            sale(1, Some("2024-01-10"), Some("Ana")),
            sale(2, Some("2024-01-10"), Some("Bruno")),
        ];
        let pass = run_pass(&reference, &[movement(2)], ymd(2024, 2, 5));

        assert_eq!(pass.points[0].shape, Shape::Circle);
        assert_eq!(pass.points[1].shape, Shape::Diamond);
        assert!(pass.points[1].popup_html.contains("movements-2"));
    }

    #[test]
    fn movement_only_customers_are_not_plotted() {
        let reference = vec![sale(1, Some("2024-01-10"), Some("Ana"))];
        let pass = run_pass(&reference, &[movement(99)], ymd(2024, 2, 5));

        assert_eq!(pass.points.len(), 1);
        assert!(pass.points.iter().all(|point| point.customer_id != 99));
        assert_eq!(pass.statistics.total_customers, 1);
        assert_eq!(pass.report.customers_with_movements, 1);
    }

    #[test]
    fn out_of_range_coordinates_skip_only_that_customer() {
        let mut broken = sale(3, Some("2024-01-10"), Some("Ana"));
        broken.latitude = Some("123.0".to_string());
        let reference = vec![broken, sale(4, Some("2024-01-10"), Some("Ana"))];
        let pass = run_pass(&reference, &[], ymd(2024, 2, 5));

        assert_eq!(pass.report.skipped_customers, 1);
        assert_eq!(pass.points.len(), 1);
        assert_eq!(pass.points[0].customer_id, 4);
    }

    #[test]
    fn classify_customer_reports_bad_coordinates() {
        let customer = CustomerAggregate {
            customer_id: 5,
            customer_name: "Far Away".to_string(),
            latitude: 10.0,
            longitude: -200.0,
            latest_reference_date: None,
            attributes: SaleAttributes::default(),
        };
        assert_matches!(
            classify_customer(&customer, &MovementIndex::default(), ymd(2024, 2, 5)),
            Err(ClassifyError::CoordinatesOutOfRange { .. })
        );
    }

    #[test]
    fn empty_input_yields_empty_pass() {
        let pass = run_pass(&[], &[], ymd(2024, 2, 5));
        assert!(pass.is_empty());
        assert_eq!(pass.statistics, StatisticsSummary::default());
    }

    #[test]
    fn repeated_passes_are_identical() {
        let reference = vec![
            sale(2, Some("2023-12-01"), Some("Bruno")),
            sale(1, Some("2024-01-10"), Some("Ana")),
            sale(1, None, Some("Carla")),
        ];
        let movements = vec![movement(1), movement(1), movement(2)];
        let today = ymd(2024, 2, 5);

        let first = run_pass(&reference, &movements, today);
        let second = run_pass(&reference, &movements, today);
        assert_eq!(first.points, second.points);
        assert_eq!(first.statistics, second.statistics);
    }
}
