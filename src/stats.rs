use std::collections::HashSet;

use crate::models::{ClassifiedPoint, Shape, StatisticsSummary};

pub fn summarize(points: &[ClassifiedPoint]) -> StatisticsSummary {
    let mut summary = StatisticsSummary::default();
    let mut customers = HashSet::new();

    for point in points {
        customers.insert(point.customer_id);
        match point.shape {
            Shape::Circle => summary.circles.increment(point.color),
            Shape::Diamond => summary.diamonds.increment(point.color),
        }
    }

    summary.total_customers = customers.len();
    summary.total_circles = summary.circles.total();
    summary.total_diamonds = summary.diamonds.total();
    summary
}
