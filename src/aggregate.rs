use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tracing::warn;

use crate::models::{CustomerAggregate, NormalizedSale, RawMovementRecord, RawSaleRecord};
use crate::normalize::normalize_sale;

/// Result of folding the reference feed into one aggregate per customer.
#[derive(Debug, Default)]
pub struct ReferenceFold {
    pub customers: BTreeMap<i64, CustomerAggregate>,
    pub skipped_records: usize,
}

pub fn aggregate_reference_sales(records: &[RawSaleRecord]) -> ReferenceFold {
    let mut fold = ReferenceFold::default();

    for raw in records {
        match normalize_sale(raw) {
            Ok(sale) => fold_sale(&mut fold.customers, sale),
            Err(err) => {
                warn!(customer_id = ?raw.customer_id, error = %err, "skipping reference record");
                fold.skipped_records += 1;
            }
        }
    }

    fold
}

fn fold_sale(customers: &mut BTreeMap<i64, CustomerAggregate>, sale: NormalizedSale) {
    match customers.entry(sale.customer_id) {
        Entry::Vacant(slot) => {
            slot.insert(CustomerAggregate::from(sale));
        }
        Entry::Occupied(mut slot) => {
            let aggregate = slot.get_mut();
            if supersedes(aggregate.latest_reference_date, sale.sale_date) {
                aggregate.latest_reference_date = sale.sale_date;
                aggregate.attributes = sale.attributes;
            }
        }
    }
}

/// A stored null date is always replaced; otherwise only a strictly later
/// date wins, so the first row seen at a given date keeps its attribution.
pub fn supersedes(current: Option<NaiveDate>, incoming: Option<NaiveDate>) -> bool {
    match (current, incoming) {
        (None, _) => true,
        (Some(current), Some(incoming)) => incoming > current,
        (Some(_), None) => false,
    }
}

/// Movement rows grouped by customer, in input order.
#[derive(Debug, Default, Clone)]
pub struct MovementIndex {
    by_customer: HashMap<i64, Vec<RawMovementRecord>>,
    dropped: usize,
}

impl MovementIndex {
    pub fn build(records: &[RawMovementRecord]) -> Self {
        let mut index = MovementIndex::default();

        for record in records {
            match record.customer_id {
                Some(customer_id) => index
                    .by_customer
                    .entry(customer_id)
                    .or_default()
                    .push(record.clone()),
                None => index.dropped += 1,
            }
        }

        index
    }

    pub fn movements_for(&self, customer_id: i64) -> &[RawMovementRecord] {
        self.by_customer
            .get(&customer_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_movements(&self, customer_id: i64) -> bool {
        !self.movements_for(customer_id).is_empty()
    }

    pub fn customer_count(&self) -> usize {
        self.by_customer.len()
    }

    /// Rows discarded for lacking a customer id.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
