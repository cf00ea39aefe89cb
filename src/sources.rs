use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::{
    ClassifiedPoint, FilterSelection, MovementKind, RawMovementRecord, RawSaleRecord,
    SaleAttributes, SaleDateValue,
};

#[derive(Debug, Deserialize)]
struct SaleCsvRow {
    #[serde(default, deserialize_with = "csv::invalid_option")]
    customer_id: Option<i64>,
    customer_name: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
    sale_date: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    salesperson_id: Option<i64>,
    salesperson_name: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    brand_id: Option<i64>,
    brand_name: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    category_id: Option<i64>,
    category_name: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    department_id: Option<i64>,
    department_name: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    city_id: Option<i64>,
    city_name: Option<String>,
}

impl From<SaleCsvRow> for RawSaleRecord {
    fn from(row: SaleCsvRow) -> Self {
        RawSaleRecord {
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            latitude: row.latitude,
            longitude: row.longitude,
            sale_date: row.sale_date.map(SaleDateValue::Text),
            attributes: SaleAttributes {
                salesperson_id: row.salesperson_id,
                salesperson_name: row.salesperson_name,
                brand_id: row.brand_id,
                brand_name: row.brand_name,
                category_id: row.category_id,
                category_name: row.category_name,
                department_id: row.department_id,
                department_name: row.department_name,
                city_id: row.city_id,
                city_name: row.city_name,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct MovementCsvRow {
    #[serde(default, deserialize_with = "csv::invalid_option")]
    customer_id: Option<i64>,
    event_date: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    presale: Option<i16>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    brand_id: Option<i64>,
    brand_name: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    quantity: Option<i64>,
}

impl From<MovementCsvRow> for RawMovementRecord {
    fn from(row: MovementCsvRow) -> Self {
        RawMovementRecord {
            customer_id: row.customer_id,
            event_date: row.event_date.map(SaleDateValue::Text),
            kind: row.presale.and_then(MovementKind::from_code),
            brand_id: row.brand_id,
            brand_name: row.brand_name,
            quantity: row.quantity,
        }
    }
}

fn read_rows<T, R>(reader: impl std::io::Read) -> anyhow::Result<Vec<R>>
where
    T: for<'de> Deserialize<'de>,
    R: From<T>,
{
    let mut reader = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for (index, result) in reader.deserialize::<T>().enumerate() {
        let row = result.with_context(|| format!("malformed CSV row {}", index + 1))?;
        records.push(R::from(row));
    }
    Ok(records)
}

pub fn read_sales_csv(path: &Path) -> anyhow::Result<Vec<RawSaleRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_rows::<SaleCsvRow, RawSaleRecord>(file)
}

pub fn read_movements_csv(path: &Path) -> anyhow::Result<Vec<RawMovementRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_rows::<MovementCsvRow, RawMovementRecord>(file)
}

/// In-memory counterpart of the database predicates for offline exports.
pub fn filter_sales(records: Vec<RawSaleRecord>, filters: &FilterSelection) -> Vec<RawSaleRecord> {
    fn admits<T: PartialEq>(wanted: Option<&T>, actual: Option<&T>) -> bool {
        wanted.map_or(true, |wanted| actual == Some(wanted))
    }

    records
        .into_iter()
        .filter(|record| {
            let attributes = &record.attributes;
            admits(filters.category_id.as_ref(), attributes.category_id.as_ref())
                && admits(filters.brand_id.as_ref(), attributes.brand_id.as_ref())
                && admits(
                    filters.salesperson_name.as_ref(),
                    attributes.salesperson_name.as_ref(),
                )
                && admits(filters.department_id.as_ref(), attributes.department_id.as_ref())
                && admits(filters.city_id.as_ref(), attributes.city_id.as_ref())
        })
        .collect()
}

pub fn filter_movements(
    records: Vec<RawMovementRecord>,
    brand_ids: Option<&[i64]>,
) -> Vec<RawMovementRecord> {
    match brand_ids {
        None => records,
        Some(ids) => records
            .into_iter()
            .filter(|record| record.brand_id.is_some_and(|id| ids.contains(&id)))
            .collect(),
    }
}

#[derive(Debug, Serialize)]
struct PointCsvRow<'a> {
    customer_id: i64,
    customer_name: &'a str,
    latitude: f64,
    longitude: f64,
    latest_reference_date: Option<String>,
    color: &'static str,
    shape: &'static str,
    label_letter: char,
    salesperson_id: Option<i64>,
    salesperson_name: Option<&'a str>,
    brand_id: Option<i64>,
    brand_name: Option<&'a str>,
    category_id: Option<i64>,
    category_name: Option<&'a str>,
    department_id: Option<i64>,
    department_name: Option<&'a str>,
    city_id: Option<i64>,
    city_name: Option<&'a str>,
}

impl<'a> From<&'a ClassifiedPoint> for PointCsvRow<'a> {
    fn from(point: &'a ClassifiedPoint) -> Self {
        let attributes = &point.attributes;
        PointCsvRow {
            customer_id: point.customer_id,
            customer_name: &point.customer_name,
            latitude: point.latitude,
            longitude: point.longitude,
            latest_reference_date: point.latest_reference_date.map(|date| date.to_string()),
            color: point.color.as_str(),
            shape: point.shape.as_str(),
            label_letter: point.label_letter,
            salesperson_id: attributes.salesperson_id,
            salesperson_name: attributes.salesperson_name.as_deref(),
            brand_id: attributes.brand_id,
            brand_name: attributes.brand_name.as_deref(),
            category_id: attributes.category_id,
            category_name: attributes.category_name.as_deref(),
            department_id: attributes.department_id,
            department_name: attributes.department_name.as_deref(),
            city_id: attributes.city_id,
            city_name: attributes.city_name.as_deref(),
        }
    }
}

pub fn write_points_csv(writer: impl std::io::Write, points: &[ClassifiedPoint]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for point in points {
        writer.serialize(PointCsvRow::from(point))?;
    }
    writer.flush()?;
    Ok(())
}
