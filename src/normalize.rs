use chrono::{NaiveDate, NaiveDateTime};

use crate::error::RecordError;
use crate::models::{NormalizedSale, RawSaleRecord, SaleDateValue};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses `YYYY-MM-DD HH:MM:SS`, falling back to `YYYY-MM-DD` at midnight.
pub fn parse_sale_timestamp(text: &str) -> Result<NaiveDateTime, RecordError> {
    let trimmed = text.trim();
    NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT)
        .or_else(|_| {
            NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .map(|date| date.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|_| RecordError::InvalidDate {
            value: text.to_string(),
        })
}

pub fn parse_sale_date(value: &SaleDateValue) -> Result<NaiveDate, RecordError> {
    match value {
        SaleDateValue::Date(date) => Ok(*date),
        SaleDateValue::DateTime(timestamp) => Ok(timestamp.date()),
        SaleDateValue::Text(text) => parse_sale_timestamp(text).map(|timestamp| timestamp.date()),
    }
}

pub fn parse_coordinate(field: &'static str, raw: Option<&str>) -> Result<f64, RecordError> {
    let raw = raw.ok_or(RecordError::MissingField { field })?;
    let invalid = || RecordError::InvalidCoordinate {
        field,
        value: raw.to_string(),
    };

    let value: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() {
        return Err(invalid());
    }
    Ok(value)
}

/// Validates one reference row. Customer id, name and both coordinates are
/// required; a present but unparseable sale date rejects the row.
pub fn normalize_sale(raw: &RawSaleRecord) -> Result<NormalizedSale, RecordError> {
    let customer_id = raw.customer_id.ok_or(RecordError::MissingField {
        field: "customer_id",
    })?;
    let customer_name = raw
        .customer_name
        .clone()
        .ok_or(RecordError::MissingField {
            field: "customer_name",
        })?;
    if raw.latitude.is_none() {
        return Err(RecordError::MissingField { field: "latitude" });
    }
    if raw.longitude.is_none() {
        return Err(RecordError::MissingField { field: "longitude" });
    }

    let sale_date = raw.sale_date.as_ref().map(parse_sale_date).transpose()?;
    let latitude = parse_coordinate("latitude", raw.latitude.as_deref())?;
    let longitude = parse_coordinate("longitude", raw.longitude.as_deref())?;

    Ok(NormalizedSale {
        customer_id,
        customer_name,
        latitude,
        longitude,
        sale_date,
        attributes: raw.attributes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn raw_sale(latitude: &str, longitude: &str, date: Option<&str>) -> RawSaleRecord {
        RawSaleRecord {
            customer_id: Some(7),
            customer_name: Some("Despensa Central".to_string()),
            latitude: Some(latitude.to_string()),
            longitude: Some(longitude.to_string()),
            sale_date: date.map(|value| SaleDateValue::Text(value.to_string())),
            ..RawSaleRecord::default()
        }
    }

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn parses_timestamp_then_plain_date() {
        let with_time = SaleDateValue::Text("2024-01-10 14:30:00".to_string());
        let plain = SaleDateValue::Text(" 2024-01-10 ".to_string());
        assert_eq!(parse_sale_date(&with_time).unwrap(), ymd(2024, 1, 10));
        assert_eq!(parse_sale_date(&plain).unwrap(), ymd(2024, 1, 10));
    }

    #[test]
    fn typed_dates_pass_through() {
        let timestamp = ymd(2024, 3, 2).and_hms_opt(23, 59, 59).unwrap();
        assert_eq!(
            parse_sale_date(&SaleDateValue::DateTime(timestamp)).unwrap(),
            ymd(2024, 3, 2)
        );
        assert_eq!(
            parse_sale_date(&SaleDateValue::Date(ymd(2024, 3, 2))).unwrap(),
            ymd(2024, 3, 2)
        );
    }

    #[test]
    fn rejects_unknown_date_formats() {
        let value = SaleDateValue::Text("10/01/2024".to_string());
        assert_matches!(parse_sale_date(&value), Err(RecordError::InvalidDate { .. }));
    }

    #[test]
    fn coordinates_must_be_finite_numbers() {
        assert_eq!(parse_coordinate("latitude", Some(" -25.30 ")).unwrap(), -25.30);
        assert_matches!(
            parse_coordinate("latitude", Some("")),
            Err(RecordError::InvalidCoordinate { field: "latitude", .. })
        );
        assert_matches!(
            parse_coordinate("longitude", Some("NaN")),
            Err(RecordError::InvalidCoordinate { field: "longitude", .. })
        );
        assert_matches!(
            parse_coordinate("longitude", None),
            Err(RecordError::MissingField { field: "longitude" })
        );
    }

    #[test]
    fn empty_latitude_excludes_record() {
        let raw = raw_sale("", "-57.6", Some("2024-01-10"));
        assert_matches!(
            normalize_sale(&raw),
            Err(RecordError::InvalidCoordinate { field: "latitude", .. })
        );
    }

    #[test]
    fn missing_name_is_reported() {
        let mut raw = raw_sale("-25.3", "-57.6", None);
        raw.customer_name = None;
        assert_matches!(
            normalize_sale(&raw),
            Err(RecordError::MissingField { field: "customer_name" })
        );
    }

    #[test]
    fn null_sale_date_is_accepted() {
        let sale = normalize_sale(&raw_sale("-25.3", "-57.6", None)).unwrap();
        assert_eq!(sale.customer_id, 7);
        assert_eq!(sale.sale_date, None);
        assert_eq!(sale.latitude, -25.3);
    }
}
