use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Sale date as delivered by a data source, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleDateValue {
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// Attribution carried by a sale: who sold what, and where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaleAttributes {
    pub salesperson_id: Option<i64>,
    pub salesperson_name: Option<String>,
    pub brand_id: Option<i64>,
    pub brand_name: Option<String>,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub department_id: Option<i64>,
    pub department_name: Option<String>,
    pub city_id: Option<i64>,
    pub city_name: Option<String>,
}

/// One reference sale row. Every field may be missing at the boundary.
#[derive(Debug, Clone, Default)]
pub struct RawSaleRecord {
    pub customer_id: Option<i64>,
    pub customer_name: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub sale_date: Option<SaleDateValue>,
    pub attributes: SaleAttributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    InTransit,
    Scheduled,
}

impl MovementKind {
    /// Decodes the `presale` code stored with each sale row.
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            2 => Some(MovementKind::InTransit),
            3 => Some(MovementKind::Scheduled),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MovementKind::InTransit => "In transit",
            MovementKind::Scheduled => "Scheduled",
        }
    }
}

/// Merchandise not yet delivered to a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMovementRecord {
    pub customer_id: Option<i64>,
    pub event_date: Option<SaleDateValue>,
    pub kind: Option<MovementKind>,
    pub brand_id: Option<i64>,
    pub brand_name: Option<String>,
    pub quantity: Option<i64>,
}

/// A reference sale that passed normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSale {
    pub customer_id: i64,
    pub customer_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub sale_date: Option<NaiveDate>,
    pub attributes: SaleAttributes,
}

/// Latest reference sale per customer, with the attribution of the row
/// that set `latest_reference_date`.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerAggregate {
    pub customer_id: i64,
    pub customer_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub latest_reference_date: Option<NaiveDate>,
    pub attributes: SaleAttributes,
}

impl From<NormalizedSale> for CustomerAggregate {
    fn from(sale: NormalizedSale) -> Self {
        CustomerAggregate {
            customer_id: sale.customer_id,
            customer_name: sale.customer_name,
            latitude: sale.latitude,
            longitude: sale.longitude,
            latest_reference_date: sale.sale_date,
            attributes: sale.attributes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Green,
    Orange,
    Red,
    Black,
}

impl Color {
    pub const ALL: [Color; 4] = [Color::Green, Color::Orange, Color::Red, Color::Black];

    pub fn as_str(self) -> &'static str {
        match self {
            Color::Green => "green",
            Color::Orange => "orange",
            Color::Red => "red",
            Color::Black => "black",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Circle,
    Diamond,
}

impl Shape {
    pub fn as_str(self) -> &'static str {
        match self {
            Shape::Circle => "circle",
            Shape::Diamond => "diamond",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedPoint {
    pub customer_id: i64,
    pub customer_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub latest_reference_date: Option<NaiveDate>,
    pub attributes: SaleAttributes,
    pub color: Color,
    pub shape: Shape,
    pub label_letter: char,
    pub popup_html: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ColorCounts {
    pub green: usize,
    pub orange: usize,
    pub red: usize,
    pub black: usize,
}

impl ColorCounts {
    pub fn get(&self, color: Color) -> usize {
        match color {
            Color::Green => self.green,
            Color::Orange => self.orange,
            Color::Red => self.red,
            Color::Black => self.black,
        }
    }

    pub fn increment(&mut self, color: Color) {
        match color {
            Color::Green => self.green += 1,
            Color::Orange => self.orange += 1,
            Color::Red => self.red += 1,
            Color::Black => self.black += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.green + self.orange + self.red + self.black
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSummary {
    #[serde(rename = "total_general_clientes")]
    pub total_customers: usize,
    pub total_circles: usize,
    pub total_diamonds: usize,
    pub circles: ColorCounts,
    pub diamonds: ColorCounts,
}

impl StatisticsSummary {
    pub fn count(&self, shape: Shape, color: Color) -> usize {
        match shape {
            Shape::Circle => self.circles.get(color),
            Shape::Diamond => self.diamonds.get(color),
        }
    }
}

/// Active filters for one classification pass. All predicates are
/// optional and combine conjunctively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterSelection {
    pub category_id: Option<i64>,
    pub brand_id: Option<i64>,
    pub salesperson_name: Option<String>,
    pub department_id: Option<i64>,
    pub city_id: Option<i64>,
}

impl FilterSelection {
    pub fn is_empty(&self) -> bool {
        self.category_id.is_none()
            && self.brand_id.is_none()
            && self.salesperson_name.is_none()
            && self.department_id.is_none()
            && self.city_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupOption {
    pub id: i64,
    pub description: String,
}
