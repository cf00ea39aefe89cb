use anyhow::Context;
use chrono::{Duration, Local, NaiveDateTime, NaiveTime};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    FilterSelection, LookupOption, MovementKind, RawMovementRecord, RawSaleRecord, SaleAttributes,
    SaleDateValue,
};
use crate::normalize::parse_sale_timestamp;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let lookups: [(&str, &[(i64, &str)]); 4] = [
        ("categories", &[(1, "Beverages"), (2, "Snacks")]),
        ("brands", &[(1, "Alfa"), (2, "Beta"), (3, "Gamma")]),
        (
            "salespeople",
            &[(1, "Ana Lopez"), (2, "Bruno Diaz"), (3, "Carla Gomez")],
        ),
        (
            "departments",
            &[(1, "Central"), (2, "Cordillera"), (3, "Alto Parana")],
        ),
    ];

    for (table, rows) in lookups {
        for (id, description) in rows {
            sqlx::query(&format!(
                "INSERT INTO sales_map.{table} (id, description) VALUES ($1, $2) \
                 ON CONFLICT (id) DO UPDATE SET description = EXCLUDED.description"
            ))
            .bind(*id)
            .bind(*description)
            .execute(pool)
            .await?;
        }
    }

    let cities = vec![
        (10, "San Lorenzo", 1),
        (11, "Luque", 1),
        (20, "Caacupe", 2),
        (30, "Ciudad del Este", 3),
    ];

    for (id, description, department_id) in cities {
        sqlx::query(
            r#"
            INSERT INTO sales_map.cities (id, description, department_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET description = EXCLUDED.description, department_id = EXCLUDED.department_id
            "#,
        )
        .bind(id as i64)
        .bind(description)
        .bind(department_id as i64)
        .execute(pool)
        .await?;
    }

    let points = vec![
        (101, "Despensa San Roque", "-25.3406", "-57.5089", 1, 10),
        (102, "Almacen La Esquina", "-25.3321", "-57.5202", 1, 10),
        (103, "Super Mercadito Luque", "-25.2650", "-57.4872", 1, 11),
        (104, "Kiosco Ruta 2", "-25.3921", "-57.1402", 2, 20),
        (105, "Autoservicio Central", "-25.5097", "-54.6111", 3, 30),
        (106, "Minimarket Sin Ubicacion", "", "", 3, 30),
    ];

    for (customer_id, description, latitude, longitude, department_id, city_id) in points {
        upsert_point_of_sale(
            pool,
            customer_id,
            description,
            Some(latitude),
            Some(longitude),
            Some(department_id),
            Some(city_id),
        )
        .await?;
    }

    // (source_key, customer, days ago, salesperson, brand, category, presale, quantity)
    let sales = vec![
        ("seed-001", 101, 5, 1, 1, 1, 1, 10),
        ("seed-002", 101, 40, 2, 2, 1, 1, 5),
        ("seed-003", 102, 45, 2, 1, 1, 1, 8),
        ("seed-004", 103, 75, 3, 3, 2, 1, 3),
        ("seed-005", 104, 120, 1, 2, 2, 1, 6),
        ("seed-006", 105, 12, 3, 1, 1, 1, 9),
        ("seed-007", 106, 3, 1, 1, 1, 1, 2),
        ("seed-008", 102, -2, 2, 1, 1, 2, 20),
        ("seed-009", 105, -7, 3, 3, 2, 3, 4),
        ("seed-010", 104, -14, 1, 2, 2, 3, 12),
    ];

    let today = Local::now().date_naive();
    for (source_key, customer_id, days_ago, salesperson_id, brand_id, category_id, presale, quantity) in
        sales
    {
        let sale_date = (today - Duration::days(days_ago)).and_time(NaiveTime::MIN);
        sqlx::query(
            r#"
            INSERT INTO sales_map.sales
            (customer_id, sale_date, salesperson_id, brand_id, category_id, presale, quantity, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(customer_id as i64)
        .bind(sale_date)
        .bind(salesperson_id as i64)
        .bind(brand_id as i64)
        .bind(category_id as i64)
        .bind(presale as i16)
        .bind(quantity as i64)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn upsert_point_of_sale(
    pool: &PgPool,
    customer_id: i64,
    description: &str,
    latitude: Option<&str>,
    longitude: Option<&str>,
    department_id: Option<i64>,
    city_id: Option<i64>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sales_map.points_of_sale
        (customer_id, description, latitude, longitude, department_id, city_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (customer_id) DO UPDATE
        SET description = EXCLUDED.description,
            latitude = EXCLUDED.latitude,
            longitude = EXCLUDED.longitude,
            department_id = EXCLUDED.department_id,
            city_id = EXCLUDED.city_id
        "#,
    )
    .bind(customer_id)
    .bind(description)
    .bind(latitude)
    .bind(longitude)
    .bind(department_id)
    .bind(city_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Latest reference sale per customer. Category, brand and salesperson
/// narrow which sales count as "latest"; department and city narrow the
/// point of sale. Ties at the latest date yield one row each.
pub fn reference_sales_query(filters: &FilterSelection) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(
        "WITH latest_reference_sale AS (\
         SELECT s.customer_id, MAX(s.sale_date) AS latest_date \
         FROM sales_map.sales s",
    );
    if filters.salesperson_name.is_some() {
        query.push(" JOIN sales_map.salespeople sp_filter ON sp_filter.id = s.salesperson_id");
    }
    query.push(" WHERE s.presale = 1");
    if let Some(category_id) = filters.category_id {
        query.push(" AND s.category_id = ").push_bind(category_id);
    }
    if let Some(brand_id) = filters.brand_id {
        query.push(" AND s.brand_id = ").push_bind(brand_id);
    }
    if let Some(name) = &filters.salesperson_name {
        query.push(" AND sp_filter.description = ").push_bind(name.clone());
    }
    query.push(
        " GROUP BY s.customer_id) \
         SELECT pv.customer_id, pv.description AS customer_name, pv.latitude, pv.longitude, \
         latest.sale_date, latest.salesperson_id, sp.description AS salesperson_name, \
         latest.brand_id, b.description AS brand_name, \
         latest.category_id, c.description AS category_name, \
         pv.department_id, d.description AS department_name, \
         pv.city_id, ci.description AS city_name \
         FROM sales_map.points_of_sale pv \
         JOIN latest_reference_sale lrs ON lrs.customer_id = pv.customer_id \
         JOIN sales_map.sales latest ON latest.customer_id = lrs.customer_id \
         AND latest.sale_date = lrs.latest_date AND latest.presale = 1 \
         LEFT JOIN sales_map.salespeople sp ON sp.id = latest.salesperson_id \
         LEFT JOIN sales_map.brands b ON b.id = latest.brand_id \
         LEFT JOIN sales_map.categories c ON c.id = latest.category_id \
         LEFT JOIN sales_map.departments d ON d.id = pv.department_id \
         LEFT JOIN sales_map.cities ci ON ci.id = pv.city_id \
         WHERE pv.latitude IS NOT NULL AND pv.longitude IS NOT NULL \
         AND pv.latitude <> '' AND pv.longitude <> ''",
    );
    if let Some(department_id) = filters.department_id {
        query.push(" AND pv.department_id = ").push_bind(department_id);
    }
    if let Some(city_id) = filters.city_id {
        query.push(" AND pv.city_id = ").push_bind(city_id);
    }
    if let Some(category_id) = filters.category_id {
        query.push(" AND latest.category_id = ").push_bind(category_id);
    }
    if let Some(brand_id) = filters.brand_id {
        query.push(" AND latest.brand_id = ").push_bind(brand_id);
    }
    if let Some(name) = &filters.salesperson_name {
        query.push(" AND sp.description = ").push_bind(name.clone());
    }
    query.push(" ORDER BY pv.customer_id, latest.sale_date DESC");
    query
}

/// In-transit and scheduled rows. `Some(&[])` restricts to no brand at all
/// and therefore returns nothing.
pub fn movements_query(brand_ids: Option<&[i64]>) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(
        "SELECT s.customer_id, s.sale_date, s.presale, s.brand_id, \
         b.description AS brand_name, s.quantity \
         FROM sales_map.sales s \
         LEFT JOIN sales_map.brands b ON b.id = s.brand_id \
         WHERE s.presale IN (2, 3) AND s.quantity > 0",
    );
    match brand_ids {
        Some([]) => {
            query.push(" AND 1 = 0");
        }
        Some(ids) => {
            query.push(" AND s.brand_id IN (");
            let mut separated = query.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }
        None => {}
    }
    query.push(" ORDER BY s.customer_id, s.sale_date DESC");
    query
}

fn sale_from_row(row: &PgRow) -> Result<RawSaleRecord, sqlx::Error> {
    let sale_date: Option<NaiveDateTime> = row.try_get("sale_date")?;
    Ok(RawSaleRecord {
        customer_id: row.try_get("customer_id")?,
        customer_name: row.try_get("customer_name")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        sale_date: sale_date.map(SaleDateValue::DateTime),
        attributes: SaleAttributes {
            salesperson_id: row.try_get("salesperson_id")?,
            salesperson_name: row.try_get("salesperson_name")?,
            brand_id: row.try_get("brand_id")?,
            brand_name: row.try_get("brand_name")?,
            category_id: row.try_get("category_id")?,
            category_name: row.try_get("category_name")?,
            department_id: row.try_get("department_id")?,
            department_name: row.try_get("department_name")?,
            city_id: row.try_get("city_id")?,
            city_name: row.try_get("city_name")?,
        },
    })
}

fn movement_from_row(row: &PgRow) -> Result<RawMovementRecord, sqlx::Error> {
    let event_date: Option<NaiveDateTime> = row.try_get("sale_date")?;
    let presale: i16 = row.try_get("presale")?;
    Ok(RawMovementRecord {
        customer_id: row.try_get("customer_id")?,
        event_date: event_date.map(SaleDateValue::DateTime),
        kind: MovementKind::from_code(presale),
        brand_id: row.try_get("brand_id")?,
        brand_name: row.try_get("brand_name")?,
        quantity: row.try_get("quantity")?,
    })
}

pub async fn fetch_reference_sales(
    pool: &PgPool,
    filters: &FilterSelection,
) -> anyhow::Result<Vec<RawSaleRecord>> {
    let mut query = reference_sales_query(filters);
    debug!(sql = query.sql(), ?filters, "fetching reference sales");

    let rows = query
        .build()
        .fetch_all(pool)
        .await
        .context("failed to fetch reference sales")?;
    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        records.push(sale_from_row(row)?);
    }
    Ok(records)
}

pub async fn fetch_movements(
    pool: &PgPool,
    brand_ids: Option<&[i64]>,
) -> anyhow::Result<Vec<RawMovementRecord>> {
    let mut query = movements_query(brand_ids);
    debug!(sql = query.sql(), ?brand_ids, "fetching movements");

    let rows = query
        .build()
        .fetch_all(pool)
        .await
        .context("failed to fetch movements")?;
    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        records.push(movement_from_row(row)?);
    }
    Ok(records)
}

async fn fetch_lookup(
    pool: &PgPool,
    base: &str,
    parent_filter: Option<(&str, i64)>,
) -> anyhow::Result<Vec<LookupOption>> {
    let mut query = String::from(base);
    if let Some((clause, _)) = parent_filter {
        query.push_str(clause);
    }
    query.push_str(" ORDER BY description");

    let mut rows = sqlx::query(&query);
    if let Some((_, parent_id)) = parent_filter {
        rows = rows.bind(parent_id);
    }

    let records = rows.fetch_all(pool).await?;
    let mut options = Vec::with_capacity(records.len());
    for row in records {
        options.push(LookupOption {
            id: row.try_get("id")?,
            description: row.try_get("description")?,
        });
    }
    Ok(options)
}

pub async fn fetch_categories(pool: &PgPool) -> anyhow::Result<Vec<LookupOption>> {
    fetch_lookup(pool, "SELECT id, description FROM sales_map.categories", None).await
}

pub async fn fetch_brands(
    pool: &PgPool,
    category_id: Option<i64>,
) -> anyhow::Result<Vec<LookupOption>> {
    fetch_lookup(
        pool,
        "SELECT id, description FROM sales_map.brands",
        category_id.map(|id| {
            (
                " WHERE id IN (SELECT DISTINCT brand_id FROM sales_map.sales WHERE category_id = $1)",
                id,
            )
        }),
    )
    .await
}

pub async fn fetch_salespeople(
    pool: &PgPool,
    category_id: Option<i64>,
) -> anyhow::Result<Vec<LookupOption>> {
    fetch_lookup(
        pool,
        "SELECT id, description FROM sales_map.salespeople",
        category_id.map(|id| {
            (
                " WHERE id IN (SELECT DISTINCT salesperson_id FROM sales_map.sales WHERE category_id = $1)",
                id,
            )
        }),
    )
    .await
}

pub async fn fetch_departments(pool: &PgPool) -> anyhow::Result<Vec<LookupOption>> {
    fetch_lookup(pool, "SELECT id, description FROM sales_map.departments", None).await
}

pub async fn fetch_cities(
    pool: &PgPool,
    department_id: Option<i64>,
) -> anyhow::Result<Vec<LookupOption>> {
    fetch_lookup(
        pool,
        "SELECT id, description FROM sales_map.cities",
        department_id.map(|id| (" WHERE department_id = $1", id)),
    )
    .await
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        customer_id: i64,
        customer_name: String,
        latitude: Option<String>,
        longitude: Option<String>,
        department_id: Option<i64>,
        city_id: Option<i64>,
        sale_date: String,
        salesperson_id: Option<i64>,
        brand_id: Option<i64>,
        category_id: Option<i64>,
        presale: i16,
        quantity: i64,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let sale_date = parse_sale_timestamp(&row.sale_date)
            .with_context(|| format!("bad sale_date for customer {}", row.customer_id))?;

        upsert_point_of_sale(
            pool,
            row.customer_id,
            &row.customer_name,
            row.latitude.as_deref(),
            row.longitude.as_deref(),
            row.department_id,
            row.city_id,
        )
        .await?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO sales_map.sales
            (customer_id, sale_date, salesperson_id, brand_id, category_id, presale, quantity, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(row.customer_id)
        .bind(sale_date)
        .bind(row.salesperson_id)
        .bind(row.brand_id)
        .bind(row.category_id)
        .bind(row.presale)
        .bind(row.quantity)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
