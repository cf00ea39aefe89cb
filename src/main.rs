use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aggregate;
mod classify;
mod config;
mod db;
mod error;
mod map;
mod models;
mod normalize;
mod popup;
mod report;
mod sources;
mod stats;

use crate::classify::ClassificationPass;
use crate::config::DbConfig;
use crate::models::{FilterSelection, LookupOption};

#[derive(Parser)]
#[command(name = "sales-point-map")]
#[command(
    about = "Map points of sale by recency of the last sale and merchandise in transit",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct FilterArgs {
    #[arg(long)]
    category: Option<i64>,
    #[arg(long)]
    brand: Option<i64>,
    #[arg(long)]
    salesperson: Option<String>,
    #[arg(long)]
    department: Option<i64>,
    #[arg(long)]
    city: Option<i64>,
    /// Only count movements for these brand ids; with no ids, ignore all movements
    #[arg(long, num_args = 0.., value_delimiter = ',')]
    movement_brands: Option<Vec<i64>>,
}

impl From<&FilterArgs> for FilterSelection {
    fn from(args: &FilterArgs) -> Self {
        FilterSelection {
            category_id: args.category,
            brand_id: args.brand,
            salesperson_name: args
                .salesperson
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            department_id: args.department,
            city_id: args.city,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// Read reference sales from a CSV export instead of the database
    #[arg(long)]
    sales_csv: Option<PathBuf>,
    /// Movement rows to pair with --sales-csv
    #[arg(long, requires = "sales_csv")]
    movements_csv: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LookupKind {
    Categories,
    Brands,
    Salespeople,
    Departments,
    Cities,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo lookup tables, points of sale and sales
    Seed,
    /// Import sale rows from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List filter options
    Options {
        #[arg(value_enum)]
        kind: LookupKind,
        /// Narrow brands or salespeople to a category
        #[arg(long)]
        category: Option<i64>,
        /// Narrow cities to a department
        #[arg(long)]
        department: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Print shape and color counts for the selected points
    Stats {
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        json: bool,
    },
    /// Write an interactive HTML map
    Map {
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value = "map.html")]
        out: PathBuf,
    },
    /// Write the classified points as CSV
    Export {
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value = "points.csv")]
        out: PathBuf,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    DbConfig::from_env()?.connect().await
}

async fn load_pass(
    filters: &FilterArgs,
    source: &SourceArgs,
    today: NaiveDate,
) -> anyhow::Result<ClassificationPass> {
    let selection = FilterSelection::from(filters);
    let movement_brands = filters.movement_brands.as_deref();

    let (reference, movements) = match &source.sales_csv {
        Some(sales_csv) => {
            let reference = sources::filter_sales(sources::read_sales_csv(sales_csv)?, &selection);
            let movements = match &source.movements_csv {
                Some(path) => {
                    sources::filter_movements(sources::read_movements_csv(path)?, movement_brands)
                }
                None => Vec::new(),
            };
            (reference, movements)
        }
        None => {
            let pool = connect().await?;
            let reference = db::fetch_reference_sales(&pool, &selection).await?;
            let movements = db::fetch_movements(&pool, movement_brands).await?;
            (reference, movements)
        }
    };

    tracing::info!(
        reference = reference.len(),
        movements = movements.len(),
        filters = %report::describe_filters(&selection),
        "records loaded"
    );

    Ok(classify::run_pass(&reference, &movements, today))
}

fn print_options(options: &[LookupOption], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(options)?);
    } else if options.is_empty() {
        println!("No options found.");
    } else {
        for option in options {
            println!("{}\t{}", option.id, option.description);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sales_point_map=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let today = Local::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} sales from {}.", csv.display());
        }
        Commands::Options {
            kind,
            category,
            department,
            json,
        } => {
            let pool = connect().await?;
            let options = match kind {
                LookupKind::Categories => db::fetch_categories(&pool).await?,
                LookupKind::Brands => db::fetch_brands(&pool, category).await?,
                LookupKind::Salespeople => db::fetch_salespeople(&pool, category).await?,
                LookupKind::Departments => db::fetch_departments(&pool).await?,
                LookupKind::Cities => db::fetch_cities(&pool, department).await?,
            };
            print_options(&options, json)?;
        }
        Commands::Stats {
            filters,
            source,
            json,
        } => {
            let pass = load_pass(&filters, &source, today).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&pass.statistics)?);
            } else {
                print!(
                    "{}",
                    report::build_summary(&FilterSelection::from(&filters), today, &pass)
                );
            }
        }
        Commands::Map {
            filters,
            source,
            out,
        } => {
            let pass = load_pass(&filters, &source, today).await?;
            if pass.is_empty() {
                println!("No data for these filters; writing an empty map.");
            }
            let document = map::render_map_document(&pass.points, &pass.statistics)?;
            std::fs::write(&out, document)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "Map with {} points written to {}.",
                pass.points.len(),
                out.display()
            );
        }
        Commands::Export {
            filters,
            source,
            out,
        } => {
            let pass = load_pass(&filters, &source, today).await?;
            if pass.is_empty() {
                println!("No data for these filters.");
                return Ok(());
            }
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            sources::write_points_csv(file, &pass.points)?;
            println!("Exported {} points to {}.", pass.points.len(), out.display());
        }
    }

    Ok(())
}
