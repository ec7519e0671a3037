//! # Seed Data Generator
//!
//! Populates the database with a tool catalogue and a handful of customers
//! for development.
//!
//! ## Usage
//! ```bash
//! # Seed 20 customers (default) and the full catalogue
//! cargo run -p toolrent-db --bin seed
//!
//! # Custom customer count
//! cargo run -p toolrent-db --bin seed -- --count 100
//!
//! # Specify database path (or set TOOLRENT_DB_PATH)
//! cargo run -p toolrent-db --bin seed -- --db ./data/toolrent.db
//! ```
//!
//! ## Generated Data
//! - One Available bucket per catalogue tool, 1-6 units each, received
//!   through the inventory engine so every unit has a `Receipt` entry
//! - A few units of each category moved to InRepair
//! - Customers with RUT-shaped ids `{n}.{n}.{n}-{k}`
//! - The daily rate setting

use std::env;
use toolrent_core::{NewCustomer, ReceiveTool, ToolState, SYSTEM_ACTOR};
use toolrent_db::config::DB_PATH_VAR;
use toolrent_db::{init_tracing, Database, DbConfig, LendingConfig};

/// Catalogue: (category, [(name, replacement value)])
const CATALOGUE: &[(&str, &[(&str, i64)])] = &[
    (
        "Electric",
        &[
            ("Hammer Drill", 85_000),
            ("Angle Grinder", 60_000),
            ("Circular Saw", 95_000),
            ("Jigsaw", 55_000),
            ("Orbital Sander", 45_000),
            ("Heat Gun", 30_000),
        ],
    ),
    (
        "Garden",
        &[
            ("Lawn Mower", 180_000),
            ("Hedge Trimmer", 70_000),
            ("Leaf Blower", 65_000),
            ("Chainsaw", 150_000),
        ],
    ),
    (
        "Construction",
        &[
            ("Concrete Mixer", 320_000),
            ("Demolition Hammer", 240_000),
            ("Plate Compactor", 410_000),
            ("Tile Cutter", 90_000),
        ],
    ),
    (
        "Hand",
        &[
            ("Pipe Wrench", 18_000),
            ("Bolt Cutter", 25_000),
            ("Ladder 6m", 75_000),
        ],
    ),
];

const FIRST_NAMES: &[&str] = &[
    "Ana", "Bruno", "Carla", "Diego", "Elena", "Felipe", "Gabriela", "Hugo", "Isabel", "Javier",
];

const LAST_NAMES: &[&str] = &["Rojas", "Muñoz", "Soto", "Contreras", "Silva", "Morales"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 20;
    let mut db_path = DbConfig::from_env().database_path.display().to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("ToolRent Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of customers to create (default: 20)");
                println!("  -d, --db <PATH>    Database file path (default: ${} or ./toolrent.db)", DB_PATH_VAR);
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = LendingConfig::from_env()?;

    println!("ToolRent Seed Data Generator");
    println!("============================");
    println!("Database:  {}", db_path);
    println!("Customers: {}", count);
    println!("Rate/day:  {}", config.default_daily_rate);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.kardex().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} kardex entries", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let inventory = db.inventory();
    let lending = db.lending(config.clone());
    lending.set_daily_rate(config.default_daily_rate).await?;

    // Tools
    println!();
    println!("Receiving tools...");
    let start = std::time::Instant::now();
    let mut units = 0;

    for (category_idx, (category, tools)) in CATALOGUE.iter().enumerate() {
        for (tool_idx, (name, replacement_value)) in tools.iter().enumerate() {
            let quantity = 1 + ((category_idx * 7 + tool_idx * 3) % 6) as i64;

            let bucket = inventory
                .receive(
                    &ReceiveTool {
                        name: name.to_string(),
                        category: category.to_string(),
                        state: ToolState::Available.to_string(),
                        replacement_value: *replacement_value,
                        quantity,
                    },
                    SYSTEM_ACTOR,
                )
                .await?;
            units += quantity;

            // Every third tool with spare stock has one unit in the shop.
            if tool_idx % 3 == 0 && bucket.quantity > 1 {
                inventory
                    .transition(&bucket.id, ToolState::InRepair, SYSTEM_ACTOR)
                    .await?;
            }
        }
    }
    println!("✓ Received {} units in {:?}", units, start.elapsed());

    // Customers
    println!();
    println!("Registering customers...");
    let mut registered = 0;

    for n in 0..count {
        let first = FIRST_NAMES[n % FIRST_NAMES.len()];
        let last = LAST_NAMES[(n / FIRST_NAMES.len()) % LAST_NAMES.len()];
        let customer = NewCustomer {
            rut: fake_rut(n),
            name: format!("{} {}", first, last),
            email: Some(format!("{}.{}{}@example.com", first, last, n).to_lowercase()),
        };

        if let Err(e) = lending.register_customer(&customer).await {
            eprintln!("Failed to register {}: {}", customer.rut, e);
            continue;
        }
        registered += 1;
    }
    println!("✓ Registered {} customers", registered);

    println!();
    for state in ToolState::ALL {
        let buckets = inventory.list_in_stock(state).await?;
        let total: i64 = buckets.iter().map(|b| b.quantity).sum();
        println!("  {:<15} {:>3} buckets, {:>4} units", state, buckets.len(), total);
    }

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// RUT-shaped id; the check digit is not a real modulo-11 digit.
fn fake_rut(n: usize) -> String {
    let body = 10_000_000 + n * 137_911;
    format!(
        "{}.{:03}.{:03}-{}",
        body / 1_000_000,
        (body / 1_000) % 1_000,
        body % 1_000,
        n % 10
    )
}
