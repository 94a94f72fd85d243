//! Load sample users and slots into the configured database
//!
//! Usage: booker-seed [--reset]
//!
//! `--reset` deletes every slot, session and user first.

use anyhow::{bail, Result};
use chrono::Utc;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use booker::{config::Config, db, services::seed};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "booker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut reset = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--reset" => reset = true,
            "-h" | "--help" => {
                println!("Usage: booker-seed [--reset]");
                return Ok(());
            }
            other => bail!("Unknown argument: {}", other),
        }
    }

    let config = Config::load_with_env(Path::new("config.yml"))?;
    let pool = db::create_pool(&config.database).await?;
    db::migrations::run_migrations(&pool).await?;

    if reset {
        seed::reset(&pool).await?;
    }

    let now = Utc::now();
    seed::purge_expired_sessions(&pool, now).await?;
    let report = seed::fill_with_sample_data(&pool, now).await?;

    println!(
        "Created {} users ({} already present) and {} slots",
        report.users_created, report.users_skipped, report.slots_created
    );

    pool.close().await;
    Ok(())
}
