//! One-shot bootstrap: create the first admin account so the login form has
//! someone to authenticate. Safe to re-run; an existing email is left alone.
//!
//! Usage: seed-admin <email> <name> <password>

use bridge_service::db::Database;
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::env;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Same .env loading as the service proper; only DATABASE_URL is needed.
    service_core::config::Config::load()?;
    init_tracing("seed-admin", "info");

    let args: Vec<String> = env::args().skip(1).collect();
    let [email, name, password] = args.as_slice() else {
        eprintln!("Usage: seed-admin <email> <name> <password>");
        std::process::exit(1);
    };

    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://bridge.db".to_string());
    let db = Database::connect(&database_url).await?;
    db.run_migrations().await?;

    match db.seed_admin_user(email, name, password).await? {
        Some(user) => {
            tracing::info!(user_id = %user.id, email = %user.email, "Admin account created")
        }
        None => tracing::info!(email = %email, "Account already exists, nothing to do"),
    }

    Ok(())
}
