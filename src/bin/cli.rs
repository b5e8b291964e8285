use sqlx::Row;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use escuela_authz::authz::{expand, Grant, PermissionCatalog};
use escuela_authz::db::accounts::{self, NewUser};
use escuela_authz::{docs, utils};

#[derive(Parser, Debug)]
#[command(author, version, about = "escuela-authz admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Print an argon2 hash for a password
    HashPassword { password: String },
    /// Expand a raw grant (JSON) against the permission catalog
    Expand { grant: String },
    /// Print the permission catalog
    Catalog,
    /// Create an account with the given role
    CreateUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "Docente")]
        role: String,
    },
    /// Write the OpenAPI document to a file
    DumpOpenapi {
        #[arg(default_value = "openapi.json")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; when running in Docker the binary CWD may differ,
    // so fall back to the crate-local `.env` using CARGO_MANIFEST_DIR.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::HashPassword { password } => {
            println!("{}", utils::hash_password(&password)?);
        }
        Commands::Expand { grant } => {
            let grant = Grant::from_json(Some(&grant))?;
            let expansion = expand(PermissionCatalog::global(), &grant);
            println!("{}", serde_json::to_string_pretty(&expansion.permissions)?);
            for dropped in &expansion.dropped {
                eprintln!("dropped: {dropped}");
            }
        }
        Commands::Catalog => {
            println!("{}", serde_json::to_string_pretty(PermissionCatalog::global())?);
        }
        Commands::CreateUser {
            name,
            email,
            password,
            role,
        } => {
            let pool = get_pool().await?;
            let role_id = accounts::find_role_id_by_name(&pool, &role)
                .await?
                .with_context(|| format!("unknown role {role}"))?;
            let password_hash = utils::hash_password(&password)?;
            let email = utils::normalize_identifier(&email);

            let user_id = accounts::insert_user(
                &pool,
                &NewUser {
                    name: &name,
                    email: &email,
                    password_hash: &password_hash,
                    role_id: Some(role_id),
                    active: true,
                    must_change_password: true,
                    ..Default::default()
                },
            )
            .await
            .context("failed to create user")?;
            println!("Created user {user_id} ({email}) with role {role}");
        }
        Commands::DumpOpenapi { path } => {
            let doc = docs::build_openapi(8000)?;
            fs::write(&path, serde_json::to_string_pretty(&doc)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("wrote {}", path.display());
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let db_applied: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;
    let applied_versions: HashSet<i64> = if db_applied.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let version = migration.version;
        let status = if applied_versions.contains(&version) { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, version, name);
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Prefer ./migrations when run from the repo root, else the crate-local folder.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
