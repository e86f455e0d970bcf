//! Docket maintenance binary.
//!
//! Configuration is loaded from the environment (a `.env` file is read
//! when present). See [`docket_db::DbConfig::from_env`] for the database
//! variables and [`docket_access::AccessConfig::from_env`] for the service
//! settings.
//!
//! Usage:
//!   docket-server migrate                        - apply the schema
//!   docket-server expired                        - list expired orders
//!   docket-server near-expiration [--days N]     - list orders expiring soon
//!   docket-server archive-expired --actor <id>   - archive every expired order

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use docket_access::{AccessConfig, LifecycleService, PermissionResolver};
use docket_core::context::RequestContext;
use docket_core::error::DocketError;
use docket_core::models::order::Order;
use docket_core::repository::DirectoryRepository;
use docket_db::repository::{
    SurrealArchiveRepository, SurrealAttachmentRepository, SurrealDepartmentGrantRepository,
    SurrealDirectoryRepository, SurrealOrderRepository, SurrealUserExceptionRepository,
    SurrealUserGrantRepository,
};
use docket_db::{DbConfig, DbError, DbManager};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "docket-server", version, about = "Docket order access maintenance")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply the database schema.
    Migrate,
    /// List non-archived orders whose expiration date has passed.
    Expired,
    /// List non-archived orders expiring within the window.
    NearExpiration {
        /// Window in days; the configured default when omitted.
        #[arg(long)]
        days: Option<u32>,
    },
    /// Archive every expired order on behalf of an administrator.
    ArchiveExpired {
        /// Directory id of the administrator running the sweep.
        #[arg(long)]
        actor: Uuid,
    },
}

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error("database connection failed: {0}")]
    Connect(#[from] surrealdb::Error),

    #[error(transparent)]
    Migration(#[from] DbError),

    #[error(transparent)]
    Docket(#[from] DocketError),
}

type Lifecycle = LifecycleService<
    SurrealOrderRepository<Client>,
    SurrealUserGrantRepository<Client>,
    SurrealDepartmentGrantRepository<Client>,
    SurrealUserExceptionRepository<Client>,
    SurrealDirectoryRepository<Client>,
    SurrealArchiveRepository<Client>,
    SurrealAttachmentRepository<Client>,
>;

fn lifecycle(db: &Surreal<Client>, config: AccessConfig) -> Lifecycle {
    let resolver = PermissionResolver::new(
        SurrealOrderRepository::new(db.clone()),
        SurrealUserGrantRepository::new(db.clone()),
        SurrealDepartmentGrantRepository::new(db.clone()),
        SurrealUserExceptionRepository::new(db.clone()),
        SurrealDirectoryRepository::new(db.clone()),
    );
    LifecycleService::new(
        resolver,
        SurrealArchiveRepository::new(db.clone()),
        SurrealAttachmentRepository::new(db.clone()),
        config,
    )
}

fn print_orders(orders: &[Order]) {
    for order in orders {
        let expires = order
            .expiration_date
            .map(|date| date.to_rfc3339())
            .unwrap_or_default();
        println!("{}\t{}\t{}\t{}", order.id, order.reference_number, expires, order.title);
    }
}

async fn run(cli: Cli) -> Result<(), ServerError> {
    let manager = DbManager::connect(&DbConfig::from_env()).await?;
    let db = manager.client();

    let service = || lifecycle(db, AccessConfig::from_env());

    match cli.command {
        Command::Migrate => {
            docket_db::run_migrations(db).await?;
            info!("Migrations applied");
        }
        Command::Expired => print_orders(&service().get_expired_orders().await?),
        Command::NearExpiration { days } => {
            print_orders(&service().get_orders_near_expiration(days).await?)
        }
        Command::ArchiveExpired { actor } => {
            let directory = SurrealDirectoryRepository::new(db.clone());
            let ctx = if directory.is_admin(actor).await? {
                RequestContext::admin(actor)
            } else {
                RequestContext::user(actor)
            };
            let archived = service().archive_expired_orders(&ctx).await?;
            println!("{archived}");
        }
    }
    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "docket_server=info,docket_access=info,docket_db=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
