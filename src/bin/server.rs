use clap::{Parser, Subcommand};
use fleetwatch::alerting::{AlertScheduler, EvaluationService};
use fleetwatch::db::schema::ensure_schema;
use fleetwatch::db::services::endpoint_service;
use fleetwatch::notifications::NotificationService;
use fleetwatch::server::config::ServerConfig;
use fleetwatch::web::{AppState, create_axum_router};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register an endpoint and print its API token once
    RegisterEndpoint {
        #[arg(long)]
        hostname: String,
        #[arg(long)]
        machine_id: String,
    },
    /// Deactivate an endpoint so its token stops resolving
    DeactivateEndpoint {
        #[arg(long)]
        id: i32,
    },
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn connect(config: &ServerConfig) -> Result<DatabaseConnection, sea_orm::DbErr> {
    let mut opt = ConnectOptions::new(config.database_url.to_owned());
    opt.max_connections(10).sqlx_logging(false);
    let db = Database::connect(opt).await?;
    ensure_schema(&db).await?;
    Ok(db)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let server_config = ServerConfig::load(args.config.as_deref())?;
    init_logging(&server_config.log_dir);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting server.");

    let db = connect(&server_config).await?;

    match args.command {
        Some(Command::RegisterEndpoint {
            hostname,
            machine_id,
        }) => {
            let (endpoint, token) =
                endpoint_service::register_endpoint(&db, &hostname, &machine_id).await?;
            println!("endpoint_id={}", endpoint.id);
            println!("token={token}");
            return Ok(());
        }
        Some(Command::DeactivateEndpoint { id }) => {
            endpoint_service::deactivate_endpoint(&db, id).await?;
            println!("endpoint {id} deactivated");
            return Ok(());
        }
        None => {}
    }

    let scheduler = if server_config.scheduler_enabled {
        let notifier = Arc::new(NotificationService::new(
            server_config.smtp_config(),
            server_config.notify_timeout(),
        )?);
        let evaluation_service = Arc::new(EvaluationService::new(db.clone(), notifier));
        Some(AlertScheduler::start(
            evaluation_service,
            server_config.scheduler_interval(),
        ))
    } else {
        info!("Alert scheduler disabled by configuration.");
        None
    };

    let app = create_axum_router(Arc::new(AppState { db_pool: db }));
    let listener = tokio::net::TcpListener::bind(&server_config.listen_addr).await?;
    info!(addr = %server_config.listen_addr, "HTTP server listening.");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    served?;
    info!("Server stopped.");
    Ok(())
}
