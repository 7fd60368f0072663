use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use ticket_inventory::client::HttpCollaborators;
use ticket_inventory::config::Config;
use ticket_inventory::handlers::{StockMessageHandler, StockOperation};
use ticket_inventory::messaging::{
    init_verbose, AmqpBroker, Router as MessageRouter, DECREMENT_STOCK_TICKET, INCREMENT_STOCK_TICKET,
};
use ticket_inventory::repository::PgInventoryStore;
use ticket_inventory::routes::{create_routes, AppState};
use ticket_inventory::rules::ZenOnlineTicketRules;
use ticket_inventory::usecase::{TicketService, TicketUsecase};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ticket_inventory=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();
    init_verbose(config.production);

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    tracing::info!("Successfully connected to database");

    sqlx::migrate!().run(&pool).await?;
    tracing::info!("Migrations run successfully");

    let rules = ZenOnlineTicketRules::from_file(&config.bre_online_ticket_path)?;
    tracing::info!(path = %config.bre_online_ticket_path, "Decision graph loaded");

    let broker = AmqpBroker::connect(&config.amqp).await?;
    let collaborators = Arc::new(HttpCollaborators::from_config(&config)?);

    let usecase: Arc<dyn TicketUsecase> = Arc::new(
        TicketService::new(
            Arc::new(PgInventoryStore::new(pool)),
            collaborators.clone(),
            Arc::new(rules),
            Arc::new(broker.clone()),
        )
        .with_online_row_policy(config.online_row_policy),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let publisher = Arc::new(broker.clone());
    let routers = [
        MessageRouter::new(
            "increment_stock_ticket_handler",
            INCREMENT_STOCK_TICKET,
            Arc::new(StockMessageHandler::new(usecase.clone(), StockOperation::Increment)),
            publisher.clone(),
        ),
        MessageRouter::new(
            "decrement_stock_ticket_handler",
            DECREMENT_STOCK_TICKET,
            Arc::new(StockMessageHandler::new(usecase.clone(), StockOperation::Decrement)),
            publisher,
        ),
    ];
    let consumers: Vec<_> = routers
        .into_iter()
        .map(|router| {
            let broker = broker.clone();
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move { broker.run(Arc::new(router), shutdown).await })
        })
        .collect();

    let app = create_routes(
        AppState {
            usecase,
            collaborators,
            auth_enabled: config.auth_enabled,
        },
        config.request_timeout,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    tracing::info!("Server running at http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    let mut server_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    for consumer in consumers {
        if let Err(e) = consumer.await {
            tracing::error!(error = %e, "Consumer task failed");
        }
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
