use std::{error::Error, sync::Arc};

use axum_server::tls_rustls::RustlsConfig;
use eventstore::ClientSettings;
use rentals::{
    domain::{
        rental::{
            BookingWorkflow, ReservationConflictChecker, ReservationRepository, RetryPolicy,
            TracingNotifier, VehicleRegistry, VehicleRepository,
        },
        IdGeneratorTask,
    },
    infrastructure::rental::{
        EventStoreReservationRepository, EventStoreVehicleRepository,
        InMemoryReservationRepository, InMemoryVehicleRepository,
    },
    RentalsConfig, StoreKind,
};
use tracing::{error, info, Level};

use crate::routes::{build_router, AppState};

mod error;
mod payload;
mod routes;

#[tokio::main]
async fn main() {
    match RentalsConfig::load() {
        Ok(config) => {
            tracing_subscriber::fmt()
                .with_max_level(Level::from(&config.logger.level))
                .init();
            if let Err(error) = serve(&config).await {
                error!("application error: {}", error);
            }
        }
        Err(error) => {
            tracing_subscriber::fmt::init();
            error!("application error: {}", error)
        }
    }
}

type Stores = (Arc<dyn ReservationRepository>, Arc<dyn VehicleRepository>);

fn stores(config: &RentalsConfig) -> Result<Stores, Box<dyn Error>> {
    Ok(match config.store.kind {
        StoreKind::Memory => (
            Arc::new(InMemoryReservationRepository::new()),
            Arc::new(InMemoryVehicleRepository::new()),
        ),
        StoreKind::EventStore => {
            let settings = config.store.eventstore_url.parse::<ClientSettings>()?;
            let client = eventstore::Client::new(settings)?;
            (
                Arc::new(EventStoreReservationRepository::new(client.clone())),
                Arc::new(EventStoreVehicleRepository::new(client)),
            )
        }
    })
}

async fn serve(config: &RentalsConfig) -> Result<(), Box<dyn Error>> {
    let (reservations, vehicles) = stores(config)?;
    let ids = IdGeneratorTask::with_node(config.id.machine_id, config.id.node_id);
    let checker = ReservationConflictChecker::new(reservations, vehicles.clone(), ids.clone());
    let workflow = BookingWorkflow::new(
        checker,
        Arc::new(TracingNotifier),
        RetryPolicy::from(&config.booking),
    );
    let app = build_router(AppState {
        workflow,
        registry: VehicleRegistry::new(vehicles, ids),
    });

    let bind = config.server.bind;
    info!(%bind, store = ?config.store.kind, "listening");
    match &config.server.tls {
        Some(tls) => {
            let rustls = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
            axum_server::bind_rustls(bind, rustls)
                .serve(app.into_make_service())
                .await?
        }
        None => {
            axum_server::bind(bind)
                .serve(app.into_make_service())
                .await?
        }
    }
    Ok(())
}
