use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use rentals::domain::rental::{BookingWorkflow, ReservationRequest, VehicleRegistry};

use crate::error::ApiError;
use crate::payload::{
    AdmissionResponse, BookRequest, RegisterVehicleRequest, RescheduleRequest, ReservationView,
    VehicleView,
};

#[derive(Clone)]
pub struct AppState {
    pub workflow: BookingWorkflow,
    pub registry: VehicleRegistry,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/vehicles", post(register_vehicle))
        .route("/vehicles/:vehicle_id", delete(retire_vehicle))
        .route(
            "/vehicles/:vehicle_id/reservations",
            get(list_reservations).post(book),
        )
        .route(
            "/vehicles/:vehicle_id/reservations/:reservation_id",
            put(reschedule),
        )
        .route(
            "/vehicles/:vehicle_id/reservations/:reservation_id/cancel",
            post(cancel),
        )
        .route(
            "/vehicles/:vehicle_id/reservations/:reservation_id/complete",
            post(complete),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn register_vehicle(
    State(state): State<AppState>,
    payload: Result<Json<RegisterVehicleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<VehicleView>), ApiError> {
    let Json(body) = payload?;
    let vehicle = state.registry.register(body.name, body.plate).await?;
    Ok((StatusCode::CREATED, Json(VehicleView::from(&vehicle))))
}

async fn retire_vehicle(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(vehicle_id) = path?;
    state.registry.retire(vehicle_id.into()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Availability view. Unknown vehicles simply have no reservations.
async fn list_reservations(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
) -> Result<Json<Vec<ReservationView>>, ApiError> {
    let Path(vehicle_id) = path?;
    let reservations = state
        .workflow
        .checker()
        .reservations(vehicle_id.into())
        .await?;
    Ok(Json(reservations.iter().map(ReservationView::from).collect()))
}

async fn book(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
    payload: Result<Json<BookRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AdmissionResponse>), ApiError> {
    let Path(vehicle_id) = path?;
    let Json(body) = payload?;
    let request = ReservationRequest {
        vehicle_id: vehicle_id.into(),
        renter_id: body.renter_id.into(),
        start: body.start_date,
        end: body.end_date,
        exclude: None,
    };
    match body.exclude_reservation_id {
        None => {
            let reservation = state.workflow.book(request).await?;
            Ok((
                StatusCode::CREATED,
                Json(AdmissionResponse::from(&reservation)),
            ))
        }
        Some(id) => {
            let reservation = state.workflow.reschedule(id.into(), request).await?;
            Ok((StatusCode::OK, Json(AdmissionResponse::from(&reservation))))
        }
    }
}

async fn reschedule(
    State(state): State<AppState>,
    path: Result<Path<(u64, u64)>, PathRejection>,
    payload: Result<Json<RescheduleRequest>, JsonRejection>,
) -> Result<Json<AdmissionResponse>, ApiError> {
    let Path((vehicle_id, reservation_id)) = path?;
    let Json(body) = payload?;
    let request = ReservationRequest {
        vehicle_id: vehicle_id.into(),
        renter_id: body.renter_id.into(),
        start: body.start_date,
        end: body.end_date,
        exclude: None,
    };
    let reservation = state
        .workflow
        .reschedule(reservation_id.into(), request)
        .await?;
    Ok(Json(AdmissionResponse::from(&reservation)))
}

async fn cancel(
    State(state): State<AppState>,
    path: Result<Path<(u64, u64)>, PathRejection>,
) -> Result<Json<ReservationView>, ApiError> {
    let Path((vehicle_id, reservation_id)) = path?;
    let reservation = state
        .workflow
        .cancel(vehicle_id.into(), reservation_id.into())
        .await?;
    Ok(Json(ReservationView::from(&reservation)))
}

async fn complete(
    State(state): State<AppState>,
    path: Result<Path<(u64, u64)>, PathRejection>,
) -> Result<Json<ReservationView>, ApiError> {
    let Path((vehicle_id, reservation_id)) = path?;
    let reservation = state
        .workflow
        .complete(vehicle_id.into(), reservation_id.into())
        .await?;
    Ok(Json(ReservationView::from(&reservation)))
}
