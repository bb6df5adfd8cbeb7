use chrono::NaiveDate;
use rentals::domain::rental::{RentalPeriod, Reservation, ReservationStatus, Vehicle};
use rentals::domain::Entity;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

// Ids leave the service as strings so snowflake values survive JavaScript
// clients. Numbers are still accepted on the way in.

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRequest {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub renter_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    pub exclude_reservation_id: Option<u64>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleRequest {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub renter_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct RegisterVehicleRequest {
    pub name: String,
    pub plate: String,
}

#[serde_as]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    #[serde_as(as = "DisplayFromStr")]
    pub reservation_id: u64,
    pub status: ReservationStatus,
}

impl From<&Reservation> for AdmissionResponse {
    fn from(value: &Reservation) -> Self {
        Self {
            reservation_id: *value.id(),
            status: value.status(),
        }
    }
}

#[serde_as]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationView {
    #[serde_as(as = "DisplayFromStr")]
    pub reservation_id: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub vehicle_id: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub renter_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub status: ReservationStatus,
}

impl From<&Reservation> for ReservationView {
    fn from(value: &Reservation) -> Self {
        let period = value.period();
        Self {
            reservation_id: *value.id(),
            vehicle_id: *value.vehicle_id(),
            renter_id: *value.renter_id(),
            start_date: period.map(|p| p.start()),
            end_date: period.map(|p| p.end()),
            status: value.status(),
        }
    }
}

#[serde_as]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleView {
    #[serde_as(as = "DisplayFromStr")]
    pub vehicle_id: u64,
    pub name: String,
    pub plate: String,
    pub retired: bool,
}

impl From<&Vehicle> for VehicleView {
    fn from(value: &Vehicle) -> Self {
        Self {
            vehicle_id: *value.id(),
            name: value.name().to_owned(),
            plate: value.plate().to_owned(),
            retired: value.retired(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl From<&RentalPeriod> for DateRange {
    fn from(value: &RentalPeriod) -> Self {
        Self {
            start_date: value.start(),
            end_date: value.end(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicting_range: Option<DateRange>,
}
