use std::sync::Arc;

use bio::data_structures::interval_tree::IntervalTree;
use chrono::NaiveDate;
use derive_more::{Display, Error};
use tracing::{debug, info, warn};

use crate::domain::{DataAccessError, Entity, IdGeneratorClosed, IdGeneratorTask};

use super::{
    PeriodError, RentalPeriod, RenterId, Reservation, ReservationError, ReservationId,
    ReservationRepository, VehicleId, VehicleRepository,
};

/// A request to hold a vehicle for `[start, end]`. `exclude` names the
/// reservation being edited, which is then moved instead of a new one made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationRequest {
    pub vehicle_id: VehicleId,
    pub renter_id: RenterId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub exclude: Option<ReservationId>,
}

/// Admits reservations so that no two confirmed reservations of a vehicle
/// share a day.
#[derive(Clone)]
pub struct ReservationConflictChecker {
    reservations: Arc<dyn ReservationRepository>,
    vehicles: Arc<dyn VehicleRepository>,
    ids: IdGeneratorTask,
}

impl ReservationConflictChecker {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        vehicles: Arc<dyn VehicleRepository>,
        ids: IdGeneratorTask,
    ) -> Self {
        Self {
            reservations,
            vehicles,
            ids,
        }
    }

    pub async fn check_and_reserve(
        &self,
        request: ReservationRequest,
    ) -> Result<Reservation, AdmissionError> {
        let period = RentalPeriod::new(request.start, request.end)?;
        if !self.vehicles.exists(request.vehicle_id).await? {
            return Err(AdmissionError::VehicleNotFound {
                vehicle_id: request.vehicle_id,
            });
        }
        match request.exclude {
            None => self.reserve(request.vehicle_id, request.renter_id, period).await,
            Some(id) => {
                self.reschedule(request.vehicle_id, request.renter_id, id, period)
                    .await
            }
        }
    }

    pub async fn cancel(
        &self,
        vehicle_id: VehicleId,
        id: ReservationId,
    ) -> Result<Reservation, AdmissionError> {
        let ledger = self.reservations.find_by_vehicle(vehicle_id).await?;
        let mut entity = ledger
            .find(id)
            .cloned()
            .ok_or(AdmissionError::ReservationNotFound { reservation_id: id })?;
        entity.cancel()?;
        self.reservations.update(&mut entity, ledger.version).await?;
        info!(vehicle_id = %vehicle_id, reservation_id = %id, "reservation cancelled");
        Ok(entity)
    }

    pub async fn complete(
        &self,
        vehicle_id: VehicleId,
        id: ReservationId,
    ) -> Result<Reservation, AdmissionError> {
        let ledger = self.reservations.find_by_vehicle(vehicle_id).await?;
        let mut entity = ledger
            .find(id)
            .cloned()
            .ok_or(AdmissionError::ReservationNotFound { reservation_id: id })?;
        entity.complete()?;
        self.reservations.update(&mut entity, ledger.version).await?;
        info!(vehicle_id = %vehicle_id, reservation_id = %id, "reservation completed");
        Ok(entity)
    }

    /// Every reservation of the vehicle, earliest first.
    pub async fn reservations(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Vec<Reservation>, AdmissionError> {
        let mut reservations = self
            .reservations
            .find_by_vehicle(vehicle_id)
            .await?
            .reservations;
        reservations.sort_by_key(|r| (r.period().map(|p| p.start()), r.id()));
        Ok(reservations)
    }

    async fn reserve(
        &self,
        vehicle_id: VehicleId,
        renter_id: RenterId,
        period: RentalPeriod,
    ) -> Result<Reservation, AdmissionError> {
        let ledger = self
            .reservations
            .find_confirmed_by_vehicle(vehicle_id, None)
            .await?;
        ensure_available(ledger.reservations.iter(), &period)?;
        let id = self.ids.generate::<ReservationId>().await?;
        let mut entity = Reservation::confirm(id, vehicle_id, renter_id, period);
        self.reservations.insert(&mut entity, ledger.version).await?;
        info!(
            vehicle_id = %vehicle_id,
            reservation_id = %id,
            period = %period,
            "reservation confirmed"
        );
        Ok(entity)
    }

    async fn reschedule(
        &self,
        vehicle_id: VehicleId,
        renter_id: RenterId,
        id: ReservationId,
        period: RentalPeriod,
    ) -> Result<Reservation, AdmissionError> {
        let ledger = self.reservations.find_by_vehicle(vehicle_id).await?;
        // another renter's booking is reported as missing
        let mut entity = ledger
            .find(id)
            .filter(|r| r.renter_id() == renter_id)
            .cloned()
            .ok_or(AdmissionError::ReservationNotFound { reservation_id: id })?;
        entity.reschedule(period)?;
        ensure_available(ledger.confirmed().filter(|r| r.id() != id), &period)?;
        self.reservations.update(&mut entity, ledger.version).await?;
        info!(
            vehicle_id = %vehicle_id,
            reservation_id = %id,
            period = %period,
            "reservation rescheduled"
        );
        Ok(entity)
    }
}

/// Fails with the earliest confirmed reservation whose days meet `period`.
pub fn ensure_available<'a, I>(candidates: I, period: &RentalPeriod) -> Result<(), AdmissionError>
where
    I: IntoIterator<Item = &'a Reservation>,
{
    let tree = IntervalTree::from_iter(
        candidates
            .into_iter()
            .filter_map(|r| r.period().map(|p| (p.day_range(), r))),
    );
    let conflict = tree
        .find(period.day_range())
        .map(|entry| *entry.data())
        .min_by_key(|r| (r.period().map(|p| p.start()), r.id()));
    match conflict {
        Some(r) => {
            let held = r.period().unwrap_or(*period);
            warn!(
                vehicle_id = %r.vehicle_id(),
                requested = %period,
                held = %held,
                "dates unavailable"
            );
            Err(AdmissionError::ReservationConflict {
                reservation_id: r.id(),
                period: held,
            })
        }
        None => {
            debug!(requested = %period, "no overlapping reservation");
            Ok(())
        }
    }
}

#[derive(Error, Display, Debug)]
pub enum AdmissionError {
    #[display(fmt = "Start date {} is after end date {}", start, end)]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[display(fmt = "Vehicle {} does not exist", vehicle_id)]
    VehicleNotFound { vehicle_id: VehicleId },
    #[display(fmt = "Reservation {} does not exist", reservation_id)]
    ReservationNotFound { reservation_id: ReservationId },
    #[display(fmt = "Dates unavailable, already reserved for {}", period)]
    ReservationConflict {
        reservation_id: ReservationId,
        period: RentalPeriod,
    },
    #[display(fmt = "Reservations changed while booking, please try again")]
    ConcurrentModification,
    #[display(fmt = "{}", source)]
    InvalidStatusTransition { source: ReservationError },
    #[display(fmt = "{}", source)]
    IdUnavailable { source: IdGeneratorClosed },
    #[display(fmt = "{}", source)]
    DataAccess { source: DataAccessError },
}

impl AdmissionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRange { .. } => "InvalidRangeError",
            Self::VehicleNotFound { .. } => "VehicleNotFoundError",
            Self::ReservationNotFound { .. } => "ReservationNotFoundError",
            Self::ReservationConflict { .. } => "ReservationConflictError",
            Self::ConcurrentModification => "ConcurrentModificationError",
            Self::InvalidStatusTransition { .. } => "InvalidStatusTransition",
            Self::IdUnavailable { .. } | Self::DataAccess { .. } => "InternalError",
        }
    }

    /// Transient failures that are safe to retry as a fresh call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification)
    }
}

impl From<PeriodError> for AdmissionError {
    fn from(value: PeriodError) -> Self {
        match value {
            PeriodError::EndBeforeStart { start, end } => Self::InvalidRange { start, end },
        }
    }
}

impl From<ReservationError> for AdmissionError {
    fn from(value: ReservationError) -> Self {
        Self::InvalidStatusTransition { source: value }
    }
}

impl From<IdGeneratorClosed> for AdmissionError {
    fn from(value: IdGeneratorClosed) -> Self {
        Self::IdUnavailable { source: value }
    }
}

impl From<DataAccessError> for AdmissionError {
    fn from(value: DataAccessError) -> Self {
        match value {
            DataAccessError::Conflict { .. } => Self::ConcurrentModification,
            other => Self::DataAccess { source: other },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use crate::domain::rental::{ReservationStatus, Vehicle, VehicleRegistry};
    use crate::infrastructure::rental::{InMemoryReservationRepository, InMemoryVehicleRepository};

    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn request(vehicle_id: VehicleId, start: &str, end: &str) -> ReservationRequest {
        ReservationRequest {
            vehicle_id,
            renter_id: RenterId::from(100),
            start: date(start),
            end: date(end),
            exclude: None,
        }
    }

    struct Fixture {
        checker: ReservationConflictChecker,
        reservations: Arc<InMemoryReservationRepository>,
        registry: VehicleRegistry,
        vehicle: Vehicle,
    }

    async fn fixture() -> Fixture {
        let ids = IdGeneratorTask::with_node(1, 1);
        let vehicles = Arc::new(InMemoryVehicleRepository::new());
        let reservations = Arc::new(InMemoryReservationRepository::new());
        let registry = VehicleRegistry::new(vehicles.clone(), ids.clone());
        let vehicle = registry
            .register("Swift Dzire".to_owned(), "KA-05-MX-1".to_owned())
            .await
            .unwrap();
        Fixture {
            checker: ReservationConflictChecker::new(reservations.clone(), vehicles, ids),
            reservations,
            registry,
            vehicle,
        }
    }

    #[tokio::test]
    async fn test_scenario_v1() {
        let f = fixture().await;
        let v1 = f.vehicle.id();
        let booked = f
            .checker
            .check_and_reserve(request(v1, "2024-06-01", "2024-06-05"))
            .await
            .unwrap();
        assert_eq!(booked.status(), ReservationStatus::Confirmed);

        match f
            .checker
            .check_and_reserve(request(v1, "2024-06-03", "2024-06-07"))
            .await
        {
            Err(AdmissionError::ReservationConflict {
                reservation_id,
                period,
            }) => {
                assert_eq!(reservation_id, booked.id());
                assert_eq!(period.to_string(), "[2024-06-01, 2024-06-05]");
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        assert!(f
            .checker
            .check_and_reserve(request(v1, "2024-06-06", "2024-06-10"))
            .await
            .is_ok());

        let touching = f
            .checker
            .check_and_reserve(request(v1, "2024-05-25", "2024-06-01"))
            .await
            .unwrap_err();
        assert_eq!(touching.kind(), "ReservationConflictError");
    }

    #[tokio::test]
    async fn test_rejects_reversed_range() {
        let f = fixture().await;
        let err = f
            .checker
            .check_and_reserve(request(f.vehicle.id(), "2024-06-05", "2024-06-01"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidRangeError");
        assert!(f
            .reservations
            .find_by_vehicle(f.vehicle.id())
            .await
            .unwrap()
            .reservations
            .is_empty());
    }

    #[tokio::test]
    async fn test_rejects_unknown_and_retired_vehicle() {
        let f = fixture().await;
        let err = f
            .checker
            .check_and_reserve(request(VehicleId::from(404), "2024-06-01", "2024-06-02"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::VehicleNotFound { .. }));

        let v = f.vehicle.id();
        f.checker
            .check_and_reserve(request(v, "2024-06-01", "2024-06-02"))
            .await
            .unwrap();
        f.registry.retire(v).await.unwrap();
        let err = f
            .checker
            .check_and_reserve(request(v, "2024-06-10", "2024-06-12"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::VehicleNotFound { vehicle_id } if vehicle_id == v));
        // existing bookings survive retirement
        assert_eq!(f.checker.reservations(v).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_equal_range_rejected_every_time() {
        let f = fixture().await;
        let v = f.vehicle.id();
        f.checker
            .check_and_reserve(request(v, "2024-06-01", "2024-06-05"))
            .await
            .unwrap();
        for _ in 0..2 {
            let err = f
                .checker
                .check_and_reserve(request(v, "2024-06-01", "2024-06-05"))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "ReservationConflictError");
        }
        let ledger = f.reservations.find_by_vehicle(v).await.unwrap();
        assert_eq!(ledger.reservations.len(), 1);
    }

    #[tokio::test]
    async fn test_edit_excludes_itself() {
        let f = fixture().await;
        let v = f.vehicle.id();
        let booked = f
            .checker
            .check_and_reserve(request(v, "2024-06-01", "2024-06-05"))
            .await
            .unwrap();
        let moved = f
            .checker
            .check_and_reserve(ReservationRequest {
                exclude: Some(booked.id()),
                ..request(v, "2024-06-03", "2024-06-08")
            })
            .await
            .unwrap();
        assert_eq!(moved.id(), booked.id());
        assert_eq!(moved.period().unwrap().to_string(), "[2024-06-03, 2024-06-08]");
        let ledger = f.reservations.find_by_vehicle(v).await.unwrap();
        assert_eq!(ledger.reservations, vec![moved]);
    }

    #[tokio::test]
    async fn test_edit_still_checks_other_reservations() {
        let f = fixture().await;
        let v = f.vehicle.id();
        let first = f
            .checker
            .check_and_reserve(request(v, "2024-06-01", "2024-06-05"))
            .await
            .unwrap();
        let second = f
            .checker
            .check_and_reserve(request(v, "2024-06-10", "2024-06-12"))
            .await
            .unwrap();
        let err = f
            .checker
            .check_and_reserve(ReservationRequest {
                exclude: Some(second.id()),
                ..request(v, "2024-06-05", "2024-06-11")
            })
            .await
            .unwrap_err();
        match err {
            AdmissionError::ReservationConflict { reservation_id, .. } => {
                assert_eq!(reservation_id, first.id())
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        let stored = f
            .reservations
            .find_by_id(v, second.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.period().unwrap().to_string(), "[2024-06-10, 2024-06-12]");
    }

    #[tokio::test]
    async fn test_edit_of_other_renters_booking_is_not_found() {
        let f = fixture().await;
        let v = f.vehicle.id();
        let booked = f
            .checker
            .check_and_reserve(request(v, "2024-06-01", "2024-06-05"))
            .await
            .unwrap();
        let err = f
            .checker
            .check_and_reserve(ReservationRequest {
                renter_id: RenterId::from(999),
                exclude: Some(booked.id()),
                ..request(v, "2024-06-02", "2024-06-03")
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ReservationNotFoundError");
    }

    #[tokio::test]
    async fn test_cancel_frees_dates() {
        let f = fixture().await;
        let v = f.vehicle.id();
        let booked = f
            .checker
            .check_and_reserve(request(v, "2024-06-01", "2024-06-05"))
            .await
            .unwrap();
        let cancelled = f.checker.cancel(v, booked.id()).await.unwrap();
        assert_eq!(cancelled.status(), ReservationStatus::Cancelled);
        assert!(f
            .checker
            .check_and_reserve(request(v, "2024-06-01", "2024-06-05"))
            .await
            .is_ok());

        let err = f
            .checker
            .check_and_reserve(ReservationRequest {
                exclude: Some(booked.id()),
                ..request(v, "2024-08-01", "2024-08-02")
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidStatusTransition");
        assert_eq!(
            f.checker.complete(v, booked.id()).await.unwrap_err().kind(),
            "InvalidStatusTransition"
        );
    }

    #[tokio::test]
    async fn test_reservations_sorted_by_start() {
        let f = fixture().await;
        let v = f.vehicle.id();
        for (start, end) in [
            ("2024-09-01", "2024-09-02"),
            ("2024-07-01", "2024-07-02"),
            ("2024-08-01", "2024-08-02"),
        ] {
            f.checker
                .check_and_reserve(request(v, start, end))
                .await
                .unwrap();
        }
        let starts = f
            .checker
            .reservations(v)
            .await
            .unwrap()
            .iter()
            .map(|r| r.period().unwrap().start().to_string())
            .collect::<Vec<_>>();
        assert_eq!(starts, vec!["2024-07-01", "2024-08-01", "2024-09-01"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_overlapping_requests_admit_one() {
        for _ in 0..20 {
            let f = fixture().await;
            let v = f.vehicle.id();
            let a = {
                let checker = f.checker.clone();
                tokio::spawn(async move {
                    checker
                        .check_and_reserve(request(v, "2024-07-01", "2024-07-05"))
                        .await
                })
            };
            let b = {
                let checker = f.checker.clone();
                tokio::spawn(async move {
                    checker
                        .check_and_reserve(request(v, "2024-07-03", "2024-07-08"))
                        .await
                })
            };
            let results = [a.await.unwrap(), b.await.unwrap()];
            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            for err in results.iter().filter_map(|r| r.as_ref().err()) {
                assert!(matches!(
                    err,
                    AdmissionError::ReservationConflict { .. }
                        | AdmissionError::ConcurrentModification
                ));
            }
            let ledger = f.reservations.find_confirmed_by_vehicle(v, None).await.unwrap();
            assert_eq!(ledger.reservations.len(), 1);
        }
    }

    #[derive(Clone, Debug)]
    enum Op {
        Book { vehicle: usize, start: u32, len: u32 },
        Move { pick: usize, start: u32, len: u32 },
        Cancel { pick: usize },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..2usize, 0..40u32, 0..6u32)
                .prop_map(|(vehicle, start, len)| Op::Book { vehicle, start, len }),
            (any::<usize>(), 0..40u32, 0..6u32)
                .prop_map(|(pick, start, len)| Op::Move { pick, start, len }),
            any::<usize>().prop_map(|pick| Op::Cancel { pick }),
        ]
    }

    fn day(offset: u32) -> NaiveDate {
        date("2024-06-01") + chrono::Duration::days(offset as i64)
    }

    proptest! {
        #[test]
        fn prop_confirmed_reservations_never_overlap(ops in prop::collection::vec(op(), 1..40)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let ids = IdGeneratorTask::with_node(1, 1);
                let vehicles = Arc::new(InMemoryVehicleRepository::new());
                let reservations = Arc::new(InMemoryReservationRepository::new());
                let registry = VehicleRegistry::new(vehicles.clone(), ids.clone());
                let mut fleet = Vec::new();
                for n in 0..2 {
                    let vehicle = registry
                        .register(format!("car {}", n), format!("KA-{}", n))
                        .await
                        .unwrap();
                    fleet.push(vehicle.id());
                }
                let checker = ReservationConflictChecker::new(reservations.clone(), vehicles, ids);
                let mut booked: Vec<(VehicleId, ReservationId)> = Vec::new();

                for op in ops {
                    match op {
                        Op::Book { vehicle, start, len } => {
                            let v = fleet[vehicle];
                            if let Ok(r) = checker.check_and_reserve(ReservationRequest {
                                vehicle_id: v,
                                renter_id: RenterId::from(1),
                                start: day(start),
                                end: day(start + len),
                                exclude: None,
                            }).await {
                                booked.push((v, r.id()));
                            }
                        }
                        Op::Move { pick, start, len } if !booked.is_empty() => {
                            let (v, id) = booked[pick % booked.len()];
                            let _ = checker.check_and_reserve(ReservationRequest {
                                vehicle_id: v,
                                renter_id: RenterId::from(1),
                                start: day(start),
                                end: day(start + len),
                                exclude: Some(id),
                            }).await;
                        }
                        Op::Cancel { pick } if !booked.is_empty() => {
                            let (v, id) = booked[pick % booked.len()];
                            let _ = checker.cancel(v, id).await;
                        }
                        _ => {}
                    }
                }

                let mut by_vehicle: HashMap<VehicleId, Vec<RentalPeriod>> = HashMap::new();
                for v in &fleet {
                    let ledger = reservations.find_confirmed_by_vehicle(*v, None).await.unwrap();
                    by_vehicle.insert(*v, ledger.reservations.iter().filter_map(|r| r.period()).collect());
                }
                for periods in by_vehicle.values() {
                    for (i, a) in periods.iter().enumerate() {
                        for b in periods.iter().skip(i + 1) {
                            assert!(a.end() < b.start() || b.end() < a.start(), "{} overlaps {}", a, b);
                        }
                    }
                }
            });
        }
    }
}
