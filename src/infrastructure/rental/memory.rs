use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use crate::domain::rental::{
    Reservation, ReservationEvent, ReservationId, ReservationRepository, Vehicle, VehicleEvent,
    VehicleId, VehicleLedger, VehicleRepository,
};
use crate::domain::{Aggregation, DataAccessError, Entity, LedgerVersion};
use crate::infrastructure::LedgerWriteError;

#[derive(Debug, Default)]
struct MemoryLedger {
    version: LedgerVersion,
    reservations: BTreeMap<ReservationId, Reservation>,
}

/// Process-local reservation store. The version check and the write happen
/// under one lock, which gives the same guarantee as a conditional append.
#[derive(Debug, Default)]
pub struct InMemoryReservationRepository {
    ledgers: RwLock<HashMap<VehicleId, MemoryLedger>>,
}

impl InMemoryReservationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn commit(
        &self,
        entity: &mut Reservation,
        expected: LedgerVersion,
        is_new: bool,
    ) -> Result<bool, DataAccessError> {
        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers.entry(entity.vehicle_id()).or_default();
        if ledger.version != expected {
            warn!(
                vehicle_id = %entity.vehicle_id(),
                expected = %expected,
                actual = %ledger.version,
                "reservation ledger moved on"
            );
            return Err(DataAccessError::Conflict { expected });
        }
        if is_new == ledger.reservations.contains_key(&entity.id()) {
            let reservation_id = *entity.id();
            return Err(match is_new {
                true => LedgerWriteError::NotNew { reservation_id },
                false => LedgerWriteError::NotStored { reservation_id },
            }
            .into());
        }
        let events = entity.pop_all();
        if events.is_empty() {
            return Ok(false);
        }
        for _ in &events {
            ledger.version = ledger.version.next();
        }
        ledger.reservations.insert(entity.id(), entity.clone());
        Ok(true)
    }
}

#[async_trait]
impl ReservationRepository for InMemoryReservationRepository {
    async fn find_by_vehicle(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<VehicleLedger, DataAccessError> {
        let ledgers = self.ledgers.read().await;
        Ok(match ledgers.get(&vehicle_id) {
            Some(ledger) => VehicleLedger {
                vehicle_id,
                version: ledger.version,
                reservations: ledger.reservations.values().cloned().collect(),
            },
            None => VehicleLedger::new(vehicle_id),
        })
    }

    async fn insert(
        &self,
        entity: &mut Reservation,
        expected: LedgerVersion,
    ) -> Result<bool, DataAccessError> {
        match entity.peek() {
            Some(ReservationEvent::ReservationConfirmed { .. }) => {
                self.commit(entity, expected, true).await
            }
            _ => Err(LedgerWriteError::NotNew {
                reservation_id: *entity.id(),
            }
            .into()),
        }
    }

    async fn update(
        &self,
        entity: &mut Reservation,
        expected: LedgerVersion,
    ) -> Result<bool, DataAccessError> {
        self.commit(entity, expected, false).await
    }
}

#[derive(Debug, Default)]
pub struct InMemoryVehicleRepository {
    vehicles: RwLock<HashMap<VehicleId, Vehicle>>,
}

impl InMemoryVehicleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VehicleRepository for InMemoryVehicleRepository {
    async fn find_by_id(&self, id: VehicleId) -> Result<Option<Vehicle>, DataAccessError> {
        Ok(self.vehicles.read().await.get(&id).cloned())
    }

    async fn save(&self, entity: &mut Vehicle) -> Result<bool, DataAccessError> {
        let mut vehicles = self.vehicles.write().await;
        let exists = vehicles.contains_key(&entity.id());
        match (entity.peek(), exists) {
            (None, _) => return Ok(false),
            (Some(VehicleEvent::VehicleRegistered { .. }), true) => {
                return Err(DataAccessError::Conflict {
                    expected: LedgerVersion::EMPTY,
                })
            }
            _ => {}
        }
        entity.clear();
        vehicles.insert(entity.id(), entity.clone());
        Ok(true)
    }
}
