use async_trait::async_trait;
use derive_more::{Deref, Display, Error, From};
use serde::{Deserialize, Serialize};

use crate::domain::{Aggregation, DataAccessError, Entity, Event, EventQueue, Id, LedgerVersion};

use super::{RentalPeriod, VehicleId};

/// Reservation repository. Writes are scoped to one vehicle's ledger and only
/// succeed while the ledger is still at the version the caller read.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// All reservations of a vehicle, whatever their status.
    async fn find_by_vehicle(&self, vehicle_id: VehicleId)
        -> Result<VehicleLedger, DataAccessError>;

    /// Saves a newly confirmed reservation.
    async fn insert(
        &self,
        entity: &mut Reservation,
        expected: LedgerVersion,
    ) -> Result<bool, DataAccessError>;

    /// Saves pending changes of an existing reservation.
    async fn update(
        &self,
        entity: &mut Reservation,
        expected: LedgerVersion,
    ) -> Result<bool, DataAccessError>;

    async fn find_confirmed_by_vehicle(
        &self,
        vehicle_id: VehicleId,
        exclude: Option<ReservationId>,
    ) -> Result<VehicleLedger, DataAccessError> {
        let mut ledger = self.find_by_vehicle(vehicle_id).await?;
        ledger
            .reservations
            .retain(|r| r.is_confirmed() && Some(r.id()) != exclude);
        Ok(ledger)
    }

    async fn find_by_id(
        &self,
        vehicle_id: VehicleId,
        id: ReservationId,
    ) -> Result<Option<Reservation>, DataAccessError> {
        Ok(self.find_by_vehicle(vehicle_id).await?.find(id).cloned())
    }
}

/// Reservations of one vehicle as of `version`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VehicleLedger {
    pub vehicle_id: VehicleId,
    pub version: LedgerVersion,
    pub reservations: Vec<Reservation>,
}

impl VehicleLedger {
    pub fn new(vehicle_id: VehicleId) -> Self {
        Self {
            vehicle_id,
            ..Default::default()
        }
    }

    pub fn find(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id() == id)
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter().filter(|r| r.is_confirmed())
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Deref,
    Default,
)]
pub struct ReservationId(u64);

impl Id for ReservationId {
    type Inner = u64;
}

/// Renting user
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct RenterId(u64);

impl Id for RenterId {
    type Inner = u64;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationEvent {
    ReservationConfirmed {
        id: ReservationId,
        vehicle_id: VehicleId,
        renter_id: RenterId,
        period: RentalPeriod,
    },
    ReservationRescheduled {
        id: ReservationId,
        period: RentalPeriod,
    },
    ReservationCancelled {
        id: ReservationId,
    },
    ReservationCompleted {
        id: ReservationId,
    },
}

impl ReservationEvent {
    pub fn reservation_id(&self) -> ReservationId {
        match self {
            Self::ReservationConfirmed { id, .. }
            | Self::ReservationRescheduled { id, .. }
            | Self::ReservationCancelled { id }
            | Self::ReservationCompleted { id } => *id,
        }
    }
}

impl Event for ReservationEvent {
    type Id = ReservationId;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reservation {
    id: ReservationId,
    vehicle_id: VehicleId,
    renter_id: RenterId,
    period: Option<RentalPeriod>,
    status: ReservationStatus,
    #[serde(skip)]
    events: EventQueue<ReservationEvent>,
}

impl Reservation {
    /// Only called once the period has been checked against the vehicle's ledger.
    pub fn confirm(
        id: ReservationId,
        vehicle_id: VehicleId,
        renter_id: RenterId,
        period: RentalPeriod,
    ) -> Self {
        let mut entity = Self {
            id,
            vehicle_id,
            renter_id,
            period: Some(period),
            status: ReservationStatus::Confirmed,
            ..Default::default()
        };
        entity.events.push(ReservationEvent::ReservationConfirmed {
            id,
            vehicle_id,
            renter_id,
            period,
        });
        entity
    }

    /// Moves the reservation to new dates. Unchanged dates record nothing.
    pub fn reschedule(&mut self, period: RentalPeriod) -> Result<(), ReservationError> {
        self.validate_rescheduled()?;
        if self.period == Some(period) {
            return Ok(());
        }
        self.period = Some(period);
        self.events.push(ReservationEvent::ReservationRescheduled {
            id: self.id,
            period,
        });
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), ReservationError> {
        self.validate_status(ReservationStatus::Cancelled)?;
        self.status = ReservationStatus::Cancelled;
        self.events
            .push(ReservationEvent::ReservationCancelled { id: self.id });
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), ReservationError> {
        self.validate_status(ReservationStatus::Completed)?;
        self.status = ReservationStatus::Completed;
        self.events
            .push(ReservationEvent::ReservationCompleted { id: self.id });
        Ok(())
    }

    pub fn vehicle_id(&self) -> VehicleId {
        self.vehicle_id
    }

    pub fn renter_id(&self) -> RenterId {
        self.renter_id
    }

    pub fn period(&self) -> Option<RentalPeriod> {
        self.period
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == ReservationStatus::Confirmed && self.period.is_some()
    }

    fn validate_id(&self, id: &ReservationId) -> Result<(), ReservationError> {
        if self.id != *id {
            return Err(ReservationError::MismatchedId);
        }
        Ok(())
    }

    fn validate_rescheduled(&self) -> Result<(), ReservationError> {
        match self.status {
            ReservationStatus::Confirmed => Ok(()),
            from => Err(ReservationError::NotConfirmed { status: from }),
        }
    }

    fn validate_status(&self, to: ReservationStatus) -> Result<(), ReservationError> {
        match (self.status, to) {
            (ReservationStatus::Confirmed, ReservationStatus::Cancelled)
            | (ReservationStatus::Confirmed, ReservationStatus::Completed) => Ok(()),
            (from, to) => Err(ReservationError::InvalidStatusTransition { from, to }),
        }
    }
}

impl Entity for Reservation {
    type Id = ReservationId;

    const ENTITY_NAME: &'static str = "reservation";

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Aggregation for Reservation {
    type Event = ReservationEvent;
    type Error = ReservationError;

    fn validate(&self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            ReservationEvent::ReservationConfirmed { .. } => Ok(()),
            ReservationEvent::ReservationRescheduled { id, .. } => {
                self.validate_id(id)?;
                self.validate_rescheduled()
            }
            ReservationEvent::ReservationCancelled { id } => {
                self.validate_id(id)?;
                self.validate_status(ReservationStatus::Cancelled)
            }
            ReservationEvent::ReservationCompleted { id } => {
                self.validate_id(id)?;
                self.validate_status(ReservationStatus::Completed)
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            ReservationEvent::ReservationConfirmed {
                id,
                vehicle_id,
                renter_id,
                period,
            } => {
                if self.id != id || self.period.is_none() {
                    *self = Self::confirm(id, vehicle_id, renter_id, period);
                }
            }
            ReservationEvent::ReservationRescheduled { id, period } => {
                if self.id == id {
                    if let Err(_e) = self.reschedule(period) {}
                }
            }
            ReservationEvent::ReservationCancelled { id } => {
                if self.id == id {
                    if let Err(_e) = self.cancel() {}
                }
            }
            ReservationEvent::ReservationCompleted { id } => {
                if self.id == id {
                    if let Err(_e) = self.complete() {}
                }
            }
        }
    }

    fn events(&self) -> &EventQueue<Self::Event> {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventQueue<Self::Event> {
        &mut self.events
    }
}

impl PartialEq for Reservation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.vehicle_id == other.vehicle_id
            && self.renter_id == other.renter_id
            && self.period == other.period
            && self.status == other.status
    }
}

impl Eq for Reservation {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
pub enum ReservationStatus {
    #[default]
    Confirmed,
    Cancelled,
    Completed,
}

#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum ReservationError {
    #[display(fmt = "ID does not match")]
    MismatchedId,
    #[display(fmt = "Only confirmed reservations can be rescheduled, this one is {}", status)]
    NotConfirmed { status: ReservationStatus },
    #[display(fmt = "Reservation cannot move from {} to {}", from, to)]
    InvalidStatusTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
}
