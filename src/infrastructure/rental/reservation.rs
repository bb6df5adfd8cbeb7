use std::collections::BTreeMap;

use async_trait::async_trait;
use eventstore::{AppendToStreamOptions, Client, EventData, ExpectedRevision, ResolvedEvent};
use tracing::warn;

use crate::domain::rental::{
    Reservation, ReservationEvent, ReservationId, ReservationRepository, VehicleId, VehicleLedger,
};
use crate::domain::{Aggregation, DataAccessError, Entity, LedgerVersion};
use crate::infrastructure::{
    from_resolved_event, to_event_data, EventConvertError, LedgerWriteError,
};

const LEDGER_PREFIX: &str = "vehicle_reservations";

/// Stream holding every reservation event of one vehicle. Appends are
/// conditional on the stream revision, so two writers that read the same
/// revision cannot both commit.
pub fn ledger_stream_name(vehicle_id: VehicleId) -> String {
    format!("{}-{}", LEDGER_PREFIX, vehicle_id)
}

#[derive(Clone)]
pub struct EventStoreReservationRepository {
    client: Client,
}

impl EventStoreReservationRepository {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn append(
        &self,
        entity: &mut Reservation,
        expected: LedgerVersion,
    ) -> Result<bool, DataAccessError> {
        if entity.peek().is_none() {
            return Ok(false);
        }
        let rev = match expected.revision() {
            Some(rev) => ExpectedRevision::Exact(rev),
            None => ExpectedRevision::NoStream,
        };
        let events = entity
            .pop_all()
            .iter()
            .map(EventData::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        match self
            .client
            .append_to_stream(
                ledger_stream_name(entity.vehicle_id()),
                &AppendToStreamOptions::default().expected_revision(rev),
                events,
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(eventstore::Error::WrongExpectedVersion { .. }) => {
                warn!(
                    vehicle_id = %entity.vehicle_id(),
                    expected = %expected,
                    "reservation ledger moved on"
                );
                Err(DataAccessError::Conflict { expected })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ReservationRepository for EventStoreReservationRepository {
    async fn find_by_vehicle(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<VehicleLedger, DataAccessError> {
        let mut ledger = VehicleLedger::new(vehicle_id);
        let mut entities: BTreeMap<ReservationId, Reservation> = BTreeMap::new();
        match self
            .client
            .read_stream(ledger_stream_name(vehicle_id), &Default::default())
            .await
        {
            Ok(mut stream) => loop {
                match stream.next().await {
                    Ok(Some(e)) => {
                        let event = ReservationEvent::try_from(&e)?;
                        entities
                            .entry(event.reservation_id())
                            .or_default()
                            .apply(event);
                        ledger.version = LedgerVersion::at(e.get_original_event().revision);
                    }
                    Ok(_) => break,
                    Err(eventstore::Error::ResourceNotFound) => break,
                    Err(e) => return Err(e.into()),
                }
            },
            Err(eventstore::Error::ResourceNotFound) => {}
            Err(e) => return Err(e.into()),
        }
        ledger.reservations = entities
            .into_values()
            .filter(|r| r.peek().is_some())
            .map(|mut r| {
                r.clear();
                r
            })
            .collect();
        Ok(ledger)
    }

    async fn insert(
        &self,
        entity: &mut Reservation,
        expected: LedgerVersion,
    ) -> Result<bool, DataAccessError> {
        match entity.peek() {
            Some(ReservationEvent::ReservationConfirmed { .. }) => {
                self.append(entity, expected).await
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
        if let Some(ReservationEvent::ReservationConfirmed { .. }) = entity.peek() {
            return Err(LedgerWriteError::NotStored {
                reservation_id: *entity.id(),
            }
            .into());
        }
        self.append(entity, expected).await
    }
}

impl TryFrom<&ReservationEvent> for EventData {
    type Error = EventConvertError;

    fn try_from(value: &ReservationEvent) -> Result<Self, Self::Error> {
        to_event_data(value)
    }
}

impl TryFrom<&ResolvedEvent> for ReservationEvent {
    type Error = EventConvertError;

    fn try_from(value: &ResolvedEvent) -> Result<Self, Self::Error> {
        from_resolved_event(value)
    }
}
