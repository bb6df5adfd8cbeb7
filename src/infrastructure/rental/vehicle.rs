use async_trait::async_trait;
use eventstore::{AppendToStreamOptions, Client, EventData, ExpectedRevision, ResolvedEvent};

use crate::domain::rental::{Vehicle, VehicleEvent, VehicleId, VehicleRepository};
use crate::domain::{Aggregation, DataAccessError, Entity};
use crate::infrastructure::{from_resolved_event, stream_name, to_event_data, EventConvertError};

#[derive(Clone)]
pub struct EventStoreVehicleRepository {
    client: Client,
}

impl EventStoreVehicleRepository {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VehicleRepository for EventStoreVehicleRepository {
    async fn find_by_id(&self, id: VehicleId) -> Result<Option<Vehicle>, DataAccessError> {
        match self
            .client
            .read_stream(stream_name::<Vehicle>(id), &Default::default())
            .await
        {
            Ok(mut stream) => {
                let mut entity = Vehicle::default();
                loop {
                    match stream.next().await {
                        Ok(Some(e)) => entity.apply(VehicleEvent::try_from(&e)?),
                        Ok(_) => break,
                        Err(eventstore::Error::ResourceDeleted) => return Ok(None),
                        Err(eventstore::Error::ResourceNotFound) => return Ok(None),
                        Err(e) => return Err(e.into()),
                    }
                }
                if entity.peek().is_none() {
                    Ok(None)
                } else {
                    entity.clear();
                    Ok(Some(entity))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entity: &mut Vehicle) -> Result<bool, DataAccessError> {
        let stream_name = stream_name::<Vehicle>(entity.id());
        let rev = match entity.peek() {
            Some(VehicleEvent::VehicleRegistered { .. }) => ExpectedRevision::NoStream,
            Some(_) => ExpectedRevision::StreamExists,
            None => return Ok(false),
        };
        let events = entity
            .pop_all()
            .iter()
            .map(EventData::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        self.client
            .append_to_stream(
                &stream_name,
                &AppendToStreamOptions::default().expected_revision(rev),
                events,
            )
            .await?;
        Ok(true)
    }
}

impl TryFrom<&VehicleEvent> for EventData {
    type Error = EventConvertError;

    fn try_from(value: &VehicleEvent) -> Result<Self, Self::Error> {
        to_event_data(value)
    }
}

impl TryFrom<&ResolvedEvent> for VehicleEvent {
    type Error = EventConvertError;

    fn try_from(value: &ResolvedEvent) -> Result<Self, Self::Error> {
        from_resolved_event(value)
    }
}
