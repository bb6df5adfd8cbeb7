pub mod rental;

use derive_more::{Display, Error};
use eventstore::{EventData, ResolvedEvent};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::{DataAccessError, Entity, Event};

impl From<eventstore::Error> for DataAccessError {
    #[allow(unreachable_patterns)]
    fn from(value: eventstore::Error) -> Self {
        match value {
            eventstore::Error::ConnectionClosed
            | eventstore::Error::Grpc { .. }
            | eventstore::Error::GrpcConnectionError(_)
            | eventstore::Error::DeadlineExceeded
            | eventstore::Error::InitializationError(_) => Self::ConnectionError(Box::new(value)),
            eventstore::Error::ServerError(_)
            | eventstore::Error::NotLeaderException(_)
            | eventstore::Error::AccessDenied
            | eventstore::Error::UnsupportedFeature
            | eventstore::Error::InternalParsingError(_)
            | eventstore::Error::InternalClientError => Self::QueryError(Box::new(value)),
            eventstore::Error::ResourceNotFound | eventstore::Error::ResourceDeleted => {
                Self::ReadError(Box::new(value))
            }
            eventstore::Error::ResourceAlreadyExists
            | eventstore::Error::WrongExpectedVersion { .. } => Self::WriteError(Box::new(value)),
            eventstore::Error::IllegalStateError(_) => Self::ClientSideError(Box::new(value)),
            _ => Self::QueryError(Box::new(value)),
        }
    }
}

impl From<EventConvertError> for DataAccessError {
    fn from(value: EventConvertError) -> Self {
        DataAccessError::ClientSideError(Box::new(value))
    }
}

#[derive(Error, Display, Debug)]
#[display(fmt = "Failed to convert event")]
pub struct EventConvertError;

impl From<serde_json::Error> for EventConvertError {
    fn from(_value: serde_json::Error) -> Self {
        EventConvertError
    }
}

/// Writes a repository refused before touching storage.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum LedgerWriteError {
    #[display(fmt = "Reservation {} is not new", reservation_id)]
    NotNew { reservation_id: u64 },
    #[display(fmt = "Reservation {} is not stored", reservation_id)]
    NotStored { reservation_id: u64 },
}

impl From<LedgerWriteError> for DataAccessError {
    fn from(value: LedgerWriteError) -> Self {
        DataAccessError::ClientSideError(Box::new(value))
    }
}

pub(crate) fn stream_name<E: Entity>(id: E::Id) -> String {
    E::ENTITY_NAME.to_owned() + "-" + &id.to_string()
}

/// `{"Variant": {..fields}}` becomes an event of type `Variant` with the fields as data.
pub(crate) fn to_event_data<E: Event>(event: &E) -> Result<EventData, EventConvertError> {
    let root = serde_json::to_value(event)?;
    let (event_type, data) = root
        .as_object()
        .and_then(|o| o.iter().next())
        .ok_or(EventConvertError)?;
    Ok(EventData::json(event_type, data)?.id(Uuid::new_v4()))
}

pub(crate) fn from_resolved_event<E: Event>(value: &ResolvedEvent) -> Result<E, EventConvertError> {
    let event = value.get_original_event();
    let data: Value = serde_json::from_slice(event.data.as_ref())?;
    let json = json!({ &event.event_type: data });
    Ok(serde_json::from_value(json)?)
}
