use std::sync::Arc;

use async_trait::async_trait;
use derive_more::{Deref, Display, Error, From};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{
    Aggregation, DataAccessError, Entity, Event, EventQueue, Id, IdGeneratorClosed,
    IdGeneratorTask,
};

/// Vehicle repository
#[async_trait]
pub trait VehicleRepository: Send + Sync {
    async fn find_by_id(&self, id: VehicleId) -> Result<Option<Vehicle>, DataAccessError>;
    async fn save(&self, entity: &mut Vehicle) -> Result<bool, DataAccessError>;

    /// Registered and not retired.
    async fn exists(&self, id: VehicleId) -> Result<bool, DataAccessError> {
        Ok(self
            .find_by_id(id)
            .await?
            .map_or(false, |vehicle| !vehicle.retired()))
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct VehicleId(u64);

impl Id for VehicleId {
    type Inner = u64;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleEvent {
    VehicleRegistered {
        id: VehicleId,
        name: String,
        plate: String,
    },
    VehicleRetired {
        id: VehicleId,
    },
}

impl Event for VehicleEvent {
    type Id = VehicleId;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    id: VehicleId,
    name: String,
    plate: String,
    retired: bool,
    #[serde(skip)]
    events: EventQueue<VehicleEvent>,
}

impl Vehicle {
    pub fn register(id: VehicleId, name: String, plate: String) -> Result<Self, VehicleError> {
        Self::validate_registered(&name, &plate)?;
        let mut entity = Vehicle {
            id,
            name: name.clone(),
            plate: plate.clone(),
            ..Default::default()
        };
        entity
            .events
            .push(VehicleEvent::VehicleRegistered { id, name, plate });
        Ok(entity)
    }

    pub fn retire(&mut self) -> Result<(), VehicleError> {
        self.validate_retired()?;
        self.retired = true;
        self.events.push(VehicleEvent::VehicleRetired { id: self.id });
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plate(&self) -> &str {
        &self.plate
    }

    pub fn retired(&self) -> bool {
        self.retired
    }

    fn validate_id(&self, id: &VehicleId) -> Result<(), VehicleError> {
        match self.id == *id {
            true => Ok(()),
            false => Err(VehicleError::MismatchedId),
        }
    }

    fn validate_registered(name: &str, plate: &str) -> Result<(), VehicleError> {
        if name.trim().is_empty() {
            return Err(VehicleError::NameIsBlank);
        }
        if plate.trim().is_empty() {
            return Err(VehicleError::PlateIsBlank);
        }
        Ok(())
    }

    fn validate_retired(&self) -> Result<(), VehicleError> {
        match self.retired {
            true => Err(VehicleError::AlreadyRetired),
            false => Ok(()),
        }
    }
}

impl Entity for Vehicle {
    type Id = VehicleId;

    const ENTITY_NAME: &'static str = "vehicle";

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Aggregation for Vehicle {
    type Event = VehicleEvent;
    type Error = VehicleError;

    fn validate(&self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            VehicleEvent::VehicleRegistered { name, plate, .. } => {
                Self::validate_registered(name, plate)
            }
            VehicleEvent::VehicleRetired { id } => {
                self.validate_id(id)?;
                self.validate_retired()
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            VehicleEvent::VehicleRegistered { id, name, plate } => {
                if self.id != id {
                    if let Ok(entity) = Self::register(id, name, plate) {
                        *self = entity;
                    }
                }
            }
            VehicleEvent::VehicleRetired { id } => {
                if self.id == id {
                    if let Err(_e) = self.retire() {}
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

impl PartialEq for Vehicle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.plate == other.plate
            && self.retired == other.retired
    }
}

impl Eq for Vehicle {}

#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum VehicleError {
    #[display(fmt = "ID does not match")]
    MismatchedId,
    #[display(fmt = "Name cannot be blank")]
    NameIsBlank,
    #[display(fmt = "Plate cannot be blank")]
    PlateIsBlank,
    #[display(fmt = "Vehicle is already retired")]
    AlreadyRetired,
}

/// Admin side of the fleet: registering and retiring vehicles.
#[derive(Clone)]
pub struct VehicleRegistry {
    vehicles: Arc<dyn VehicleRepository>,
    ids: IdGeneratorTask,
}

impl VehicleRegistry {
    pub fn new(vehicles: Arc<dyn VehicleRepository>, ids: IdGeneratorTask) -> Self {
        Self { vehicles, ids }
    }

    pub async fn register(&self, name: String, plate: String) -> Result<Vehicle, RegistryError> {
        let id = self.ids.generate::<VehicleId>().await?;
        let mut entity = Vehicle::register(id, name, plate)?;
        self.vehicles.save(&mut entity).await?;
        info!(vehicle_id = %id, plate = entity.plate(), "vehicle registered");
        Ok(entity)
    }

    pub async fn retire(&self, id: VehicleId) -> Result<Vehicle, RegistryError> {
        let mut entity = self
            .vehicles
            .find_by_id(id)
            .await?
            .ok_or(RegistryError::VehicleNotFound { vehicle_id: id })?;
        entity.retire()?;
        self.vehicles.save(&mut entity).await?;
        info!(vehicle_id = %id, "vehicle retired");
        Ok(entity)
    }
}

#[derive(Error, Display, Debug, From)]
pub enum RegistryError {
    #[display(fmt = "Vehicle {} does not exist", vehicle_id)]
    #[from(ignore)]
    VehicleNotFound { vehicle_id: VehicleId },
    #[display(fmt = "{}", _0)]
    Vehicle(#[error(source)] VehicleError),
    #[display(fmt = "{}", _0)]
    IdUnavailable(#[error(source)] IdGeneratorClosed),
    #[display(fmt = "{}", _0)]
    DataAccess(#[error(source)] DataAccessError),
}
