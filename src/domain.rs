pub mod rental;

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use snowflake::SnowflakeIdGenerator;
use std::{
    collections::VecDeque, error::Error as StdError, fmt, ops::Deref, str::FromStr, sync::Arc,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

pub trait Id:
    Copy
    + Eq
    + Deref<Target = Self::Inner>
    + From<Self::Inner>
    + fmt::Display
    + fmt::Debug
    + Serialize
    + for<'de> Deserialize<'de>
{
    type Inner: FromStr;
}

pub trait Event: Clone + Eq + fmt::Debug + Serialize + for<'a> Deserialize<'a> {
    type Id;
}

pub trait Entity {
    type Id: Id;

    const ENTITY_NAME: &'static str;

    fn id(&self) -> Self::Id;
}

/// Entity whose state is rebuilt from its events.
pub trait Aggregation: Entity + Default {
    type Event: Event<Id = Self::Id>;
    type Error: StdError;

    /// Checks that `event` may be applied to the current state.
    fn validate(&self, event: &Self::Event) -> Result<(), Self::Error>;
    /// Folds an event into the state. Used when replaying a stream.
    fn apply(&mut self, event: Self::Event);
    fn events(&self) -> &EventQueue<Self::Event>;
    fn events_mut(&mut self) -> &mut EventQueue<Self::Event>;
    fn pop(&mut self) -> Option<Self::Event> {
        self.events_mut().pop()
    }
    fn pop_all(&mut self) -> Vec<Self::Event> {
        let mut events = Vec::new();
        while let Some(e) = self.pop() {
            events.push(e);
        }
        events
    }
    fn clear(&mut self) {
        self.events_mut().clear()
    }
    fn peek(&self) -> Option<&Self::Event> {
        self.events().peek()
    }
}

#[derive(Error, Display, Debug)]
pub enum DataAccessError {
    #[display(fmt = "Database connection error: {}", _0)]
    ConnectionError(#[error(not(source))] Box<dyn StdError + Send + Sync>),
    #[display(fmt = "Database query error: {}", _0)]
    QueryError(#[error(not(source))] Box<dyn StdError + Send + Sync>),
    #[display(fmt = "Data read error: {}", _0)]
    ReadError(#[error(not(source))] Box<dyn StdError + Send + Sync>),
    #[display(fmt = "Data write error: {}", _0)]
    WriteError(#[error(not(source))] Box<dyn StdError + Send + Sync>),
    #[display(fmt = "Client side error: {}", _0)]
    ClientSideError(#[error(not(source))] Box<dyn StdError + Send + Sync>),
    #[display(fmt = "Write rejected, expected version {}", expected)]
    Conflict { expected: LedgerVersion },
}

/// Revision of a per-entity event stream. `None` means nothing was written yet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerVersion(Option<u64>);

impl LedgerVersion {
    pub const EMPTY: Self = Self(None);

    pub fn at(revision: u64) -> Self {
        Self(Some(revision))
    }

    pub fn revision(&self) -> Option<u64> {
        self.0
    }

    pub fn next(&self) -> Self {
        match self.0 {
            Some(rev) => Self(Some(rev + 1)),
            None => Self(Some(0)),
        }
    }
}

impl fmt::Display for LedgerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(rev) => rev.fmt(f),
            None => f.write_str("none"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventQueue<T> {
    queue: VecDeque<T>,
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }
    pub fn peek(&self) -> Option<&T> {
        self.queue.front()
    }
    pub fn push(&mut self, value: T) {
        self.queue.push_back(value)
    }
    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }
    pub fn clear(&mut self) {
        self.queue.clear()
    }
    pub fn len(&self) -> usize {
        self.queue.len()
    }
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
    pub fn iter(&self) -> EventQueueIter<'_, T> {
        self.queue.iter()
    }
}

impl<T> IntoIterator for EventQueue<T> {
    type Item = T;
    type IntoIter = EventQueueIntoIter<T>;
    fn into_iter(self) -> Self::IntoIter {
        self.queue.into_iter()
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type EventQueueIntoIter<T> = std::collections::vec_deque::IntoIter<T>;
pub type EventQueueIter<'a, T> = std::collections::vec_deque::Iter<'a, T>;

pub struct IdGenerator(SnowflakeIdGenerator);

impl IdGenerator {
    pub fn new(gen: SnowflakeIdGenerator) -> Self {
        Self(gen)
    }

    pub fn generate(&mut self) -> u64 {
        self.0.generate() as u64
    }
}

impl From<SnowflakeIdGenerator> for IdGenerator {
    fn from(value: SnowflakeIdGenerator) -> Self {
        Self::new(value)
    }
}

#[derive(Error, Display, Debug)]
#[display(fmt = "Id generator task has stopped")]
pub struct IdGeneratorClosed;

/// Serves snowflake ids from a single task so that callers can share one generator.
#[derive(Clone)]
pub struct IdGeneratorTask {
    _handle: Arc<JoinHandle<()>>,
    sender: mpsc::Sender<oneshot::Sender<u64>>,
}

impl IdGeneratorTask {
    pub fn spawn(mut gen: IdGenerator) -> Self {
        let (tx_async, mut rx_async) = mpsc::channel::<oneshot::Sender<u64>>(100);
        let handle = tokio::spawn(async move {
            while let Some(tx) = rx_async.recv().await {
                // receiver may have given up
                let _ = tx.send(gen.generate());
            }
        });
        Self {
            _handle: Arc::new(handle),
            sender: tx_async,
        }
    }

    pub fn with_node(machine_id: i32, node_id: i32) -> Self {
        Self::spawn(SnowflakeIdGenerator::new(machine_id, node_id).into())
    }

    pub async fn generate<T>(&self) -> Result<T, IdGeneratorClosed>
    where
        T: From<u64>,
    {
        let (tx, rx) = oneshot::channel::<u64>();
        self.sender.send(tx).await.map_err(|_| IdGeneratorClosed)?;
        rx.await.map(T::from).map_err(|_| IdGeneratorClosed)
    }
}
