/// Local typed state cells.
///
/// A datapoint is the application-facing side of a group link: named, typed
/// once at construction, tracking its previous value, and notifying
/// subscribers synchronously on every committed mutation.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{LaresError, Value, ValueChange, ValueKind};

/// Declared data direction of a datapoint.
///
/// Descriptive metadata for configuration and tooling; no gate consults it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Input,
    Output,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Input => "input",
            Access::Output => "output",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle for removing a change subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&ValueChange) + Send>;

/// One named, typed state variable.
pub struct Datapoint {
    name: String,
    kind: ValueKind,
    access: Access,
    value: Value,
    previous: Value,
    next_listener: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

impl Datapoint {
    /// Create a datapoint holding `initial`. Fails if `initial` is not of
    /// the declared kind.
    pub fn new(
        name: impl Into<String>,
        kind: ValueKind,
        access: Access,
        initial: Value,
    ) -> Result<Self, LaresError> {
        let name = name.into();
        if initial.kind() != kind {
            return Err(LaresError::TypeMismatch {
                datapoint: name,
                expected: kind,
                actual: initial.kind(),
            });
        }
        Ok(Self {
            name,
            kind,
            access,
            previous: initial.clone(),
            value: initial,
            next_listener: 0,
            listeners: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The value before the last committed mutation.
    pub fn previous(&self) -> &Value {
        &self.previous
    }

    /// Commit a new value and notify subscribers, in registration order,
    /// after the store. Returns the committed change.
    ///
    /// Every assignment counts as a mutation, equal values included; edge
    /// detection is the transmit gate's business, not the datapoint's.
    pub fn set_value(&mut self, value: Value) -> Result<ValueChange, LaresError> {
        if value.kind() != self.kind {
            return Err(LaresError::TypeMismatch {
                datapoint: self.name.clone(),
                expected: self.kind,
                actual: value.kind(),
            });
        }
        self.previous = std::mem::replace(&mut self.value, value);
        let change = ValueChange {
            datapoint: self.name.clone(),
            previous: self.previous.clone(),
            current: self.value.clone(),
        };
        tracing::debug!(
            "datapoint {}: {} -> {}",
            self.name,
            change.previous,
            change.current
        );
        for (_, listener) in self.listeners.iter_mut() {
            listener(&change);
        }
        Ok(change)
    }

    /// Decode a bus payload against this datapoint's kind.
    pub fn decode(&self, payload: &[u8]) -> Result<Value, LaresError> {
        self.kind.decode(payload)
    }

    /// Encode the current value for the bus.
    pub fn encode(&self) -> Vec<u8> {
        self.value.encode()
    }

    /// Register a change subscriber. Subscribers run synchronously inside
    /// `set_value`, in registration order.
    pub fn subscribe(&mut self, listener: impl FnMut(&ValueChange) + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Drop a subscription. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }
}

impl fmt::Debug for Datapoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datapoint")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("access", &self.access)
            .field("value", &self.value)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
