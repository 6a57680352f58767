/// Mediation-layer errors for lares.
///
/// Wraps bus errors and adds configuration, typing, and codec variants.
use crate::ValueKind;

#[derive(Debug, thiserror::Error)]
pub enum LaresError {
    #[error("bus error: {0}")]
    Bus(#[from] lares_bus::BusError),

    #[error("unknown flag token {token:?}")]
    UnknownFlag { token: char },

    #[error("duplicate flag token {token:?}")]
    DuplicateFlag { token: char },

    #[error("type mismatch on {datapoint:?}: expected {expected}, got {actual}")]
    TypeMismatch {
        datapoint: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("cannot decode {kind} payload: {reason}")]
    Decode { kind: ValueKind, reason: String },

    #[error("unknown datapoint {name:?}")]
    UnknownDatapoint { name: String },

    #[error("duplicate datapoint {name:?}")]
    DuplicateDatapoint { name: String },

    #[error("duplicate group link for datapoint {datapoint:?}")]
    DuplicateLink { datapoint: String },

    #[error("datapoint {name:?} has no group link")]
    NotLinked { name: String },

    #[error("runtime is shut down")]
    RuntimeShutDown,
}
