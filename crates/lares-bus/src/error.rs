use crate::IndividualAddress;

/// Errors returned by the lares bus layer.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("invalid group address {input:?}: {reason}")]
    InvalidGroupAddress { input: String, reason: String },

    #[error("invalid individual address {input:?}: {reason}")]
    InvalidIndividualAddress { input: String, reason: String },

    #[error("unknown priority {0:?}")]
    UnknownPriority(String),

    #[error("address {0} is already attached to the bus")]
    AlreadyAttached(IndividualAddress),

    #[error("tap {0} is detached from the bus")]
    Detached(IndividualAddress),

    #[error("bus closed")]
    Closed,
}
