//! # ECS Error Types
//!
//! Fallible entry points return [`EcsResult`]. Contract violations on the
//! hot path (stale handles, unregistered types) panic instead.

use thiserror::Error;

/// Errors that can occur while setting up or configuring a world.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The component type was registered twice.
    #[error("component type already registered: {0}")]
    AlreadyRegistered(&'static str),

    /// A component type was used without being registered.
    #[error("component type not registered: {0}")]
    NotRegistered(&'static str),

    /// The process-wide registry is frozen once the first world exists.
    #[error("component registry is sealed, register {0} before creating a world")]
    RegistrySealed(&'static str),

    /// Pool segments must hold at least one slot.
    #[error("invalid pool segment size for {name}: {size}")]
    InvalidSegmentSize {
        /// Component type name.
        name: &'static str,
        /// Requested segment size.
        size: usize,
    },

    /// The same filter shape was registered twice in one world.
    #[error("filter already registered: {0}")]
    DuplicateFilter(String),

    /// Filters only track mutations made after registration.
    #[error("filter {shape} registered after {alive} entities were created")]
    EntitiesExist {
        /// Filter shape description.
        shape: String,
        /// Number of live entities at registration time.
        alive: usize,
    },

    /// A group filter was built before its underlying filter.
    #[error("underlying filter not registered: {0}")]
    FilterNotRegistered(String),

    /// The same group strategy was registered twice in one world.
    #[error("group filter already registered: {0}")]
    DuplicateGroupFilter(&'static str),

    /// The world reached its configured entity cap.
    #[error("entity capacity exhausted: max {max}")]
    CapacityExhausted {
        /// Configured maximum.
        max: usize,
    },

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for ECS operations.
pub type EcsResult<T> = Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EcsError::InvalidSegmentSize { name: "Name", size: 0 };
        assert_eq!(err.to_string(), "invalid pool segment size for Name: 0");

        let err = EcsError::EntitiesExist {
            shape: "Filter<(Age,), ()>".to_string(),
            alive: 3,
        };
        assert!(err.to_string().contains("after 3 entities"));
    }
}
