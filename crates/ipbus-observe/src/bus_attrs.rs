//! Span and event attribute names for bus operations.
//!
//! Usable as field names in `tracing` macros through the brace syntax, e.g.
//! `info_span!("bench", { BUS_IDENTIFIER } = %id)`. The library crates log
//! with the same literal names (`bus.identifier`, `bus.session_id`).

/// Identifier of the bus (e.g. "com.myapp").
pub const BUS_IDENTIFIER: &str = "bus.identifier";

/// Engine-issued session handle.
pub const BUS_SESSION_ID: &str = "bus.session_id";

/// Payload size in bytes.
pub const BUS_MESSAGE_SIZE: &str = "bus.message.size";

/// Number of messages in a batch operation.
pub const BUS_MESSAGE_COUNT: &str = "bus.message.count";

// --- Operation name values ---

pub const OP_BENCH: &str = "bench";
pub const OP_LATENCY: &str = "latency";
pub const OP_PING: &str = "ping";

/// Attribute carrying one of the `OP_*` values.
pub const BUS_OPERATION_NAME: &str = "bus.operation.name";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_library_log_fields() {
        assert_eq!(BUS_IDENTIFIER, "bus.identifier");
        assert_eq!(BUS_SESSION_ID, "bus.session_id");
    }

    #[test]
    fn attribute_names_share_the_bus_namespace() {
        for name in [
            BUS_IDENTIFIER,
            BUS_SESSION_ID,
            BUS_MESSAGE_SIZE,
            BUS_MESSAGE_COUNT,
            BUS_OPERATION_NAME,
        ] {
            assert!(name.starts_with("bus."), "{name}");
        }
    }
}
