// src/protocol/mod.rs

//! Remote execution protocol.
//!
//! - [`address`] defines the routing key (`EventAddress`) every inbound
//!   message is dispatched on.
//! - [`catalog`] has factory functions for the addresses the bridge uses.
//! - [`messages`] holds the inbound events and outbound control messages.
//! - [`codec`] turns them into frames and back, enforcing the frame ceiling.

pub mod address;
pub mod catalog;
pub mod codec;
pub mod messages;

pub use address::{EventAddress, EventKind, OperationId, Scope};
pub use codec::{decode_event, encode_control, MAX_FRAME_BYTES};
pub use messages::{
    ControlMessage, ExecutionRequest, RemoteEvent, RemoteStatus, Row, RowDirection,
    StopMessage,
};
