//! SOME/IP message model.
//!
//! - Identifiers like [`ServiceId`] and [`RequestId`] address services, methods and requests.
//! - [`Message`] is the unit exchanged between applications.

mod primitives;
pub use primitives::{
    ClientId, EventGroupId, EventId, InstanceId, InterfaceVersion, MessageType, MethodId,
    RequestId, ReturnCode, ServiceId, ServiceKey, SessionId,
};

mod message;
pub use message::{CodecError, Message, HEADER_SIZE, PROTOCOL_VERSION};
