use crate::{
    application::State,
    someip::{ClientId, EventGroupId, EventId, Message, MethodId, ReturnCode, ServiceKey},
    transport::TransportError,
};

/// Result type returned by this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by applications and their components.
///
/// Addressing and lifecycle errors are returned synchronously by the offending call. Routing and
/// delivery errors are delivered to the continuation of the affected request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Resources required by the application could not be acquired.
    #[error("initialization failed: {0}")]
    Initialization(String),
    /// An identifier is malformed or reserved.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// The service is not available.
    #[error("service {0} not found")]
    ServiceNotFound(ServiceKey),
    /// The service does not handle the method.
    #[error("method {method} not found on service {key}")]
    MethodNotFound {
        /// The addressed service.
        key: ServiceKey,
        /// The missing method.
        method: MethodId,
    },
    /// No response arrived before the deadline.
    #[error("request timed out")]
    Timeout,
    /// The transport failed to deliver the message.
    #[error("transport failure: {0}")]
    TransportFailure(#[from] TransportError),
    /// The operation is not allowed in the current state.
    #[error("`{operation}` is not allowed in state {state:?}")]
    LifecycleViolation {
        /// The rejected operation.
        operation: &'static str,
        /// State of the application at the time.
        state: State,
    },
    /// The application was stopped.
    #[error("application stopped")]
    Stopped,
    /// A periodic interval is zero.
    #[error("interval must be greater than zero")]
    ZeroInterval,
    /// The event is not offered by this application.
    #[error("event {event} is not offered on service {key}")]
    NotOffered {
        /// The addressed service.
        key: ServiceKey,
        /// The unknown event.
        event: EventId,
    },
    /// No offered event of the service belongs to the group.
    #[error("event group {group} is not offered on service {key}")]
    GroupNotOffered {
        /// The addressed service.
        key: ServiceKey,
        /// The unknown group.
        group: EventGroupId,
    },
    /// The response does not answer a request received by this application.
    #[error("unknown client {0}")]
    UnknownClient(ClientId),
    /// The message could not be encoded or was rejected as malformed.
    #[error("malformed message: {0:?}")]
    Malformed(ReturnCode),
    /// The remote application answered with an error.
    #[error("remote error: {0:?}")]
    Remote(ReturnCode),
    /// Every session id of the client is in flight.
    #[error("no session ids left for {0}")]
    SessionsExhausted(ClientId),
}

impl Error {
    /// Returns the [`ReturnCode`] that represents this error on the wire.
    pub fn return_code(&self) -> ReturnCode {
        match self {
            Self::ServiceNotFound(_) => ReturnCode::UnknownService,
            Self::MethodNotFound { .. } => ReturnCode::UnknownMethod,
            Self::Timeout => ReturnCode::Timeout,
            Self::TransportFailure(_) => ReturnCode::NotReachable,
            Self::Stopped => ReturnCode::NotReady,
            Self::Malformed(code) | Self::Remote(code) => *code,
            _ => ReturnCode::NotOk,
        }
    }

    /// Creates the error represented by an error response.
    pub fn from_message(message: &Message) -> Self {
        match message.return_code {
            ReturnCode::UnknownService => Self::ServiceNotFound(message.key()),
            ReturnCode::UnknownMethod => Self::MethodNotFound {
                key: message.key(),
                method: message.method,
            },
            ReturnCode::Timeout => Self::Timeout,
            code @ (ReturnCode::MalformedMessage
            | ReturnCode::WrongProtocolVersion
            | ReturnCode::WrongInterfaceVersion
            | ReturnCode::WrongMessageType) => Self::Malformed(code),
            code => Self::Remote(code),
        }
    }
}
