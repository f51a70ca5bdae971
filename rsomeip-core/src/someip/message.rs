use super::{
    ClientId, EventId, InstanceId, InterfaceVersion, MessageType, MethodId, RequestId, ReturnCode,
    ServiceId, ServiceKey, SessionId,
};
use crate::{
    codec::{Deserialize, DeserializeError, Serialize, SerializeError},
    transport::PeerAddress,
};
use bytes::{BufMut, Bytes};

/// Version of the protocol carried by every message.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Size of the header preceding the payload.
pub const HEADER_SIZE: usize = 18;

/// Portion of the header counted by the length field, excluding the payload.
const LENGTH_OFFSET: usize = 10;

/// A SOME/IP message.
///
/// Carries the addressing fields of a request, response, notification or error, and an opaque
/// payload.
///
/// # Wire format
///
/// ```text
/// service:u16 | method:u16 | length:u32 | client:u16 | session:u16 |
/// protocol:u8 | interface:u8 | type:u8 | return code:u8 | instance:u16 | payload
/// ```
///
/// The length field counts every byte that follows it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Message {
    /// Service the message is addressed to.
    pub service: ServiceId,
    /// Instance of the service.
    pub instance: InstanceId,
    /// Method, or event for notifications.
    pub method: MethodId,
    /// Client that issued the request.
    pub client: ClientId,
    /// Session of the request.
    pub session: SessionId,
    /// Version of the service interface.
    pub interface: InterfaceVersion,
    /// Kind of message.
    pub message_type: MessageType,
    /// Result of the request.
    pub return_code: ReturnCode,
    /// Opaque payload.
    pub payload: Bytes,
    /// Peer an inbound request was received from.
    ///
    /// Not part of the wire format. Responses created with [`Message::to_response`] or
    /// [`Message::to_error`] keep it, so that they are sent back to the same peer.
    pub origin: Option<PeerAddress>,
}

impl Message {
    /// Creates a new request to the given method of the service.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rsomeip_core::someip::{InstanceId, Message, MessageType, MethodId, ServiceId, ServiceKey};
    ///
    /// let key = ServiceKey::new(ServiceId::new(0x1234), InstanceId::new(0x5678));
    /// let request = Message::request(key, MethodId::new(0x0421)).with_payload("Hello");
    /// assert_eq!(request.message_type, MessageType::Request);
    /// assert_eq!(request.key(), key);
    /// assert_eq!(&request.payload[..], b"Hello");
    /// ```
    #[must_use]
    pub fn request(key: ServiceKey, method: MethodId) -> Self {
        Self {
            service: key.service,
            instance: key.instance,
            method,
            ..Self::default()
        }
    }

    /// Creates a new notification of the given event.
    #[must_use]
    pub fn notification(key: ServiceKey, event: EventId) -> Self {
        Self::request(key, event.into()).with_message_type(MessageType::Notification)
    }

    /// Creates an empty response to `self`.
    ///
    /// The response echoes the addressing and request id of `self`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rsomeip_core::someip::{ClientId, Message, MessageType, SessionId};
    ///
    /// let request = Message::default()
    ///     .with_client(ClientId::new(0x0001))
    ///     .with_session(SessionId::new(0x0042))
    ///     .with_payload("Hello");
    /// let response = request.to_response();
    /// assert_eq!(response.message_type, MessageType::Response);
    /// assert_eq!(response.request_id(), request.request_id());
    /// assert!(response.payload.is_empty());
    /// ```
    #[must_use]
    pub fn to_response(&self) -> Self {
        Self {
            message_type: MessageType::Response,
            return_code: ReturnCode::Ok,
            payload: Bytes::new(),
            ..self.clone()
        }
    }

    /// Creates an error response to `self` with the given return code.
    #[must_use]
    pub fn to_error(&self, return_code: ReturnCode) -> Self {
        Self {
            message_type: MessageType::Error,
            return_code,
            payload: Bytes::new(),
            ..self.clone()
        }
    }

    /// Returns the service endpoint the message is addressed to.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> ServiceKey {
        ServiceKey::new(self.service, self.instance)
    }

    /// Returns the id of the request.
    #[inline]
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        RequestId::new(self.client, self.session)
    }

    /// Returns `self` with the given client.
    #[inline]
    #[must_use]
    pub const fn with_client(mut self, client: ClientId) -> Self {
        self.client = client;
        self
    }

    /// Returns `self` with the given session.
    #[inline]
    #[must_use]
    pub const fn with_session(mut self, session: SessionId) -> Self {
        self.session = session;
        self
    }

    /// Returns `self` with the given interface version.
    #[inline]
    #[must_use]
    pub const fn with_interface(mut self, interface: InterfaceVersion) -> Self {
        self.interface = interface;
        self
    }

    /// Returns `self` with the given message type.
    #[inline]
    #[must_use]
    pub const fn with_message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    /// Returns `self` with the given return code.
    #[inline]
    #[must_use]
    pub const fn with_return_code(mut self, return_code: ReturnCode) -> Self {
        self.return_code = return_code;
        self
    }

    /// Returns `self` with the given origin.
    #[inline]
    #[must_use]
    pub const fn with_origin(mut self, origin: PeerAddress) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Returns `self` with the given payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Decodes a message from a frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if the frame cannot hold a header, and
    /// [`CodecError::Malformed`] if the header could be read but is not consistent.
    pub fn from_bytes(mut buffer: Bytes) -> Result<Self, CodecError> {
        if buffer.len() < HEADER_SIZE {
            return Err(CodecError::Truncated(DeserializeError));
        }
        let service = ServiceId::deserialize(&mut buffer)?;
        let method = MethodId::deserialize(&mut buffer)?;
        let length = u32::deserialize(&mut buffer)?;
        let client = ClientId::deserialize(&mut buffer)?;
        let session = SessionId::deserialize(&mut buffer)?;
        let protocol = u8::deserialize(&mut buffer)?;
        let interface = InterfaceVersion::deserialize(&mut buffer)?;
        let message_type = MessageType::deserialize(&mut buffer)?;
        let return_code = ReturnCode::deserialize(&mut buffer)?;
        let instance = InstanceId::deserialize(&mut buffer)?;
        let payload = Bytes::deserialize(&mut buffer)?;
        let message = Self {
            service,
            instance,
            method,
            client,
            session,
            interface,
            message_type,
            return_code,
            payload,
            origin: None,
        };

        let malformed = if protocol != PROTOCOL_VERSION {
            Some(ReturnCode::WrongProtocolVersion)
        } else if usize::try_from(length).ok() != Some(LENGTH_OFFSET + message.payload.len()) {
            Some(ReturnCode::MalformedMessage)
        } else if matches!(message_type, MessageType::Unknown(_)) {
            Some(ReturnCode::WrongMessageType)
        } else {
            None
        };
        match malformed {
            Some(return_code) => Err(CodecError::Malformed {
                message: Box::new(message),
                return_code,
            }),
            None => Ok(message),
        }
    }
}

impl Serialize for Message {
    fn serialize(&self, buffer: &mut impl BufMut) -> Result<usize, SerializeError> {
        let length = u32::try_from(LENGTH_OFFSET + self.payload.len()).map_err(|_| SerializeError)?;
        let mut size = 0;
        size += self.service.serialize(buffer)?;
        size += self.method.serialize(buffer)?;
        size += length.serialize(buffer)?;
        size += self.client.serialize(buffer)?;
        size += self.session.serialize(buffer)?;
        size += PROTOCOL_VERSION.serialize(buffer)?;
        size += self.interface.serialize(buffer)?;
        size += self.message_type.serialize(buffer)?;
        size += self.return_code.serialize(buffer)?;
        size += self.instance.serialize(buffer)?;
        size += self.payload.serialize(buffer)?;
        Ok(size)
    }

    fn size_hint(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

impl std::fmt::Display for Message {
    /// Formats the header of the message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rsomeip_core::someip::{ClientId, InstanceId, Message, MethodId, ServiceId, ServiceKey};
    ///
    /// let key = ServiceKey::new(ServiceId::new(0x1234), InstanceId::new(0x5678));
    /// let message = Message::request(key, MethodId::new(0x0421)).with_client(ClientId::new(1));
    /// assert_eq!(message.to_string(), "[REQ.1234.5678.0421.0001.0000]");
    /// ```
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}.{}.{}.{}.{}.{}]",
            self.message_type, self.service, self.instance, self.method, self.client, self.session
        )
    }
}

/// Errors when decoding a [`Message`] from a frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame is too short to contain a header.
    #[error("frame is too short to contain a header")]
    Truncated(#[from] DeserializeError),
    /// The header is inconsistent.
    #[error("malformed message {message}: {return_code:?}")]
    Malformed {
        /// The decoded message.
        message: Box<Message>,
        /// Reason for rejecting the message.
        return_code: ReturnCode,
    },
}

impl CodecError {
    /// Returns the error response that should be sent back to the source, if any.
    ///
    /// Only malformed requests expecting a response are answered. Everything else is dropped.
    pub fn reply(&self) -> Option<Message> {
        match self {
            Self::Malformed {
                message,
                return_code,
            } if message.message_type == MessageType::Request => Some(message.to_error(*return_code)),
            _ => None,
        }
    }
}
