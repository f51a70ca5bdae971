//! SOME/IP primitive types.
//!
//! Strongly-typed identifiers used to address services, methods, events and requests.

use crate::{
    codec::{Deserialize, DeserializeError, Serialize, SerializeError},
    Error, Result,
};
use bytes::{BufMut, Bytes};

/// Implements basic functionality for new-types that wrap a single primitive.
///
/// Includes const `new` and `as_` methods, conversions from and into the representation,
/// [`Serialize`], [`Deserialize`] and [`std::fmt::Display`].
macro_rules! impl_basic_type {
    ($name:ident, $repr:ty, $getter:ident, $fmt:literal) => {
        impl $name {
            #[doc=concat!("Creates a new [`", stringify!($name), "`] with the given `value`.")]
            #[inline]
            #[must_use]
            pub const fn new(value: $repr) -> Self {
                Self(value)
            }

            #[doc=concat!("Returns the [`", stringify!($repr), "`] representation of this [`", stringify!($name), "`].")]
            #[inline]
            #[must_use]
            pub const fn $getter(self) -> $repr {
                self.0
            }
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for $repr {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl Serialize for $name {
            fn serialize(&self, buffer: &mut impl BufMut) -> Result<usize, SerializeError> {
                self.0.serialize(buffer)
            }

            fn size_hint(&self) -> usize {
                self.0.size_hint()
            }
        }

        impl Deserialize for $name {
            type Output = Self;

            fn deserialize(buffer: &mut Bytes) -> Result<Self::Output, DeserializeError> {
                <$repr>::deserialize(buffer).map(Self::new)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, $fmt, self.0)
            }
        }
    };
}

macro_rules! impl_basic_type_u16 {
    ($name:ident) => {
        impl_basic_type!($name, u16, as_u16, "{:04x?}");
    };
}

macro_rules! impl_basic_type_u8 {
    ($name:ident) => {
        impl_basic_type!($name, u8, as_u8, "{:02x?}");
    };
}

/// Returns an [`Error::InvalidIdentifier`] describing the given value.
fn invalid(kind: &str, value: impl std::fmt::Display) -> Error {
    Error::InvalidIdentifier(format!("{kind} {value} is reserved"))
}

/// Unique identifier of a service interface.
///
/// `0x0000` and `0xffff` are reserved. The latter addresses discovery messages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceId(u16);

impl_basic_type_u16!(ServiceId);

impl ServiceId {
    /// Service used by discovery messages.
    pub const DISCOVERY: Self = Self::new(0xffff);

    /// Returns `self` if it can be used to address a service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the id is reserved.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rsomeip_core::someip::ServiceId;
    ///
    /// assert!(ServiceId::new(0x1234).check().is_ok());
    /// assert!(ServiceId::new(0x0000).check().is_err());
    /// assert!(ServiceId::new(0xffff).check().is_err());
    /// ```
    pub fn check(self) -> Result<Self> {
        match self.0 {
            0x0000 | 0xffff => Err(invalid("service", self)),
            _ => Ok(self),
        }
    }
}

/// Unique identifier of an instance of a service.
///
/// `0x0000` and `0xffff` are reserved.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u16);

impl_basic_type_u16!(InstanceId);

impl InstanceId {
    /// Instance used by discovery messages.
    pub const DISCOVERY: Self = Self::new(0xffff);

    /// Returns `self` if it can be used to address an instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the id is reserved.
    pub fn check(self) -> Result<Self> {
        match self.0 {
            0x0000 | 0xffff => Err(invalid("instance", self)),
            _ => Ok(self),
        }
    }
}

/// Unique identifier of a method or event on a service interface.
///
/// Methods usually use the range `0x0000-0x7fff` and events the range `0x8000-0xfffe`. Since
/// notifications are delivered to message handlers, both ranges are accepted here.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodId(u16);

impl_basic_type_u16!(MethodId);

impl MethodId {
    /// Returns `self` if it can be used to address a method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the id is `0xffff`.
    pub fn check(self) -> Result<Self> {
        match self.0 {
            0xffff => Err(invalid("method", self)),
            _ => Ok(self),
        }
    }
}

impl From<EventId> for MethodId {
    fn from(value: EventId) -> Self {
        Self::new(value.as_u16())
    }
}

/// Unique identifier of an event on a service interface.
///
/// Events live in the range `0x8000-0xfffe`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u16);

impl_basic_type_u16!(EventId);

impl EventId {
    /// Returns `self` if it lies in the event range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] otherwise.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rsomeip_core::someip::EventId;
    ///
    /// assert!(EventId::new(0x8778).check().is_ok());
    /// assert!(EventId::new(0x0421).check().is_err());
    /// ```
    pub fn check(self) -> Result<Self> {
        match self.0 {
            0x8000..=0xfffe => Ok(self),
            _ => Err(Error::InvalidIdentifier(format!(
                "event {self} is outside of 8000-fffe"
            ))),
        }
    }
}

/// Unique identifier of a group of events.
///
/// `0x0000` and `0xffff` are reserved.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventGroupId(u16);

impl_basic_type_u16!(EventGroupId);

impl EventGroupId {
    /// Returns `self` if it can be used to address an event group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the id is reserved.
    pub fn check(self) -> Result<Self> {
        match self.0 {
            0x0000 | 0xffff => Err(invalid("event group", self)),
            _ => Ok(self),
        }
    }
}

/// Unique identifier of the client of a service interface.
///
/// Assigned by the [`Runtime`](crate::Runtime) to each application.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u16);

impl_basic_type_u16!(ClientId);

impl ClientId {
    /// Returns `self` if it can be assigned to an application.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] for `0x0000` and `0xffff`.
    pub fn check(self) -> Result<Self> {
        match self.0 {
            0x0000 | 0xffff => Err(invalid("client", self)),
            _ => Ok(self),
        }
    }
}

/// Unique identifier of a sequential message or request.
///
/// When session handling is active (`0x0001-0xffff`), each new request increments the ID by one
/// and each response copies the ID of its request. After reaching `0xffff`, the ID wraps back
/// around to `1`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u16);

impl_basic_type_u16!(SessionId);

impl SessionId {
    /// Value used when session handling is disabled.
    pub const DISABLED: Self = Self::new(0);

    /// First value used when session handling is enabled.
    pub const ENABLED: Self = Self::new(1);

    /// Whether session handling is enabled.
    #[inline]
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        self.0 > 0
    }

    /// Increments this [`SessionId`] by one and returns the old value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rsomeip_core::someip::SessionId;
    ///
    /// let mut session = SessionId::new(0xffff);
    /// assert_eq!(session.increment().as_u16(), 0xffff);
    /// assert_eq!(session.as_u16(), 0x0001);
    /// ```
    #[expect(clippy::return_self_not_must_use)]
    pub fn increment(&mut self) -> Self {
        let old = self.0;
        self.0 = match old.wrapping_add(1) {
            0 => 1,
            x => x,
        };
        Self::new(old)
    }
}

/// Version of the service interface.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceVersion(u8);

impl_basic_type_u8!(InterfaceVersion);

/// Identifies a service endpoint by its service and instance.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceKey {
    /// Service portion of the key.
    pub service: ServiceId,
    /// Instance portion of the key.
    pub instance: InstanceId,
}

impl ServiceKey {
    /// Creates a new [`ServiceKey`].
    #[inline]
    #[must_use]
    pub const fn new(service: ServiceId, instance: InstanceId) -> Self {
        Self { service, instance }
    }

    /// Returns `self` if both ids are valid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if either id is reserved.
    pub fn check(self) -> Result<Self> {
        self.service.check()?;
        self.instance.check()?;
        Ok(self)
    }
}

impl std::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.service, self.instance)
    }
}

/// Identifies a request by the client that sent it and its session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId {
    /// Client portion of the id.
    pub client: ClientId,
    /// Session portion of the id.
    pub session: SessionId,
}

impl RequestId {
    /// Creates a new [`RequestId`] with the given `client` and `session` ids.
    #[inline]
    #[must_use]
    pub const fn new(client: ClientId, session: SessionId) -> Self {
        Self { client, session }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.client, self.session)
    }
}

/// Type of a SOME/IP message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// A request expecting a response.
    #[default]
    Request,
    /// A fire-and-forget request.
    RequestNoReturn,
    /// A notification or event callback expecting no response.
    Notification,
    /// A response message.
    Response,
    /// A response containing an error.
    Error,
    /// Unknown message type.
    Unknown(u8),
}

impl MessageType {
    /// Creates a new [`MessageType`] from the given `value`.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Request,
            0x01 => Self::RequestNoReturn,
            0x02 => Self::Notification,
            0x80 => Self::Response,
            0x81 => Self::Error,
            x => Self::Unknown(x),
        }
    }

    /// Returns the [`u8`] representation of `self`.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Request => 0x00,
            Self::RequestNoReturn => 0x01,
            Self::Notification => 0x02,
            Self::Response => 0x80,
            Self::Error => 0x81,
            Self::Unknown(x) => x,
        }
    }

    /// Whether the message is a request of either kind.
    #[inline]
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(self, Self::Request | Self::RequestNoReturn)
    }

    /// Whether the message answers a request.
    #[inline]
    #[must_use]
    pub const fn is_response(self) -> bool {
        matches!(self, Self::Response | Self::Error)
    }
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        Self::from_u8(value)
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value.as_u8()
    }
}

impl Serialize for MessageType {
    fn serialize(&self, buffer: &mut impl BufMut) -> Result<usize, SerializeError> {
        self.as_u8().serialize(buffer)
    }

    fn size_hint(&self) -> usize {
        size_of::<u8>()
    }
}

impl Deserialize for MessageType {
    type Output = Self;

    fn deserialize(buffer: &mut Bytes) -> Result<Self::Output, DeserializeError> {
        u8::deserialize(buffer).map(Self::from_u8)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request => f.write_str("REQ"),
            Self::RequestNoReturn => f.write_str("RNR"),
            Self::Notification => f.write_str("NOT"),
            Self::Response => f.write_str("RES"),
            Self::Error => f.write_str("ERR"),
            Self::Unknown(x) => write!(f, "{x:02x?}"),
        }
    }
}

/// Result of processing a request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    /// No error occurred.
    #[default]
    Ok,
    /// An unspecified error occurred.
    NotOk,
    /// The requested service is unknown.
    UnknownService,
    /// The requested method is unknown.
    UnknownMethod,
    /// Application not running.
    NotReady,
    /// System running the service not reachable.
    NotReachable,
    /// A timeout occurred.
    Timeout,
    /// Version of the protocol not supported.
    WrongProtocolVersion,
    /// Interface version mismatch.
    WrongInterfaceVersion,
    /// Payload could not be deserialized.
    MalformedMessage,
    /// Wrong [`MessageType`] was received.
    WrongMessageType,
    /// Reserved for generic errors.
    Reserved(u8),
    /// Reserved for errors specified by the service interface.
    Other(u8),
}

impl From<u8> for ReturnCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Ok,
            0x01 => Self::NotOk,
            0x02 => Self::UnknownService,
            0x03 => Self::UnknownMethod,
            0x04 => Self::NotReady,
            0x05 => Self::NotReachable,
            0x06 => Self::Timeout,
            0x07 => Self::WrongProtocolVersion,
            0x08 => Self::WrongInterfaceVersion,
            0x09 => Self::MalformedMessage,
            0x0a => Self::WrongMessageType,
            n if (0x0b..=0x5e).contains(&n) => Self::Reserved(n),
            n => Self::Other(n),
        }
    }
}

impl From<ReturnCode> for u8 {
    fn from(value: ReturnCode) -> Self {
        match value {
            ReturnCode::Ok => 0x00,
            ReturnCode::NotOk => 0x01,
            ReturnCode::UnknownService => 0x02,
            ReturnCode::UnknownMethod => 0x03,
            ReturnCode::NotReady => 0x04,
            ReturnCode::NotReachable => 0x05,
            ReturnCode::Timeout => 0x06,
            ReturnCode::WrongProtocolVersion => 0x07,
            ReturnCode::WrongInterfaceVersion => 0x08,
            ReturnCode::MalformedMessage => 0x09,
            ReturnCode::WrongMessageType => 0x0a,
            ReturnCode::Reserved(n) | ReturnCode::Other(n) => n,
        }
    }
}

impl Serialize for ReturnCode {
    fn serialize(&self, buffer: &mut impl BufMut) -> Result<usize, SerializeError> {
        u8::from(*self).serialize(buffer)
    }

    fn size_hint(&self) -> usize {
        size_of::<u8>()
    }
}

impl Deserialize for ReturnCode {
    type Output = Self;

    fn deserialize(buffer: &mut Bytes) -> Result<Self::Output, DeserializeError> {
        u8::deserialize(buffer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_ids_are_rejected() {
        assert!(ServiceId::new(0x1234).check().is_ok());
        assert!(ServiceId::new(0x0000).check().is_err());
        assert!(InstanceId::new(0xffff).check().is_err());
        assert!(MethodId::new(0x8778).check().is_ok());
        assert!(MethodId::new(0xffff).check().is_err());
        assert!(EventId::new(0x7fff).check().is_err());
        assert!(EventId::new(0xffff).check().is_err());
        assert!(EventGroupId::new(0x4465).check().is_ok());
        assert!(EventGroupId::new(0x0000).check().is_err());
        assert!(ClientId::new(0x0000).check().is_err());
        assert!(matches!(
            ServiceKey::new(ServiceId::new(0x1234), InstanceId::new(0)).check(),
            Err(Error::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn session_skips_zero_when_wrapping() {
        let mut session = SessionId::ENABLED;
        assert_eq!(session.increment(), SessionId::new(1));
        assert_eq!(session, SessionId::new(2));

        let mut session = SessionId::new(0xffff);
        assert_eq!(session.increment(), SessionId::new(0xffff));
        assert_eq!(session, SessionId::ENABLED);
        assert!(session.is_enabled());
        assert!(!SessionId::DISABLED.is_enabled());
    }

    #[test]
    fn message_type_conversions() {
        for value in [0x00, 0x01, 0x02, 0x80, 0x81, 0x42] {
            assert_eq!(MessageType::from_u8(value).as_u8(), value);
        }
        assert_eq!(MessageType::from_u8(0x42), MessageType::Unknown(0x42));
        assert!(MessageType::RequestNoReturn.is_request());
        assert!(MessageType::Error.is_response());
        assert!(!MessageType::Notification.is_response());
    }

    #[test]
    fn return_code_conversions() {
        for value in 0..=u8::MAX {
            assert_eq!(u8::from(ReturnCode::from(value)), value);
        }
        assert_eq!(ReturnCode::from(0x02), ReturnCode::UnknownService);
        assert_eq!(ReturnCode::from(0x20), ReturnCode::Reserved(0x20));
        assert_eq!(ReturnCode::from(0x60), ReturnCode::Other(0x60));
    }

    #[test]
    fn ids_display_as_hex() {
        let key = ServiceKey::new(ServiceId::new(0x1234), InstanceId::new(0x5678));
        assert_eq!(key.to_string(), "1234.5678");
        assert_eq!(EventId::new(0x8778).to_string(), "8778");
        assert_eq!(InterfaceVersion::new(1).to_string(), "01");
    }
}
