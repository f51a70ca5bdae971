//! Discovery of services and event group subscriptions.
//!
//! Applications exchange control entries in-band, as notifications addressed to
//! [`ServiceId::DISCOVERY`] and [`METHOD`]. The payload of such a message is a list of entries,
//! each seven bytes long:
//!
//! ```text
//! type:u8 | service:u16 | instance:u16 | event group:u16
//! ```

use crate::{
    codec::{Deserialize, DeserializeError, Serialize, SerializeError},
    someip::{
        EventGroupId, InstanceId, Message, MessageType, MethodId, ServiceId, ServiceKey,
    },
};
use bytes::{BufMut, Bytes};

/// Method of discovery messages.
pub const METHOD: MethodId = MethodId::new(0x8100);

/// Kind of a discovery [`Entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Asks peers whether they offer a service.
    FindService,
    /// Announces that a service is offered.
    OfferService,
    /// Announces that a service is no longer offered.
    StopOfferService,
    /// Subscribes to an event group.
    Subscribe,
    /// Cancels a subscription.
    StopSubscribe,
    /// Accepts a subscription.
    SubscribeAck,
    /// Rejects a subscription.
    SubscribeNack,
}

impl EntryType {
    const fn as_u8(self) -> u8 {
        match self {
            Self::FindService => 0x00,
            Self::OfferService => 0x01,
            Self::StopOfferService => 0x02,
            Self::Subscribe => 0x06,
            Self::StopSubscribe => 0x07,
            Self::SubscribeAck => 0x08,
            Self::SubscribeNack => 0x09,
        }
    }

    const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::FindService),
            0x01 => Some(Self::OfferService),
            0x02 => Some(Self::StopOfferService),
            0x06 => Some(Self::Subscribe),
            0x07 => Some(Self::StopSubscribe),
            0x08 => Some(Self::SubscribeAck),
            0x09 => Some(Self::SubscribeNack),
            _ => None,
        }
    }
}

/// A single discovery entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entry {
    /// Kind of entry.
    pub entry_type: EntryType,
    /// Service the entry refers to.
    pub key: ServiceKey,
    /// Event group the entry refers to, if it concerns a subscription.
    pub group: EventGroupId,
}

impl Entry {
    const SIZE: usize = 7;

    fn service(entry_type: EntryType, key: ServiceKey) -> Self {
        Self {
            entry_type,
            key,
            group: EventGroupId::default(),
        }
    }

    fn subscription(entry_type: EntryType, key: ServiceKey, group: EventGroupId) -> Self {
        Self {
            entry_type,
            key,
            group,
        }
    }

    /// Creates a [`EntryType::FindService`] entry.
    pub fn find(key: ServiceKey) -> Self {
        Self::service(EntryType::FindService, key)
    }

    /// Creates a [`EntryType::OfferService`] entry.
    pub fn offer(key: ServiceKey) -> Self {
        Self::service(EntryType::OfferService, key)
    }

    /// Creates a [`EntryType::StopOfferService`] entry.
    pub fn stop_offer(key: ServiceKey) -> Self {
        Self::service(EntryType::StopOfferService, key)
    }

    /// Creates a [`EntryType::Subscribe`] entry.
    pub fn subscribe(key: ServiceKey, group: EventGroupId) -> Self {
        Self::subscription(EntryType::Subscribe, key, group)
    }

    /// Creates a [`EntryType::StopSubscribe`] entry.
    pub fn stop_subscribe(key: ServiceKey, group: EventGroupId) -> Self {
        Self::subscription(EntryType::StopSubscribe, key, group)
    }

    /// Creates a [`EntryType::SubscribeAck`] entry.
    pub fn ack(key: ServiceKey, group: EventGroupId) -> Self {
        Self::subscription(EntryType::SubscribeAck, key, group)
    }

    /// Creates a [`EntryType::SubscribeNack`] entry.
    pub fn nack(key: ServiceKey, group: EventGroupId) -> Self {
        Self::subscription(EntryType::SubscribeNack, key, group)
    }
}

impl Serialize for Entry {
    fn serialize(&self, buffer: &mut impl BufMut) -> Result<usize, SerializeError> {
        let mut size = self.entry_type.as_u8().serialize(buffer)?;
        size += self.key.service.serialize(buffer)?;
        size += self.key.instance.serialize(buffer)?;
        size += self.group.serialize(buffer)?;
        Ok(size)
    }

    fn size_hint(&self) -> usize {
        Self::SIZE
    }
}

impl Deserialize for Entry {
    type Output = Self;

    fn deserialize(buffer: &mut Bytes) -> Result<Self::Output, DeserializeError> {
        let entry_type = EntryType::from_u8(u8::deserialize(buffer)?).ok_or(DeserializeError)?;
        let service = ServiceId::deserialize(buffer)?;
        let instance = InstanceId::deserialize(buffer)?;
        let group = EventGroupId::deserialize(buffer)?;
        Ok(Self {
            entry_type,
            key: ServiceKey::new(service, instance),
            group,
        })
    }
}

/// Creates a discovery message carrying the given entries.
///
/// # Errors
///
/// Returns an error if the entries cannot be serialized.
///
/// # Examples
///
/// ```rust
/// use rsomeip_core::discovery::{self, Entry};
/// use rsomeip_core::someip::{InstanceId, ServiceId, ServiceKey};
///
/// let key = ServiceKey::new(ServiceId::new(0x1234), InstanceId::new(0x5678));
/// let message = discovery::message(&[Entry::offer(key)]).expect("should serialize");
/// assert!(discovery::is_discovery(&message));
/// assert_eq!(discovery::entries(&message), Ok(vec![Entry::offer(key)]));
/// ```
pub fn message(entries: &[Entry]) -> Result<Message, SerializeError> {
    let key = ServiceKey::new(ServiceId::DISCOVERY, InstanceId::DISCOVERY);
    Ok(Message::request(key, METHOD)
        .with_message_type(MessageType::Notification)
        .with_payload(entries.to_bytes()?))
}

/// Whether the message carries discovery entries.
pub fn is_discovery(message: &Message) -> bool {
    message.service == ServiceId::DISCOVERY
        && message.method == METHOD
        && message.message_type == MessageType::Notification
}

/// Returns the entries carried by a discovery message.
///
/// # Errors
///
/// Returns an error if the payload contains an unknown or truncated entry.
pub fn entries(message: &Message) -> Result<Vec<Entry>, DeserializeError> {
    Vec::<Entry>::deserialize(&mut message.payload.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ServiceKey {
        ServiceKey::new(ServiceId::new(0x1234), InstanceId::new(0x5678))
    }

    #[test]
    fn entries_are_batched_in_one_message() {
        let group = EventGroupId::new(0x4465);
        let batch = [
            Entry::find(key()),
            Entry::offer(key()),
            Entry::stop_offer(key()),
            Entry::subscribe(key(), group),
            Entry::stop_subscribe(key(), group),
            Entry::ack(key(), group),
            Entry::nack(key(), group),
        ];
        let message = message(&batch).expect("should serialize");
        assert_eq!(message.payload.len(), batch.len() * Entry::SIZE);
        assert_eq!(entries(&message), Ok(batch.to_vec()));
    }

    #[test]
    fn entry_layout() {
        let entry = Entry::subscribe(key(), EventGroupId::new(0x4465));
        let bytes = entry.to_bytes().expect("should serialize");
        assert_eq!(&bytes[..], &[0x06, 0x12, 0x34, 0x56, 0x78, 0x44, 0x65]);
    }

    #[test]
    fn unknown_entries_are_rejected() {
        let mut message = message(&[Entry::offer(key())]).expect("should serialize");
        message.payload = Bytes::from_static(&[0x05, 0x12, 0x34, 0x56, 0x78, 0x00, 0x00]);
        assert_eq!(entries(&message), Err(DeserializeError));
        message.payload = Bytes::from_static(&[0x01, 0x12]);
        assert_eq!(entries(&message), Err(DeserializeError));
    }

    #[test]
    fn regular_messages_are_not_discovery() {
        let message = Message::request(key(), METHOD);
        assert!(!is_discovery(&message));
    }
}
