use super::*;
use crate::someip::{InstanceId, ServiceId};

const EVENT: EventId = EventId::new(0x8778);
const GROUP: EventGroupId = EventGroupId::new(0x4465);

fn key() -> ServiceKey {
    ServiceKey::new(ServiceId::new(0x1234), InstanceId::new(0x5678))
}

fn offered() -> EventSubsystem {
    let events = EventSubsystem::new();
    events
        .offer_event(key(), EVENT, &[GROUP], EventType::Event)
        .expect("should offer the event");
    events
}

#[test]
fn events_need_at_least_one_valid_group() {
    let events = EventSubsystem::new();
    assert!(events
        .offer_event(key(), EVENT, &[], EventType::Event)
        .is_err());
    assert!(events
        .offer_event(key(), EVENT, &[EventGroupId::new(0)], EventType::Event)
        .is_err());
    assert!(events.request_event(key(), EVENT, &[], EventType::Event).is_err());
}

#[test]
fn notifications_reach_every_subscriber() {
    let events = offered();
    for id in 1..=3 {
        events
            .add_subscriber(key(), GROUP, PeerAddress::Local(id))
            .expect("should subscribe");
    }
    let targets = events
        .notify(key(), EVENT, Bytes::from_static(b"tick"))
        .expect("should notify");
    assert_eq!(
        targets,
        vec![
            PeerAddress::Local(1),
            PeerAddress::Local(2),
            PeerAddress::Local(3)
        ]
    );
}

#[test]
fn peers_in_several_groups_are_notified_once() {
    let events = EventSubsystem::new();
    let other = EventGroupId::new(0x0001);
    events
        .offer_event(key(), EVENT, &[GROUP, other], EventType::Event)
        .expect("should offer the event");
    let peer = PeerAddress::Local(7);
    events.add_subscriber(key(), GROUP, peer).expect("should subscribe");
    events.add_subscriber(key(), other, peer).expect("should subscribe");
    let targets = events
        .notify(key(), EVENT, Bytes::new())
        .expect("should notify");
    assert_eq!(targets, vec![peer]);
}

#[test]
fn unsubscribed_peers_are_not_notified() {
    let events = offered();
    let peer = PeerAddress::Local(2);
    events.add_subscriber(key(), GROUP, peer).expect("should subscribe");
    assert!(events.remove_subscriber(key(), GROUP, peer));
    assert!(!events.remove_subscriber(key(), GROUP, peer));
    assert!(events
        .notify(key(), EVENT, Bytes::new())
        .expect("should notify")
        .is_empty());
}

#[test]
fn notifying_unknown_events_fails() {
    let events = EventSubsystem::new();
    assert!(matches!(
        events.notify(key(), EVENT, Bytes::new()),
        Err(Error::NotOffered { event, .. }) if event == EVENT
    ));
}

#[test]
fn subscribing_to_unknown_groups_fails() {
    let events = offered();
    assert!(matches!(
        events.add_subscriber(key(), EventGroupId::new(0x0002), PeerAddress::Local(2)),
        Err(Error::GroupNotOffered { .. })
    ));
}

#[test]
fn fields_send_their_last_value_to_new_subscribers() {
    let events = EventSubsystem::new();
    events
        .offer_event(key(), EVENT, &[GROUP], EventType::Field)
        .expect("should offer the field");
    let initial = events
        .add_subscriber(key(), GROUP, PeerAddress::Local(2))
        .expect("should subscribe");
    assert!(initial.is_empty());

    let _ = events
        .notify(key(), EVENT, Bytes::from_static(b"42"))
        .expect("should notify");
    let initial = events
        .add_subscriber(key(), GROUP, PeerAddress::Local(3))
        .expect("should subscribe");
    assert_eq!(initial, vec![(EVENT, Bytes::from_static(b"42"))]);
}

#[test]
fn plain_events_send_nothing_to_new_subscribers() {
    let events = offered();
    let _ = events
        .notify(key(), EVENT, Bytes::from_static(b"42"))
        .expect("should notify");
    let initial = events
        .add_subscriber(key(), GROUP, PeerAddress::Local(2))
        .expect("should subscribe");
    assert!(initial.is_empty());
    assert_eq!(events.last_value(key(), EVENT), Some(Bytes::from_static(b"42")));
}

#[test]
fn reoffering_keeps_the_last_value() {
    let events = offered();
    let _ = events.notify(key(), EVENT, Bytes::from_static(b"1"));
    events
        .offer_event(key(), EVENT, &[GROUP], EventType::Field)
        .expect("should offer the field");
    assert_eq!(events.last_value(key(), EVENT), Some(Bytes::from_static(b"1")));
    assert!(events.stop_offer_event(key(), EVENT));
    assert!(!events.stop_offer_event(key(), EVENT));
    assert!(matches!(
        events.add_subscriber(key(), GROUP, PeerAddress::Local(2)),
        Err(Error::GroupNotOffered { .. })
    ));
}

#[test]
fn subscriptions_wait_for_the_service() {
    let events = EventSubsystem::new();
    let peer = PeerAddress::Local(2);
    assert_eq!(events.subscribe(key(), GROUP, None), None);
    assert_eq!(
        events.subscription(key(), GROUP),
        Some(SubscriptionState::Pending)
    );
    assert_eq!(events.pending_services(), vec![key()]);

    assert_eq!(events.resolve(key(), peer), vec![GROUP]);
    assert_eq!(
        events.subscription(key(), GROUP),
        Some(SubscriptionState::Requested(peer))
    );
    assert!(events.resolve(key(), peer).is_empty());

    assert!(events.acknowledge(key(), GROUP, peer));
    assert!(!events.acknowledge(key(), GROUP, peer));
    assert_eq!(
        events.subscription(key(), GROUP),
        Some(SubscriptionState::Subscribed(peer))
    );
}

#[test]
fn notifications_need_a_request_and_a_subscription() {
    let events = EventSubsystem::new();
    let peer = PeerAddress::Local(2);
    assert_eq!(events.accepts(key(), EVENT, peer), None);

    events
        .request_event(key(), EVENT, &[GROUP], EventType::Field)
        .expect("should request the event");
    assert_eq!(events.accepts(key(), EVENT, peer), None);

    let _ = events.subscribe(key(), GROUP, None);
    assert_eq!(events.accepts(key(), EVENT, peer), None);
    let _ = events.resolve(key(), peer);
    assert_eq!(events.accepts(key(), EVENT, peer), Some(EventType::Field));
    assert_eq!(events.accepts(key(), EVENT, PeerAddress::Local(3)), None);

    assert!(events.release_event(key(), EVENT));
    assert!(!events.release_event(key(), EVENT));
    assert_eq!(events.accepts(key(), EVENT, peer), None);
}

#[test]
fn subscribing_twice_sends_once() {
    let events = EventSubsystem::new();
    let peer = PeerAddress::Local(2);
    assert_eq!(events.subscribe(key(), GROUP, Some(peer)), Some(peer));
    assert_eq!(events.subscribe(key(), GROUP, Some(peer)), None);
    assert_eq!(events.unsubscribe(key(), GROUP), Some(peer));
    assert_eq!(events.unsubscribe(key(), GROUP), None);
}

#[test]
fn rejected_and_orphaned_subscriptions_become_pending() {
    let events = EventSubsystem::new();
    let peer = PeerAddress::Local(2);
    let _ = events.subscribe(key(), GROUP, Some(peer));
    events.reject(key(), GROUP, PeerAddress::Local(3));
    assert_eq!(
        events.subscription(key(), GROUP),
        Some(SubscriptionState::Requested(peer))
    );
    events.reject(key(), GROUP, peer);
    assert_eq!(
        events.subscription(key(), GROUP),
        Some(SubscriptionState::Pending)
    );

    let _ = events.resolve(key(), peer);
    events.on_service_unavailable(key());
    assert_eq!(
        events.subscription(key(), GROUP),
        Some(SubscriptionState::Pending)
    );
}

#[test]
fn removing_a_peer_forgets_its_subscriptions() {
    let events = offered();
    let peer = PeerAddress::Local(2);
    events.add_subscriber(key(), GROUP, peer).expect("should subscribe");
    let other = ServiceKey::new(ServiceId::new(0x4321), InstanceId::new(0x0001));
    let _ = events.subscribe(other, GROUP, Some(peer));

    events.remove_peer(peer);
    assert!(events
        .notify(key(), EVENT, Bytes::new())
        .expect("should notify")
        .is_empty());
    assert_eq!(
        events.subscription(other, GROUP),
        Some(SubscriptionState::Pending)
    );
}

#[test]
fn draining_returns_sent_subscriptions() {
    let events = EventSubsystem::new();
    let peer = PeerAddress::Local(2);
    let other = ServiceKey::new(ServiceId::new(0x4321), InstanceId::new(0x0001));
    let _ = events.subscribe(key(), GROUP, Some(peer));
    let _ = events.subscribe(other, GROUP, None);
    assert_eq!(events.drain_subscriptions(), vec![(key(), GROUP, peer)]);
    assert_eq!(events.subscription(other, GROUP), None);
}
