use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn key() -> ServiceKey {
    ServiceKey::new(ServiceId::new(0x1234), InstanceId::new(0x5678))
}

#[test]
fn repeated_offers_produce_one_transition() {
    let registry = ServiceRegistry::new();
    assert!(registry.request(key()));

    let update = registry.offer(key());
    assert!(update.changed);
    assert_eq!(
        update.change(),
        Some(AvailabilityChange {
            key: key(),
            available: true
        })
    );

    let update = registry.offer(key());
    assert!(!update.changed);
    assert_eq!(update.change(), None);
    assert!(registry.is_available(&key()));
}

#[test]
fn availability_follows_the_latest_call() {
    let registry = ServiceRegistry::new();
    registry.request(key());
    let sequence = [true, false, false, true, true, false];
    let mut available = false;
    let mut transitions = 0;
    for offer in sequence {
        let update = if offer {
            registry.offer(key())
        } else {
            registry.stop_offer(key())
        };
        if offer != available {
            transitions += 1;
            assert_eq!(update.availability, Some(offer));
        } else {
            assert_eq!(update.availability, None);
        }
        available = offer;
        assert_eq!(registry.is_available(&key()), offer);
    }
    assert_eq!(transitions, 4);
}

#[test]
fn transitions_are_only_reported_for_interesting_services() {
    let registry = ServiceRegistry::new();
    let update = registry.offer(key());
    assert!(update.changed);
    assert_eq!(update.availability, None);
}

#[test]
fn remote_offers_make_services_available() {
    let registry = ServiceRegistry::new();
    registry.request(key());
    let peer = PeerAddress::Local(2);

    let update = registry.add_remote(key(), peer);
    assert_eq!(update.availability, Some(true));
    assert_eq!(registry.route(&key()), Some(peer));
    assert!(!registry.add_remote(key(), peer).changed);

    let update = registry.remove_remote(key(), PeerAddress::Local(3));
    assert!(!update.changed);
    assert!(registry.is_available(&key()));

    let update = registry.remove_remote(key(), peer);
    assert_eq!(update.availability, Some(false));
    assert_eq!(registry.route(&key()), None);
}

#[test]
fn local_offers_take_precedence() {
    let registry = ServiceRegistry::new();
    let local = PeerAddress::Local(1);
    registry.set_local(local);
    let _ = registry.add_remote(key(), PeerAddress::Local(2));
    let _ = registry.offer(key());
    assert_eq!(registry.route(&key()), Some(local));
    assert!(registry.is_offered(&key()));
}

#[test]
fn removing_a_peer_drops_its_offers() {
    let registry = ServiceRegistry::new();
    let other = ServiceKey::new(ServiceId::new(0x4321), InstanceId::new(0x0001));
    registry.request(key());
    let _ = registry.add_remote(key(), PeerAddress::Local(2));
    let _ = registry.add_remote(other, PeerAddress::Local(3));

    let updates = registry.remove_peer(PeerAddress::Local(2));
    assert_eq!(updates.len(), 1);
    assert_eq!(
        updates[0].change(),
        Some(AvailabilityChange {
            key: key(),
            available: false
        })
    );
    assert!(registry.is_available(&other));
}

#[test]
fn handlers_are_kept_until_cleared() {
    let registry = ServiceRegistry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let handler: AvailabilityHandler = Arc::new(move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(!registry.register_handler(key(), handler));
    let _ = registry.offer(key());
    for handler in registry.handlers(&key()) {
        handler(key().service, key().instance, true);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Releasing keeps the interest alive while handlers exist.
    registry.request(key());
    assert!(registry.release(key()));
    assert!(!registry.release(key()));
    assert_eq!(registry.handlers(&key()).len(), 1);

    registry.clear();
    assert!(registry.handlers(&key()).is_empty());
    assert!(!registry.is_available(&key()));
}

#[test]
fn handler_registered_on_available_service_is_told() {
    let registry = ServiceRegistry::new();
    let _ = registry.offer(key());
    assert!(registry.register_handler(key(), Arc::new(|_, _, _| {})));
}

#[test]
fn watchers_observe_transitions() {
    let registry = ServiceRegistry::new();
    let receiver = registry.watch(key());
    assert!(!*receiver.borrow());
    let _ = registry.offer(key());
    assert!(*receiver.borrow());
    registry.clear();
    assert!(receiver.has_changed().is_err());
}

#[test]
fn requested_and_offered_are_listed() {
    let registry = ServiceRegistry::new();
    let other = ServiceKey::new(ServiceId::new(0x0001), InstanceId::new(0x0001));
    registry.request(key());
    assert!(!registry.request(key()));
    let _ = registry.offer(other);
    assert_eq!(registry.requested(), vec![key()]);
    assert_eq!(registry.offered(), vec![other]);
    assert!(!registry.release(other));
}
