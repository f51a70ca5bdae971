use super::*;
use crate::someip::{InstanceId, MessageType, ReturnCode, ServiceId};
use std::{collections::HashSet, time::Duration};

const PEER: PeerAddress = PeerAddress::Local(2);

fn key() -> ServiceKey {
    ServiceKey::new(ServiceId::new(0x1234), InstanceId::new(0x5678))
}

fn request() -> Message {
    Message::request(key(), MethodId::new(0x0421)).with_payload("Hello, Server!")
}

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

#[test]
fn sessions_are_unique_among_requests_in_flight() {
    let router = RoutingEngine::new(ClientId::new(0x0001));
    let sessions: HashSet<SessionId> = (0..100)
        .map(|_| {
            router
                .begin(request(), PEER, deadline(), Continuation::Handler)
                .expect("should begin")
                .session
        })
        .collect();
    assert_eq!(sessions.len(), 100);
    assert!(!sessions.contains(&SessionId::DISABLED));
    assert_eq!(router.in_flight(), 100);
}

#[test]
fn sessions_skip_ids_in_flight_after_wrapping() {
    let router = RoutingEngine::new(ClientId::new(0x0001));
    let first = router
        .begin(request(), PEER, deadline(), Continuation::Handler)
        .expect("should begin");
    assert_eq!(first.session, SessionId::new(1));
    for _ in 0..0xfffe {
        let message = router.assign(request()).expect("should assign");
        assert_ne!(message.session, first.session);
    }
    let next = router.assign(request()).expect("should assign");
    assert_eq!(next.session, SessionId::new(2));
}

#[test]
fn requests_carry_the_client_id() {
    let router = RoutingEngine::new(ClientId::new(0x0042));
    let message = router
        .begin(request(), PEER, deadline(), Continuation::Handler)
        .expect("should begin");
    assert_eq!(message.client, ClientId::new(0x0042));
    assert_eq!(&message.payload[..], b"Hello, Server!");
}

#[test]
fn responses_complete_matching_requests_once() {
    let router = RoutingEngine::new(ClientId::new(0x0001));
    let message = router
        .begin(request(), PEER, deadline(), Continuation::Handler)
        .expect("should begin");
    let response = message.to_response().with_payload("Response from Server!");

    let pending = router.complete(&response).expect("should match");
    assert_eq!(pending.request.request_id(), message.request_id());
    assert_eq!(pending.peer, Some(PEER));
    assert!(pending.request.payload.is_empty());
    assert!(router.complete(&response).is_none());
}

#[test]
fn unsolicited_responses_are_ignored() {
    let router = RoutingEngine::new(ClientId::new(0x0001));
    let message = router
        .begin(request(), PEER, deadline(), Continuation::Handler)
        .expect("should begin");

    let other_client = message.to_response().with_client(ClientId::new(0x0002));
    assert!(router.complete(&other_client).is_none());

    let other_session = message.to_response().with_session(SessionId::new(0x0100));
    assert!(router.complete(&other_session).is_none());

    let mut other_service = message.to_response();
    other_service.service = ServiceId::new(0x4321);
    assert!(router.complete(&other_service).is_none());

    assert_eq!(router.in_flight(), 1);
}

#[test]
fn expired_requests_are_removed() {
    let router = RoutingEngine::new(ClientId::new(0x0001));
    let now = Instant::now();
    let early = router
        .begin(request(), PEER, now, Continuation::Handler)
        .expect("should begin");
    let late = router
        .begin(
            request(),
            PEER,
            now + Duration::from_secs(10),
            Continuation::Handler,
        )
        .expect("should begin");

    let expired = router.expire(now);
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].request.request_id(), early.request_id());
    assert!(router.expire(now).is_empty());
    assert!(router.complete(&early.to_response()).is_none());
    assert!(router.complete(&late.to_response()).is_some());
}

#[test]
fn failing_a_peer_only_removes_its_requests() {
    let router = RoutingEngine::new(ClientId::new(0x0001));
    router
        .begin(request(), PEER, deadline(), Continuation::Handler)
        .expect("should begin");
    router
        .begin(
            request(),
            PeerAddress::Local(3),
            deadline(),
            Continuation::Handler,
        )
        .expect("should begin");

    let failed = router.fail_peer(PEER);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].peer, Some(PEER));
    assert_eq!(router.drain().len(), 1);
    assert_eq!(router.in_flight(), 0);
}

#[test]
fn aborted_requests_are_removed() {
    let router = RoutingEngine::new(ClientId::new(0x0001));
    let message = router
        .begin(request(), PEER, deadline(), Continuation::Handler)
        .expect("should begin");
    assert!(router.abort(message.request_id()).is_some());
    assert!(router.abort(message.request_id()).is_none());
}

#[test]
fn inbound_requests_need_an_offer_and_a_handler() {
    let registry = ServiceRegistry::new();
    let router = RoutingEngine::new(ClientId::new(0x0001));

    let error = router
        .dispatch(&registry, &request())
        .err()
        .expect("should fail");
    assert!(matches!(error, Error::ServiceNotFound(k) if k == key()));
    assert_eq!(error.return_code(), ReturnCode::UnknownService);

    let _ = registry.offer(key());
    let error = router
        .dispatch(&registry, &request())
        .err()
        .expect("should fail");
    assert_eq!(error.return_code(), ReturnCode::UnknownMethod);

    router.register(key(), MethodId::new(0x0421), Arc::new(|_| {}));
    assert!(router.dispatch(&registry, &request()).is_ok());

    let _ = registry.stop_offer(key());
    assert!(router.dispatch(&registry, &request()).is_err());
}

#[test]
fn callbacks_are_kept_with_the_request() {
    let router = RoutingEngine::new(ClientId::new(0x0001));
    let (sender, receiver) = std::sync::mpsc::channel::<Result<Message, Error>>();
    let message = router
        .begin(
            request(),
            PEER,
            deadline(),
            Continuation::Callback(Box::new(move |result| {
                let _ = sender.send(result);
            })),
        )
        .expect("should begin");
    let response = message.to_response();
    let pending = router.complete(&response).expect("should match");
    let Continuation::Callback(callback) = pending.continuation else {
        panic!("should keep the callback");
    };
    callback(Ok(response.clone()));
    let received = receiver.try_recv().expect("should be sent").expect("should be ok");
    assert_eq!(received.message_type, MessageType::Response);
    assert_eq!(received, response);
}
