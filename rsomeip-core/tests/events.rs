#![allow(clippy::expect_used, reason = "helps to reduce verbosity")]

use rsomeip_core::{
    event::SubscriptionState,
    someip::{InstanceId, Message, MethodId, ServiceId},
    Config, Error, EventType, Runtime,
};
use std::{sync::mpsc, thread, time::Duration};

mod common;
use common::{
    channel, configure_tracing, key, wait_until, Running, DEADLINE, EVENT, GROUP, INSTANCE, METHOD,
    QUIET, SERVICE,
};

/// Starts an application that offers the service and its event, and echoes requests to
/// [`METHOD`].
fn event_server(runtime: &Runtime, event_type: EventType, cycle: Option<Duration>) -> Running {
    let server = runtime
        .create_application("server", Config::default())
        .expect("should create the server");
    let weak = server.downgrade();
    server
        .register_message_handler(SERVICE, INSTANCE, METHOD, move |request| {
            if let Some(server) = weak.upgrade() {
                let response = request.to_response().with_payload(request.payload.clone());
                server.send(response).expect("should send the response");
            }
        })
        .expect("should register the handler");
    server
        .offer_service(SERVICE, INSTANCE)
        .expect("should offer the service");
    server
        .offer_event(SERVICE, INSTANCE, EVENT, &[GROUP], event_type, cycle)
        .expect("should offer the event");
    Running::start(server)
}

/// Starts an application subscribed to the event group, and returns the notifications it gets.
fn subscriber(
    runtime: &Runtime,
    name: &str,
    event_type: EventType,
) -> (Running, mpsc::Receiver<Message>) {
    let client = runtime
        .create_application(name, Config::default())
        .expect("should create the client");
    let (on_notification, notifications) = channel::<Message>();
    client
        .register_message_handler(SERVICE, INSTANCE, MethodId::from(EVENT), on_notification)
        .expect("should register the handler");
    client
        .request_service(SERVICE, INSTANCE)
        .expect("should request the service");
    client
        .request_event(SERVICE, INSTANCE, EVENT, &[GROUP], event_type)
        .expect("should request the event");
    client
        .subscribe(SERVICE, INSTANCE, GROUP)
        .expect("should subscribe");
    let client = Running::start(client);
    wait_subscribed(&client);
    (client, notifications)
}

fn wait_subscribed(client: &Running) {
    wait_until("the subscription is accepted", || {
        matches!(
            client.subscription(SERVICE, INSTANCE, GROUP),
            Some(SubscriptionState::Subscribed(_))
        )
    });
}

/// Sends a request and waits for its response, so that everything sent before it was processed.
fn round_trip(client: &Running) {
    client
        .request(Message::request(key(), METHOD))
        .expect("should send the request")
        .wait()
        .expect("should receive the response");
}

#[test]
fn notifications_fan_out_to_every_subscriber() {
    const SUBSCRIBERS: usize = 3;
    configure_tracing();
    let runtime = Runtime::new();
    let server = event_server(&runtime, EventType::Event, None);
    let subscribers: Vec<_> = (0..SUBSCRIBERS)
        .map(|index| subscriber(&runtime, &format!("client-{index}"), EventType::Event))
        .collect();

    let delivered = server
        .notify(SERVICE, INSTANCE, EVENT, "fan-out")
        .expect("should notify");
    assert_eq!(delivered, SUBSCRIBERS);
    for (_, notifications) in &subscribers {
        let notification = notifications
            .recv_timeout(DEADLINE)
            .expect("should receive the notification");
        assert_eq!(&notification.payload[..], b"fan-out");
    }
    thread::sleep(QUIET);
    for (_, notifications) in &subscribers {
        assert!(notifications.try_recv().is_err(), "should be notified once");
    }

    for (client, _) in subscribers {
        client.shutdown();
    }
    server.shutdown();
}

#[test]
fn unsubscribed_clients_are_not_notified() {
    configure_tracing();
    let runtime = Runtime::new();
    let server = event_server(&runtime, EventType::Event, None);
    let (leaving, left) = subscriber(&runtime, "leaving", EventType::Event);
    let (staying, stayed) = subscriber(&runtime, "staying", EventType::Event);

    leaving
        .unsubscribe(SERVICE, INSTANCE, GROUP)
        .expect("should unsubscribe");
    assert_eq!(leaving.subscription(SERVICE, INSTANCE, GROUP), None);
    round_trip(&leaving);

    let delivered = server
        .notify(SERVICE, INSTANCE, EVENT, "after")
        .expect("should notify");
    assert_eq!(delivered, 1);
    stayed
        .recv_timeout(DEADLINE)
        .expect("should notify the remaining subscriber");
    thread::sleep(QUIET);
    assert!(left.try_recv().is_err());

    staying
        .unsubscribe(SERVICE, INSTANCE, GROUP)
        .expect("should unsubscribe");
    round_trip(&staying);
    let delivered = server
        .notify(SERVICE, INSTANCE, EVENT, "nobody")
        .expect("should notify");
    assert_eq!(delivered, 0);

    leaving.shutdown();
    staying.shutdown();
    server.shutdown();
}

#[test]
fn released_events_are_no_longer_delivered() {
    configure_tracing();
    let runtime = Runtime::new();
    let server = event_server(&runtime, EventType::Event, None);
    let (client, notifications) = subscriber(&runtime, "client", EventType::Event);

    server
        .notify(SERVICE, INSTANCE, EVENT, "before")
        .expect("should notify");
    let notification = notifications
        .recv_timeout(DEADLINE)
        .expect("should receive the notification");
    assert_eq!(&notification.payload[..], b"before");

    client
        .release_event(SERVICE, INSTANCE, EVENT)
        .expect("should release the event");
    let delivered = server
        .notify(SERVICE, INSTANCE, EVENT, "after")
        .expect("should notify");
    assert_eq!(delivered, 1);
    // The response comes after the notification, so the notification was handled by then.
    round_trip(&client);
    assert!(notifications.try_recv().is_err());

    client.shutdown();
    server.shutdown();
}

#[test]
fn fields_send_their_last_value_to_new_subscribers() {
    configure_tracing();
    let runtime = Runtime::new();
    let server = event_server(&runtime, EventType::Field, None);
    let delivered = server
        .notify(SERVICE, INSTANCE, EVENT, "42")
        .expect("should update the field");
    assert_eq!(delivered, 0);

    let (client, notifications) = subscriber(&runtime, "client", EventType::Field);
    let initial = notifications
        .recv_timeout(DEADLINE)
        .expect("should receive the initial value");
    assert_eq!(&initial.payload[..], b"42");

    server
        .notify(SERVICE, INSTANCE, EVENT, "43")
        .expect("should update the field");
    let update = notifications
        .recv_timeout(DEADLINE)
        .expect("should receive the update");
    assert_eq!(&update.payload[..], b"43");

    client.shutdown();
    server.shutdown();
}

#[test]
fn cyclic_events_repeat_their_last_value() {
    configure_tracing();
    let runtime = Runtime::new();
    let server = event_server(&runtime, EventType::Event, Some(Duration::from_millis(20)));
    let (client, notifications) = subscriber(&runtime, "client", EventType::Event);

    // Nothing is repeated before the first value.
    thread::sleep(Duration::from_millis(100));
    assert!(notifications.try_recv().is_err());

    server
        .notify(SERVICE, INSTANCE, EVENT, "tick")
        .expect("should notify");
    for _ in 0..3 {
        let notification = notifications
            .recv_timeout(DEADLINE)
            .expect("should receive the notification");
        assert_eq!(&notification.payload[..], b"tick");
    }

    server
        .stop_offer_event(SERVICE, INSTANCE, EVENT)
        .expect("should stop offering the event");
    assert!(matches!(
        server.notify(SERVICE, INSTANCE, EVENT, "gone"),
        Err(Error::NotOffered { .. })
    ));
    round_trip(&client);
    thread::sleep(QUIET);
    while notifications.try_recv().is_ok() {}
    thread::sleep(QUIET);
    assert!(notifications.try_recv().is_err(), "should stop repeating");

    client.shutdown();
    server.shutdown();
}

#[test]
fn offering_twice_reports_availability_once() {
    configure_tracing();
    let runtime = Runtime::new();
    let server = event_server(&runtime, EventType::Event, None);

    let client = runtime
        .create_application("client", Config::default())
        .expect("should create the client");
    let (on_availability, availability) = channel::<(ServiceId, InstanceId, bool)>();
    client
        .register_availability_handler(SERVICE, INSTANCE, move |service, instance, available| {
            on_availability((service, instance, available));
        })
        .expect("should register the handler");
    client
        .request_service(SERVICE, INSTANCE)
        .expect("should request the service");
    let client = Running::start(client);
    assert_eq!(
        availability.recv_timeout(DEADLINE).expect("should be told"),
        (SERVICE, INSTANCE, true)
    );

    server
        .offer_service(SERVICE, INSTANCE)
        .expect("should offer the service again");
    round_trip(&client);
    thread::sleep(QUIET);
    assert!(availability.try_recv().is_err());

    server
        .stop_offer_service(SERVICE, INSTANCE)
        .expect("should stop offering");
    assert_eq!(
        availability.recv_timeout(DEADLINE).expect("should be told"),
        (SERVICE, INSTANCE, false)
    );
    server
        .stop_offer_service(SERVICE, INSTANCE)
        .expect("should stop offering again");
    thread::sleep(QUIET);
    assert!(availability.try_recv().is_err());

    client.shutdown();
    server.shutdown();
}

#[test]
fn subscriptions_survive_a_restarted_offer() {
    configure_tracing();
    let runtime = Runtime::new();
    let server = event_server(&runtime, EventType::Event, None);
    let (client, notifications) = subscriber(&runtime, "client", EventType::Event);

    server
        .stop_offer_service(SERVICE, INSTANCE)
        .expect("should stop offering");
    wait_until("the subscription is pending", || {
        client.subscription(SERVICE, INSTANCE, GROUP) == Some(SubscriptionState::Pending)
    });
    assert_eq!(
        server
            .notify(SERVICE, INSTANCE, EVENT, "lost")
            .expect("should notify"),
        0
    );

    server
        .offer_service(SERVICE, INSTANCE)
        .expect("should offer the service again");
    wait_subscribed(&client);
    assert_eq!(
        server
            .notify(SERVICE, INSTANCE, EVENT, "back")
            .expect("should notify"),
        1
    );
    let notification = notifications
        .recv_timeout(DEADLINE)
        .expect("should receive the notification");
    assert_eq!(&notification.payload[..], b"back");

    client.shutdown();
    server.shutdown();
}
