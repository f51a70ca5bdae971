#![allow(clippy::expect_used, reason = "helps to reduce verbosity")]

use rsomeip_core::{
    someip::{Message, MethodId, ServiceKey},
    Config, EventType, Runtime, State,
};
use std::thread;

mod common;
use common::{
    client_address, configure_tracing, server_address, CLIENT_CLIENT_ID, SAMPLE_EVENTGROUP_ID,
    SAMPLE_EVENT_ID, SAMPLE_INSTANCE_ID, SAMPLE_METHOD_ID, SAMPLE_SERVICE_ID,
};

fn main() {
    configure_tracing();

    // Create the application.
    let config = Config::builder()
        .client_id(CLIENT_CLIENT_ID)
        .tcp(client_address(), [server_address()])
        .build();
    let application = Runtime::new()
        .create_application("Client", config)
        .expect("should create the application");
    application.init().expect("should initialize the application");

    // Register the handlers.
    application
        .register_state_handler(|state| {
            if state == State::Registered {
                tracing::info!("client registered");
            }
        })
        .expect("should register the state handler");
    application
        .register_message_handler(
            SAMPLE_SERVICE_ID,
            SAMPLE_INSTANCE_ID,
            SAMPLE_METHOD_ID,
            |response| {
                tracing::info!(
                    "received response for client/session [{}/{}]: {}",
                    response.client,
                    response.session,
                    String::from_utf8_lossy(&response.payload)
                );
            },
        )
        .expect("should register the response handler");
    application
        .register_message_handler(
            SAMPLE_SERVICE_ID,
            SAMPLE_INSTANCE_ID,
            MethodId::from(SAMPLE_EVENT_ID),
            |notification| {
                tracing::info!(
                    "received notification of event {}: {}",
                    notification.method,
                    String::from_utf8_lossy(&notification.payload)
                );
            },
        )
        .expect("should register the notification handler");
    application
        .register_availability_handler(
            SAMPLE_SERVICE_ID,
            SAMPLE_INSTANCE_ID,
            |service, instance, available| {
                let status = if available { "available" } else { "NOT available" };
                tracing::info!("service [{service}.{instance}] is {status}");
            },
        )
        .expect("should register the availability handler");

    // Look for the service, and subscribe to its event.
    application
        .request_service(SAMPLE_SERVICE_ID, SAMPLE_INSTANCE_ID)
        .expect("should request the service");
    application
        .request_event(
            SAMPLE_SERVICE_ID,
            SAMPLE_INSTANCE_ID,
            SAMPLE_EVENT_ID,
            &[SAMPLE_EVENTGROUP_ID],
            EventType::Event,
        )
        .expect("should request the event");
    application
        .subscribe(SAMPLE_SERVICE_ID, SAMPLE_INSTANCE_ID, SAMPLE_EVENTGROUP_ID)
        .expect("should subscribe to the event group");

    // Send a request as soon as the service is available.
    let mut availability = application
        .availability(SAMPLE_SERVICE_ID, SAMPLE_INSTANCE_ID)
        .expect("should watch the service");
    let sender = {
        let application = application.clone();
        thread::spawn(move || {
            if availability.wait_blocking().is_err() {
                return;
            }
            let key = ServiceKey::new(SAMPLE_SERVICE_ID, SAMPLE_INSTANCE_ID);
            let request = Message::request(key, SAMPLE_METHOD_ID).with_payload("Hello, Server!");
            application.send(request).expect("should send the request");
            tracing::info!("sent request: Hello, Server!");
        })
    };

    // Process messages until the process is killed.
    application.start().expect("should run the application");
    sender.join().expect("should join the sender");
}
