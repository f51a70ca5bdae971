#![allow(clippy::expect_used, reason = "helps to reduce verbosity")]

use rsomeip_core::{Application, Config, EventType, Runtime, State};
use std::time::Duration;

mod common;
use common::{
    client_address, configure_tracing, server_address, SAMPLE_EVENTGROUP_ID, SAMPLE_EVENT_ID,
    SAMPLE_INSTANCE_ID, SAMPLE_METHOD_ID, SAMPLE_SERVICE_ID, SERVER_CLIENT_ID,
};

fn main() {
    configure_tracing();

    // Create the application.
    let config = Config::builder()
        .client_id(SERVER_CLIENT_ID)
        .offer_interval(Duration::from_secs(2))
        .tcp(server_address(), [client_address()])
        .build();
    let application = Runtime::new()
        .create_application("Server", config)
        .expect("should create the application");
    application.init().expect("should initialize the application");

    // Offer the service once the application is registered.
    let weak = application.downgrade();
    application
        .register_state_handler(move |state| {
            if state != State::Registered {
                return;
            }
            let Some(application) = weak.upgrade() else {
                return;
            };
            application
                .offer_service(SAMPLE_SERVICE_ID, SAMPLE_INSTANCE_ID)
                .expect("should offer the service");
            tracing::info!("offered service [{SAMPLE_SERVICE_ID}.{SAMPLE_INSTANCE_ID}]");
        })
        .expect("should register the state handler");

    // Answer requests, and notify subscribers about each of them.
    let weak = application.downgrade();
    application
        .register_message_handler(
            SAMPLE_SERVICE_ID,
            SAMPLE_INSTANCE_ID,
            SAMPLE_METHOD_ID,
            move |request| {
                let Some(application) = weak.upgrade() else {
                    return;
                };
                tracing::info!(
                    "received request from client/session [{}/{}]: {}",
                    request.client,
                    request.session,
                    String::from_utf8_lossy(&request.payload)
                );
                let response = request.to_response().with_payload("Response from Server!");
                application
                    .send(response)
                    .expect("should send the response");
                notify(&application, "Notification triggered by request!");
            },
        )
        .expect("should register the message handler");

    // Offer the event, and repeat its last value every second.
    application
        .offer_event(
            SAMPLE_SERVICE_ID,
            SAMPLE_INSTANCE_ID,
            SAMPLE_EVENT_ID,
            &[SAMPLE_EVENTGROUP_ID],
            EventType::Event,
            Some(Duration::from_secs(1)),
        )
        .expect("should offer the event");

    // Send a fresh notification every 5 seconds.
    let weak = application.downgrade();
    application
        .spawn_periodic(Duration::from_secs(5), move || {
            if let Some(application) = weak.upgrade() {
                notify(&application, "Periodic notification from Server!");
            }
        })
        .expect("should spawn the periodic notification");

    // Process messages until the process is killed.
    application.start().expect("should run the application");
}

fn notify(application: &Application, payload: &'static str) {
    match application.notify(SAMPLE_SERVICE_ID, SAMPLE_INSTANCE_ID, SAMPLE_EVENT_ID, payload) {
        Ok(subscribers) => tracing::info!("notified {subscribers} subscriber(s): {payload}"),
        Err(error) => tracing::warn!("failed to notify subscribers: {error}"),
    }
}
