use rsomeip_core::someip::{ClientId, EventGroupId, EventId, InstanceId, MethodId, ServiceId};
use std::net::SocketAddr;

/// ID of the service.
pub const SAMPLE_SERVICE_ID: ServiceId = ServiceId::new(0x1234);

/// ID of the service instance.
pub const SAMPLE_INSTANCE_ID: InstanceId = InstanceId::new(0x5678);

/// ID of the method.
pub const SAMPLE_METHOD_ID: MethodId = MethodId::new(0x0421);

/// ID of the event.
pub const SAMPLE_EVENT_ID: EventId = EventId::new(0x8778);

/// ID of the event group.
pub const SAMPLE_EVENTGROUP_ID: EventGroupId = EventGroupId::new(0x4465);

/// Client ID of the service provider.
#[allow(dead_code, reason = "false positive")]
pub const SERVER_CLIENT_ID: ClientId = ClientId::new(0x0100);

/// Client ID of the service consumer.
#[allow(dead_code, reason = "false positive")]
pub const CLIENT_CLIENT_ID: ClientId = ClientId::new(0x0200);

/// Returns the address of the service provider.
pub fn server_address() -> SocketAddr {
    ([127, 0, 0, 1], 30509).into()
}

/// Returns the address of the service consumer.
pub fn client_address() -> SocketAddr {
    ([127, 0, 0, 1], 30510).into()
}

/// Prints `tracing` output to stdout. The filter is read from `RUST_LOG`.
pub fn configure_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}
