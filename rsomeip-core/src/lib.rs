//! Service registry, routing and event core for [Scalable service-Oriented MiddlewarE over IP
//! (SOME/IP)](https://some-ip.com/) style applications.
//!
//! ## Overview
//!
//! A [`Runtime`] creates [`Application`]s. Each application can offer services and handle
//! requests to their methods, request services offered by other applications and send requests
//! to them, and publish or subscribe to events grouped in event groups.
//!
//! ```no_run
//! use rsomeip_core::{
//!     someip::{InstanceId, MethodId, ServiceId},
//!     Config, Runtime, State,
//! };
//!
//! let runtime = Runtime::new();
//! let server = runtime
//!     .create_application("server", Config::default())
//!     .expect("should create the application");
//! let weak = server.downgrade();
//! server
//!     .register_state_handler(move |state| {
//!         if let (State::Registered, Some(server)) = (state, weak.upgrade()) {
//!             let _ = server.offer_service(ServiceId::new(0x1234), InstanceId::new(0x5678));
//!         }
//!     })
//!     .expect("should register the handler");
//! let weak = server.downgrade();
//! server
//!     .register_message_handler(
//!         ServiceId::new(0x1234),
//!         InstanceId::new(0x5678),
//!         MethodId::new(0x0421),
//!         move |request| {
//!             if let Some(server) = weak.upgrade() {
//!                 let _ = server.send(request.to_response().with_payload("pong"));
//!             }
//!         },
//!     )
//!     .expect("should register the handler");
//! server.start().expect("should run until stopped");
//! ```

#![warn(
    clippy::nursery,
    clippy::pedantic,
    clippy::expect_used,
    clippy::unwrap_used
)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::future_not_send
)]

pub mod application;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod event;
pub mod registry;
pub mod router;
pub mod someip;
pub(crate) mod support;
pub(crate) mod testing;
pub mod transport;

mod error;
pub use error::{Error, Result};

pub mod runtime;
pub use application::{
    Application, Availability, PendingResponse, PeriodicHandle, State, WeakApplication,
};
pub use config::Config;
pub use event::EventType;
pub use runtime::Runtime;
