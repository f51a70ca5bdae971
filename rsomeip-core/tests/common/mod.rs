#![allow(dead_code, reason = "not every test uses every helper")]

use rsomeip_core::{
    someip::{EventGroupId, EventId, InstanceId, MethodId, ServiceId, ServiceKey},
    Application, Result,
};
use std::{
    sync::{mpsc, Mutex},
    thread,
    time::{Duration, Instant},
};

pub const SERVICE: ServiceId = ServiceId::new(0x1234);
pub const INSTANCE: InstanceId = InstanceId::new(0x5678);
pub const METHOD: MethodId = MethodId::new(0x0421);
pub const EVENT: EventId = EventId::new(0x8778);
pub const GROUP: EventGroupId = EventGroupId::new(0x4465);

/// Upper bound for anything a test waits on.
pub const DEADLINE: Duration = Duration::from_secs(5);

/// How long a test waits to be confident that nothing else arrives.
pub const QUIET: Duration = Duration::from_millis(200);

pub fn key() -> ServiceKey {
    ServiceKey::new(SERVICE, INSTANCE)
}

/// Installs a `tracing` subscriber writing to the test output.
pub fn configure_tracing() {
    use std::sync::OnceLock;
    static TRACING: OnceLock<()> = OnceLock::new();
    TRACING.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::DEBUG.into())
                    .from_env_lossy(),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A started application and the thread processing its messages.
pub struct Running {
    pub application: Application,
    thread: Option<thread::JoinHandle<Result<()>>>,
}

impl Running {
    /// Starts the application, and waits until it runs.
    pub fn start(application: Application) -> Self {
        let thread = application.start_detached().expect("should start");
        application.wait_running().expect("should run");
        Self {
            application,
            thread: Some(thread),
        }
    }

    /// Stops the application, and waits for its thread.
    pub fn shutdown(mut self) {
        self.application.stop();
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .expect("should join the thread")
                .expect("should stop cleanly");
        }
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.application.stop();
    }
}

impl std::ops::Deref for Running {
    type Target = Application;

    fn deref(&self) -> &Self::Target {
        &self.application
    }
}

/// Returns a sender usable from `Fn` handlers, and its receiver.
pub fn channel<T: Send + 'static>() -> (impl Fn(T) + Send + Sync + 'static, mpsc::Receiver<T>) {
    let (sender, receiver) = mpsc::channel();
    let sender = Mutex::new(sender);
    let send = move |value| {
        let _ = sender
            .lock()
            .expect("should lock the sender")
            .send(value);
    };
    (send, receiver)
}

/// Polls `condition` until it holds, or panics after [`DEADLINE`].
pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < DEADLINE, "timed out waiting until {what}");
        thread::sleep(Duration::from_millis(5));
    }
}
