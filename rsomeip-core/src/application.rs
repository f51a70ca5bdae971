//! Applications offering and using services.
//!
//! An [`Application`] owns a [`ServiceRegistry`], a [`RoutingEngine`] and an [`EventSubsystem`],
//! and moves messages between them and its [`Transport`]. Its lifecycle follows [`State`]:
//!
//! 1. Handlers are registered while the application is [`State::Created`] or
//!    [`State::Initialized`].
//! 2. [`Application::init`] binds the transport.
//! 3. [`Application::start`] (or [`Application::run`]) opens the transport, moves through
//!    [`State::Registered`] into [`State::Running`], and processes inbound messages until
//!    [`Application::stop`] is called.
//!
//! Every handler runs in the processing context of the application, one at a time.

use crate::{
    codec::Serialize,
    config::Config,
    discovery::{self, Entry},
    event::{EventSubsystem, EventType, SubscriptionState},
    registry::{AvailabilityHandler, ServiceRegistry, Update},
    router::{Continuation, MessageHandler, PendingRequest, RoutingEngine},
    someip::{
        ClientId, EventGroupId, EventId, InstanceId, Message, MessageType, MethodId, ReturnCode,
        ServiceId, ServiceKey,
    },
    support::sync::{lock, response_channels, ResponseReceiver},
    transport::{PeerAddress, Transport},
    Error, Result,
};
use bytes::Bytes;
use futures::{future::BoxFuture, FutureExt};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
    thread,
    time::Duration,
};
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

mod dispatch;
use dispatch::{Outcome, Work, WorkQueue};

mod periodic;
pub use periodic::PeriodicHandle;

mod state;
pub use state::State;
use state::StateWatcher;

/// Called with the new state of the application.
pub type StateHandler = Arc<dyn Fn(State) + Send + Sync>;

/// Tasks spawned before the application runs are kept until a runtime is available.
#[derive(Default)]
struct Tasks {
    handle: Option<Handle>,
    deferred: Vec<BoxFuture<'static, ()>>,
}

struct Inner {
    name: String,
    client: ClientId,
    config: Config,
    transport: Arc<dyn Transport>,
    state: StateWatcher,
    registry: ServiceRegistry,
    router: RoutingEngine,
    events: EventSubsystem,
    state_handlers: Mutex<Vec<StateHandler>>,
    work: WorkQueue,
    cancel: CancellationToken,
    tasks: Mutex<Tasks>,
    cyclic: Mutex<HashMap<(ServiceKey, EventId), PeriodicHandle>>,
}

/// A SOME/IP application.
///
/// Cloning an [`Application`] returns another handle to the same application. Handlers that need
/// to call back into the application should capture a [`WeakApplication`] instead.
#[derive(Clone)]
pub struct Application {
    inner: Arc<Inner>,
}

/// A weak handle to an [`Application`].
#[derive(Clone)]
pub struct WeakApplication {
    inner: Weak<Inner>,
}

impl WeakApplication {
    /// Returns the application, if it still exists.
    pub fn upgrade(&self) -> Option<Application> {
        self.inner.upgrade().map(|inner| Application { inner })
    }
}

impl std::fmt::Debug for WeakApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakApplication").finish_non_exhaustive()
    }
}

impl Application {
    /// Creates a new [`Application`].
    ///
    /// Applications are usually created by a [`crate::Runtime`], which picks the client id and
    /// the transport.
    pub fn new(
        name: impl Into<String>,
        client: ClientId,
        config: Config,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                client,
                config,
                transport,
                state: StateWatcher::new(),
                registry: ServiceRegistry::new(),
                router: RoutingEngine::new(client),
                events: EventSubsystem::new(),
                state_handlers: Mutex::default(),
                work: WorkQueue::new(),
                cancel: CancellationToken::new(),
                tasks: Mutex::default(),
                cyclic: Mutex::default(),
            }),
        }
    }

    /// Returns the name of the application.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the client id of the application.
    pub fn client_id(&self) -> ClientId {
        self.inner.client
    }

    /// Returns the current state of the application.
    pub fn state(&self) -> State {
        self.inner.state.state()
    }

    /// Returns a weak handle to this application.
    pub fn downgrade(&self) -> WeakApplication {
        WeakApplication {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Acquires the resources of the application.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] if the application is not [`State::Created`].
    /// - [`Error::Initialization`] if the configuration is invalid or the transport cannot be
    ///   bound.
    pub fn init(&self) -> Result<()> {
        let inner = &self.inner;
        inner.require("init", &[State::Created])?;
        inner.config.validate()?;
        let address = inner
            .transport
            .bind()
            .map_err(|error| Error::Initialization(error.to_string()))?;
        inner.registry.set_local(address);
        if !inner.transition(State::Created, State::Initialized) {
            return Err(inner.violation("init"));
        }
        tracing::info!("{} initialized at {address}", inner.name);
        Ok(())
    }

    /// Runs the application on the calling thread until it is stopped.
    ///
    /// Initializes the application first, if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the application cannot be initialized or started.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| Error::Initialization(error.to_string()))?;
        runtime.block_on(self.run())
    }

    /// Runs the application on a dedicated thread.
    ///
    /// The application is initialized before returning. The thread exits when the application
    /// is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the application cannot be initialized, or the thread cannot be
    /// spawned.
    pub fn start_detached(&self) -> Result<thread::JoinHandle<Result<()>>> {
        if self.state() == State::Created {
            self.init()?;
        }
        let application = self.clone();
        thread::Builder::new()
            .name(self.inner.name.clone())
            .spawn(move || application.start())
            .map_err(|error| Error::Initialization(error.to_string()))
    }

    /// Runs the application until it is stopped.
    ///
    /// Must be called from within a tokio runtime, which also runs the periodic tasks of the
    /// application.
    ///
    /// # Errors
    ///
    /// Returns an error if the application cannot be initialized or started.
    pub async fn run(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.state.state() == State::Created {
            self.init()?;
        }
        inner.require("run", &[State::Initialized])?;
        let mut inbound = inner
            .transport
            .open()
            .map_err(|error| Error::Initialization(error.to_string()))?;
        let Some(mut work) = inner.work.take() else {
            return Err(inner.violation("run"));
        };
        inner.attach(Handle::current());

        if !inner.transition(State::Initialized, State::Registered)
            || !inner.transition(State::Registered, State::Running)
        {
            tracing::debug!("{} stopped while starting", inner.name);
            inner.finalize(&mut work);
            return Ok(());
        }
        tracing::info!("{} running", inner.name);
        inner.announce();

        let mut scan = tokio::time::interval(inner.config.timeout_scan_interval);
        scan.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut offers = inner.config.offer_interval.map(|period| {
            let mut offers = tokio::time::interval_at(Instant::now() + period, period);
            offers.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            offers
        });

        loop {
            tokio::select! {
                biased;
                () = inner.cancel.cancelled() => break,
                event = inbound.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("{} transport closed", inner.name);
                        break;
                    };
                    inner.on_transport_event(event);
                }
                Some(item) = work.recv() => inner.perform(item),
                _ = scan.tick() => inner.expire(Instant::now()),
                () = dispatch::tick(offers.as_mut()) => inner.announce_offers(),
            }
        }
        self.stop();
        inner.finalize(&mut work);
        Ok(())
    }

    /// Waits until the application is [`State::Running`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] if the application stops first.
    pub async fn running(&self) -> Result<()> {
        let mut receiver = self.inner.state.subscribe();
        let state = receiver
            .wait_for(|state| matches!(state, State::Running | State::Stopped))
            .await
            .map_or(State::Stopped, |state| *state);
        if state == State::Running {
            Ok(())
        } else {
            Err(Error::Stopped)
        }
    }

    /// Blocks the calling thread until the application is [`State::Running`].
    ///
    /// Must not be called from the processing context of the application.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] if the application stops first.
    pub fn wait_running(&self) -> Result<()> {
        futures::executor::block_on(self.running())
    }

    /// Stops the application.
    ///
    /// Withdraws every offer and subscription, cancels periodic tasks, and closes the transport.
    /// The processing context then fails every request in flight with [`Error::Stopped`], tells
    /// the state handlers, and forgets every handler. An application that never ran does this
    /// before returning. Stopping an application more than once has no effect.
    pub fn stop(&self) {
        let inner = &self.inner;
        let previous = inner.state.stop();
        if previous == State::Stopped {
            return;
        }
        tracing::info!("{} stopping", inner.name);

        if matches!(previous, State::Registered | State::Running) {
            let withdrawn: Vec<Entry> = inner
                .registry
                .offered()
                .into_iter()
                .map(Entry::stop_offer)
                .collect();
            inner.broadcast(&withdrawn);
            for (key, group, peer) in inner.events.drain_subscriptions() {
                inner.send_entries(peer, &[Entry::stop_subscribe(key, group)]);
            }
        }
        inner.cancel.cancel();
        inner.transport.close();

        // Without a processing context there is nothing to race with.
        if let Some(mut work) = inner.work.take() {
            inner.finalize(&mut work);
        }
    }

    /// Registers a handler for state changes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LifecycleViolation`] unless the application is [`State::Created`] or
    /// [`State::Initialized`].
    pub fn register_state_handler<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(State) + Send + Sync + 'static,
    {
        self.inner.require_registration("register_state_handler")?;
        lock(&self.inner.state_handlers).push(Arc::new(handler));
        Ok(())
    }

    /// Registers the handler of a method or event, replacing the previous one.
    ///
    /// The handler receives inbound requests and notifications, as well as the responses to the
    /// requests sent with [`Application::send`].
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] unless the application is [`State::Created`] or
    ///   [`State::Initialized`].
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved.
    pub fn register_message_handler<F>(
        &self,
        service: ServiceId,
        instance: InstanceId,
        method: MethodId,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.inner.require_registration("register_message_handler")?;
        let key = ServiceKey::new(service, instance).check()?;
        let method = method.check()?;
        let handler: MessageHandler = Arc::new(handler);
        self.inner.router.register(key, method, handler);
        Ok(())
    }

    /// Registers a handler for availability changes of a service.
    ///
    /// If the service is already available, the handler is told so once.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] unless the application is [`State::Created`] or
    ///   [`State::Initialized`].
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved.
    pub fn register_availability_handler<F>(
        &self,
        service: ServiceId,
        instance: InstanceId,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(ServiceId, InstanceId, bool) + Send + Sync + 'static,
    {
        self.inner
            .require_registration("register_availability_handler")?;
        let key = ServiceKey::new(service, instance).check()?;
        let handler: AvailabilityHandler = Arc::new(handler);
        if self.inner.registry.register_handler(key, handler.clone()) {
            self.inner.work.push(Work::Notify {
                handler,
                key,
                available: true,
            });
        }
        Ok(())
    }

    /// Offers a service.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] if the application is stopped.
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved.
    pub fn offer_service(&self, service: ServiceId, instance: InstanceId) -> Result<()> {
        let inner = &self.inner;
        inner.require_active("offer_service")?;
        let key = ServiceKey::new(service, instance).check()?;
        let update = inner.registry.offer(key);
        if update.changed {
            tracing::info!("{} offers {key}", inner.name);
        }
        if inner.is_running() {
            inner.broadcast(&[Entry::offer(key)]);
            if let Some(address) = inner.registry.route(&key) {
                inner.resolve_subscriptions(key, address);
            }
        }
        inner.publish(update);
        Ok(())
    }

    /// Withdraws the offer of a service.
    ///
    /// Requests to the service are rejected from now on, and its subscribers are forgotten.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] if the application is stopped.
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved.
    pub fn stop_offer_service(&self, service: ServiceId, instance: InstanceId) -> Result<()> {
        let inner = &self.inner;
        inner.require_active("stop_offer_service")?;
        let key = ServiceKey::new(service, instance).check()?;
        let update = inner.registry.stop_offer(key);
        if !update.changed {
            return Ok(());
        }
        tracing::info!("{} stopped offering {key}", inner.name);
        inner.events.clear_service(key);
        if inner.is_running() {
            inner.broadcast(&[Entry::stop_offer(key)]);
        }
        inner.on_unavailable(update);
        Ok(())
    }

    /// Registers interest in a service.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] if the application is stopped.
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved.
    pub fn request_service(&self, service: ServiceId, instance: InstanceId) -> Result<()> {
        let inner = &self.inner;
        inner.require_active("request_service")?;
        let key = ServiceKey::new(service, instance).check()?;
        if inner.registry.request(key) && inner.is_running() && !inner.registry.is_available(&key)
        {
            inner.broadcast(&[Entry::find(key)]);
        }
        Ok(())
    }

    /// Drops interest in a service, and cancels every subscription to it.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] if the application is stopped.
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved.
    pub fn release_service(&self, service: ServiceId, instance: InstanceId) -> Result<()> {
        let inner = &self.inner;
        inner.require_active("release_service")?;
        let key = ServiceKey::new(service, instance).check()?;
        inner.registry.release(key);
        for (group, peer) in inner.events.unsubscribe_service(key) {
            inner.send_entries(peer, &[Entry::stop_subscribe(key, group)]);
        }
        Ok(())
    }

    /// Whether the service is offered locally or by a known peer.
    pub fn is_available(&self, service: ServiceId, instance: InstanceId) -> bool {
        self.inner
            .registry
            .is_available(&ServiceKey::new(service, instance))
    }

    /// Returns the state of a subscription, if it exists.
    pub fn subscription(
        &self,
        service: ServiceId,
        instance: InstanceId,
        group: EventGroupId,
    ) -> Option<SubscriptionState> {
        self.inner
            .events
            .subscription(ServiceKey::new(service, instance), group)
    }

    /// Returns the address other applications reach this one at, once initialized.
    pub fn local_address(&self) -> Option<PeerAddress> {
        self.inner.transport.local_address()
    }

    /// Returns a signal that resolves when the service becomes available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if any identifier is reserved.
    pub fn availability(&self, service: ServiceId, instance: InstanceId) -> Result<Availability> {
        let key = ServiceKey::new(service, instance).check()?;
        Ok(Availability {
            available: self.inner.registry.watch(key),
            state: self.inner.state.subscribe(),
        })
    }

    /// Sends a message.
    ///
    /// - Requests are sent to the application offering the service. Their response, or an error
    ///   response if the request fails, is delivered to the message handler of the method.
    /// - Responses and errors are sent to the application the request came from.
    ///
    /// Delivery failures of requests are reported asynchronously.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] unless the application is [`State::Registered`] or
    ///   [`State::Running`].
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved.
    /// - [`Error::UnknownClient`] if a response was not created from a received request.
    pub fn send(&self, message: Message) -> Result<()> {
        self.inner.require_io("send")?;
        self.inner.send(message, Continuation::Handler)
    }

    /// Sends a request, and calls `callback` with its outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] unless the application is [`State::Registered`] or
    ///   [`State::Running`].
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved.
    /// - [`Error::Malformed`] if the message is not a request.
    pub fn send_with<F>(&self, message: Message, callback: F) -> Result<()>
    where
        F: FnOnce(Result<Message>) + Send + 'static,
    {
        self.inner.require_io("send_with")?;
        if message.message_type != MessageType::Request {
            return Err(Error::Malformed(ReturnCode::WrongMessageType));
        }
        self.inner
            .send(message, Continuation::Callback(Box::new(callback)))
    }

    /// Sends a request, and returns its pending response.
    ///
    /// # Errors
    ///
    /// Fails like [`Application::send_with`].
    pub fn request(&self, message: Message) -> Result<PendingResponse> {
        let (sender, receiver) = response_channels();
        self.send_with(message, move |result| sender.send(result))?;
        Ok(PendingResponse { receiver })
    }

    /// Offers an event as part of the given groups.
    ///
    /// If `cycle` is set, the last value of the event is sent to its subscribers every `cycle`.
    /// A zero `cycle` is the same as none.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] if the application is stopped.
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved, or `groups` is empty.
    pub fn offer_event(
        &self,
        service: ServiceId,
        instance: InstanceId,
        event: EventId,
        groups: &[EventGroupId],
        event_type: EventType,
        cycle: Option<Duration>,
    ) -> Result<()> {
        let inner = &self.inner;
        inner.require_active("offer_event")?;
        let key = ServiceKey::new(service, instance).check()?;
        let event = event.check()?;
        let cycle = cycle.filter(|cycle| !cycle.is_zero());
        inner
            .events
            .offer_event(key, event, groups, event_type)?;

        let previous = lock(&inner.cyclic).remove(&(key, event));
        if let Some(previous) = previous {
            previous.cancel();
        }
        if let Some(cycle) = cycle {
            let application = self.downgrade();
            let handle = self.spawn_periodic(cycle, move || {
                let Some(application) = application.upgrade() else {
                    return;
                };
                application.inner.republish(key, event);
            })?;
            lock(&inner.cyclic).insert((key, event), handle);
        }
        Ok(())
    }

    /// Withdraws an event.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] if the application is stopped.
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved.
    pub fn stop_offer_event(
        &self,
        service: ServiceId,
        instance: InstanceId,
        event: EventId,
    ) -> Result<()> {
        let inner = &self.inner;
        inner.require_active("stop_offer_event")?;
        let key = ServiceKey::new(service, instance).check()?;
        inner.events.stop_offer_event(key, event);
        if let Some(handle) = lock(&inner.cyclic).remove(&(key, event)) {
            handle.cancel();
        }
        Ok(())
    }

    /// Registers interest in an event of a remote service.
    ///
    /// Notifications of the event are delivered to the message handler registered with the id
    /// of the event, once one of its groups is subscribed to. Other notifications are dropped.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] if the application is stopped.
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved, or `groups` is empty.
    pub fn request_event(
        &self,
        service: ServiceId,
        instance: InstanceId,
        event: EventId,
        groups: &[EventGroupId],
        event_type: EventType,
    ) -> Result<()> {
        self.inner.require_active("request_event")?;
        let key = ServiceKey::new(service, instance).check()?;
        let event = event.check()?;
        self.inner
            .events
            .request_event(key, event, groups, event_type)
    }

    /// Drops interest in an event. Its notifications are no longer delivered.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] if the application is stopped.
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved.
    pub fn release_event(
        &self,
        service: ServiceId,
        instance: InstanceId,
        event: EventId,
    ) -> Result<()> {
        self.inner.require_active("release_event")?;
        let key = ServiceKey::new(service, instance).check()?;
        self.inner.events.release_event(key, event);
        Ok(())
    }

    /// Subscribes to an event group.
    ///
    /// If the service is not available yet, the subscription is sent as soon as it is.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] if the application is stopped.
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved.
    pub fn subscribe(
        &self,
        service: ServiceId,
        instance: InstanceId,
        group: EventGroupId,
    ) -> Result<()> {
        let inner = &self.inner;
        inner.require_active("subscribe")?;
        let key = ServiceKey::new(service, instance).check()?;
        let group = group.check()?;
        let route = if inner.is_running() {
            inner.registry.route(&key)
        } else {
            None
        };
        if let Some(peer) = inner.events.subscribe(key, group, route) {
            inner.send_entries(peer, &[Entry::subscribe(key, group)]);
        }
        Ok(())
    }

    /// Cancels a subscription to an event group.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] if the application is stopped.
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved.
    pub fn unsubscribe(
        &self,
        service: ServiceId,
        instance: InstanceId,
        group: EventGroupId,
    ) -> Result<()> {
        let inner = &self.inner;
        inner.require_active("unsubscribe")?;
        let key = ServiceKey::new(service, instance).check()?;
        if let Some(peer) = inner.events.unsubscribe(key, group) {
            inner.send_entries(peer, &[Entry::stop_subscribe(key, group)]);
        }
        Ok(())
    }

    /// Sends a notification of an event to its subscribers.
    ///
    /// Returns the number of subscribers the notification was handed to. Each subscriber gets
    /// the notification at most once, even if it subscribed to several groups of the event.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] if the application is stopped.
    /// - [`Error::InvalidIdentifier`] if any identifier is reserved.
    /// - [`Error::NotOffered`] if the event is not offered.
    pub fn notify(
        &self,
        service: ServiceId,
        instance: InstanceId,
        event: EventId,
        payload: impl Into<Bytes>,
    ) -> Result<usize> {
        let inner = &self.inner;
        inner.require_active("notify")?;
        let key = ServiceKey::new(service, instance).check()?;
        let event = event.check()?;
        let payload = payload.into();
        let targets = inner.events.notify(key, event, payload.clone())?;
        Ok(inner.deliver(key, event, payload, &targets))
    }

    /// Calls `callback` every `period`, starting one period from now, until the returned handle
    /// is cancelled or the application stops.
    ///
    /// The callback runs in the processing context of the application. Tasks spawned before the
    /// application runs start when it does.
    ///
    /// # Errors
    ///
    /// - [`Error::LifecycleViolation`] if the application is stopped.
    /// - [`Error::ZeroInterval`] if `period` is zero.
    pub fn spawn_periodic<F>(&self, period: Duration, callback: F) -> Result<PeriodicHandle>
    where
        F: FnMut() + Send + 'static,
    {
        self.inner.require_active("spawn_periodic")?;
        if period.is_zero() {
            return Err(Error::ZeroInterval);
        }
        let token = self.inner.cancel.child_token();
        self.inner
            .spawn(periodic::run(period, token.clone(), callback).boxed());
        Ok(PeriodicHandle::new(token))
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.inner.name)
            .field("client", &self.inner.client)
            .field("state", &self.inner.state.state())
            .field("transport", &self.inner.transport)
            .field("registry", &self.inner.registry)
            .field("router", &self.inner.router)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn violation(&self, operation: &'static str) -> Error {
        Error::LifecycleViolation {
            operation,
            state: self.state.state(),
        }
    }

    fn require(&self, operation: &'static str, allowed: &[State]) -> Result<()> {
        if allowed.contains(&self.state.state()) {
            Ok(())
        } else {
            Err(self.violation(operation))
        }
    }

    fn require_registration(&self, operation: &'static str) -> Result<()> {
        self.require(operation, &[State::Created, State::Initialized])
    }

    fn require_io(&self, operation: &'static str) -> Result<()> {
        self.require(operation, &[State::Registered, State::Running])
    }

    fn require_active(&self, operation: &'static str) -> Result<()> {
        if self.state.state() == State::Stopped {
            Err(self.violation(operation))
        } else {
            Ok(())
        }
    }

    fn is_running(&self) -> bool {
        self.state.state() == State::Running
    }

    /// Moves from `from` to `to`, and tells the state handlers.
    fn transition(&self, from: State, to: State) -> bool {
        if !self.state.advance(from, to) {
            return false;
        }
        tracing::debug!("{} {from} -> {to}", self.name);
        self.notify_state(to);
        true
    }

    /// Completes a stop on the context that owns the work queue.
    fn finalize(&self, work: &mut mpsc::UnboundedReceiver<Work>) {
        for pending in self.router.drain() {
            self.finish(pending, Outcome::Failed(Error::Stopped));
        }
        self.drain(work);
        self.notify_state(State::Stopped);

        lock(&self.cyclic).clear();
        lock(&self.state_handlers).clear();
        self.registry.clear();
        self.router.clear();
        self.events.clear();
        tracing::info!("{} stopped", self.name);
    }

    fn notify_state(&self, state: State) {
        let handlers = lock(&self.state_handlers).clone();
        for handler in handlers {
            handler(state);
        }
    }

    /// Uses the runtime of the processing context for periodic tasks.
    fn attach(&self, handle: Handle) {
        let mut tasks = lock(&self.tasks);
        for task in tasks.deferred.drain(..) {
            handle.spawn(task);
        }
        tasks.handle = Some(handle);
    }

    fn spawn(&self, task: BoxFuture<'static, ()>) {
        let mut tasks = lock(&self.tasks);
        if let Some(handle) = &tasks.handle {
            handle.spawn(task);
        } else {
            tasks.deferred.push(task);
        }
    }

    /// Queues the availability transition of an update, if any.
    fn publish(&self, update: Update) {
        if let Some(change) = update.change() {
            self.work.push(Work::Availability(change));
        }
    }

    /// Serializes and sends a message to a peer.
    fn transmit(&self, peer: PeerAddress, message: &Message) -> Result<()> {
        let data = message
            .to_bytes()
            .map_err(|_| Error::Malformed(ReturnCode::MalformedMessage))?;
        tracing::trace!("{} {message} -> {peer}", self.name);
        self.transport.send(&peer, data)?;
        Ok(())
    }

    fn send(&self, message: Message, continuation: Continuation) -> Result<()> {
        let key = message.key().check()?;
        message.method.check()?;
        match message.message_type {
            MessageType::Request => self.send_request(key, message, continuation),
            MessageType::RequestNoReturn => {
                let Some(peer) = self.registry.route(&key) else {
                    tracing::warn!("{} dropped {message}: service {key} not found", self.name);
                    return Ok(());
                };
                let message = self.router.assign(message)?;
                self.transmit(peer, &message)
            }
            MessageType::Response | MessageType::Error => {
                let Some(peer) = message.origin else {
                    return Err(Error::UnknownClient(message.client));
                };
                self.transmit(peer, &message)
            }
            MessageType::Notification | MessageType::Unknown(_) => {
                Err(Error::Malformed(ReturnCode::WrongMessageType))
            }
        }
    }

    fn send_request(
        &self,
        key: ServiceKey,
        message: Message,
        continuation: Continuation,
    ) -> Result<()> {
        let Some(peer) = self.registry.route(&key) else {
            let request = self.router.assign(message)?;
            tracing::debug!("{} cannot send {request}: service {key} not found", self.name);
            self.work.push(Work::Complete {
                pending: PendingRequest::unsent(request, continuation),
                outcome: Outcome::Failed(Error::ServiceNotFound(key)),
            });
            return Ok(());
        };
        let deadline = Instant::now() + self.config.request_timeout;
        let request = self.router.begin(message, peer, deadline, continuation)?;
        if let Err(error) = self.transmit(peer, &request) {
            tracing::warn!("{} failed to send {request}: {error}", self.name);
            if let Some(pending) = self.router.abort(request.request_id()) {
                self.work.push(Work::Complete {
                    pending,
                    outcome: Outcome::Failed(error),
                });
            }
        }
        Ok(())
    }

    /// Hands a notification to every target. Returns the number of successful hand-overs.
    fn deliver(
        &self,
        key: ServiceKey,
        event: EventId,
        payload: Bytes,
        targets: &[PeerAddress],
    ) -> usize {
        let message = Message::notification(key, event)
            .with_client(self.client)
            .with_payload(payload);
        targets
            .iter()
            .filter(|peer| match self.transmit(**peer, &message) {
                Ok(()) => true,
                Err(error) => {
                    tracing::warn!("{} failed to notify {peer}: {error}", self.name);
                    false
                }
            })
            .count()
    }

    /// Sends the last value of an event to its subscribers again.
    fn republish(&self, key: ServiceKey, event: EventId) {
        let Some(value) = self.events.last_value(key, event) else {
            return;
        };
        match self.events.notify(key, event, value.clone()) {
            Ok(targets) => {
                self.deliver(key, event, value, &targets);
            }
            Err(error) => tracing::debug!("{} cyclic notification skipped: {error}", self.name),
        }
    }

    /// Sends discovery entries to a single peer.
    fn send_entries(&self, peer: PeerAddress, entries: &[Entry]) {
        if entries.is_empty() {
            return;
        }
        let result = discovery::message(entries)
            .map_err(|_| Error::Malformed(ReturnCode::MalformedMessage))
            .and_then(|message| self.transmit(peer, &message));
        if let Err(error) = result {
            tracing::debug!("{} failed to send discovery entries to {peer}: {error}", self.name);
        }
    }

    /// Sends discovery entries to every peer.
    fn broadcast(&self, entries: &[Entry]) {
        for peer in self.transport.peers() {
            self.send_entries(peer, entries);
        }
    }

    /// Announces every offer and every request.
    fn announce(&self) {
        let offered = self.registry.offered();
        let mut entries: Vec<Entry> = offered.iter().copied().map(Entry::offer).collect();
        entries.extend(
            self.registry
                .requested()
                .into_iter()
                .filter(|key| !self.registry.is_available(key))
                .map(Entry::find),
        );
        self.broadcast(&entries);
        for key in self.events.pending_services() {
            if let Some(peer) = self.registry.route(&key) {
                self.resolve_subscriptions(key, peer);
            }
        }
    }

    fn announce_offers(&self) {
        let entries: Vec<Entry> = self
            .registry
            .offered()
            .into_iter()
            .map(Entry::offer)
            .collect();
        self.broadcast(&entries);
    }

    /// Sends the pending subscriptions to a service that became reachable at `peer`.
    fn resolve_subscriptions(&self, key: ServiceKey, peer: PeerAddress) {
        let entries: Vec<Entry> = self
            .events
            .resolve(key, peer)
            .into_iter()
            .map(|group| Entry::subscribe(key, group))
            .collect();
        self.send_entries(peer, &entries);
    }

    /// Handles a service that may have become unavailable.
    fn on_unavailable(&self, update: Update) {
        if update.changed && !self.registry.is_available(&update.key) {
            self.events.on_service_unavailable(update.key);
        }
        self.publish(update);
    }
}

/// Signal that resolves when a service becomes available.
///
/// Created by [`Application::availability`].
#[derive(Debug, Clone)]
pub struct Availability {
    available: watch::Receiver<bool>,
    state: watch::Receiver<State>,
}

impl Availability {
    /// Whether the service is available right now.
    pub fn is_available(&self) -> bool {
        *self.available.borrow()
    }

    /// Waits until the service is available.
    ///
    /// Resolves immediately if it already is. Can be called again after the service becomes
    /// unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] if the application stops first.
    pub async fn wait(&mut self) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.state.wait_for(|state| *state == State::Stopped) => Err(Error::Stopped),
            available = self.available.wait_for(|available| *available) => {
                available.map(|_| ()).map_err(|_| Error::Stopped)
            }
        }
    }

    /// Blocks the calling thread until the service is available.
    ///
    /// Must not be called from the processing context of the application.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] if the application stops first.
    pub fn wait_blocking(&mut self) -> Result<()> {
        futures::executor::block_on(self.wait())
    }
}

/// The response to a request sent with [`Application::request`].
#[derive(Debug)]
pub struct PendingResponse {
    receiver: ResponseReceiver<Message, Error>,
}

impl PendingResponse {
    /// Waits for the response.
    ///
    /// # Errors
    ///
    /// Returns the error that failed the request, or [`Error::Stopped`] if the application
    /// stopped before completing it.
    pub async fn get(self) -> Result<Message> {
        self.receiver.get().await.unwrap_or(Err(Error::Stopped))
    }

    /// Blocks the calling thread until the response arrives.
    ///
    /// Must not be called from the processing context of the application.
    ///
    /// # Errors
    ///
    /// Fails like [`PendingResponse::get`].
    pub fn wait(self) -> Result<Message> {
        futures::executor::block_on(self.get())
    }
}
