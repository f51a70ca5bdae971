//! Application configuration.
//!
//! ```
//! use rsomeip_core::{config::Config, someip::ClientId};
//! use std::time::Duration;
//!
//! let config = Config::builder()
//!     .request_timeout(Duration::from_secs(1))
//!     .client_id(ClientId::new(0x0042))
//!     .build();
//! assert!(config.validate().is_ok());
//! ```

use crate::{someip::ClientId, Error, Result};
use std::{net::SocketAddr, time::Duration};

/// Default time a request waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between two scans for expired requests.
pub const DEFAULT_TIMEOUT_SCAN_INTERVAL: Duration = Duration::from_millis(100);

/// Transport used by an application.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// In-process delivery between applications of the same runtime.
    #[default]
    Local,
    /// TCP streams.
    Tcp {
        /// Address to listen on. Port `0` lets the OS pick one.
        bind: SocketAddr,
        /// Listening addresses of the other applications.
        peers: Vec<SocketAddr>,
    },
}

/// Configuration of an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Time a request waits for its response (default: 5 seconds).
    pub request_timeout: Duration,
    /// Interval between two scans for expired requests (default: 100 milliseconds).
    pub timeout_scan_interval: Duration,
    /// Interval between repeated announcements of offered services (default: none).
    pub offer_interval: Option<Duration>,
    /// Client id of the application. Assigned by the runtime if not set.
    pub client_id: Option<ClientId>,
    /// Transport used by the application (default: [`TransportConfig::Local`]).
    pub transport: TransportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            timeout_scan_interval: DEFAULT_TIMEOUT_SCAN_INTERVAL,
            offer_interval: None,
            client_id: None,
            transport: TransportConfig::Local,
        }
    }
}

impl Config {
    /// Creates a builder starting from the default configuration.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Checks that the configuration can be used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Initialization`] if any interval is zero, or [`Error::InvalidIdentifier`]
    /// if the client id is reserved.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(Error::Initialization("request timeout must not be zero".into()));
        }
        if self.timeout_scan_interval.is_zero() {
            return Err(Error::Initialization(
                "timeout scan interval must not be zero".into(),
            ));
        }
        if self.offer_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(Error::Initialization("offer interval must not be zero".into()));
        }
        if let Some(client) = self.client_id {
            client.check()?;
        }
        Ok(())
    }
}

/// Builder for [`Config`].
#[derive(Debug, Default)]
#[must_use]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Time a request waits for its response.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Interval between two scans for expired requests.
    pub fn timeout_scan_interval(mut self, interval: Duration) -> Self {
        self.config.timeout_scan_interval = interval;
        self
    }

    /// Repeats the announcement of offered services at the given interval.
    pub fn offer_interval(mut self, interval: Duration) -> Self {
        self.config.offer_interval = Some(interval);
        self
    }

    /// Uses the given client id instead of one assigned by the runtime.
    pub fn client_id(mut self, client: ClientId) -> Self {
        self.config.client_id = Some(client);
        self
    }

    /// Uses TCP streams, listening on `bind` and sending to `peers`.
    pub fn tcp(mut self, bind: SocketAddr, peers: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.config.transport = TransportConfig::Tcp {
            bind,
            peers: peers.into_iter().collect(),
        };
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}
