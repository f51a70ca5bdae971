//! Factory of applications.
//!
//! A [`Runtime`] creates [`Application`]s and gives each of them a unique [`ClientId`].
//! Applications created with [`TransportConfig::Local`] reach each other through the in-process
//! [`MemoryHub`] of their runtime.

use crate::{
    application::Application,
    config::{Config, TransportConfig},
    someip::ClientId,
    support::sync::lock,
    transport::{MemoryHub, TcpTransport, Transport},
    Error, Result,
};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

#[derive(Debug)]
struct Clients {
    next: ClientId,
    taken: HashSet<ClientId>,
}

impl Clients {
    /// Claims the given client id, or the next free one.
    fn claim(&mut self, requested: Option<ClientId>) -> Result<ClientId> {
        if let Some(client) = requested {
            let client = client.check()?;
            if !self.taken.insert(client) {
                return Err(Error::InvalidIdentifier(format!(
                    "client id {client} is already taken"
                )));
            }
            return Ok(client);
        }
        for _ in 0..=u16::MAX {
            let client = self.next;
            self.next = match client.as_u16().wrapping_add(1) {
                0 | 0xffff => ClientId::new(1),
                next => ClientId::new(next),
            };
            if client.check().is_ok() && self.taken.insert(client) {
                return Ok(client);
            }
        }
        Err(Error::Initialization("no client ids left".into()))
    }
}

/// Creates applications.
#[derive(Debug)]
pub struct Runtime {
    hub: MemoryHub,
    clients: Mutex<Clients>,
}

impl Runtime {
    /// Creates a new [`Runtime`].
    pub fn new() -> Self {
        Self {
            hub: MemoryHub::new(),
            clients: Mutex::new(Clients {
                next: ClientId::new(0x0001),
                taken: HashSet::new(),
            }),
        }
    }

    /// Creates an application using the transport chosen by its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the configured client id is reserved or already
    /// taken.
    pub fn create_application(&self, name: impl Into<String>, config: Config) -> Result<Application> {
        let transport: Arc<dyn Transport> = match &config.transport {
            TransportConfig::Local => Arc::new(self.hub.transport()),
            TransportConfig::Tcp { bind, peers } => Arc::new(TcpTransport::new(*bind, peers.clone())),
        };
        self.create_application_with(name, config, transport)
    }

    /// Creates an application using the given transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the configured client id is reserved or already
    /// taken.
    pub fn create_application_with(
        &self,
        name: impl Into<String>,
        config: Config,
        transport: Arc<dyn Transport>,
    ) -> Result<Application> {
        let client = lock(&self.clients).claim(config.client_id)?;
        let name = name.into();
        tracing::debug!("created {name} with client id {client}");
        Ok(Application::new(name, client, config, transport))
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
