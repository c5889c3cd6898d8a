//! Shallow registry façade: owns the entity objects, hands out weak handles.

use crate::net_entity::NetEntity;
use crate::tcp::{TcpAcceptor, TcpConnector};
use crate::udp::UdpEntityIo;
use crate::Entity;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Owner of network entities.
///
/// Application code holds [`NetEntity`] handles, which never keep their
/// entity alive; something has to, and that is this registry. `make_*`
/// methods create an entity, retain it, and return its handle. Dropping the
/// `Net` (or calling [`remove`](Self::remove)) releases the entities, after
/// which outstanding handles report `WeakPtrExpired`.
///
/// # Example
///
/// ```rust,no_run
/// use hawser::Net;
/// use std::time::Duration;
///
/// # async fn example() {
/// let net = Net::new();
/// let acceptor = net.make_tcp_acceptor("127.0.0.1:5000".parse().unwrap(), true);
/// let connector = net.make_tcp_connector("example.com", 5000, Duration::from_millis(500));
/// // ... start the entities with callbacks, run, then:
/// net.stop_all();
/// # }
/// ```
#[derive(Default)]
pub struct Net {
    acceptors: Mutex<Vec<Arc<TcpAcceptor>>>,
    connectors: Mutex<Vec<Arc<TcpConnector>>>,
    udp_entities: Mutex<Vec<Arc<UdpEntityIo>>>,
}

impl Net {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and retains a TCP acceptor for the given local endpoint.
    pub fn make_tcp_acceptor(
        &self,
        local_endp: SocketAddr,
        reuse_addr: bool,
    ) -> NetEntity<TcpAcceptor> {
        let acceptor = TcpAcceptor::new(local_endp, reuse_addr);
        let handle = NetEntity::new(Arc::downgrade(&acceptor));
        self.acceptors.lock().unwrap().push(acceptor);
        handle
    }

    /// Creates and retains a TCP connector that resolves `host:port` when
    /// started.
    pub fn make_tcp_connector(
        &self,
        remote_host: &str,
        remote_port: u16,
        reconnect_interval: Duration,
    ) -> NetEntity<TcpConnector> {
        let connector = TcpConnector::new(remote_host, remote_port, reconnect_interval);
        let handle = NetEntity::new(Arc::downgrade(&connector));
        self.connectors.lock().unwrap().push(connector);
        handle
    }

    /// Creates and retains a TCP connector over a pre-resolved endpoint
    /// list.
    pub fn make_tcp_connector_resolved(
        &self,
        endpoints: Vec<SocketAddr>,
        reconnect_interval: Duration,
    ) -> NetEntity<TcpConnector> {
        let connector = TcpConnector::with_endpoints(endpoints, reconnect_interval);
        let handle = NetEntity::new(Arc::downgrade(&connector));
        self.connectors.lock().unwrap().push(connector);
        handle
    }

    /// Creates and retains a UDP entity. `None` is the send-only
    /// configuration bound to an ephemeral wildcard address.
    pub fn make_udp(&self, local_endp: Option<SocketAddr>) -> NetEntity<UdpEntityIo> {
        let udp = UdpEntityIo::new(local_endp);
        let handle = NetEntity::new(Arc::downgrade(&udp));
        self.udp_entities.lock().unwrap().push(udp);
        handle
    }

    /// Stops and releases the entity behind `handle`; outstanding handles to
    /// it expire. Unknown or already-removed handles are ignored.
    pub fn remove<E>(&self, handle: &NetEntity<E>)
    where
        Self: Registry<E>,
        E: Entity,
    {
        Registry::remove_entity(self, handle);
    }

    /// Stops every retained entity. The entities stay registered and can be
    /// started again.
    pub fn stop_all(&self) {
        for acceptor in self.acceptors.lock().unwrap().iter() {
            acceptor.stop();
        }
        for connector in self.connectors.lock().unwrap().iter() {
            connector.stop();
        }
        for udp in self.udp_entities.lock().unwrap().iter() {
            udp.stop();
        }
    }
}

/// Per-entity-type storage used by [`Net::remove`].
pub trait Registry<E: Entity> {
    #[doc(hidden)]
    fn remove_entity(&self, handle: &NetEntity<E>);
}

fn remove_from<E: Entity>(list: &Mutex<Vec<Arc<E>>>, handle: &NetEntity<E>) {
    let mut list = list.lock().unwrap();
    list.retain(|entity| {
        if NetEntity::new(Arc::downgrade(entity)) == *handle {
            entity.stop();
            false
        } else {
            true
        }
    });
}

impl Registry<TcpAcceptor> for Net {
    fn remove_entity(&self, handle: &NetEntity<TcpAcceptor>) {
        remove_from(&self.acceptors, handle);
    }
}

impl Registry<TcpConnector> for Net {
    fn remove_entity(&self, handle: &NetEntity<TcpConnector>) {
        remove_from(&self.connectors, handle);
    }
}

impl Registry<UdpEntityIo> for Net {
    fn remove_entity(&self, handle: &NetEntity<UdpEntityIo>) {
        remove_from(&self.udp_entities, handle);
    }
}
