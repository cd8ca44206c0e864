use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use wordtree_common::protocol::error::{Result, WordTreeError};

/// Finds the address this node is reachable at.
///
/// The address is the node's identity in the tree: it is what the node
/// announces to its coordinator and what its receivers bind to.
pub trait HostResolver {
    fn resolve(&self) -> Result<IpAddr>;
}

/// A fixed, configured address.
#[derive(Debug, Clone, Copy)]
pub struct StaticHost(pub IpAddr);

impl HostResolver for StaticHost {
    fn resolve(&self) -> Result<IpAddr> {
        Ok(self.0)
    }
}

/// Asks the OS which local address it would route `target` through.
///
/// A UDP socket is "connected" to `target`, which only selects a route; no
/// packet is sent.
#[derive(Debug, Clone, Copy)]
pub struct UdpProbeResolver {
    target: SocketAddr,
}

impl Default for UdpProbeResolver {
    fn default() -> Self {
        Self {
            target: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 9),
        }
    }
}

impl UdpProbeResolver {
    /// Probes the route towards `target` instead of the default
    /// documentation address.
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }
}

impl HostResolver for UdpProbeResolver {
    fn resolve(&self) -> Result<IpAddr> {
        let bind = match self.target {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };

        let socket = UdpSocket::bind(bind)?;
        socket.connect(self.target).map_err(|e| {
            WordTreeError::Connection(format!("No route towards {}: {}", self.target, e))
        })?;

        let local = socket.local_addr()?.ip();
        if local.is_unspecified() {
            return Err(WordTreeError::Connection(format!(
                "No local address routes to {}",
                self.target
            )));
        }
        Ok(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_host() {
        let addr: IpAddr = "10.1.2.3".parse().unwrap();
        assert_eq!(StaticHost(addr).resolve().unwrap(), addr);
    }

    #[test]
    fn test_probe_towards_loopback_resolves_loopback() {
        let resolver = UdpProbeResolver::new("127.0.0.1:9".parse().unwrap());
        assert_eq!(resolver.resolve().unwrap(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_resolvers_are_object_safe() {
        let resolvers: Vec<Box<dyn HostResolver>> = vec![
            Box::new(StaticHost(IpAddr::V4(Ipv4Addr::LOCALHOST))),
            Box::new(UdpProbeResolver::new("127.0.0.1:9".parse().unwrap())),
        ];
        for resolver in resolvers {
            assert!(resolver.resolve().unwrap().is_loopback());
        }
    }
}
