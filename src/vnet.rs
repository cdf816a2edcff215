//! VNet Allocator (spec §2 component 7, optional): reserves/releases IPs on
//! a host-local virtual network. The pool is shared mutable state guarded by
//! a short-held lock (spec §5 "VNet IP pool: serialized likewise"), the same
//! granularity of locking the teacher's connection pool uses around its
//! `Mutex<VecDeque<_>>` of idle connections.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VNetError {
    #[error("vnet '{0}' IP pool exhausted")]
    PoolExhausted(String),

    #[error("ip {ip} is not reserved on vnet '{network}'")]
    NotReserved { network: String, ip: Ipv4Addr },
}

pub type VNetResult<T> = Result<T, VNetError>;

struct NetworkPool {
    network: String,
    base: u32,
    size: u32,
    allocated: HashSet<u32>,
}

impl NetworkPool {
    fn reserve(&mut self) -> VNetResult<Ipv4Addr> {
        for offset in 1..self.size.saturating_sub(1) {
            if self.allocated.insert(offset) {
                return Ok(Ipv4Addr::from(self.base + offset));
            }
        }
        Err(VNetError::PoolExhausted(self.network.clone()))
    }

    fn release(&mut self, ip: Ipv4Addr) -> VNetResult<()> {
        let offset = u32::from(ip).wrapping_sub(self.base);
        if !self.allocated.remove(&offset) {
            return Err(VNetError::NotReserved { network: self.network.clone(), ip });
        }
        Ok(())
    }
}

/// Allocates IPv4 addresses out of one or more /24-ish host-local networks,
/// each identified by name (spec GLOSSARY "VNet").
pub struct VNetAllocator {
    pools: Mutex<Vec<NetworkPool>>,
}

impl VNetAllocator {
    /// `networks` is `(name, base_ip, size)` — `size` includes the network
    /// and broadcast addresses, both of which are never handed out.
    pub fn new(networks: Vec<(String, Ipv4Addr, u32)>) -> Self {
        let pools = networks
            .into_iter()
            .map(|(network, base, size)| NetworkPool {
                network,
                base: u32::from(base),
                size,
                allocated: HashSet::new(),
            })
            .collect();
        Self { pools: Mutex::new(pools) }
    }

    pub fn reserve(&self, network: &str) -> VNetResult<Ipv4Addr> {
        let mut pools = self.pools.lock().unwrap();
        let pool = pools
            .iter_mut()
            .find(|p| p.network == network)
            .ok_or_else(|| VNetError::PoolExhausted(network.to_string()))?;
        pool.reserve()
    }

    pub fn release(&self, network: &str, ip: Ipv4Addr) -> VNetResult<()> {
        let mut pools = self.pools.lock().unwrap();
        let pool = pools
            .iter_mut()
            .find(|p| p.network == network)
            .ok_or_else(|| VNetError::NotReserved { network: network.to_string(), ip })?;
        pool.release(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> VNetAllocator {
        VNetAllocator::new(vec![("default".to_string(), Ipv4Addr::new(10, 88, 0, 0), 4)])
    }

    #[test]
    fn reserve_then_release_allows_reuse() {
        let a = allocator();
        let ip = a.reserve("default").unwrap();
        assert_eq!(ip, Ipv4Addr::new(10, 88, 0, 1));
        a.release("default", ip).unwrap();
        let ip2 = a.reserve("default").unwrap();
        assert_eq!(ip2, ip);
    }

    #[test]
    fn pool_exhaustion_is_reported() {
        let a = allocator();
        let _a1 = a.reserve("default").unwrap();
        let _a2 = a.reserve("default").unwrap();
        assert!(matches!(a.reserve("default"), Err(VNetError::PoolExhausted(_))));
    }

    #[test]
    fn releasing_unreserved_ip_is_an_error() {
        let a = allocator();
        let err = a.release("default", Ipv4Addr::new(10, 88, 0, 1)).unwrap_err();
        assert!(matches!(err, VNetError::NotReserved { .. }));
    }
}
