use std::time::Duration;

use wordtree_common::protocol::error::{Result, WordTreeError};
use wordtree_common::TransportConfig;

/// Default first port of the root's namespace
pub const DEFAULT_BASE_PORT: u16 = 8502;

/// Default number of direct subordinates a node accepts before redirecting
pub const DEFAULT_MAX_WORKERS_PER_BRANCH: usize = 4;

/// Default number of words per unit of reported capacity
pub const DEFAULT_MIN_FRAGMENT_UNIT: usize = 50;

/// Default time a worker may stay busy before it is assumed idle again
pub const DEFAULT_BUSY_LEASE: Duration = Duration::from_secs(30);

/// Default period of the node maintenance loop
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

/// Number of tree levels whose port namespaces must fit below `u16::MAX`
pub const SUPPORTED_DEPTH: u16 = 16;

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// First port of the root's namespace; each tree level adds 2
    pub base_port: u16,
    /// Direct subordinates accepted before joiners are redirected downward
    pub max_workers_per_branch: usize,
    /// Words per unit of worker capacity when splitting a job
    pub min_fragment_unit: usize,
    /// Concurrency of every sender, receiver, processor and counter pool
    pub pool_size: usize,
    /// Bounded wait of every queue poll
    pub poll_timeout: Duration,
    /// Deadline of every socket connect/read/write
    pub io_timeout: Duration,
    /// How long a worker stays busy without news before returning to idle
    pub busy_lease: Duration,
    /// How often expired leases are collected
    pub maintenance_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            base_port: DEFAULT_BASE_PORT,
            max_workers_per_branch: DEFAULT_MAX_WORKERS_PER_BRANCH,
            min_fragment_unit: DEFAULT_MIN_FRAGMENT_UNIT,
            pool_size: transport.pool_size,
            poll_timeout: transport.poll_timeout,
            io_timeout: transport.io_timeout,
            busy_lease: DEFAULT_BUSY_LEASE,
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
        }
    }
}

impl NodeConfig {
    /// Sets the first port of the root's namespace.
    ///
    /// Every node of one tree must use the same base port.
    pub fn with_base_port(mut self, base_port: u16) -> Self {
        self.base_port = base_port;
        self
    }

    /// Sets how many direct workers a node accepts before it redirects
    /// joiners to one of them.
    pub fn with_max_workers_per_branch(mut self, max: usize) -> Self {
        self.max_workers_per_branch = max;
        self
    }

    /// Sets the number of words a worker receives per unit of capacity.
    pub fn with_min_fragment_unit(mut self, unit: usize) -> Self {
        self.min_fragment_unit = unit;
        self
    }

    /// Sets the permits of every bounded pool (transport and processing).
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Sets how long a queue poll waits before it returns nothing.
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Sets the deadline of every connect, read and write.
    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    /// Sets how long a worker stays busy after receiving a fragment.
    pub fn with_busy_lease(mut self, busy_lease: Duration) -> Self {
        self.busy_lease = busy_lease;
        self
    }

    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// The transport settings derived from this configuration.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig::default()
            .with_pool_size(self.pool_size)
            .with_poll_timeout(self.poll_timeout)
            .with_io_timeout(self.io_timeout)
    }

    /// Checks the configuration for values a node cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `Config` if:
    /// - `pool_size`, `min_fragment_unit` or `max_workers_per_branch` is zero
    /// - a timeout or interval is zero
    /// - the port namespaces of [`SUPPORTED_DEPTH`] levels would not fit in a `u16`
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(WordTreeError::Config("pool_size must be at least 1".to_string()));
        }
        if self.min_fragment_unit == 0 {
            return Err(WordTreeError::Config(
                "min_fragment_unit must be at least 1".to_string(),
            ));
        }
        if self.max_workers_per_branch == 0 {
            return Err(WordTreeError::Config(
                "max_workers_per_branch must be at least 1".to_string(),
            ));
        }
        if self.poll_timeout.is_zero()
            || self.io_timeout.is_zero()
            || self.busy_lease.is_zero()
            || self.maintenance_interval.is_zero()
        {
            return Err(WordTreeError::Config("timeouts must be non-zero".to_string()));
        }

        // Highest port used by the deepest supported level
        let highest = u32::from(self.base_port) + 2 * u32::from(SUPPORTED_DEPTH) + 3;
        if self.base_port == 0 || highest > u32::from(u16::MAX) {
            return Err(WordTreeError::Config(format!(
                "base_port {} leaves no room for {} tree levels",
                self.base_port, SUPPORTED_DEPTH
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.base_port, 8502);
        assert_eq!(config.max_workers_per_branch, 4);
        assert_eq!(config.min_fragment_unit, 50);
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.poll_timeout, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_transport_follows_node_settings() {
        let config = NodeConfig::default()
            .with_pool_size(2)
            .with_poll_timeout(Duration::from_millis(30))
            .with_io_timeout(Duration::from_secs(1));

        let transport = config.transport();
        assert_eq!(transport.pool_size, 2);
        assert_eq!(transport.poll_timeout, Duration::from_millis(30));
        assert_eq!(transport.io_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        assert!(NodeConfig::default().with_pool_size(0).validate().is_err());
        assert!(NodeConfig::default().with_min_fragment_unit(0).validate().is_err());
        assert!(NodeConfig::default().with_max_workers_per_branch(0).validate().is_err());
        assert!(NodeConfig::default()
            .with_poll_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_rejects_port_overflow() {
        let result = NodeConfig::default().with_base_port(u16::MAX - 10).validate();
        assert!(matches!(result, Err(WordTreeError::Config(_))));

        assert!(NodeConfig::default().with_base_port(0).validate().is_err());
        assert!(NodeConfig::default().with_base_port(60000).validate().is_ok());
    }
}
