//! Shard pool and endpoint selection.
//!
//! The pool is `pool_size` replicas of the target service listening on
//! contiguous ports `[base_port, base_port + pool_size)` on one host. The
//! pool itself is immutable after construction and shared read-only across
//! virtual users; each virtual user owns a [`ShardSelector`] carrying only
//! its own round-robin cursor.

use std::fmt;
use std::sync::Arc;

use crate::loadtest::config::{SelectionMode, TargetConfig};
use crate::loadtest::entropy::EntropySource;
use crate::loadtest::error::LoadTestError;

/// One network-addressable instance of the target service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// URI for a tonic channel, `http://` for plaintext and `https://` otherwise.
    pub fn uri(&self, plaintext: bool) -> String {
        let scheme = if plaintext { "http" } else { "https" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Fixed, read-only pool of shard endpoints.
#[derive(Debug, Clone)]
pub struct ShardPool {
    endpoints: Arc<[Endpoint]>,
    base_port: u16,
}

impl ShardPool {
    /// Build the pool described by a `[target]` section.
    ///
    /// Rejects an empty pool and port ranges past 65535.
    pub fn from_target(target: &TargetConfig) -> Result<Self, LoadTestError> {
        Self::new(&target.host, target.base_port, target.pool_size)
    }

    /// Build a pool of `size` endpoints on `host` starting at `base_port`.
    pub fn new(host: &str, base_port: u16, size: u16) -> Result<Self, LoadTestError> {
        if size == 0 {
            return Err(LoadTestError::validation(
                "target.pool_size must be at least 1 (empty shard pool)",
            ));
        }
        let endpoints = (0..size)
            .map(|offset| {
                base_port
                    .checked_add(offset)
                    .map(|port| Endpoint {
                        host: host.to_owned(),
                        port,
                    })
                    .ok_or_else(|| {
                        LoadTestError::validation(format!(
                            "target port range starting at {base_port} with {size} shards exceeds 65535"
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            endpoints: endpoints.into(),
            base_port,
        })
    }

    /// Number of shards (N).
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always `false`: construction rejects empty pools.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Port of shard 0.
    pub fn base_port(&self) -> u16 {
        self.base_port
    }

    /// Shard index of an endpoint belonging to this pool.
    pub fn index_of(&self, endpoint: &Endpoint) -> Option<usize> {
        let offset = endpoint.port.checked_sub(self.base_port)? as usize;
        (offset < self.len()).then_some(offset)
    }

    #[cfg(test)]
    fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

/// Per-virtual-user view of the pool.
#[derive(Debug, Clone)]
pub struct ShardSelector {
    pool: ShardPool,
    mode: SelectionMode,
    cursor: usize,
}

impl ShardSelector {
    /// Creates a selector; `start` offsets the round-robin cursor so virtual
    /// users do not march in lockstep.
    pub fn new(pool: ShardPool, mode: SelectionMode, start: usize) -> Self {
        let cursor = start % pool.len().max(1);
        Self { pool, mode, cursor }
    }

    /// Pick the endpoint for the next call.
    pub fn select_endpoint(&mut self, entropy: &mut EntropySource) -> Endpoint {
        let len = self.pool.len();
        let index = match self.mode {
            SelectionMode::Random => entropy.random_bounded(len as u64) as usize,
            SelectionMode::RoundRobin => {
                let index = self.cursor;
                self.cursor = (self.cursor + 1) % len;
                index
            }
        };
        self.pool.endpoints[index].clone()
    }

    /// The pool this selector draws from.
    pub fn pool(&self) -> &ShardPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_ports_are_contiguous() {
        let pool = ShardPool::new("localhost", 8000, 10).unwrap();
        assert_eq!(pool.len(), 10);
        let ports: Vec<u16> = pool.endpoints().iter().map(|e| e.port).collect();
        assert_eq!(ports, (8000..8010).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(ShardPool::new("localhost", 8000, 0).is_err());
    }

    #[test]
    fn test_pool_port_overflow_rejected() {
        assert!(ShardPool::new("localhost", 65535, 2).is_err());
        assert!(ShardPool::new("localhost", 65535, 1).is_ok());
    }

    #[test]
    fn test_index_of() {
        let pool = ShardPool::new("localhost", 8000, 10).unwrap();
        let ep = Endpoint {
            host: "localhost".to_string(),
            port: 8003,
        };
        assert_eq!(pool.index_of(&ep), Some(3));
        let outside = Endpoint {
            host: "localhost".to_string(),
            port: 8010,
        };
        assert_eq!(pool.index_of(&outside), None);
    }

    #[test]
    fn test_endpoint_uri_and_display() {
        let ep = Endpoint {
            host: "localhost".to_string(),
            port: 8000,
        };
        assert_eq!(ep.uri(true), "http://localhost:8000");
        assert_eq!(ep.uri(false), "https://localhost:8000");
        assert_eq!(ep.to_string(), "localhost:8000");
    }

    #[test]
    fn test_random_selection_is_uniform() {
        // 10 shards x 10,000 draws; chi-square with 9 degrees of freedom.
        // 33.72 is the p = 0.0001 critical value.
        let pool = ShardPool::new("localhost", 8000, 10).unwrap();
        let mut selector = ShardSelector::new(pool, SelectionMode::Random, 0);
        let mut entropy = EntropySource::seeded(2024);
        let mut counts = [0u32; 10];

        for _ in 0..10_000 {
            let ep = selector.select_endpoint(&mut entropy);
            assert!((8000..8010).contains(&ep.port), "port {} out of range", ep.port);
            counts[(ep.port - 8000) as usize] += 1;
        }

        let expected = 1_000.0;
        let chi_square: f64 = counts
            .iter()
            .map(|&c| {
                let diff = f64::from(c) - expected;
                diff * diff / expected
            })
            .sum();
        assert!(
            chi_square < 33.72,
            "chi-square {chi_square:.2} too large for counts {counts:?}"
        );
    }

    #[test]
    fn test_round_robin_cycles_from_offset() {
        let pool = ShardPool::new("localhost", 8000, 3).unwrap();
        let mut selector = ShardSelector::new(pool, SelectionMode::RoundRobin, 4);
        let mut entropy = EntropySource::seeded(0);
        let ports: Vec<u16> = (0..6)
            .map(|_| selector.select_endpoint(&mut entropy).port)
            .collect();
        assert_eq!(ports, vec![8001, 8002, 8000, 8001, 8002, 8000]);
    }
}
