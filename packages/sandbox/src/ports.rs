// ABOUTME: Host port leasing for sandbox containers from a configured range
// ABOUTME: Random choice with bounded retries; check-and-insert is atomic per port

use rand::Rng;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::error::{Result, SandboxError};
use crate::settings::PortRange;

/// Attempts per requested port before giving up
const MAX_ATTEMPTS_PER_PORT: usize = 100;

/// Tracks which host ports are leased to live containers.
#[derive(Debug)]
pub struct PortAllocator {
    range: PortRange,
    leased: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new(range: PortRange) -> Self {
        Self {
            range,
            leased: Mutex::new(HashSet::new()),
        }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<u16>> {
        self.leased.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lease `count` distinct ports. On failure nothing stays leased.
    pub fn allocate(&self, count: usize) -> Result<Vec<u16>> {
        let mut ports = Vec::with_capacity(count);
        for _ in 0..count {
            match self.allocate_one() {
                Some(port) => ports.push(port),
                None => {
                    self.release(&ports);
                    return Err(SandboxError::PortsExhausted {
                        min: self.range.min,
                        max: self.range.max,
                    });
                }
            }
        }
        debug!("Allocated ports {:?}", ports);
        Ok(ports)
    }

    fn allocate_one(&self) -> Option<u16> {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_ATTEMPTS_PER_PORT {
            let port = rng.gen_range(self.range.min..=self.range.max);
            // Insert under the lock so two sessions can never lease the same port
            if self.lock().insert(port) {
                return Some(port);
            }
        }
        None
    }

    /// Return ports to the pool. Releasing a free port is a no-op.
    pub fn release(&self, ports: &[u16]) {
        if ports.is_empty() {
            return;
        }
        let mut leased = self.lock();
        for port in ports {
            leased.remove(port);
        }
        debug!("Released ports {:?}", ports);
    }

    pub fn is_leased(&self, port: u16) -> bool {
        self.lock().contains(&port)
    }

    pub fn leased(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.lock().iter().copied().collect();
        ports.sort_unstable();
        ports
    }

    pub fn leased_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn allocator(min: u16, max: u16) -> PortAllocator {
        PortAllocator::new(PortRange::new(min, max).unwrap())
    }

    #[test]
    fn test_allocated_ports_are_in_range_and_leased() {
        let ports = allocator(40000, 40100);
        let leased = ports.allocate(2).unwrap();
        assert_eq!(leased.len(), 2);
        assert_ne!(leased[0], leased[1]);
        for port in &leased {
            assert!(ports.range().contains(*port));
            assert!(ports.is_leased(*port));
        }
    }

    #[test]
    fn test_release_is_idempotent() {
        let ports = allocator(40000, 40100);
        let leased = ports.allocate(1).unwrap();
        ports.release(&leased);
        ports.release(&leased);
        assert!(!ports.is_leased(leased[0]));
        assert_eq!(ports.leased_count(), 0);
    }

    #[test]
    fn test_exhaustion_rolls_back_partial_allocation() {
        let ports = allocator(41000, 41000);
        let err = ports.allocate(2).unwrap_err();
        assert!(matches!(
            err,
            SandboxError::PortsExhausted {
                min: 41000,
                max: 41000
            }
        ));
        assert_eq!(ports.leased_count(), 0);
    }

    #[test]
    fn test_concurrent_allocations_are_distinct() {
        let ports = Arc::new(allocator(42000, 42999));
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let ports = ports.clone();
                std::thread::spawn(move || ports.allocate(1).unwrap()[0])
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            let port = handle.join().unwrap();
            assert!((42000..=42999).contains(&port));
            assert!(seen.insert(port), "port {} leased twice", port);
        }
        assert_eq!(ports.leased_count(), 64);
    }
}
