//! Weighted round-robin load balancing strategy.

use std::sync::{Arc, Mutex, PoisonError};

use crate::load_balancer::{server::Server, LoadBalancer};

#[derive(Debug, Default)]
struct Cursor {
    /// Index of the next server to consider.
    next: usize,
    /// Minimum weight a server needs to be picked in this pass.
    current_weight: u32,
}

/// Interleaved weighted round-robin selector.
///
/// Servers are visited in order; on every full pass the weight threshold
/// drops by the GCD of all weights, so heavier servers are picked more
/// often without being picked in long runs.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    cursor: Mutex<Cursor>,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

impl LoadBalancer for WeightedRoundRobin {
    fn next_server(&self, servers: &[Arc<Server>]) -> Option<Arc<Server>> {
        if servers.is_empty() {
            return None;
        }

        let weights: Vec<u32> = servers.iter().map(|s| s.effective_weight().max(1)).collect();
        let max = weights.iter().copied().max().unwrap_or(1);
        let step = weights.iter().copied().fold(0, gcd).max(1);

        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let index = cursor.next % servers.len();
            cursor.next = index + 1;
            if index == 0 {
                cursor.current_weight = if cursor.current_weight <= step {
                    max
                } else {
                    cursor.current_weight - step
                };
            }
            if weights[index] >= cursor.current_weight {
                return Some(Arc::clone(&servers[index]));
            }
        }
    }
}
