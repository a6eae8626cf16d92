//! Connection slots with bounded concurrency

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{Result, ScriptError};

/// Limits how many client connections the server keeps open at once
#[derive(Clone)]
pub struct ConnectionPool {
    semaphore: Arc<Semaphore>,
}

impl ConnectionPool {
    /// Create a pool with `max_connections` slots
    ///
    /// # Errors
    ///
    /// Returns error if `max_connections` is 0
    pub fn new(max_connections: usize) -> Result<Self> {
        if max_connections == 0 {
            return Err(ScriptError::ConfigError(
                "max_connections must be > 0".to_string(),
            ));
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(max_connections)),
        })
    }

    /// Take a slot without waiting; `None` when all slots are in use
    pub fn try_acquire(&self) -> Option<ConnectionGuard> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| ConnectionGuard { _permit: permit })
    }
}

/// Releases a connection slot when dropped
pub struct ConnectionGuard {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_released_on_drop() {
        let pool = ConnectionPool::new(2).unwrap();

        {
            let _first = pool.try_acquire().unwrap();
            let _second = pool.try_acquire().unwrap();
            assert!(pool.try_acquire().is_none());
        }

        assert!(pool.try_acquire().is_some());
    }

    #[test]
    fn test_zero_slots_rejected() {
        assert!(matches!(
            ConnectionPool::new(0),
            Err(ScriptError::ConfigError(_))
        ));
    }
}
