//! Keep-alive references to caller buffers.
//!
//! A pending send holds a [`BufferLease`] on the caller's buffer until its
//! completion runs. The lease is released when it is dropped, so success,
//! failure and abandoned operations all release it exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

/// Counts leases issued and released for one sender.
#[derive(Debug, Default)]
pub struct LeaseLedger {
    issued: AtomicU64,
    released: AtomicU64,
}

impl LeaseLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a keep-alive reference on `data`.
    pub fn lease(self: &Arc<Self>, data: Bytes) -> BufferLease {
        self.issued.fetch_add(1, Ordering::SeqCst);
        BufferLease {
            data,
            ledger: Arc::clone(self),
        }
    }

    /// Leases issued so far.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Leases released so far.
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Leases currently held by pending operations.
    pub fn outstanding(&self) -> u64 {
        self.issued().saturating_sub(self.released())
    }
}

/// Strong reference keeping a caller buffer alive for a pending send.
///
/// Does not prevent the caller from mutating the memory; doing so while a
/// send is in flight gives an undefined picture, not a fault.
#[derive(Debug)]
pub struct BufferLease {
    data: Bytes,
    ledger: Arc<LeaseLedger>,
}

impl BufferLease {
    /// The leased bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Length of the leased region.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the leased region is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Release the lease now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
        trace!(len = self.data.len(), "Buffer lease released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_released_once() {
        let ledger = Arc::new(LeaseLedger::new());
        let lease = ledger.lease(Bytes::from_static(b"abcd"));
        assert_eq!(ledger.outstanding(), 1);
        assert_eq!(lease.bytes(), b"abcd");

        lease.release();
        assert_eq!(ledger.issued(), 1);
        assert_eq!(ledger.released(), 1);
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn test_lease_shares_caller_memory() {
        let ledger = Arc::new(LeaseLedger::new());
        let data = Bytes::from(vec![7u8; 64]);
        let lease = ledger.lease(data.clone());
        assert_eq!(lease.bytes().as_ptr(), data.as_ptr());
    }

    #[test]
    fn test_dropped_lease_counts_as_released() {
        let ledger = Arc::new(LeaseLedger::new());
        {
            let _a = ledger.lease(Bytes::from_static(b"a"));
            let _b = ledger.lease(Bytes::from_static(b"b"));
            assert_eq!(ledger.outstanding(), 2);
        }
        assert_eq!(ledger.released(), 2);
    }
}
