use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::store::Region;

/// One-sided access to the memory regions of remote replicas.
///
/// The store issues whole-bucket and whole-value reads through this seam and
/// never retries; failures propagate to the caller unchanged. `tid` is the
/// caller's stable thread id, which a real transport uses to pick the
/// per-thread registered buffer and queue pair.
pub trait RemoteReader: Send + Sync {
    /// Blocking read of `dst.len()` bytes from server `sid` at byte offset
    /// `src_off` of its region.
    fn read(&self, tid: usize, sid: usize, dst: &mut [u8], src_off: u64) -> Result<()>;
}

/// In-process transport over shared region handles.
///
/// Every replica of a test cluster registers its region here; reads are
/// plain memory copies. This is also what backs a single-server store,
/// where the remote path is never taken.
pub struct Loopback {
    regions: Vec<Arc<Region>>,
}

impl Loopback {
    pub fn new(regions: Vec<Arc<Region>>) -> Self {
        Self { regions }
    }

    /// The region registered for server `sid`.
    pub fn region(&self, sid: usize) -> Option<&Arc<Region>> {
        self.regions.get(sid)
    }
}

impl RemoteReader for Loopback {
    fn read(&self, _tid: usize, sid: usize, dst: &mut [u8], src_off: u64) -> Result<()> {
        let region = self
            .regions
            .get(sid)
            .ok_or_else(|| StoreError::Transport(format!("no region for server {}", sid)))?;
        region.read_bytes(src_off, dst)
    }
}
