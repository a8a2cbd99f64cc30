use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;

use crate::error::FormatError;

/// Allows at most one format of a buffer at a time.
///
/// Waiters are served in the order they asked for the lock.
#[derive(Clone, Default)]
pub struct BufferLocks {
  semaphores: Arc<Mutex<HashMap<PathBuf, Arc<Semaphore>>>>,
}

impl BufferLocks {
  pub fn new() -> Self {
    Self::default()
  }

  /// Waits for the buffer to be free and locks it.
  pub async fn lock(&self, path: &Path) -> BufferLockGuard {
    let mut guard = self.guard_for(path);
    guard.permit = guard.semaphore.clone().acquire_owned().await.ok();
    guard
  }

  /// Locks the buffer, failing with `Busy` when a format is already in flight.
  pub fn try_lock(&self, path: &Path) -> Result<BufferLockGuard, FormatError> {
    let mut guard = self.guard_for(path);
    match guard.semaphore.clone().try_acquire_owned() {
      Ok(permit) => {
        guard.permit = Some(permit);
        Ok(guard)
      }
      Err(_) => Err(FormatError::Busy(path.to_path_buf())),
    }
  }

  fn guard_for(&self, path: &Path) -> BufferLockGuard {
    let semaphore = self
      .semaphores
      .lock()
      .entry(path.to_path_buf())
      .or_insert_with(|| Arc::new(Semaphore::new(1)))
      .clone();
    BufferLockGuard {
      locks: self.clone(),
      path: path.to_path_buf(),
      semaphore,
      permit: None,
    }
  }

  #[cfg(test)]
  fn tracked_len(&self) -> usize {
    self.semaphores.lock().len()
  }
}

pub struct BufferLockGuard {
  locks: BufferLocks,
  path: PathBuf,
  semaphore: Arc<Semaphore>,
  permit: Option<OwnedSemaphorePermit>,
}

impl Drop for BufferLockGuard {
  fn drop(&mut self) {
    drop(self.permit.take());
    let mut semaphores = self.locks.semaphores.lock();
    // only the map and this guard reference it, so nobody is waiting
    if Arc::strong_count(&self.semaphore) == 2 {
      semaphores.remove(&self.path);
    }
  }
}
