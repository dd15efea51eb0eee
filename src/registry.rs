use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared set of external processes that belong to the running pipeline.
///
/// The orchestrator adds a process right after it starts and removes it once
/// it has been reaped; the signal relay reads it to forward interrupts. Clones
/// share the same set. Every access goes through one mutex.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    pids: Arc<Mutex<Vec<u32>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pid: u32) {
        self.lock().push(pid);
    }

    /// Forget a reaped process so that its id is never signaled again.
    pub fn remove(&self, pid: u32) {
        self.lock().retain(|&p| p != pid);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    #[cfg(test)]
    fn pids(&self) -> Vec<u32> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Send `signal` to every registered process while holding the lock.
    ///
    /// Failures for single processes (typically one that already exited) are
    /// reported on stderr and do not stop the others from being signaled.
    /// Returns how many processes were signaled successfully.
    pub fn signal_all(&self, signal: Signal) -> usize {
        let pids = self.lock();
        let mut delivered = 0;
        for &pid in pids.iter() {
            let Ok(raw) = i32::try_from(pid) else {
                continue;
            };
            match kill(Pid::from_raw(raw), signal) {
                Ok(()) => delivered += 1,
                Err(e) => eprintln!("err: signal {pid}: {e}"),
            }
        }
        delivered
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u32>> {
        // The set stays consistent even if a holder panicked mid-iteration.
        self.pids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
