use crate::registry::ProcessRegistry;
use anyhow::{Context, Result};
use nix::sys::signal::Signal;
use signal_hook::consts::SIGINT;
use signal_hook::iterator::Signals;
use std::thread::{self, JoinHandle};

/// Forwards interrupts received by the shell to the running pipeline.
///
/// The shell itself survives Ctrl-C: installing the relay replaces the default
/// SIGINT disposition, and each delivery is turned into a SIGINT for every
/// process in the [`ProcessRegistry`].
#[derive(Debug, Clone)]
pub struct SignalRelay {
    registry: ProcessRegistry,
}

impl SignalRelay {
    pub fn new(registry: ProcessRegistry) -> Self {
        Self { registry }
    }

    /// Register for SIGINT and drain the notifications on a dedicated thread.
    pub fn install(self) -> Result<JoinHandle<()>> {
        let mut signals = Signals::new([SIGINT]).context("can't register SIGINT handler")?;
        thread::Builder::new()
            .name("signal-relay".into())
            .spawn(move || self.run(signals.forever()))
            .context("can't start signal relay thread")
    }

    /// Forward every interrupt from `events` until the stream ends.
    ///
    /// Other signal numbers are ignored.
    pub fn run(&self, events: impl IntoIterator<Item = i32>) {
        for event in events {
            if event == SIGINT {
                self.registry.signal_all(Signal::SIGINT);
            }
        }
    }
}
