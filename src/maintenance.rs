// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::ValueLogPool;
use std::{
    sync::mpsc::{self, RecvTimeoutError},
    thread::JoinHandle,
};

/// Runs the pool's maintenance sweep periodically on a background thread.
///
/// The thread only holds a weak reference to the pool, so it ends on its own
/// once the pool is dropped. Dropping this handle stops and joins it.
pub struct Maintenance {
    stop_signal: Option<mpsc::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Maintenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maintenance<running: {}>", self.join.is_some())
    }
}

impl Maintenance {
    /// Spawns the maintenance thread.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the thread cannot be spawned.
    pub fn start(pool: &ValueLogPool) -> crate::Result<Self> {
        let (stop_signal, stop_rx) = mpsc::channel::<()>();

        let interval = pool.config().sweep_interval;
        let pool = pool.weak();

        let join = std::thread::Builder::new()
            .name("vlog-maintenance".into())
            .spawn(move || {
                log::debug!("Maintenance thread started, sweeping every {interval:?}");

                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let Some(inner) = pool.upgrade() else {
                        break;
                    };
                    let pool = ValueLogPool::from_inner(inner);

                    if pool.is_closed() {
                        break;
                    }

                    let sealed = pool.run_maintenance_sweep();

                    if !sealed.is_empty() {
                        log::debug!("Maintenance sweep sealed {} value logs", sealed.len());
                    }
                }

                log::debug!("Maintenance thread stopped");
            })?;

        Ok(Self {
            stop_signal: Some(stop_signal),
            join: Some(join),
        })
    }

    /// Stops the thread and waits for it to finish.
    ///
    /// Can be called more than once.
    pub fn stop(&mut self) {
        // NOTE: Dropping the sender wakes the thread up
        self.stop_signal.take();

        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("Maintenance thread panicked");
            }
        }
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.stop();
    }
}
