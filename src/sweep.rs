//! Periodic garbage collection of expiring rows.
//!
//! Nothing here is needed for correctness: every store already treats expired rows as
//! absent. The sweeper only keeps storage bounded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{event, Level};

use crate::error::Error;

pub trait Sweep: Send + Sync {
    fn name(&self) -> &'static str;
    /// Deletes expired rows, returning how many went.
    fn sweep(&self) -> Result<usize, Error>;
}

pub struct Sweeper {
    targets: Vec<Arc<dyn Sweep>>,
    every: Duration,
}

pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

impl Sweeper {
    pub fn new(every: Duration) -> Self {
        Self {
            targets: Vec::new(),
            every,
        }
    }

    pub fn with(mut self, target: Arc<dyn Sweep>) -> Self {
        self.targets.push(target);
        self
    }

    /// One pass over every target. Failures are logged and do not stop the pass.
    pub fn run_once(&self) -> usize {
        let mut total = 0;
        for target in &self.targets {
            match target.sweep() {
                Ok(n) => {
                    event!(Level::DEBUG, target = target.name(), removed = n, "Swept");
                    total += n;
                }
                Err(e) => {
                    event!(Level::ERROR, target = target.name(), error = %e, "Sweep failed")
                }
            }
        }
        total
    }

    pub fn spawn(self) -> SweeperHandle {
        let (shutdown, mut signal) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.every);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let sweeper = &self;
                        tokio::task::block_in_place(|| sweeper.run_once());
                    }
                    changed = signal.changed() => {
                        if changed.is_err() || *signal.borrow() {
                            event!(Level::INFO, "Sweeper stopping");
                            break;
                        }
                    }
                }
            }
        });

        SweeperHandle { shutdown, task }
    }
}
