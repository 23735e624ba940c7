//! Handle to a running limiter actor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::actor::{Actor, Command};
use super::backend::Limiter;
use super::delay::Delay;
use crate::config::LimiterConfig;
use crate::error::{LimiterError, Result};

/// Per-task time quantum limiter.
///
/// Each task may hold at most `quantum` of committed time within any
/// trailing window of `quantum`. Unused allowance replenishes with the
/// passage of time. All requests are serialized through a single actor
/// task, so the handle can be shared freely behind an `Arc`.
///
/// After [`close`](Self::close), `schedule`, `schedule_blocking` and
/// `tracked_tasks` return [`LimiterError::Closed`] immediately;
/// `quantum` keeps answering.
pub struct QuantumLimiter {
    /// Window size, exactly as constructed
    quantum: Duration,
    /// Settings the actor was started with
    config: LimiterConfig,
    /// Request mailbox of the actor
    mailbox: mpsc::Sender<Command>,
    /// Shutdown signal observed by the actor
    shutdown: watch::Sender<bool>,
    /// Set by the first call to `close`
    closed: AtomicBool,
    /// The actor task, taken by the first `close`
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for QuantumLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantumLimiter")
            .field("quantum", &self.quantum)
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl QuantumLimiter {
    /// Create a limiter with the given quantum and default sweep settings.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new(quantum: Duration) -> Self {
        Self::spawn(quantum, LimiterConfig::with_quantum(quantum))
    }

    /// Create a limiter from a full configuration.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn with_config(config: LimiterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::spawn(config.quantum(), config))
    }

    fn spawn(quantum: Duration, config: LimiterConfig) -> Self {
        let (mailbox, inbox) = mpsc::channel(config.mailbox_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let actor = Actor::new(quantum, &config, inbox, shutdown_rx);
        let handle = tokio::spawn(actor.run());

        info!(
            quantum = ?quantum,
            mailbox_capacity = config.mailbox_capacity,
            "Limiter created"
        );

        Self {
            quantum,
            config,
            mailbox,
            shutdown,
            closed: AtomicBool::new(false),
            actor: Mutex::new(Some(handle)),
        }
    }

    /// The time budget every task gets per window.
    pub fn quantum(&self) -> Duration {
        self.quantum
    }

    /// The configuration this limiter runs with.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Schedule `task` to run for `slice` if it has quantum available.
    ///
    /// A granted delay commits the slice. A denied delay leaves the task's
    /// budget untouched and tells the caller how long to wait before the
    /// same request would succeed. Once the request is queued it is
    /// evaluated even if this future is dropped.
    pub async fn schedule(&self, task: &str, slice: Duration) -> Result<Delay> {
        if self.is_closed() {
            return Err(LimiterError::Closed);
        }

        let (reply, response) = oneshot::channel();
        self.mailbox
            .send(Command::Schedule {
                task: task.to_owned(),
                slice,
                reply,
            })
            .await
            .map_err(|_| LimiterError::Closed)?;

        response.await.map_err(|_| LimiterError::Closed)
    }

    /// Blocking variant of [`schedule`](Self::schedule) for plain threads.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn schedule_blocking(&self, task: &str, slice: Duration) -> Result<Delay> {
        if self.is_closed() {
            return Err(LimiterError::Closed);
        }

        let (reply, response) = oneshot::channel();
        self.mailbox
            .blocking_send(Command::Schedule {
                task: task.to_owned(),
                slice,
                reply,
            })
            .map_err(|_| LimiterError::Closed)?;

        response.blocking_recv().map_err(|_| LimiterError::Closed)
    }

    /// Number of tasks currently held in the ledger.
    pub async fn tracked_tasks(&self) -> Result<usize> {
        if self.is_closed() {
            return Err(LimiterError::Closed);
        }

        let (reply, response) = oneshot::channel();
        self.mailbox
            .send(Command::Len { reply })
            .await
            .map_err(|_| LimiterError::Closed)?;

        response.await.map_err(|_| LimiterError::Closed)
    }

    /// Stop the actor and its sweeper.
    ///
    /// Only the first call has an effect; it returns once the actor has
    /// exited. Later calls return immediately. Never fails.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.shutdown.send_replace(true);

        let actor = self.actor.lock().take();
        if let Some(actor) = actor {
            if let Err(e) = actor.await {
                warn!(error = %e, "Limiter actor terminated abnormally");
            }
        }

        info!(quantum = ?self.quantum, "Limiter closed");
        Ok(())
    }
}

#[async_trait]
impl Limiter for QuantumLimiter {
    fn quantum(&self) -> Duration {
        QuantumLimiter::quantum(self)
    }

    async fn schedule(&self, task: &str, slice: Duration) -> Result<Delay> {
        QuantumLimiter::schedule(self, task, slice).await
    }

    async fn close(&self) -> Result<()> {
        QuantumLimiter::close(self).await
    }
}
