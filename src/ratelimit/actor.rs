//! The limiter actor: sole owner of the ledger.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use super::clock::Clock;
use super::delay::Delay;
use super::ledger::Ledger;
use crate::config::LimiterConfig;

/// Requests handled by the actor.
#[derive(Debug)]
pub(crate) enum Command {
    /// Commit `slice` of `task`'s budget if available
    Schedule {
        task: String,
        slice: Duration,
        reply: oneshot::Sender<Delay>,
    },
    /// Report the number of tracked tasks
    Len { reply: oneshot::Sender<usize> },
}

/// Sequential processor for schedule requests and sweep ticks.
///
/// Every ledger read and write happens inside [`Actor::run`], one command at
/// a time, so the read-modify-write of a schedule needs no lock.
pub(crate) struct Actor {
    ledger: Ledger,
    clock: Clock,
    tick_interval: Duration,
    sweep_batch: usize,
    mailbox: mpsc::Receiver<Command>,
    shutdown: watch::Receiver<bool>,
}

impl Actor {
    pub fn new(
        quantum: Duration,
        config: &LimiterConfig,
        mailbox: mpsc::Receiver<Command>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ledger: Ledger::new(quantum),
            clock: Clock::new(),
            tick_interval: config.tick_interval(),
            sweep_batch: config.sweep_batch,
            mailbox,
            shutdown,
        }
    }

    /// Process commands and sweep ticks until shutdown or until every
    /// handle is gone.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tick_interval = ?self.tick_interval,
            sweep_batch = self.sweep_batch,
            "Limiter actor started"
        );

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                command = self.mailbox.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = tick.tick() => {
                    if self.is_shutdown() {
                        break;
                    }
                    self.sweep();
                }
            }
        }

        info!(tracked = self.ledger.len(), "Limiter actor stopped");
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Schedule { task, slice, reply } => {
                let now = self.clock.now_nanos();
                let delay = self.ledger.schedule(&task, slice, now);

                trace!(task = %task, slice = ?slice, delay = %delay, "Scheduled task");
                if !delay.is_granted() {
                    debug!(task = %task, wait = ?delay.wait(), "Task over quantum");
                }

                // The caller may have stopped waiting; a grant stays committed.
                let _ = reply.send(delay);
            }
            Command::Len { reply } => {
                let _ = reply.send(self.ledger.len());
            }
        }
    }

    fn sweep(&mut self) {
        let now = self.clock.now_nanos();
        let evicted = self.ledger.sweep(now, self.sweep_batch);
        if evicted > 0 {
            debug!(
                evicted = evicted,
                remaining = self.ledger.len(),
                "Swept decayed tasks"
            );
        }
    }
}
