//! Running a junction against the wall clock, for interactive use.
//!
//! The junction itself never looks at real time. The driver owns it on a single task, sleeps until
//! the wall-clock instant of its next event, and serialises injections with dispatch by handling
//! them on that same task.

use std::time::Duration;

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    error::{DriverError, InvalidEventError},
    event::Event,
    junction::{Injection, Junction, Step},
    snapshot::Snapshot,
};

enum Message {
    Inject(Injection, oneshot::Sender<Result<(), InvalidEventError>>),
    Snapshot(oneshot::Sender<Snapshot>),
    ShutDown,
}

/// A handle to a junction running on its own task.
///
/// Dropping it stops the task.
#[derive(Debug)]
pub struct LiveDriver {
    msg_tx: mpsc::Sender<Message>,
    handle: Option<JoinHandle<Junction>>,
}

struct Worker {
    junction: Junction,
    msg_rx: mpsc::Receiver<Message>,
    event_tx: mpsc::UnboundedSender<Event>,

    /// Simulated seconds per wall-clock second.
    speed: f64,
    /// The wall-clock instant matching `sim_origin`.
    wall_origin: Instant,
    sim_origin: Duration,

    /// Set once the horizon is reached or nothing is left to dispatch.
    finished: bool,
}

impl LiveDriver {
    /// Start driving `junction` at `speed` simulated seconds per wall-clock second.
    ///
    /// Returns the handle and the outbound event stream. Must be called from within a Tokio
    /// runtime.
    pub fn spawn(junction: Junction, speed: f64) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (msg_tx, msg_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let speed = if speed.is_finite() && speed > 0.0 {
            speed
        } else {
            warn!(speed, "Invalid driver speed, running in real time");
            1.0
        };

        let worker = Worker {
            sim_origin: junction.now(),
            wall_origin: Instant::now(),
            junction,
            msg_rx,
            event_tx,
            speed,
            finished: false,
        };

        let handle = tokio::spawn(worker.run());

        (
            Self {
                msg_tx,
                handle: Some(handle),
            },
            event_rx,
        )
    }

    /// Hand an injection to the junction. Resolves once it has been applied, or rejected.
    pub async fn inject(&self, injection: Injection) -> Result<(), DriverError> {
        let (tx, rx) = oneshot::channel();
        self.msg_tx.send(Message::Inject(injection, tx)).await?;
        Ok(rx.await??)
    }

    /// The junction's state between dispatches.
    pub async fn snapshot(&self) -> Result<Snapshot, DriverError> {
        let (tx, rx) = oneshot::channel();
        self.msg_tx.send(Message::Snapshot(tx)).await?;
        Ok(rx.await?)
    }

    /// Stop driving and take the junction back.
    pub async fn shut_down(mut self) -> Result<Junction, DriverError> {
        // If the task has already gone, the join below reports it.
        let _ = self.msg_tx.send(Message::ShutDown).await;
        let handle = self.handle.take().ok_or(DriverError::Stopped)?;
        handle.await.map_err(|_| DriverError::Stopped)
    }
}

impl Drop for LiveDriver {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

impl Worker {
    async fn run(mut self) -> Junction {
        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                msg = self.msg_rx.recv() => {
                    match msg {
                        Some(Message::Inject(injection, tx)) => {
                            let result = self.apply(injection);
                            if tx.send(result).is_err() {
                                debug!("Injection result receiver dropped");
                            }
                        }
                        Some(Message::Snapshot(tx)) => {
                            let _ = tx.send(self.junction.snapshot());
                        }
                        Some(Message::ShutDown) | None => {
                            info!(now = ?self.junction.now(), "Live driver shutting down");
                            return self.junction;
                        }
                    }
                }

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.step();
                }
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        if self.finished {
            return None;
        }
        let at = self.junction.next_event_time()?;
        // Too far away to represent as a wall-clock instant: wait for messages only.
        let seconds = at.saturating_sub(self.sim_origin).as_secs_f64() / self.speed;
        let offset = Duration::try_from_secs_f64(seconds).ok()?;
        self.wall_origin.checked_add(offset)
    }

    fn apply(&mut self, injection: Injection) -> Result<(), InvalidEventError> {
        self.junction.inject(injection);
        if let Err(err) = self.junction.apply_pending() {
            warn!(error = %err, "Rejected injection");
            self.junction.discard_injection();
            return Err(err);
        }
        // A new arrival or rate may have brought work back.
        self.finished = false;
        Ok(())
    }

    fn step(&mut self) {
        match self.junction.advance() {
            Ok(Step::Dispatched(_)) => {}
            Ok(Step::HorizonReached) => {
                info!(now = ?self.junction.now(), "Horizon reached");
                self.finished = true;
            }
            Ok(Step::Drained) => self.finished = true,
            Err(err) => {
                // Injections are applied eagerly, so this only happens if one slipped through.
                warn!(error = %err, "Dropping injection that failed at dispatch");
                self.junction.discard_injection();
            }
        }

        for event in self.junction.drain_events() {
            if self.event_tx.send(event).is_err() {
                debug!("Event receiver dropped");
                break;
            }
        }
    }
}
