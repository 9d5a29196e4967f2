#![forbid(unsafe_code)]

//! Tokio task that runs a switch's decay and aging steps on time.
//!
//! The switch itself only knows deadlines. [`spawn_timer_driver`] sleeps until the next one,
//! runs the due steps and goes back to sleep; when every timer is idle it parks until a
//! packet arms one again. Stopping goes through [`TimerHandle::shutdown`], which ends the
//! task before cancelling the switch's timers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use conga_core::PortId;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use crate::packet::Packet;
use crate::switch::{PacketHandler, Switch, SwitchStats};
use crate::RoutingResult;

/// A switch shared between the forwarding path and its timer driver.
#[derive(Clone)]
pub struct SharedSwitch {
    inner: Arc<Mutex<Switch>>,
    wake: Arc<Notify>,
}

impl SharedSwitch {
    pub fn new(switch: Switch) -> Self {
        Self {
            inner: Arc::new(Mutex::new(switch)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Route one packet at the current tokio time. Wakes the driver when the packet
    /// moved the next deadline (typically by arming an idle timer).
    pub fn handle_packet(&self, packet: &mut Packet) -> RoutingResult<PortId> {
        let now = Instant::now().into_std();
        let (result, rescheduled) = {
            let mut switch = self.lock();
            let before = switch.next_deadline();
            let result = switch.handle_packet(packet, now);
            (result, switch.next_deadline() != before)
        };
        if rescheduled {
            self.wake.notify_one();
        }
        result
    }

    /// Run `f` with exclusive access to the switch.
    pub fn with<R>(&self, f: impl FnOnce(&mut Switch) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn stats(&self) -> SwitchStats {
        self.lock().stats()
    }

    fn lock(&self) -> MutexGuard<'_, Switch> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a running timer driver.
pub struct TimerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    switch: SharedSwitch,
}

impl TimerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the driver task, wait for it, then cancel the switch's pending timers.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            warn!(%err, "timer driver task failed");
        }
        self.switch.lock().shutdown();
    }
}

/// Spawn the driver for `switch` on the current tokio runtime.
pub fn spawn_timer_driver(switch: SharedSwitch) -> TimerHandle {
    let (stop, mut stopped) = watch::channel(false);
    let driven = switch.clone();
    let task = tokio::spawn(async move {
        info!("timer driver started");
        loop {
            let deadline = driven.lock().next_deadline();
            match deadline {
                Some(at) => {
                    tokio::select! {
                        _ = sleep_until(Instant::from_std(at)) => {
                            let now = Instant::now().into_std();
                            driven.lock().run_timers(now);
                        }
                        _ = driven.wake.notified() => {}
                        _ = stopped.changed() => break,
                    }
                }
                None => {
                    tokio::select! {
                        _ = driven.wake.notified() => {}
                        _ = stopped.changed() => break,
                    }
                }
            }
        }
        info!("timer driver stopped");
    });
    TimerHandle { stop, task, switch }
}
