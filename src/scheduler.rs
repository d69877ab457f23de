//! Per-room tick driver.
//!
//! Every room with occupants gets one background task advancing its
//! simulation at the mode's cadence. The task holds the room lock only for
//! the duration of one step; collected events are flushed through the hub
//! after the lock is released. When a room empties, the task retires it
//! from the registry and exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::registry::RoomHandle;
use crate::rooms::{Outbox, Simulated, MAX_TICK_DELTA};
use crate::server::GameServer;

/// Spawn the ticker for a room unless one is already running.
pub fn spawn_room_ticker<S: Simulated>(
    server: Arc<GameServer>,
    handle: Arc<RoomHandle<S>>,
    tick_hz: u32,
) {
    if !handle.claim_ticker() {
        return;
    }

    tokio::spawn(async move {
        let period = Duration::from_secs_f64(1.0 / f64::from(tick_hz.max(1)));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = server.now();

        tracing::debug!(room = %handle.key, tick_hz, "Room ticker started");

        loop {
            ticker.tick().await;
            let now = server.now();
            let dt = (now - last).clamp(0.0, MAX_TICK_DELTA);
            last = now;

            let mut out = Outbox::new();
            let occupants = {
                let mut state = handle.state.lock().await;
                state.step(now, dt, &mut out);
                state.occupant_count()
            };
            server.flush(&handle.key, out);

            if occupants == 0 && server.registry().try_retire(&handle.key).await {
                handle.release_ticker();
                tracing::debug!(room = %handle.key, "Room retired");
                break;
            }
        }
    });
}
