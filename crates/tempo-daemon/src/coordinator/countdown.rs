//! Countdown-specific operations: stop, start, reset.
//!
//! Stop/start conserve remaining time: stopping records the pause moment,
//! starting shifts the end time forward by exactly the time spent paused.
//! Reset rebases the clock to `now + duration` regardless of pause state.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::info;

use tempo_core::db::unix_timestamp;
use tempo_core::error::{Result, ResultExt, TimerError};
use tempo_core::model::event::TimerEvent;
use tempo_core::model::{CountdownTimer, Timer, TimerId, UserId};
use tempo_core::saga::Saga;

use super::{TimerCoordinator, settle};

const OP_STOP: &str = "stop";
const OP_START: &str = "start";
const OP_RESET: &str = "reset";

impl TimerCoordinator {
    /// Pause a running countdown timer at `pause_time`. Creator-only;
    /// stopping an already paused timer returns `TimerIsPaused`.
    pub async fn stop(&self, timer_id: TimerId, user_id: UserId, pause_time: i64) -> Result<()> {
        let saga = Saga::new();
        let outcome = timeout(
            self.config.operation_deadline,
            self.stop_writes(timer_id, user_id, pause_time, &saga),
        )
        .await;
        settle(OP_STOP, &saga, outcome).await?;

        self.bus
            .publish(TimerEvent::Stop {
                timer_id,
                pause_time,
            })
            .await;
        info!(timer_id = %timer_id, user_id, pause_time, "Countdown timer stopped");
        Ok(())
    }

    async fn stop_writes(
        &self,
        timer_id: TimerId,
        user_id: UserId,
        pause_time: i64,
        saga: &Saga,
    ) -> Result<()> {
        // The precondition load counts against the deadline too.
        let timer = self
            .check_countdown(OP_STOP, timer_id, user_id)
            .await
            .step(OP_STOP, "check timer")?;
        if timer.timer.is_paused {
            return Err(TimerError::TimerIsPaused(timer_id));
        }

        self.ticks
            .stop(timer_id)
            .await
            .step(OP_STOP, "suspend in tick service")?;
        let ticks = Arc::clone(&self.ticks);
        let end_time = timer.timer.end_time;
        saga.register("resume in tick service", async move {
            ticks.start(timer_id, end_time).await
        });

        self.timers
            .update_pause_time(timer_id, pause_time, true)
            .await
            .step(OP_STOP, "write pause state")?;
        let timers = Arc::clone(&self.timers);
        saga.register("clear pause state", async move {
            timers.update_pause_time(timer_id, 0, false).await
        });

        Ok(())
    }

    /// Resume a paused countdown timer. Creator-only; starting a running
    /// timer returns `TimerIsPlaying`. The end time shifts forward by the
    /// time spent paused, so the remaining duration is unchanged. Returns
    /// the timer with its post-resume fields.
    pub async fn start(&self, timer_id: TimerId, user_id: UserId) -> Result<Timer> {
        let saga = Saga::new();
        let outcome = timeout(
            self.config.operation_deadline,
            self.start_writes(timer_id, user_id, &saga),
        )
        .await;
        let started = settle(OP_START, &saga, outcome).await?;

        self.bus
            .publish(TimerEvent::Start {
                timer_id,
                end_time: started.end_time,
            })
            .await;
        info!(timer_id = %timer_id, user_id, end_time = started.end_time, "Countdown timer started");
        Ok(started)
    }

    async fn start_writes(&self, timer_id: TimerId, user_id: UserId, saga: &Saga) -> Result<Timer> {
        let timer = self
            .check_countdown(OP_START, timer_id, user_id)
            .await
            .step(OP_START, "check timer")?;
        if !timer.timer.is_paused {
            return Err(TimerError::TimerIsPlaying(timer_id));
        }

        let paused_for = unix_timestamp() - timer.timer.pause_time;
        let end_time = timer.timer.end_time + paused_for;

        self.timers
            .update_end_time(timer_id, end_time)
            .await
            .step(OP_START, "write new end time")?;
        let timers = Arc::clone(&self.timers);
        let previous_end = timer.timer.end_time;
        saga.register("restore previous end time", async move {
            timers.update_end_time(timer_id, previous_end).await
        });

        self.timers
            .update_pause_time(timer_id, 0, false)
            .await
            .step(OP_START, "clear pause state")?;
        let timers = Arc::clone(&self.timers);
        let pause_time = timer.timer.pause_time;
        saga.register("restore pause state", async move {
            timers.update_pause_time(timer_id, pause_time, true).await
        });

        self.ticks
            .start(timer_id, end_time)
            .await
            .step(OP_START, "resume in tick service")?;
        let ticks = Arc::clone(&self.ticks);
        saga.register("suspend in tick service", async move {
            ticks.stop(timer_id).await
        });

        let mut started = timer.timer;
        started.end_time = end_time;
        started.pause_time = 0;
        started.is_paused = false;
        Ok(started)
    }

    /// Rebase the timer's end time to `now + duration`. Creator-only.
    /// Pause state is deliberately left untouched: resetting a paused timer
    /// keeps it paused with a full duration ahead. Returns the timer with
    /// its post-reset end time.
    pub async fn reset(&self, timer_id: TimerId, user_id: UserId) -> Result<Timer> {
        let write = async {
            let timer = self
                .check_countdown(OP_RESET, timer_id, user_id)
                .await
                .step(OP_RESET, "check timer")?;

            let end_time = unix_timestamp() + timer.timer.duration;
            self.timers
                .update_end_time(timer_id, end_time)
                .await
                .step(OP_RESET, "write new end time")?;

            let mut reset = timer.timer;
            reset.end_time = end_time;
            Ok::<Timer, TimerError>(reset)
        };
        let reset = match timeout(self.config.operation_deadline, write).await {
            Ok(result) => result?,
            Err(_) => return Err(TimerError::DeadlineExceeded(OP_RESET)),
        };

        self.bus
            .publish(TimerEvent::Reset {
                timer_id,
                end_time: reset.end_time,
            })
            .await;
        info!(timer_id = %timer_id, user_id, end_time = reset.end_time, "Countdown timer reset");
        Ok(reset)
    }

    /// Load the countdown timer and require the caller to be its creator.
    async fn check_countdown(
        &self,
        op: &'static str,
        timer_id: TimerId,
        user_id: UserId,
    ) -> Result<CountdownTimer> {
        let timer = self
            .timers
            .countdown_timer(timer_id)
            .await
            .step(op, "load countdown timer")?;
        if timer.timer.creator != user_id {
            return Err(TimerError::Forbidden { timer_id, user_id });
        }
        Ok(timer)
    }
}
