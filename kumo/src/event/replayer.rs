//! Time-warped replay of stored events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::bus::EventBus;
use super::storage::{EventQuery, EventStorage};
use crate::error::{AgentError, Result};

/// Replay pacing and repetition.
#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    /// Speed multiplier over the original event spacing. `1.0` replays in
    /// real time, `2.0` twice as fast, `0.0` as fast as possible while
    /// preserving order.
    pub speed: f64,
    /// Number of passes over the selected events.
    pub loop_count: usize,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            loop_count: 1,
        }
    }
}

/// Re-publishes stored events to a target bus.
///
/// Events are delivered in original timestamp order (sequence-number
/// tiebreak, the order [`EventStorage::query`] returns), with the gaps
/// between original timestamps divided by the speed multiplier.
#[derive(Debug)]
pub struct EventReplayer {
    storage: Arc<dyn EventStorage>,
    target: EventBus,
    options: ReplayOptions,
}

impl EventReplayer {
    /// Create a replayer from storage onto a target bus.
    #[must_use]
    pub fn new(storage: Arc<dyn EventStorage>, target: EventBus) -> Self {
        Self {
            storage,
            target,
            options: ReplayOptions::default(),
        }
    }

    /// Set pacing and repetition options.
    #[must_use]
    pub fn with_options(mut self, options: ReplayOptions) -> Self {
        self.options = options;
        self
    }

    /// Replay events matching `query`, returning how many were published.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Cancelled`](crate::ErrorCode::Cancelled) when
    /// `cancel` fires mid-replay, or an internal error when the target bus
    /// is closed.
    pub async fn replay(&self, query: &EventQuery, cancel: &CancellationToken) -> Result<usize> {
        let stored = self.storage.query(query).await?;
        if stored.is_empty() {
            return Ok(0);
        }
        info!(
            events = stored.len(),
            speed = self.options.speed,
            loops = self.options.loop_count,
            "Starting event replay",
        );

        let mut published = 0usize;
        for pass in 0..self.options.loop_count.max(1) {
            debug!(pass, "Replay pass");
            let mut previous: Option<DateTime<Utc>> = None;
            for entry in &stored {
                if cancel.is_cancelled() {
                    return Err(AgentError::cancelled("event replay"));
                }
                if self.options.speed > 0.0 {
                    if let Some(prev) = previous {
                        let gap = (entry.event.timestamp - prev)
                            .to_std()
                            .unwrap_or_default();
                        let scaled = gap.div_f64(self.options.speed);
                        if !scaled.is_zero() {
                            tokio::select! {
                                () = tokio::time::sleep(scaled) => {}
                                () = cancel.cancelled() => {
                                    return Err(AgentError::cancelled("event replay"));
                                }
                            }
                        }
                    }
                }
                previous = Some(entry.event.timestamp);
                self.target
                    .publish(entry.event.clone())
                    .await
                    .map_err(|e| AgentError::internal(format!("replay target: {e}")))?;
                published += 1;
            }
        }
        Ok(published)
    }
}
