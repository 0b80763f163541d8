use std::sync::mpsc;

use engine_logging::{engine_debug, engine_info, engine_warn};

use crate::{CooldownKind, HarvestEvent};

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: HarvestEvent);
}

/// Forwards events to a receiver on another thread.
pub struct ChannelProgressSink {
    tx: mpsc::Sender<HarvestEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<HarvestEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: HarvestEvent) {
        let _ = self.tx.send(event);
    }
}

/// Writes events to the log; the default when nobody listens.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn emit(&self, event: HarvestEvent) {
        match event {
            HarvestEvent::GroupStarted {
                group_key,
                seeded_total,
            } => engine_info!("#{} starting with {} stored rows", group_key, seeded_total),
            HarvestEvent::ItemProcessed {
                outcome,
                running_total,
                session_count,
                ..
            } => engine_debug!(
                "item {:?} (session {}, total {})",
                outcome,
                session_count,
                running_total
            ),
            HarvestEvent::ExtractionMissed { kind, message, .. } => {
                engine_warn!("{}: {}", kind, message)
            }
            HarvestEvent::Cooldown { kind, duration, .. } => {
                let unit = match kind {
                    CooldownKind::Rows => "rows",
                    CooldownKind::Rounds => "rounds",
                };
                engine_info!("cooldown after {} for {:.1}s", unit, duration.as_secs_f64())
            }
            HarvestEvent::RoundFinished {
                round, new_rows, ..
            } => engine_info!("round {} inserted {} new rows", round, new_rows),
            HarvestEvent::GroupFinished(summary) => engine_info!(
                "#{} done: attempted={} saved={} merged={} stop={}",
                summary.group_key,
                summary.attempted_count,
                summary.saved_count,
                summary.merged_count,
                summary.stop_reason
            ),
        }
    }
}
