//! Background sweep -- periodically re-analyzes recently active subjects so
//! baselines and audit trails stay current without any API traffic.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::analysis::PatternEngine;
use crate::config::SweepConfig;

/// Main sweep loop. Checks the shutdown signal between subjects, so a
/// cancellation never leaves a subject's incremental state half-written; the
/// next pass simply re-analyzes from persisted data.
pub async fn run_sweep_loop(
    engine: Arc<PatternEngine>,
    config: SweepConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    if !config.enabled {
        info!("background sweep disabled");
        return;
    }

    info!(
        interval_secs = config.interval_secs,
        window_hours = config.window_hours,
        "sweep engine started"
    );
    let mut interval = tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so startup stays quiet.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                info!("sweep engine stopping");
                return;
            }
        }

        let cutoff = Utc::now() - chrono::Duration::hours(config.window_hours as i64);
        let subjects = match engine.active_subjects(cutoff).await {
            Ok(subjects) => subjects,
            Err(err) => {
                warn!(error = %err, "sweep could not list active subjects");
                continue;
            }
        };

        debug!(count = subjects.len(), "sweep pass starting");
        for subject in subjects {
            if *shutdown.borrow() {
                info!("sweep engine stopping mid-pass");
                return;
            }

            match engine.analyze(Some(&subject), config.window_hours).await {
                Ok(result) => {
                    debug!(
                        subject = %subject,
                        risk = %result.risk_assessment.level,
                        anomalies = result.anomalies.len(),
                        "sweep analysis complete"
                    );
                }
                Err(err) => {
                    warn!(subject = %subject, error = %err, "sweep analysis failed");
                }
            }
        }
    }
}
