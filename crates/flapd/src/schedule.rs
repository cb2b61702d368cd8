//! Cron-driven rendering of scheduled templates.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Local;
use cron::Schedule;
use flap_board::{render, Template};
use flap_core::{Hold, MessageRequest};
use tracing::{info, warn};

use crate::content::TemplateEntry;
use crate::AppState;

/// Parse a 5-field cron expression (minute granularity). The parser wants a
/// seconds field, so we pin it to zero.
pub fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    Schedule::from_str(&format!("0 {expr}"))
}

/// Render one template and hand the result to the engine. Returns `Ok(false)`
/// when the render was skipped because its provider had no data.
pub async fn fire(state: &Arc<AppState>, entry: &TemplateEntry) -> anyhow::Result<bool> {
    let mut variables = entry.variables.clone();
    if let Some(integration) = &entry.integration {
        let provider = state
            .providers
            .get(integration)
            .ok_or_else(|| anyhow::anyhow!("no provider named {integration}"))?;
        match provider.variables().await {
            Ok(live) => variables.extend(live),
            Err(flap_providers::ProviderError::Unavailable(reason)) => {
                info!(template = %entry.id, %reason, "provider has no data, skipping");
                state.metrics.renders_skipped.inc();
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        }
    }

    let template = Template {
        formats: entry.formats.clone(),
        variables,
        truncation: entry.truncation,
    };
    let grid = render(state.model, &template, &mut rand::thread_rng());

    state.engine.admit(MessageRequest {
        name: entry.id.clone(),
        priority: entry.priority,
        timeout: entry.timeout,
        hold: Hold::For(entry.hold),
        payload: grid,
    });
    Ok(true)
}

/// Drive one scheduled template forever: sleep until the next cron
/// occurrence, render, repeat. Render failures are logged and do not stop
/// the schedule.
pub async fn run_schedule(state: Arc<AppState>, entry: TemplateEntry, schedule: Schedule) {
    loop {
        let Some(next) = schedule.upcoming(Local).next() else {
            warn!(template = %entry.id, "cron schedule has no further occurrences");
            return;
        };
        let wait = (next - Local::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        tokio::time::sleep(wait).await;

        match fire(&state, &entry).await {
            Ok(true) => info!(template = %entry.id, "rendered scheduled template"),
            Ok(false) => {}
            Err(err) => warn!(template = %entry.id, error = %err, "scheduled render failed"),
        }
    }
}
