pub mod api;
pub mod content;
pub mod schedule;
pub mod shutdown;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use flap_board::BoardModel;
use flap_core::DeliveryEngine;
use flap_providers::ProviderRegistry;
use tracing::warn;

use content::TemplateEntry;

/// Split loaded content into cron-scheduled entries and webhook-dispatched
/// media templates (keyed by name). A cron-less template whose name the
/// webhook never uses still loads, but a warn makes the typo visible at
/// startup instead of leaving the template silently unreachable.
pub fn partition_templates(
    entries: Vec<TemplateEntry>,
) -> (Vec<TemplateEntry>, HashMap<String, TemplateEntry>) {
    let mut scheduled = Vec::new();
    let mut media = HashMap::new();
    for entry in entries {
        if entry.cron.is_some() {
            scheduled.push(entry);
        } else {
            if !api::DISPATCHED_TEMPLATES.contains(&entry.name.as_str()) {
                warn!(
                    template = %entry.id,
                    "template has no cron and no webhook event dispatches it"
                );
            }
            media.insert(entry.name.clone(), entry);
        }
    }
    (scheduled, media)
}

/// Metrics for prometheus
pub struct Metrics {
    pub registry: prometheus::Registry,
    pub webhook_events: prometheus::IntCounter,
    pub renders_skipped: prometheus::IntCounter,
    pub messages_admitted: prometheus::IntCounter,
    pub messages_expired: prometheus::IntCounter,
    pub messages_sent: prometheus::IntCounter,
    pub send_failures: prometheus::IntCounter,
    pub preemptions: prometheus::IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = prometheus::Registry::new();

        let webhook_events = prometheus::IntCounter::new(
            "flapd_webhook_events_total",
            "Webhook events accepted",
        )
        .unwrap();
        let renders_skipped = prometheus::IntCounter::new(
            "flapd_renders_skipped_total",
            "Renders skipped because provider data was unavailable",
        )
        .unwrap();
        let messages_admitted =
            prometheus::IntCounter::new("flapd_messages_admitted_total", "Messages admitted")
                .unwrap();
        let messages_expired = prometheus::IntCounter::new(
            "flapd_messages_expired_total",
            "Messages discarded after expiring in the queue",
        )
        .unwrap();
        let messages_sent =
            prometheus::IntCounter::new("flapd_messages_sent_total", "Messages sent to the board")
                .unwrap();
        let send_failures =
            prometheus::IntCounter::new("flapd_send_failures_total", "Failed board sends").unwrap();
        let preemptions =
            prometheus::IntCounter::new("flapd_preemptions_total", "Holds cut short by priority")
                .unwrap();

        registry.register(Box::new(webhook_events.clone())).unwrap();
        registry.register(Box::new(renders_skipped.clone())).unwrap();
        registry.register(Box::new(messages_admitted.clone())).unwrap();
        registry.register(Box::new(messages_expired.clone())).unwrap();
        registry.register(Box::new(messages_sent.clone())).unwrap();
        registry.register(Box::new(send_failures.clone())).unwrap();
        registry.register(Box::new(preemptions.clone())).unwrap();

        Self {
            registry,
            webhook_events,
            renders_skipped,
            messages_admitted,
            messages_expired,
            messages_sent,
            send_failures,
            preemptions,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared application state
pub struct AppState {
    pub engine: Arc<DeliveryEngine>,
    pub providers: ProviderRegistry,
    pub model: BoardModel,
    pub webhook_secret: Option<String>,
    /// Webhook-triggered templates (no cron), keyed by template name.
    pub media_templates: HashMap<String, TemplateEntry>,
    pub metrics: Metrics,
}

/// Advance a prometheus counter to an absolute value taken from the engine's
/// atomics. Counters only move forward, so this applies the delta since the
/// last scrape.
fn advance_to(counter: &prometheus::IntCounter, value: u64) {
    let current = counter.get();
    if value > current {
        counter.inc_by(value - current);
    }
}

impl AppState {
    /// Mirror the engine's live counters into the prometheus registry.
    pub fn sync_engine_metrics(&self) {
        let stats = &self.engine.stats;
        advance_to(
            &self.metrics.messages_admitted,
            stats.admitted.load(Ordering::Relaxed),
        );
        advance_to(
            &self.metrics.messages_expired,
            stats.expired.load(Ordering::Relaxed),
        );
        advance_to(
            &self.metrics.messages_sent,
            stats.sent.load(Ordering::Relaxed),
        );
        advance_to(
            &self.metrics.send_failures,
            stats.send_failures.load(Ordering::Relaxed),
        );
        advance_to(
            &self.metrics.preemptions,
            stats.preemptions.load(Ordering::Relaxed),
        );
    }
}
