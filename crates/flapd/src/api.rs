//! HTTP surface: media webhook, health, metrics.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use flap_board::{render, Template, VariableMap};
use flap_core::{Hold, MessageRequest};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::AppState;

/// Template names the webhook dispatches. Cron-less content under any other
/// name can never fire.
pub const DISPATCHED_TEMPLATES: [&str; 2] = ["now_playing", "paused"];

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/webhook/media", post(media_webhook))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.sync_engine_metrics();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    (StatusCode::OK, String::from_utf8_lossy(&buffer).into_owned())
}

#[derive(Debug, Deserialize)]
struct MediaEvent {
    event: String,
    #[serde(rename = "Metadata", default)]
    metadata: Option<MediaMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaMetadata {
    #[serde(rename = "type", default)]
    media_type: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "grandparentTitle", default)]
    grandparent_title: String,
    #[serde(rename = "parentIndex", default)]
    parent_index: Option<u32>,
    #[serde(default)]
    index: Option<u32>,
}

/// "THE EXPANSE" → "EXPANSE". Boards are narrow; leading articles waste
/// columns without aiding recognition.
fn strip_leading_article(title: &str) -> &str {
    for article in ["THE ", "AN ", "A "] {
        if let Some(prefix) = title.get(..article.len()) {
            if title.len() > article.len() && prefix.eq_ignore_ascii_case(article) {
                return &title[article.len()..];
            }
        }
    }
    title
}

/// Build the display variables for a playback event.
fn media_variables(meta: &MediaMetadata) -> VariableMap {
    let mut vars = VariableMap::new();
    if meta.media_type == "episode" {
        let show = strip_leading_article(&meta.grandparent_title).to_uppercase();
        let episode = match (meta.parent_index, meta.index) {
            (Some(season), Some(ep)) => format!("S{season}E{ep} {}", meta.title.to_uppercase()),
            _ => meta.title.to_uppercase(),
        };
        vars.insert("show_name".to_string(), vec![vec![show]]);
        vars.insert("episode_line".to_string(), vec![vec![episode]]);
    } else {
        vars.insert(
            "show_name".to_string(),
            vec![vec![meta.title.to_uppercase()]],
        );
        vars.insert("episode_line".to_string(), vec![vec![String::new()]]);
    }
    vars
}

fn check_secret(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let Some(expected) = state.webhook_secret.as_deref() else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };
    let presented = headers
        .get("x-webhook-secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if presented.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

async fn media_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(event): Json<MediaEvent>,
) -> StatusCode {
    if let Err(status) = check_secret(&state, &headers) {
        warn!(event = %event.event, %status, "rejected media webhook");
        return status;
    }

    let template_name = match event.event.as_str() {
        "media.play" | "media.resume" => "now_playing",
        "media.pause" => "paused",
        "media.stop" => {
            info!("playback stopped, releasing the board");
            state.engine.interrupt();
            state.metrics.webhook_events.inc();
            return StatusCode::OK;
        }
        other => {
            info!(event = %other, "ignoring media event");
            return StatusCode::OK;
        }
    };

    let Some(entry) = state.media_templates.get(template_name) else {
        warn!(template = %template_name, "no media template configured");
        return StatusCode::OK;
    };

    let mut variables = entry.variables.clone();
    variables.extend(media_variables(&event.metadata.unwrap_or_default()));
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
        hold: Hold::UntilInterrupted,
        payload: grid,
    });
    state.metrics.webhook_events.inc();
    info!(event = %event.event, template = %entry.id, "admitted media message");
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use flap_board::{BoardModel, Format};
    use flap_core::{DeliveryEngine, EngineConfig};
    use flap_providers::ProviderRegistry;
    use tower::ServiceExt;

    use super::*;
    use crate::content::TemplateEntry;
    use crate::Metrics;

    fn media_entry(name: &str) -> TemplateEntry {
        TemplateEntry {
            id: format!("media.{name}"),
            name: name.to_string(),
            cron: None,
            priority: 9,
            hold: Duration::from_secs(60),
            timeout: Duration::from_secs(300),
            truncation: Default::default(),
            formats: vec![Format {
                format: vec!["{show_name}".into(), "{episode_line}".into()],
            }],
            variables: HashMap::new(),
            integration: None,
        }
    }

    fn test_state(secret: Option<&str>) -> Arc<AppState> {
        let mut media_templates = HashMap::new();
        for name in ["now_playing", "paused"] {
            media_templates.insert(name.to_string(), media_entry(name));
        }
        Arc::new(AppState {
            engine: DeliveryEngine::new(EngineConfig::default()),
            providers: ProviderRegistry::new(),
            model: BoardModel::Note,
            webhook_secret: secret.map(String::from),
            media_templates,
            metrics: Metrics::new(),
        })
    }

    fn webhook_request(secret: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/v1/webhook/media")
            .header("content-type", "application/json");
        if let Some(secret) = secret {
            builder = builder.header("x-webhook-secret", secret);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_play_event_admits_indefinite_message() {
        let state = test_state(Some("s3cret"));
        let app = build_router(state.clone());
        let body = r#"{"event":"media.play","Metadata":{"type":"episode","title":"Leviathan Wakes","grandparentTitle":"The Expanse","parentIndex":1,"index":1}}"#;
        let res = app
            .oneshot(webhook_request(Some("s3cret"), body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(state.engine.pending_len(), 1);
        assert_eq!(state.metrics.webhook_events.get(), 1);
    }

    #[tokio::test]
    async fn test_stop_event_interrupts_without_admitting() {
        let state = test_state(Some("s3cret"));
        let app = build_router(state.clone());
        let res = app
            .oneshot(webhook_request(Some("s3cret"), r#"{"event":"media.stop"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(state.engine.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_unauthorized() {
        let state = test_state(Some("s3cret"));
        let app = build_router(state.clone());
        let res = app
            .oneshot(webhook_request(Some("wrong"), r#"{"event":"media.play"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.engine.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_secret_is_service_unavailable() {
        let state = test_state(None);
        let app = build_router(state.clone());
        let res = app
            .oneshot(webhook_request(Some("anything"), r#"{"event":"media.play"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_event_is_ignored() {
        let state = test_state(Some("s3cret"));
        let app = build_router(state.clone());
        let res = app
            .oneshot(webhook_request(
                Some("s3cret"),
                r#"{"event":"library.new"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(state.engine.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_health_and_metrics_respond() {
        let state = test_state(None);
        let app = build_router(state);
        let res = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let res = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[test]
    fn test_strip_leading_article() {
        assert_eq!(strip_leading_article("THE EXPANSE"), "EXPANSE");
        assert_eq!(strip_leading_article("An Adventure"), "Adventure");
        assert_eq!(strip_leading_article("ANDOR"), "ANDOR");
        assert_eq!(strip_leading_article("A"), "A");
    }

    #[test]
    fn test_media_variables_for_episode_and_movie() {
        let episode = MediaMetadata {
            media_type: "episode".into(),
            title: "Pilot".into(),
            grandparent_title: "The Office".into(),
            parent_index: Some(1),
            index: Some(1),
        };
        let vars = media_variables(&episode);
        assert_eq!(vars["show_name"], vec![vec!["OFFICE".to_string()]]);
        assert_eq!(vars["episode_line"], vec![vec!["S1E1 PILOT".to_string()]]);

        let movie = MediaMetadata {
            media_type: "movie".into(),
            title: "Dune".into(),
            ..Default::default()
        };
        let vars = media_variables(&movie);
        assert_eq!(vars["show_name"], vec![vec!["DUNE".to_string()]]);
    }
}
