use std::{collections::HashSet, time::Duration};

use axum::response::sse::{Event, KeepAlive};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{trace, warn};

/// Pipeline stage that produced a tap event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Validate,
    Specification,
    Query,
    Page,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Validate => "validate",
            StageKind::Specification => "specification",
            StageKind::Query => "query",
            StageKind::Page => "page",
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct StageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StageMetadata {
    fn is_empty(&self) -> bool {
        self.result.is_none() && self.latency_ms.is_none() && self.message.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StagePayload {
    /// Set when filter values were withheld and only their shape is shown.
    pub redacted: bool,
    pub payload: Value,
}

impl Default for StagePayload {
    fn default() -> Self {
        Self {
            redacted: false,
            payload: Value::Null,
        }
    }
}

impl StagePayload {
    pub fn plain(payload: Value) -> Self {
        Self {
            redacted: false,
            payload,
        }
    }

    pub fn redacted(payload: Value) -> Self {
        Self {
            redacted: true,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub stage: StageKind,
    pub entity: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "StageMetadata::is_empty")]
    pub meta: StageMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#in: Option<StagePayload>,
    pub out: StagePayload,
}

impl StageEvent {
    pub fn new(stage: StageKind, entity: &'static str) -> Self {
        Self {
            ts: chrono::Utc::now(),
            stage,
            entity,
            trace_id: None,
            meta: StageMetadata::default(),
            r#in: None,
            out: StagePayload::default(),
        }
    }

    pub fn trace(mut self, trace_id: &str) -> Self {
        self.trace_id = Some(trace_id.to_string());
        self
    }

    pub fn meta(mut self, meta: StageMetadata) -> Self {
        self.meta = meta;
        self
    }

    pub fn input(mut self, payload: StagePayload) -> Self {
        self.r#in = Some(payload);
        self
    }

    pub fn output(mut self, payload: StagePayload) -> Self {
        self.out = payload;
        self
    }

    pub fn event_name(&self) -> &'static str {
        self.stage.as_str()
    }

    pub fn into_sse_event(self) -> Result<Event, serde_json::Error> {
        let mut event = Event::default().event(self.event_name());
        if let Some(trace_id) = &self.trace_id {
            event = event.id(trace_id.clone());
        }
        let data = serde_json::to_string(&self)?;
        Ok(event.data(data))
    }
}

/// Fan-out hub for pipeline stage events. Publishing never blocks.
#[derive(Clone)]
pub struct TapHub {
    sender: broadcast::Sender<StageEvent>,
}

impl TapHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(128);
        Self { sender }
    }

    pub fn publish(&self, event: StageEvent) {
        if self.sender.receiver_count() == 0 {
            trace!(stage = event.stage.as_str(), "no tap subscribers");
            return;
        }
        if let Err(err) = self.sender.send(event) {
            warn!(stage = "app", error = %err, "failed to broadcast tap event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
        self.sender.subscribe()
    }
}

impl Default for TapHub {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TapFilter {
    stages: Option<HashSet<StageKind>>,
    entity: Option<String>,
}

impl TapFilter {
    pub fn new(stages: Option<HashSet<StageKind>>, entity: Option<String>) -> Self {
        Self { stages, entity }
    }

    pub fn matches(&self, event: &StageEvent) -> bool {
        let stage_ok = match &self.stages {
            Some(stages) => stages.contains(&event.stage),
            None => true,
        };
        let entity_ok = match &self.entity {
            Some(entity) => entity.eq_ignore_ascii_case(event.entity),
            None => true,
        };
        stage_ok && entity_ok
    }
}

pub fn tap_stream(
    hub: TapHub,
    filter: TapFilter,
) -> impl Stream<Item = Result<Event, serde_json::Error>> + Send + 'static {
    BroadcastStream::new(hub.subscribe()).filter_map(move |result| match result {
        Ok(event) if filter.matches(&event) => Some(event.into_sse_event()),
        Ok(_) => None,
        Err(_) => None,
    })
}

pub fn tap_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(20))
        .text("heartbeat")
}

pub fn parse_stage_list(value: Option<String>) -> Result<Option<HashSet<StageKind>>, String> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let mut set = HashSet::new();
    for item in raw.split(',').filter(|s| !s.trim().is_empty()) {
        let stage = match item.trim().to_lowercase().as_str() {
            "validate" => StageKind::Validate,
            "specification" => StageKind::Specification,
            "query" => StageKind::Query,
            "page" => StageKind::Page,
            other => {
                return Err(format!("unknown stage '{other}'"));
            }
        };
        set.insert(stage);
    }

    if set.is_empty() {
        Ok(None)
    } else {
        Ok(Some(set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_known_stages() {
        let stages = parse_stage_list(Some("validate, Query,,page".into()))
            .expect("stages parse")
            .expect("non-empty");
        assert_eq!(stages.len(), 3);
        assert!(stages.contains(&StageKind::Query));
        assert!(parse_stage_list(Some(" , ".into())).expect("parse").is_none());
        assert!(parse_stage_list(Some("ingress".into())).is_err());
    }

    #[test]
    fn filter_matches_stage_and_entity() {
        let filter = TapFilter::new(
            Some(HashSet::from([StageKind::Page])),
            Some("Supplier".into()),
        );
        assert!(filter.matches(&StageEvent::new(StageKind::Page, "supplier")));
        assert!(!filter.matches(&StageEvent::new(StageKind::Query, "supplier")));
        assert!(!filter.matches(&StageEvent::new(StageKind::Page, "check")));
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        let hub = TapHub::new();
        hub.publish(StageEvent::new(StageKind::Validate, "check"));

        let mut receiver = hub.subscribe();
        hub.publish(StageEvent::new(StageKind::Validate, "check"));
        let event = receiver.try_recv().expect("event delivered");
        assert_eq!(event.stage, StageKind::Validate);
    }

    #[test]
    fn event_serializes_stage_and_payloads() {
        let event = StageEvent::new(StageKind::Specification, "check")
            .trace("req-1")
            .input(StagePayload::redacted(json!([{"field": "status", "op": "equals"}])));
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["stage"], "specification");
        assert_eq!(value["entity"], "check");
        assert_eq!(value["trace_id"], "req-1");
        assert_eq!(value["in"]["redacted"], true);
        assert!(value.get("meta").is_none());
    }

    #[test]
    fn event_without_input_omits_it() {
        let event = StageEvent::new(StageKind::Page, "supplier")
            .output(StagePayload::plain(json!({"totalPages": 2})));
        let value = serde_json::to_value(&event).expect("serialize");
        assert!(value.get("in").is_none());
        assert_eq!(value["out"]["payload"]["totalPages"], 2);
    }
}
