//! Calendar triggers: poll an iCal URL and fire for events starting inside
//! the next polling window.
//!
//! The extractor is deliberately minimal — `VEVENT` blocks with
//! DTSTART/DTEND/SUMMARY/DESCRIPTION, folded lines unfolded, three datetime
//! shapes (`…Z` UTC, floating local treated as UTC, bare dates at midnight).

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::json;
use tokio::sync::watch;

use crate::error::Result;

use super::{registry::TriggerRegistry, types::Trigger};

const DEFAULT_POLL_MINUTES: u64 = 15;

// ─── VEvent ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct VEvent {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub summary: String,
    pub description: String,
}

/// Unfold RFC 5545 line continuations (a line starting with a space or tab
/// continues the previous one).
fn unfold(ics: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in ics.lines() {
        if (raw.starts_with(' ') || raw.starts_with('\t'))
            && let Some(last) = lines.last_mut()
        {
            last.push_str(raw.trim_start());
        } else {
            lines.push(raw.trim_end().to_string());
        }
    }
    lines
}

fn parse_ical_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Some(stripped) = value.strip_suffix('Z')
        && let Ok(naive) = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S")
    {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S") {
        // Floating time: treated as UTC (good enough for window filtering).
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y%m%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// Extract `VEVENT` blocks from an iCal document.
pub fn parse_vevents(ics: &str) -> Vec<VEvent> {
    let mut events = Vec::new();
    let mut current: Option<(Option<DateTime<Utc>>, Option<DateTime<Utc>>, String, String)> = None;

    for line in unfold(ics) {
        if line.eq_ignore_ascii_case("BEGIN:VEVENT") {
            current = Some((None, None, String::new(), String::new()));
            continue;
        }
        if line.eq_ignore_ascii_case("END:VEVENT") {
            if let Some((Some(start), end, summary, description)) = current.take() {
                events.push(VEvent { start, end, summary, description });
            }
            continue;
        }
        let Some(state) = current.as_mut() else { continue };
        let Some((prop, value)) = line.split_once(':') else { continue };
        // Strip parameters: "DTSTART;TZID=…" → "DTSTART".
        let name = prop.split(';').next().unwrap_or(prop).to_ascii_uppercase();
        match name.as_str() {
            "DTSTART" => state.0 = parse_ical_datetime(value),
            "DTEND" => state.1 = parse_ical_datetime(value),
            "SUMMARY" => state.2 = value.trim().to_string(),
            "DESCRIPTION" => state.3 = value.trim().to_string(),
            _ => {}
        }
    }
    events
}

/// Events whose start falls in `(after, until]`.
pub fn events_in_window(
    events: &[VEvent],
    after: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Vec<VEvent> {
    events
        .iter()
        .filter(|e| e.start > after && e.start <= until)
        .cloned()
        .collect()
}

// ─── Poller ───────────────────────────────────────────────────────────────────

async fn poll_once(
    registry: &TriggerRegistry,
    trigger: &Trigger,
    client: &reqwest::Client,
    last_poll: DateTime<Utc>,
    window: chrono::Duration,
) -> Result<()> {
    let Some(url) = trigger.config_str("url") else { return Ok(()) };
    let body = client.get(url).send().await?.text().await?;
    let events = parse_vevents(&body);
    let now = Utc::now();
    for event in events_in_window(&events, last_poll, now + window) {
        let payload = json!({
            "summary": event.summary,
            "description": event.description,
            "start": event.start.to_rfc3339(),
            "end": event.end.map(|e| e.to_rfc3339()),
        });
        registry.record_fire(&trigger.id, payload)?;
    }
    Ok(())
}

/// Drive one calendar trigger until shutdown.
pub fn spawn(
    registry: Arc<TriggerRegistry>,
    trigger: Trigger,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let poll_minutes = trigger.config_u64("pollMinutes").unwrap_or(DEFAULT_POLL_MINUTES).max(1);
        let interval = std::time::Duration::from_secs(poll_minutes * 60);
        let window = chrono::Duration::seconds(interval.as_secs() as i64);
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let mut last_poll = Utc::now();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let polled_at = Utc::now();
                    if let Err(e) = poll_once(&registry, &trigger, &client, last_poll, window).await {
                        log::warn!("calendar '{}': poll failed: {e}", trigger.name);
                    }
                    last_poll = polled_at;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────
