//! Shared helpers for orchestrator integration tests.
#![allow(dead_code)]

pub mod fake_backend;

use std::time::Duration;

use pldl_core::{JobEvent, JobId};
use tokio::sync::broadcast::{self, error::RecvError};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Collects events for `job_id` up to and including its terminal event.
pub async fn collect_until_terminal(
    rx: &mut broadcast::Receiver<JobEvent>,
    job_id: JobId,
) -> Vec<JobEvent> {
    let mut events = Vec::new();
    loop {
        let event = match tokio::time::timeout(EVENT_TIMEOUT, rx.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(RecvError::Lagged(n))) => panic!("observer lagged by {n} events"),
            Ok(Err(RecvError::Closed)) => panic!("event bus closed"),
            Err(_) => panic!("timed out waiting for terminal event; got {events:?}"),
        };
        if event.job_id() != job_id {
            continue;
        }
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

/// Short label per event, e.g. `status:1/2:A`, `progress:A`, `complete:0`.
pub fn kinds(events: &[JobEvent]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for event in events {
        let label = match event {
            JobEvent::Status {
                current,
                total,
                title,
                ..
            } => format!("status:{current}/{total}:{title}"),
            JobEvent::Progress { progress, .. } => format!("progress:{}", progress.title),
            JobEvent::ItemFinished { title, .. } => format!("finished:{title}"),
            JobEvent::Stopped { .. } => "stopped".to_string(),
            JobEvent::Complete { failed, .. } => format!("complete:{}", failed.len()),
            JobEvent::Error { error, .. } => format!("error:{error}"),
        };
        // Consecutive progress ticks of one item collapse into one label.
        if label.starts_with("progress:") && out.last() == Some(&label) {
            continue;
        }
        out.push(label);
    }
    out
}

/// Asserts nothing further arrives for `job_id` within a short window.
pub async fn assert_quiet(rx: &mut broadcast::Receiver<JobEvent>, job_id: JobId) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(100);
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Err(_) => return,
            Ok(Ok(event)) if event.job_id() == job_id => {
                panic!("unexpected event after terminal: {event:?}")
            }
            Ok(Ok(_)) => continue,
            Ok(Err(e)) => panic!("event bus error: {e}"),
        }
    }
}
