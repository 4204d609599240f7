use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use canvasflow_core::event::EventBus;
use canvasflow_core::types::{GraphEvent, SessionId};

/// JSONL traversal logger.
///
/// Subscribes to the EventBus and writes structured log entries as JSONL
/// (one JSON object per line). Every line is flushed as it is written, so a
/// crash mid-traversal leaves all earlier lines intact.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

/// A single log entry written to the JSONL file.
#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    session_id: String,
    event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// Create a new RunLogger.
    ///
    /// Logs are written to `{log_dir}/{session_id}/{timestamp}.jsonl`.
    /// `level` controls verbosity: 1=traversal summary, 2=routing and
    /// failures, 3=every node.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// Run the logger as a background task.
    ///
    /// Writes JSONL until cancellation or the traversal completes or fails.
    /// Returns the log file path, or `None` if it could not be opened.
    pub async fn run(
        self,
        event_bus: Arc<EventBus>,
        session_id: SessionId,
        cancel: CancellationToken,
    ) -> Option<PathBuf> {
        let mut rx = event_bus.subscribe();

        let session_dir = self.log_dir.join(&session_id.0);
        if let Err(e) = tokio::fs::create_dir_all(&session_dir).await {
            error!(error = %e, "Failed to create log directory");
            return None;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_path = session_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return None;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");

        let mut writer = tokio::io::BufWriter::new(file);
        let sid = session_id.0.clone();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let entry = match self.event_to_entry(&sid, &event) {
                                Some(e) => e,
                                None => continue,
                            };

                            if let Ok(json) = serde_json::to_string(&entry) {
                                let line = format!("{}\n", json);
                                if let Err(e) = writer.write_all(line.as_bytes()).await {
                                    error!(error = %e, "Failed to write log entry");
                                    break;
                                }
                                if let Err(e) = writer.flush().await {
                                    error!(error = %e, "Failed to flush log");
                                }
                            }

                            if matches!(
                                event,
                                GraphEvent::TraversalCompleted { .. } | GraphEvent::TraversalFailed { .. }
                            ) {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
        Some(log_path)
    }

    /// Convert a GraphEvent to a log entry (returns None if filtered by level).
    fn event_to_entry(&self, session_id: &str, event: &GraphEvent) -> Option<LogEntry> {
        let entry = |event_type: &str, step: Option<usize>, detail: Option<serde_json::Value>| {
            LogEntry {
                timestamp: Utc::now().to_rfc3339(),
                session_id: session_id.to_string(),
                event_type: event_type.to_string(),
                step,
                detail,
            }
        };

        match event {
            // L1: traversal summary
            GraphEvent::TraversalStarted { run_name, .. } => Some(entry(
                "traversal_started",
                None,
                Some(serde_json::json!({ "run_name": run_name })),
            )),
            GraphEvent::TraversalCompleted {
                path,
                total_elapsed_ms,
                ..
            } => Some(entry(
                "traversal_completed",
                Some(path.len()),
                Some(serde_json::json!({
                    "path": path,
                    "total_elapsed_ms": total_elapsed_ms,
                })),
            )),
            GraphEvent::TraversalFailed { error, .. } => Some(entry(
                "traversal_failed",
                None,
                Some(serde_json::json!({ "error": error })),
            )),

            // L2: routing decisions and node failures
            GraphEvent::Routed { targets } if self.level >= 2 => Some(entry(
                "routed",
                None,
                Some(serde_json::json!({ "targets": targets })),
            )),
            GraphEvent::NodeFailed { node, error } if self.level >= 2 => Some(entry(
                "node_failed",
                None,
                Some(serde_json::json!({ "node": node, "error": truncate_str(error, 500) })),
            )),

            // L3: every node
            GraphEvent::NodeStarted { node, step } if self.level >= 3 => Some(entry(
                "node_started",
                Some(*step),
                Some(serde_json::json!({ "node": node })),
            )),
            GraphEvent::NodeCompleted {
                node,
                step,
                elapsed_ms,
            } if self.level >= 3 => Some(entry(
                "node_completed",
                Some(*step),
                Some(serde_json::json!({ "node": node, "elapsed_ms": elapsed_ms })),
            )),

            _ => None,
        }
    }
}

/// Truncate a string for logging without splitting a character.
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvasflow_core::route::{NodeId, RouteTarget};

    #[test]
    fn test_jsonl_entry_format() {
        let entry = LogEntry {
            timestamp: "2026-02-24T12:00:00Z".to_string(),
            session_id: "test-session".to_string(),
            event_type: "traversal_started".to_string(),
            step: None,
            detail: None,
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("traversal_started"));
        assert!(json.contains("test-session"));
        assert!(!json.contains("step"));
        assert!(!json.contains("detail"));
    }

    #[test]
    fn test_truncate_str_char_boundary() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("héllo", 2), "h");
    }

    #[test]
    fn test_event_level_filtering() {
        let sid = "test";
        let started = GraphEvent::NodeStarted {
            node: NodeId::Reflect,
            step: 4,
        };
        let routed = GraphEvent::Routed {
            targets: vec![RouteTarget::GenerateArtifact],
        };
        let summary = GraphEvent::TraversalStarted {
            session_id: SessionId::from_str(sid),
            run_name: "open_canvas".into(),
        };

        let logger = RunLogger::new(PathBuf::from("/tmp"), 1);
        assert!(logger.event_to_entry(sid, &summary).is_some());
        assert!(logger.event_to_entry(sid, &routed).is_none());
        assert!(logger.event_to_entry(sid, &started).is_none());

        let logger2 = RunLogger::new(PathBuf::from("/tmp"), 2);
        let entry = logger2.event_to_entry(sid, &routed).unwrap();
        assert_eq!(entry.detail.unwrap()["targets"][0], "generateArtifact");
        assert!(logger2.event_to_entry(sid, &started).is_none());

        let logger3 = RunLogger::new(PathBuf::from("/tmp"), 3);
        let entry = logger3.event_to_entry(sid, &started).unwrap();
        assert_eq!(entry.step, Some(4));
        assert_eq!(entry.detail.unwrap()["node"], "reflect");
    }

    #[tokio::test]
    async fn test_logger_writes_until_completion() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::new(16));
        let session = SessionId::from_str("sess-1");
        let logger = RunLogger::new(dir.path().to_path_buf(), 3);

        let handle = tokio::spawn(logger.run(bus.clone(), session.clone(), CancellationToken::new()));
        // Wait for the logger to subscribe.
        while bus.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }

        bus.publish(GraphEvent::NodeStarted {
            node: NodeId::GeneratePath,
            step: 1,
        });
        bus.publish(GraphEvent::TraversalCompleted {
            session_id: session,
            path: vec![NodeId::GeneratePath],
            total_elapsed_ms: 3,
        });

        let path = handle.await.unwrap().expect("log path");
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("node_started"));
        assert!(lines[1].contains("traversal_completed"));
        assert!(path.starts_with(dir.path().join("sess-1")));
    }
}
