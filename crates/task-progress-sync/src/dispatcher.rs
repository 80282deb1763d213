//! Inbound message dispatch into the external store.
//!
//! Every text frame goes through [`EventDispatcher::dispatch`]. Progress
//! envelopes are merged per `task_id`; control envelopes and malformed
//! frames are dropped. Nothing here can fail the subscription.

use crate::messages::{ControlKind, InboundMessage, ProgressEvent, TaskKind, TaskStatus};
use crate::store::{ProgressSink, ScenePatch, SceneStatus, TaskPatch};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Last (status, progress) applied for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedState {
    pub status: TaskStatus,
    pub progress: u8,
}

impl From<&ProgressEvent> for AppliedState {
    fn from(event: &ProgressEvent) -> Self {
        Self {
            status: event.status,
            progress: event.progress,
        }
    }
}

/// Merge rule shared by every writer of task state.
///
/// - A terminal status is never replaced by a non-terminal one.
/// - A non-terminal event ranking below the recorded status, or with the
///   same status and lower progress, is a stale duplicate.
/// - Everything else applies; re-applying the same event is a no-op.
pub fn should_apply(current: Option<AppliedState>, incoming: &ProgressEvent) -> bool {
    let Some(current) = current else {
        return true;
    };

    if current.status.is_terminal() || incoming.status.is_terminal() {
        return incoming.status.is_terminal();
    }

    match incoming.status.rank().cmp(&current.status.rank()) {
        Ordering::Less => false,
        Ordering::Greater => true,
        Ordering::Equal => incoming.progress >= current.progress,
    }
}

/// Result of dispatching one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Progress event written to the store.
    Applied(ProgressEvent),
    /// Progress event older than what the store already holds.
    Stale { task_id: String },
    /// Control envelope, discarded.
    Control(ControlKind),
    /// Frame could not be parsed.
    Malformed,
}

/// Parses frames and applies progress to a [`ProgressSink`].
pub struct EventDispatcher {
    sink: Arc<dyn ProgressSink>,
    applied: HashMap<String, AppliedState>,
}

impl EventDispatcher {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            applied: HashMap::new(),
        }
    }

    /// Forget per-task history, e.g. when switching projects.
    pub fn reset(&mut self) {
        self.applied.clear();
    }

    pub fn applied_state(&self, task_id: &str) -> Option<AppliedState> {
        self.applied.get(task_id).copied()
    }

    /// Handle one raw text frame.
    pub fn dispatch(&mut self, raw: &str) -> DispatchOutcome {
        match InboundMessage::parse(raw) {
            Ok(InboundMessage::Progress(event)) => self.apply(event),
            Ok(InboundMessage::Control(kind)) => {
                match &kind {
                    ControlKind::Pong | ControlKind::Heartbeat => trace!(?kind, "control message"),
                    ControlKind::Other(other) => {
                        debug!(msg_type = %other, "ignoring unknown control message")
                    }
                }
                DispatchOutcome::Control(kind)
            }
            Err(e) => {
                warn!(error = %e, len = raw.len(), "dropping malformed message");
                DispatchOutcome::Malformed
            }
        }
    }

    fn apply(&mut self, event: ProgressEvent) -> DispatchOutcome {
        let current = self.applied_state(&event.task_id);
        if !should_apply(current, &event) {
            debug!(
                task_id = %event.task_id,
                status = ?event.status,
                progress = event.progress,
                recorded = ?current,
                "skipping stale progress event"
            );
            return DispatchOutcome::Stale {
                task_id: event.task_id,
            };
        }

        self.sink.update_task(
            &event.task_id,
            TaskPatch {
                kind: Some(event.kind),
                status: Some(event.status),
                progress: Some(event.progress),
                message: Some(event.message.clone()),
                error: Some(event.error.clone()),
                result: Some(event.result.clone()),
            },
        );
        self.applied
            .insert(event.task_id.clone(), AppliedState::from(&event));

        trace!(
            task_id = %event.task_id,
            status = ?event.status,
            progress = event.progress,
            "task progress applied"
        );

        self.route_to_scene(&event);
        DispatchOutcome::Applied(event)
    }

    /// Secondary effect: reflect finished media on the owning scene.
    fn route_to_scene(&self, event: &ProgressEvent) {
        let patch = match (event.status, event.kind) {
            (TaskStatus::Completed, TaskKind::Image) => {
                event.result_str("image_url").map(|url| ScenePatch {
                    status: Some(SceneStatus::Completed),
                    image_url: Some(url.to_string()),
                    ..Default::default()
                })
            }
            (TaskStatus::Completed, TaskKind::Video) => {
                event.result_str("video_url").map(|url| ScenePatch {
                    status: Some(SceneStatus::Completed),
                    video_url: Some(url.to_string()),
                    duration: event
                        .result
                        .as_ref()
                        .and_then(|r| r.get("duration"))
                        .and_then(|d| d.as_f64()),
                    ..Default::default()
                })
            }
            (TaskStatus::Failed, _) => Some(ScenePatch {
                status: Some(SceneStatus::Failed),
                ..Default::default()
            }),
            _ => None,
        };

        let Some(patch) = patch else {
            return;
        };
        let Some(scene_id) = event.associated_scene() else {
            debug!(task_id = %event.task_id, "no scene associated with task");
            return;
        };

        if let Err(e) = self.sink.update_scene(scene_id, patch) {
            warn!(
                task_id = %event.task_id,
                scene_id = %scene_id,
                error = %e,
                "scene update skipped"
            );
        }
    }
}
