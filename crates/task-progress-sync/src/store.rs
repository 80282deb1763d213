//! External task/scene state contract.
//!
//! The sync client writes into a store it does not own. Hosts implement
//! [`ProgressSink`] over their own state; [`MemoryStore`] is a ready-made
//! in-memory implementation.

use crate::messages::{TaskKind, TaskStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Partial task update. `None` fields leave the stored value untouched;
/// for the optional fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub kind: Option<TaskKind>,
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub message: Option<Option<String>>,
    pub error: Option<Option<String>>,
    pub result: Option<Option<Map<String, Value>>>,
}

/// Scene status as tracked by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

/// Partial scene update. `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenePatch {
    pub status: Option<SceneStatus>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<f64>,
}

/// Store-side failures the dispatcher tolerates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("scene {0} is not present in the local store")]
    UnknownScene(String),
}

/// Receiver of dispatched progress.
///
/// Both methods are upserts; task updates always succeed, scene updates may
/// report that the scene is not held locally.
pub trait ProgressSink: Send + Sync {
    fn update_task(&self, task_id: &str, patch: TaskPatch);

    fn update_scene(&self, scene_id: &str, patch: ScenePatch) -> Result<(), StoreError>;
}

/// Stored task state.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub kind: Option<TaskKind>,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub error: Option<String>,
    pub result: Option<Map<String, Value>>,
}

impl Default for TaskRecord {
    fn default() -> Self {
        Self {
            kind: None,
            status: TaskStatus::Pending,
            progress: 0,
            message: None,
            error: None,
            result: None,
        }
    }
}

impl TaskRecord {
    fn merge(&mut self, patch: TaskPatch) {
        if let Some(kind) = patch.kind {
            self.kind = Some(kind);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress;
        }
        if let Some(message) = patch.message {
            self.message = message;
        }
        if let Some(error) = patch.error {
            self.error = error;
        }
        if let Some(result) = patch.result {
            self.result = result;
        }
    }
}

/// Stored scene state.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRecord {
    pub status: SceneStatus,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<f64>,
}

impl Default for SceneRecord {
    fn default() -> Self {
        Self {
            status: SceneStatus::Pending,
            image_url: None,
            video_url: None,
            duration: None,
        }
    }
}

impl SceneRecord {
    fn merge(&mut self, patch: ScenePatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if patch.image_url.is_some() {
            self.image_url = patch.image_url;
        }
        if patch.video_url.is_some() {
            self.video_url = patch.video_url;
        }
        if patch.duration.is_some() {
            self.duration = patch.duration;
        }
    }
}

/// In-memory [`ProgressSink`].
///
/// Tasks are created on first update. Scenes must be registered with
/// [`MemoryStore::insert_scene`] first, mirroring a dashboard that only
/// holds the scenes it has loaded.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: Mutex<HashMap<String, TaskRecord>>,
    scenes: Mutex<HashMap<String, SceneRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_scene(&self, scene_id: &str) {
        self.scenes
            .lock()
            .entry(scene_id.to_string())
            .or_default();
    }

    pub fn task(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.lock().get(task_id).cloned()
    }

    pub fn scene(&self, scene_id: &str) -> Option<SceneRecord> {
        self.scenes.lock().get(scene_id).cloned()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl ProgressSink for MemoryStore {
    fn update_task(&self, task_id: &str, patch: TaskPatch) {
        self.tasks
            .lock()
            .entry(task_id.to_string())
            .or_default()
            .merge(patch);
    }

    fn update_scene(&self, scene_id: &str, patch: ScenePatch) -> Result<(), StoreError> {
        let mut scenes = self.scenes.lock();
        let scene = scenes
            .get_mut(scene_id)
            .ok_or_else(|| StoreError::UnknownScene(scene_id.to_string()))?;
        scene.merge(patch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_task_creates_then_merges() {
        let store = MemoryStore::new();
        store.update_task(
            "t1",
            TaskPatch {
                kind: Some(TaskKind::Image),
                status: Some(TaskStatus::Running),
                progress: Some(10),
                message: Some(Some("starting".to_string())),
                ..Default::default()
            },
        );
        store.update_task(
            "t1",
            TaskPatch {
                progress: Some(55),
                ..Default::default()
            },
        );

        let task = store.task("t1").unwrap();
        assert_eq!(task.kind, Some(TaskKind::Image));
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.progress, 55);
        assert_eq!(task.message.as_deref(), Some("starting"));
        assert_eq!(store.task_count(), 1);
    }

    #[test]
    fn test_update_task_clears_optional_fields() {
        let store = MemoryStore::new();
        store.update_task(
            "t1",
            TaskPatch {
                status: Some(TaskStatus::Failed),
                error: Some(Some("boom".to_string())),
                message: Some(Some("rendering".to_string())),
                ..Default::default()
            },
        );
        store.update_task(
            "t1",
            TaskPatch {
                status: Some(TaskStatus::Completed),
                error: Some(None),
                message: Some(None),
                result: Some(None),
                ..Default::default()
            },
        );

        let task = store.task("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.error.is_none());
        assert!(task.message.is_none());
    }

    #[test]
    fn test_update_unknown_scene_is_reported() {
        let store = MemoryStore::new();
        let result = store.update_scene(
            "missing",
            ScenePatch {
                status: Some(SceneStatus::Failed),
                ..Default::default()
            },
        );
        assert_eq!(result, Err(StoreError::UnknownScene("missing".to_string())));
        assert!(store.scene("missing").is_none());
    }

    #[test]
    fn test_update_known_scene_merges() {
        let store = MemoryStore::new();
        store.insert_scene("s1");
        store
            .update_scene(
                "s1",
                ScenePatch {
                    status: Some(SceneStatus::Completed),
                    video_url: Some("https://cdn/v.mp4".to_string()),
                    duration: Some(4.5),
                    ..Default::default()
                },
            )
            .unwrap();

        let scene = store.scene("s1").unwrap();
        assert_eq!(scene.status, SceneStatus::Completed);
        assert_eq!(scene.video_url.as_deref(), Some("https://cdn/v.mp4"));
        assert_eq!(scene.duration, Some(4.5));
        assert!(scene.image_url.is_none());
    }
}
