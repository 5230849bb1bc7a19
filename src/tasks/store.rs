//! Persistent task queue: one JSON document per task under `tasks/`, loaded
//! into an in-memory index at start-up. Every mutator persists synchronously
//! before returning; tasks found in `running` at start-up are re-marked
//! `paused` (the process that owned them is gone).

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, RwLock},
};

use crate::{
    error::{CoreError, Result},
    event_bus::{AppEvent, EventBus},
    util::atomic_write,
};

use super::types::{NewTask, Task, TaskStatus, TaskStep, TaskTokenUsage};

pub struct TaskStore {
    dir: PathBuf,
    index: RwLock<HashMap<String, Task>>,
    bus: Option<Arc<dyn EventBus>>,
}

impl TaskStore {
    /// Load all task documents and run crash recovery.
    pub fn load(workspace: &std::path::Path, bus: Option<Arc<dyn EventBus>>) -> Result<Self> {
        let dir = workspace.join("tasks");
        std::fs::create_dir_all(&dir)
            .map_err(|e| CoreError::fatal(format!("cannot create tasks dir: {e}")))?;

        let mut index = HashMap::new();
        for entry in std::fs::read_dir(&dir)
            .map_err(|e| CoreError::fatal(format!("cannot read tasks dir: {e}")))?
            .flatten()
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .ok()
                .and_then(|raw| serde_json::from_str::<Task>(&raw).ok())
            {
                Some(task) => {
                    index.insert(task.id.clone(), task);
                }
                None => log::warn!("task store: skipping unreadable {}", path.display()),
            }
        }

        let store = Self {
            dir,
            index: RwLock::new(index),
            bus,
        };
        store.recover_interrupted()?;
        Ok(store)
    }

    /// Re-mark tasks left `running` by a dead process as `paused`.
    fn recover_interrupted(&self) -> Result<()> {
        let interrupted: Vec<String> = self
            .index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .map(|t| t.id.clone())
            .collect();
        for id in interrupted {
            log::info!("task store: recovering interrupted task {id} → paused");
            self.update_status(&id, TaskStatus::Paused, None, None, None)?;
        }
        Ok(())
    }

    // ── CRUD ─────────────────────────────────────────────────────────────────

    pub fn create(&self, params: NewTask) -> Result<Task> {
        let task = Task::new(params);
        self.persist(&task)?;
        self.index
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task.id.clone(), task.clone());
        self.emit(&task);
        Ok(task)
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.index.read().unwrap_or_else(|e| e.into_inner()).get(id).cloned()
    }

    /// Resolve a task by full id or unique prefix.
    pub fn get_by_prefix(&self, prefix: &str) -> Option<Task> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        let mut matches = index.values().filter(|t| t.id.starts_with(prefix));
        let first = matches.next()?.clone();
        matches.next().is_none().then_some(first)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = self
            .index
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some();
        if removed {
            let _ = std::fs::remove_file(self.path_for(id));
        }
        Ok(removed)
    }

    // ── Mutators ─────────────────────────────────────────────────────────────

    /// Status transition; `progress`, `result`, and `error` ride along.
    pub fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        progress: Option<u8>,
        result: Option<String>,
        error: Option<String>,
    ) -> Result<Task> {
        self.mutate(id, |task| {
            task.status = status;
            if let Some(p) = progress {
                task.progress = p.min(100);
            }
            if status == TaskStatus::Completed {
                task.progress = 100;
            }
            if let Some(r) = result {
                task.result = Some(r);
            }
            if let Some(e) = error {
                task.error = Some(e);
            }
            task.completed_at = if matches!(status, TaskStatus::Completed | TaskStatus::Failed) {
                Some(chrono::Utc::now())
            } else {
                None
            };
        })
    }

    pub fn set_progress(&self, id: &str, progress: u8) -> Result<Task> {
        self.mutate(id, |task| {
            // Progress 100 is reserved for the completed transition.
            task.progress = progress.min(if task.status == TaskStatus::Completed { 100 } else { 99 });
        })
    }

    pub fn add_step(&self, id: &str, description: impl Into<String>) -> Result<Task> {
        let description = description.into();
        self.mutate(id, |task| {
            task.steps.push(TaskStep { description: description.clone(), completed: false });
        })
    }

    /// Mark a step complete and re-derive progress from the completion ratio.
    pub fn complete_step(&self, id: &str, step_index: usize) -> Result<Task> {
        let task = self.mutate(id, |task| {
            if let Some(step) = task.steps.get_mut(step_index) {
                step.completed = true;
            }
            task.current_step_index = (step_index + 1).min(task.steps.len());
            if task.status != TaskStatus::Completed {
                task.progress = task.derived_progress().min(99);
            }
        })?;
        Ok(task)
    }

    pub fn add_usage(&self, id: &str, usage: TaskTokenUsage) -> Result<Task> {
        self.mutate(id, |task| {
            task.usage.input_tokens += usage.input_tokens;
            task.usage.output_tokens += usage.output_tokens;
            task.usage.cost += usage.cost;
        })
    }

    pub fn append_scratchpad(&self, id: &str, note: &str) -> Result<Task> {
        let stamped = format!("[{}] {note}\n", chrono::Utc::now().format("%H:%M:%S"));
        self.mutate(id, |task| task.scratchpad.push_str(&stamped))
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn all(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    pub fn list_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.all().into_iter().filter(|t| t.status == status).collect()
    }

    pub fn list_recent(&self, limit: usize) -> Vec<Task> {
        self.all().into_iter().take(limit).collect()
    }

    pub fn subtasks(&self, parent_id: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|t| t.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    /// Highest-priority, oldest pending task.
    pub fn next_pending(&self) -> Option<Task> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        index
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .min_by(|a, b| {
                a.priority
                    .order()
                    .cmp(&b.priority.order())
                    .then(a.created_at.cmp(&b.created_at))
            })
            .cloned()
    }

    // ── Internal ─────────────────────────────────────────────────────────────

    fn mutate(&self, id: &str, op: impl FnOnce(&mut Task)) -> Result<Task> {
        let updated = {
            let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
            let task = index
                .get_mut(id)
                .ok_or_else(|| CoreError::validation(format!("unknown task '{id}'")))?;
            op(task);
            task.updated_at = chrono::Utc::now();
            task.clone()
        };
        self.persist(&updated)?;
        self.emit(&updated);
        Ok(updated)
    }

    fn persist(&self, task: &Task) -> Result<()> {
        let raw = serde_json::to_string_pretty(task)?;
        atomic_write(&self.path_for(&task.id), &raw)
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn emit(&self, task: &Task) {
        if let Some(bus) = &self.bus {
            let _ = bus.publish(AppEvent::TaskUpdated {
                task_id: task.id.clone(),
                status: task.status.as_str().to_string(),
                progress: task.progress,
            });
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::types::TaskPriority;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> TaskStore {
        TaskStore::load(dir.path(), None).unwrap()
    }

    fn new_task(title: &str, priority: TaskPriority) -> NewTask {
        NewTask {
            title: title.into(),
            description: String::new(),
            priority,
            ..Default::default()
        }
    }

    #[test]
    fn create_persists_to_disk() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let task = s.create(new_task("t", TaskPriority::Normal)).unwrap();
        let path = dir.path().join("tasks").join(format!("{}.json", task.id));
        assert!(path.exists());

        let on_disk: Task = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(on_disk.id, task.id);
        assert_eq!(on_disk.status, TaskStatus::Pending);
    }

    #[test]
    fn completed_implies_progress_100_in_memory_and_on_disk() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let task = s.create(new_task("t", TaskPriority::Normal)).unwrap();
        let updated = s
            .update_status(&task.id, TaskStatus::Completed, Some(100), Some("done".into()), None)
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Completed);
        assert_eq!(updated.progress, 100);
        assert!(updated.completed_at.is_some());

        let path = dir.path().join("tasks").join(format!("{}.json", task.id));
        let on_disk: Task = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(on_disk.status, TaskStatus::Completed);
        assert_eq!(on_disk.progress, 100);
    }

    #[test]
    fn restart_reloads_records_unchanged() {
        let dir = TempDir::new().unwrap();
        let id = {
            let s = store(&dir);
            let task = s.create(new_task("persisted", TaskPriority::High)).unwrap();
            s.update_status(&task.id, TaskStatus::Completed, None, Some("r".into()), None)
                .unwrap();
            task.id
        };
        let s2 = store(&dir);
        let back = s2.get(&id).unwrap();
        assert_eq!(back.title, "persisted");
        assert_eq!(back.status, TaskStatus::Completed);
        assert_eq!(back.result.as_deref(), Some("r"));
    }

    #[test]
    fn running_task_paused_after_restart() {
        let dir = TempDir::new().unwrap();
        let id = {
            let s = store(&dir);
            let task = s.create(new_task("crashy", TaskPriority::Normal)).unwrap();
            s.update_status(&task.id, TaskStatus::Running, Some(40), None, None).unwrap();
            task.id
        };
        let s2 = store(&dir);
        assert_eq!(s2.get(&id).unwrap().status, TaskStatus::Paused);
    }

    #[test]
    fn next_pending_orders_by_priority_then_age() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let _low = s.create(new_task("low", TaskPriority::Low)).unwrap();
        let normal_old = s.create(new_task("normal-old", TaskPriority::Normal)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let _normal_new = s.create(new_task("normal-new", TaskPriority::Normal)).unwrap();
        let critical = s.create(new_task("critical", TaskPriority::Critical)).unwrap();

        assert_eq!(s.next_pending().unwrap().id, critical.id);
        s.update_status(&critical.id, TaskStatus::Completed, None, None, None).unwrap();
        assert_eq!(s.next_pending().unwrap().id, normal_old.id);
    }

    #[test]
    fn steps_drive_progress() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let task = s.create(new_task("stepped", TaskPriority::Normal)).unwrap();
        s.add_step(&task.id, "one").unwrap();
        s.add_step(&task.id, "two").unwrap();
        let after = s.complete_step(&task.id, 0).unwrap();
        assert_eq!(after.progress, 50);
        assert_eq!(after.current_step_index, 1);
    }

    #[test]
    fn usage_accumulates() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let task = s.create(new_task("billed", TaskPriority::Normal)).unwrap();
        s.add_usage(&task.id, TaskTokenUsage { input_tokens: 100, output_tokens: 20, cost: 0.01 })
            .unwrap();
        let after = s
            .add_usage(&task.id, TaskTokenUsage { input_tokens: 50, output_tokens: 10, cost: 0.02 })
            .unwrap();
        assert_eq!(after.usage.input_tokens, 150);
        assert_eq!(after.usage.output_tokens, 30);
        assert!((after.usage.cost - 0.03).abs() < 1e-9);
    }

    #[test]
    fn scratchpad_is_append_only() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let task = s.create(new_task("diary", TaskPriority::Normal)).unwrap();
        s.append_scratchpad(&task.id, "started research").unwrap();
        let after = s.append_scratchpad(&task.id, "found two sources").unwrap();
        assert!(after.scratchpad.contains("started research"));
        assert!(after.scratchpad.contains("found two sources"));
    }

    #[test]
    fn subtasks_listed_in_creation_order() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let parent = s.create(new_task("parent", TaskPriority::Normal)).unwrap();
        for i in 0..3 {
            let mut params = new_task(&format!("child-{i}"), TaskPriority::Normal);
            params.parent_id = Some(parent.id.clone());
            s.create(params).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(3));
        }
        let children = s.subtasks(&parent.id);
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].title, "child-0");
        assert_eq!(children[2].title, "child-2");
    }

    #[test]
    fn get_by_prefix_requires_uniqueness() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let task = s.create(new_task("t", TaskPriority::Normal)).unwrap();
        assert_eq!(s.get_by_prefix(&task.id[..8]).unwrap().id, task.id);
        // An empty prefix matches everything → ambiguous once 2 tasks exist.
        s.create(new_task("t2", TaskPriority::Normal)).unwrap();
        assert!(s.get_by_prefix("").is_none());
    }

    #[test]
    fn delete_removes_memory_and_disk() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let task = s.create(new_task("gone", TaskPriority::Normal)).unwrap();
        assert!(s.delete(&task.id).unwrap());
        assert!(s.get(&task.id).is_none());
        assert!(!dir.path().join("tasks").join(format!("{}.json", task.id)).exists());
        assert!(!s.delete(&task.id).unwrap());
    }
}
