//! Skill Registry (§4.C): the singleton map `name -> Skill`, its lifecycle
//! operations, and the debounced observer fanout that keeps the Holographic
//! Index in sync.
//!
//! Grounded on the teacher's `jobs/worker.rs` `Arc<RwLock<Vec<JoinHandle<()>>>>`
//! pattern for GC-protected background work (there it tracked worker-pool
//! tasks; here it tracks in-flight observer notifications), generalized
//! from a fixed worker pool to an ad-hoc fire-and-forget task set.

use crate::errors::{KernelError, Result};
use crate::loader::ModuleLoader;
use crate::types::{ChangeType, Skill, SkillChangeEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// The debounce window within which notifications for the same skill are
/// coalesced (§4.C).
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

#[async_trait]
pub trait RegistryObserver: Send + Sync {
    async fn on_change(&self, event: SkillChangeEvent);
}

struct ObserverSlot {
    id: u64,
    observer: Arc<dyn RegistryObserver>,
}

/// GC-protected set of in-flight background tasks: holds a strong reference
/// to each `JoinHandle` until it completes, then discards it, so the async
/// runtime never collects a task that's still running (§4.C rationale).
#[derive(Clone, Default)]
struct BackgroundTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    fn track(&self, handle: JoinHandle<()>) {
        let handles = self.handles.clone();
        tokio::spawn(async move {
            handles.lock().await.push(handle);
        });
    }

    /// Drop handles for tasks that have already finished; called
    /// opportunistically so the set doesn't grow without bound.
    async fn reap(&self) {
        let mut handles = self.handles.lock().await;
        handles.retain(|h| !h.is_finished());
    }

    #[cfg(test)]
    async fn drain(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.reap().await;
            if self.handles.lock().await.is_empty() || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Pending, not-yet-flushed change per skill name, plus a flag for whether
/// a flush task is already scheduled for that skill.
#[derive(Default)]
struct DebounceState {
    pending: HashMap<String, ChangeType>,
    flush_scheduled: std::collections::HashSet<String>,
}

/// The Skill Registry: discovery, lifecycle, observer fanout.
pub struct SkillRegistry {
    root: PathBuf,
    skills: RwLock<HashMap<String, Skill>>,
    loader: Arc<ModuleLoader>,
    observers: RwLock<Vec<ObserverSlot>>,
    next_observer_id: std::sync::atomic::AtomicU64,
    debounce: Arc<Mutex<DebounceState>>,
    background: BackgroundTasks,
}

impl SkillRegistry {
    pub fn new(root: impl Into<PathBuf>, loader: Arc<ModuleLoader>) -> Self {
        Self {
            root: root.into(),
            skills: RwLock::new(HashMap::new()),
            loader,
            observers: RwLock::new(Vec::new()),
            next_observer_id: std::sync::atomic::AtomicU64::new(0),
            debounce: Arc::new(Mutex::new(DebounceState::default())),
            background: BackgroundTasks::default(),
        }
    }

    /// Names of all discoverable skills on disk, regardless of load state.
    pub fn list_available(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if !self.root.is_dir() {
            return Ok(names);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            if entry.path().join("skill.toml").exists() || entry.path().join("SKILL.md").exists() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn list_loaded(&self) -> Vec<String> {
        let mut names: Vec<String> = self.skills.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn get(&self, name: &str) -> Option<Skill> {
        self.skills.read().await.get(name).cloned()
    }

    fn skill_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// `load(name)` (§4.C): delegate to the Loader, install the result,
    /// and emit a debounced `load` notification.
    pub async fn load(&self, name: &str) -> Result<Skill> {
        let dir = self.skill_dir(name);
        let skill = self.loader.load(&dir)?;
        // Enforce the invariant "skill names are unique process-wide" by
        // trusting the directory-derived name over the manifest's own
        // `name` field only when they disagree is a load error, not a silent
        // rename: callers address skills by directory name.
        if skill.name != name {
            return Err(KernelError::LoadFailed {
                skill: name.to_string(),
                reason: format!("manifest name {:?} does not match directory {:?}", skill.name, name),
            });
        }
        self.skills.write().await.insert(name.to_string(), skill.clone());
        self.notify(name, ChangeType::Load).await;
        Ok(skill)
    }

    /// `unload(name)` (§4.C): idempotent.
    pub async fn unload(&self, name: &str) -> Result<()> {
        let removed = self.skills.write().await.remove(name);
        if let Some(skill) = &removed {
            self.loader.unload(skill);
        }
        self.notify(name, ChangeType::Unload).await;
        Ok(())
    }

    /// `reload(name)` (§4.C): fail-safe — on `ReloadFailed` the previous
    /// version stays installed and the error is returned, but a `reload`
    /// notification still fires so observers know a reload was attempted.
    pub async fn reload(&self, name: &str) -> Result<Skill> {
        let previous = self
            .skills
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| KernelError::NotFound(name.to_string()))?;
        match self.loader.reload(&previous) {
            Ok(next) => {
                self.skills.write().await.insert(name.to_string(), next.clone());
                self.notify(name, ChangeType::Reload).await;
                Ok(next)
            }
            Err(e) => {
                self.notify(name, ChangeType::Reload).await;
                Err(e)
            }
        }
    }

    /// Check whether `name`'s on-disk manifest changed since it was loaded
    /// and, if so, reload it. Called lazily "on the next registry operation
    /// referencing that skill" (§4.C); a filesystem watcher collaborator
    /// may call this proactively instead.
    pub async fn reload_if_stale(&self, name: &str, loaded_at: std::time::SystemTime) -> Result<Option<Skill>> {
        let dir = self.skill_dir(name);
        match ModuleLoader::directory_mtime(&dir) {
            Some(mtime) if mtime > loaded_at => Ok(Some(self.reload(name).await?)),
            _ => Ok(None),
        }
    }

    pub async fn subscribe(&self, observer: Arc<dyn RegistryObserver>) -> u64 {
        let id = self.next_observer_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.observers.write().await.push(ObserverSlot { id, observer });
        id
    }

    pub async fn unsubscribe(&self, id: u64) {
        self.observers.write().await.retain(|slot| slot.id != id);
    }

    /// Enqueue a change for debounced delivery. If no flush is already
    /// scheduled for this skill, spawn one; it sleeps for the debounce
    /// window, then delivers whatever the *final* coalesced change type is
    /// (last-write-wins by ordinal: unload > reload > load, per
    /// `ChangeType`'s `Ord`).
    async fn notify(&self, skill_name: &str, change: ChangeType) {
        let mut state = self.debounce.lock().await;
        let entry = state.pending.entry(skill_name.to_string()).or_insert(change);
        if change > *entry {
            *entry = change;
        }

        if state.flush_scheduled.insert(skill_name.to_string()) {
            drop(state);
            self.schedule_flush(skill_name.to_string()).await;
        }
    }

    async fn schedule_flush(&self, skill_name: String) {
        let debounce = self.debounce.clone();
        let observers = self.clone_observers().await;
        let background = self.background.clone();
        background.reap().await;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE_WINDOW).await;
            let change = {
                let mut state = debounce.lock().await;
                state.flush_scheduled.remove(&skill_name);
                state.pending.remove(&skill_name)
            };
            if let Some(change_type) = change {
                let event = SkillChangeEvent { skill_name, change_type };
                for slot in &observers {
                    slot.on_change(event.clone()).await;
                }
            }
        });
        self.background.track(handle);
    }

    async fn clone_observers(&self) -> Vec<Arc<dyn RegistryObserver>> {
        self.observers.read().await.iter().map(|s| s.observer.clone()).collect()
    }

    #[cfg(test)]
    pub async fn drain_background(&self, timeout: Duration) {
        self.background.drain(timeout).await;
    }
}
