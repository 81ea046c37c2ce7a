use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ArtifactFields;
use crate::sandbox::{ConsoleMessage, RunReport, SandboxRunner, SurfaceKind};

/// Snapshot of one runner, as returned by the playground endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaygroundState {
    pub id: Uuid,
    pub sources: ArtifactFields,
    pub auto_run: bool,
    pub surface: SurfaceKind,
    pub last_run: Option<RunReport>,
    pub console: Vec<ConsoleMessage>,
}

impl PlaygroundState {
    fn of(id: Uuid, runner: &SandboxRunner) -> Self {
        Self {
            id,
            sources: runner.sources().clone(),
            auto_run: runner.auto_run(),
            surface: runner.active_surface(),
            last_run: runner.last_run(),
            console: runner.console().messages().to_vec(),
        }
    }
}

struct TrackedRunner {
    runner: SandboxRunner,
    last_touched: Instant,
}

impl TrackedRunner {
    fn new(runner: SandboxRunner) -> Self {
        Self {
            runner,
            last_touched: Instant::now(),
        }
    }
}

/// Live playground runners, one per open editor. Clones share the registry.
#[derive(Default, Clone)]
pub struct PlaygroundHub {
    runners: Arc<Mutex<HashMap<Uuid, TrackedRunner>>>,
}

impl PlaygroundHub {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self, sources))]
    pub fn create(&self, sources: ArtifactFields) -> Result<PlaygroundState, AppError> {
        let id = Uuid::new_v4();
        let runner = SandboxRunner::new(sources);
        let state = PlaygroundState::of(id, &runner);

        self.lock()?.insert(id, TrackedRunner::new(runner));
        info!(%id, "Playground created");
        Ok(state)
    }

    /// Runs `f` against the runner and returns its value with the runner's
    /// resulting state. Any access counts as activity for the idle sweep.
    pub fn with_runner<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut SandboxRunner) -> T,
    ) -> Result<(T, PlaygroundState), AppError> {
        let mut runners = self.lock()?;
        let tracked = runners
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Playground {} not found", id)))?;
        tracked.last_touched = Instant::now();
        let value = f(&mut tracked.runner);
        Ok((value, PlaygroundState::of(id, &tracked.runner)))
    }

    pub fn state(&self, id: Uuid) -> Result<PlaygroundState, AppError> {
        self.with_runner(id, |_| ()).map(|(_, state)| state)
    }

    pub fn relay(&self, id: Uuid, message: &Value) -> Result<Option<ConsoleMessage>, AppError> {
        self.with_runner(id, |runner| runner.relay(message).cloned())
            .map(|(accepted, _)| accepted)
    }

    /// Document on the runner's active surface.
    pub fn document(&self, id: Uuid) -> Result<String, AppError> {
        self.with_runner(id, |runner| runner.active_document().map(str::to_string))?
            .0
            .ok_or_else(|| AppError::NotFound(format!("Playground {} has not run yet", id)))
    }

    /// Drops the runner, closing any pop-out window it had open.
    #[instrument(skip(self))]
    pub fn teardown(&self, id: Uuid) -> Result<(), AppError> {
        match self.lock()?.remove(&id) {
            Some(mut tracked) => {
                tracked.runner.teardown();
                info!(%id, "Playground torn down");
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Playground {} not found", id))),
        }
    }

    /// Tears down every runner untouched for at least `max_idle`.
    pub fn sweep_idle(&self, max_idle: Duration) -> Result<usize, AppError> {
        self.sweep_idle_at(Instant::now(), max_idle)
    }

    fn sweep_idle_at(&self, now: Instant, max_idle: Duration) -> Result<usize, AppError> {
        let mut runners = self.lock()?;
        let before = runners.len();
        runners.retain(|id, tracked| {
            let idle = now.saturating_duration_since(tracked.last_touched) >= max_idle;
            if idle {
                tracked.runner.teardown();
                debug!(%id, "Idle playground swept");
            }
            !idle
        });
        Ok(before - runners.len())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|runners| runners.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, TrackedRunner>>, AppError> {
        self.runners
            .lock()
            .map_err(|_| AppError::Internal("Playground registry lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_edit_and_teardown() {
        let hub = PlaygroundHub::new();
        let state = hub.create(ArtifactFields::new("<p>a</p>", "", "")).unwrap();
        assert_eq!(state.surface, SurfaceKind::Embedded);
        assert_eq!(hub.len(), 1);

        let (_, state) = hub
            .with_runner(state.id, |runner| runner.set_markup("<p>b</p>"))
            .unwrap();
        assert_eq!(state.sources.markup, "<p>b</p>");
        assert!(hub.document(state.id).unwrap().contains("<p>b</p>"));

        hub.teardown(state.id).unwrap();
        assert!(hub.is_empty());
        assert!(matches!(hub.state(state.id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_relay_through_hub() {
        let hub = PlaygroundHub::new();
        let id = hub.create(ArtifactFields::default()).unwrap().id;

        let accepted = hub
            .relay(id, &json!({"type": "console", "level": "warn", "message": "hm"}))
            .unwrap();
        assert_eq!(accepted.map(|m| m.message), Some("hm".to_string()));

        let ignored = hub.relay(id, &json!({"type": "other"})).unwrap();
        assert!(ignored.is_none());
        assert_eq!(hub.state(id).unwrap().console.len(), 1);
    }

    #[test]
    fn test_sweep_drops_only_idle_runners() {
        let hub = PlaygroundHub::new();
        let active = hub.create(ArtifactFields::default()).unwrap().id;
        let abandoned = hub.create(ArtifactFields::default()).unwrap().id;
        hub.with_runner(abandoned, |runner| runner.pop_out()).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        hub.state(active).unwrap();

        let swept = hub
            .sweep_idle_at(Instant::now(), Duration::from_millis(25))
            .unwrap();
        assert_eq!(swept, 1);
        assert!(hub.state(active).is_ok());
        assert!(matches!(hub.state(abandoned), Err(AppError::NotFound(_))));

        let later = Instant::now() + Duration::from_secs(3600);
        assert_eq!(hub.sweep_idle_at(later, Duration::from_secs(1800)).unwrap(), 1);
        assert!(hub.is_empty());
    }

    #[test]
    fn test_clones_share_runners() {
        let hub = PlaygroundHub::new();
        let sweeper = hub.clone();
        hub.create(ArtifactFields::default()).unwrap();

        assert_eq!(sweeper.len(), 1);
        assert_eq!(sweeper.sweep_idle(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(hub.len(), 1);
    }
}
