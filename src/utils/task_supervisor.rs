use tokio::task::JoinHandle;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

/// Task Supervisor - Tracks background updater tasks
///
/// ## Purpose
/// Keeps the `JoinHandle` of every spawned continuous-update task, keyed by
/// source id, so shutdown can join them instead of sleeping blindly.
///
/// ## Usage
/// ```rust,ignore
/// let mut supervisor = TaskSupervisor::new();
/// supervisor.spawn("binance", async move { /* drain listener */ });
///
/// // After signalling stop:
/// supervisor.join_all(Duration::from_secs(2)).await;
/// ```
pub struct TaskSupervisor {
    tasks: HashMap<String, JoinHandle<()>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        TaskSupervisor {
            tasks: HashMap::new(),
        }
    }

    /// Spawn a new background task and register it for monitoring.
    /// A previous task under the same name is aborted.
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F) -> &mut Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(future);

        info!("Spawned background task: {}", name);
        if let Some(previous) = self.tasks.insert(name.clone(), handle) {
            warn!("Replacing still tracked task: {}", name);
            previous.abort();
        }
        self
    }

    /// Names of tasks that have already terminated
    pub fn finished_tasks(&self) -> Vec<String> {
        let mut finished: Vec<String> = self.tasks.iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();
        finished.sort();
        finished
    }

    /// Get count of tracked tasks that are still running
    pub fn active_task_count(&self) -> usize {
        self.tasks.values().filter(|handle| !handle.is_finished()).count()
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Wait for every tracked task to finish, aborting whichever is still
    /// running once `grace` has elapsed. Returns the names of aborted tasks.
    pub async fn join_all(&mut self, grace: Duration) -> Vec<String> {
        info!("Waiting for {} background tasks", self.tasks.len());
        let deadline = tokio::time::Instant::now() + grace;
        let mut aborted = Vec::new();

        for (name, mut handle) in self.tasks.drain() {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => info!("Task {} completed", name),
                Ok(Err(e)) => warn!("Task {} failed: {:?}", name, e),
                Err(_) => {
                    handle.abort();
                    warn!("Aborted task after grace period: {}", name);
                    aborted.push(name);
                }
            }
        }

        aborted.sort();
        aborted
    }

    /// Abort all tasks immediately
    pub fn shutdown_all(&mut self) {
        info!("Shutting down {} background tasks", self.tasks.len());

        for (name, handle) in self.tasks.drain() {
            handle.abort();
            info!("Aborted task: {}", name);
        }
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
