use super::worker::Worker;
use super::{DispatchContext, WorkerStatus};
use area::AreaError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

struct WorkerHandle {
    cancel: CancellationToken,
    status: Arc<Mutex<WorkerStatus>>,
    task: JoinHandle<()>,
    /// Distinguishes a restarted worker from the one it replaced
    generation: u64,
}

/// Owns every Area worker.
///
/// # Responsibilities
/// - Start a worker per enabled Area at boot
/// - Start/stop single workers as Areas are created, edited, disabled or deleted
/// - Expose per-Area status
/// - Graceful shutdown
pub struct DispatchEngine {
    ctx: Arc<DispatchContext>,
    workers: Arc<DashMap<i64, WorkerHandle>>,
    next_generation: AtomicU64,
}

impl DispatchEngine {
    pub fn new(ctx: DispatchContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            workers: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Starts a worker for every enabled Area.
    ///
    /// # Returns
    /// Number of workers started
    pub fn start(&self) -> Result<usize, AreaError> {
        let areas = self.ctx.areas.find_enabled()?;
        for area in &areas {
            self.start_area(area.id);
        }
        info!(workers = areas.len(), "Dispatch engine started");
        Ok(areas.len())
    }

    /// Starts (or restarts) the worker of one Area from its persisted cursor.
    ///
    /// A disabled or missing Area makes the new worker exit on its first tick.
    pub fn start_area(&self, area_id: i64) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let status = Arc::new(Mutex::new(WorkerStatus::default()));

        let worker = Worker {
            area_id,
            ctx: self.ctx.clone(),
            cancel: cancel.clone(),
            status: status.clone(),
        };
        let workers = self.workers.clone();
        let task = tokio::spawn(async move {
            worker.run().await;
            // Exited on its own (Area gone or disabled): forget the handle
            // unless a newer worker already took the slot.
            workers.remove_if(&area_id, |_, handle| handle.generation == generation);
        });

        let previous = self.workers.insert(
            area_id,
            WorkerHandle {
                cancel,
                status,
                task,
                generation,
            },
        );
        if let Some(old) = previous {
            old.cancel.cancel();
            info!(area_id, "Replaced running area worker");
        }
    }

    /// Cancels the Area's worker. Returns whether one was running.
    pub fn stop_area(&self, area_id: i64) -> bool {
        match self.workers.remove(&area_id) {
            Some((_, handle)) => {
                handle.cancel.cancel();
                info!(area_id, "Stopped area worker");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, area_id: i64) -> bool {
        self.workers
            .get(&area_id)
            .map(|handle| !handle.task.is_finished())
            .unwrap_or(false)
    }

    pub fn running_count(&self) -> usize {
        self.workers
            .iter()
            .filter(|entry| !entry.task.is_finished())
            .count()
    }

    /// Status snapshot of the Area's worker, if it runs.
    pub async fn status(&self, area_id: i64) -> Option<WorkerStatus> {
        // Do not hold the map guard across the await.
        let status = self.workers.get(&area_id).map(|h| h.status.clone())?;
        let snapshot = status.lock().await.clone();
        Some(snapshot)
    }

    /// Cancels every worker and waits for them to exit.
    pub async fn shutdown(&self) {
        let ids: Vec<i64> = self.workers.iter().map(|entry| *entry.key()).collect();
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, handle)) = self.workers.remove(&id) {
                handle.cancel.cancel();
                tasks.push(handle.task);
            }
        }

        let count = tasks.len();
        for task in tasks {
            let _ = task.await;
        }
        info!(workers = count, "Dispatch engine shut down");
    }
}
