//! Per-Area worker loop.

use super::{effective_interval, DispatchContext, WorkerStatus, FALLBACK_INTERVAL};
use crate::adapter::{PollOutcome, PollRequest, ReactionRequest};
use crate::registry::{RegisteredAction, RegisteredReaction};
use area::credentials::Credentials;
use area::store::Area;
use area::AreaError;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Floor between two polls of the same Area when neither the Area nor the
/// Action asks for a delay.
const MIN_TICK: Duration = Duration::from_secs(1);

pub(super) struct Worker {
    pub area_id: i64,
    pub ctx: Arc<DispatchContext>,
    pub cancel: CancellationToken,
    pub status: Arc<Mutex<WorkerStatus>>,
}

/// Everything one tick needs, resolved from the Area row.
struct Plan {
    area: Area,
    action: RegisteredAction,
    reaction: RegisteredReaction,
    interval: Duration,
}

enum Step {
    /// Wait this long after the tick started.
    Continue(Duration),
    /// The Area is gone, disabled, or the worker was cancelled.
    Stop,
}

/// Outcome of a future raced against the worker's cancellation.
enum Raced<T> {
    Done(T),
    Cancelled,
}

impl Worker {
    pub async fn run(self) {
        info!(area_id = self.area_id, "Area worker started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let started = Instant::now();

            let wait = match self.tick().await {
                Step::Continue(wait) => wait.max(MIN_TICK),
                Step::Stop => break,
            };

            let remaining = wait.saturating_sub(started.elapsed());
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        info!(area_id = self.area_id, "Area worker stopped");
    }

    async fn tick(&self) -> Step {
        let plan = match self.plan() {
            Ok(Some(plan)) => plan,
            Ok(None) => return Step::Stop,
            Err(e) => {
                self.record_failure(&e).await;
                return Step::Continue(FALLBACK_INTERVAL);
            }
        };

        debug!(
            area_id = self.area_id,
            action = %plan.action.descriptor.name,
            interval_secs = plan.interval.as_secs(),
            "Polling area"
        );

        match self.poll_and_fire(&plan).await {
            Ok(Some(())) => Step::Continue(plan.interval),
            Ok(None) => Step::Stop,
            Err(e) => {
                self.record_failure(&e).await;
                Step::Continue(plan.interval)
            }
        }
    }

    /// Re-reads the Area so option edits apply on the next tick.
    /// `None` ends the worker.
    fn plan(&self) -> Result<Option<Plan>, AreaError> {
        let Some(area) = self.ctx.areas.find_by_id(self.area_id)? else {
            info!(area_id = self.area_id, "Area deleted, stopping worker");
            return Ok(None);
        };
        if !area.enabled {
            info!(area_id = self.area_id, "Area disabled, stopping worker");
            return Ok(None);
        }

        let action_row = self
            .ctx
            .catalog
            .action_by_id(area.action_id)?
            .ok_or_else(|| AreaError::NotFound(format!("action {}", area.action_id)))?;
        let reaction_row = self
            .ctx
            .catalog
            .reaction_by_id(area.reaction_id)?
            .ok_or_else(|| AreaError::NotFound(format!("reaction {}", area.reaction_id)))?;

        let action = self.ctx.registry.resolve_action(&action_row.name)?.clone();
        let reaction = self.ctx.registry.resolve_reaction(&reaction_row.name)?.clone();
        let interval = effective_interval(
            area.action_interval_secs,
            action.descriptor.minimum_interval_secs,
        );

        Ok(Some(Plan {
            area,
            action,
            reaction,
            interval,
        }))
    }

    /// `Ok(None)` when the worker must stop.
    async fn poll_and_fire(&self, plan: &Plan) -> Result<Option<()>, AreaError> {
        let area = &plan.area;

        let poll = {
            let ctx = self.ctx.clone();
            let handler = plan.action.handler.clone();
            let service = plan.action.service.clone();
            let name = plan.action.descriptor.name.clone();
            let user_id = area.user_id;
            let cursor = area.cursor.clone();
            let options = area.action_options.clone();
            async move {
                let credentials = credentials_for(&ctx, user_id, &service).await?;
                handler
                    .poll(PollRequest {
                        cursor,
                        options,
                        credentials,
                    })
                    .await
                    .map_err(|e| e.context(&format!("unable to poll {}", name)))
            }
        };

        let outcome = match self.race(poll).await? {
            Raced::Done(outcome) => outcome,
            Raced::Cancelled => return Ok(None),
        };
        self.record_poll().await;

        let (payload, cursor) = match outcome {
            PollOutcome::NoEvent { cursor: None } => return Ok(Some(())),
            PollOutcome::NoEvent {
                cursor: Some(cursor),
            } => {
                if !self.ctx.areas.update_cursor(area.id, &cursor)? {
                    return Ok(None);
                }
                return Ok(Some(()));
            }
            PollOutcome::Event { payload, cursor } => (payload, cursor),
        };

        // The event is consumed from here on, whatever the Reaction does.
        if !self.ctx.areas.update_cursor(area.id, &cursor)? {
            return Ok(None);
        }

        info!(
            area_id = area.id,
            action = %plan.action.descriptor.name,
            reaction = %plan.reaction.descriptor.name,
            "Action triggered, firing reaction"
        );

        let fire = {
            let ctx = self.ctx.clone();
            let handler = plan.reaction.handler.clone();
            let service = plan.reaction.service.clone();
            let name = plan.reaction.descriptor.name.clone();
            let user_id = area.user_id;
            let options = area.reaction_options.clone();
            async move {
                let credentials = credentials_for(&ctx, user_id, &service).await?;
                handler
                    .invoke(ReactionRequest {
                        options,
                        event: payload,
                        credentials,
                    })
                    .await
                    .map_err(|e| e.context(&format!("unable to run {}", name)))
            }
        };

        let result = match self.race(fire).await? {
            Raced::Done(result) => result,
            Raced::Cancelled => return Ok(None),
        };

        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        self.ctx.results.save(area.id, &result)?;
        // A delete that raced the insert has already dropped the Area row
        if self.ctx.areas.find_by_id(area.id)?.is_none() {
            self.ctx.results.delete_by_area(area.id)?;
            info!(area_id = area.id, "Area deleted while its Reaction ran, result dropped");
            return Ok(None);
        }
        self.record_fire().await;
        info!(area_id = area.id, result = %result, "Reaction result recorded");
        Ok(Some(()))
    }

    /// Runs `fut` on its own task. On cancellation the call finishes in the
    /// background and its output is dropped.
    async fn race<T, F>(&self, fut: F) -> Result<Raced<T>, AreaError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, AreaError>> + Send + 'static,
    {
        let task = tokio::spawn(fut);
        tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(area_id = self.area_id, "Cancelled during handler call, discarding result");
                Ok(Raced::Cancelled)
            }
            joined = task => match joined {
                Ok(result) => result.map(Raced::Done),
                Err(e) => Err(AreaError::Storage(anyhow::anyhow!("handler task failed: {}", e))),
            }
        }
    }

    async fn record_poll(&self) {
        let mut status = self.status.lock().await;
        status.last_poll = Some(Utc::now());
        status.poll_count += 1;
        status.consecutive_failures = 0;
        status.last_error = None;
    }

    async fn record_fire(&self) {
        let mut status = self.status.lock().await;
        status.last_fire = Some(Utc::now());
        status.fire_count += 1;
    }

    async fn record_failure(&self, e: &AreaError) {
        let failures = {
            let mut status = self.status.lock().await;
            status.last_error = Some(e.to_string());
            status.consecutive_failures += 1;
            status.consecutive_failures
        };

        // Retried next tick either way; only the log level escalates.
        if e.is_upstream_rejection() || failures >= self.ctx.failure_alert_threshold {
            error!(
                area_id = self.area_id,
                consecutive_failures = failures,
                error = %e,
                "Area tick failed"
            );
        } else {
            warn!(
                area_id = self.area_id,
                consecutive_failures = failures,
                error = %e,
                "Area tick failed, retrying next tick"
            );
        }
    }
}

/// Fresh credential of `user_id` for an OAuth service, `None` otherwise.
async fn credentials_for(
    ctx: &DispatchContext,
    user_id: i64,
    service: &str,
) -> Result<Option<Credentials>, AreaError> {
    if !ctx.registry.requires_oauth(service)? {
        return Ok(None);
    }
    ctx.tokens.fresh_credential(user_id, service).await.map(Some)
}
