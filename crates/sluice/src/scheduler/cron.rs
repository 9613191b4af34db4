/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # Cron Scheduler
//!
//! Owns one cron job per enabled schedule and fires the DAG executor at
//! each schedule's next cron instant, evaluated in the schedule's IANA
//! timezone (civil time, DST-correct).
//!
//! The active job set reconciles with the metadata store every poll
//! interval, so edits to `cron_expr`, `timezone`, `dag`, or the `enabled`
//! flag, as well as added or deleted schedules, apply without a restart.
//!
//! Firing is fault-isolated: a failed firing is logged and swallowed, and
//! a firing delayed more than the misfire grace (60 s) is dropped rather
//! than run late.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use croner::Cron;
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dal::MetadataStore;
use crate::error::SchedulerError;
use crate::executor::DagExecutor;
use crate::models::{Schedule, TriggerKind};

/// Firings delayed more than this many seconds are dropped instead of
/// run late.
const MISFIRE_GRACE_SECS: i64 = 60;

/// How long `stop()` waits for in-flight firings before abandoning them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Counts of reconciliation operations from one sync pass.
///
/// Two consecutive passes with no store changes produce an all-zero
/// report, so reconciliation is observably idempotent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Jobs installed for schedules not previously active.
    pub added: usize,
    /// Jobs removed for schedules disabled or deleted in the store.
    pub removed: usize,
    /// Jobs reinstalled because `cron_expr`, `timezone`, or `dag` changed.
    pub refreshed: usize,
}

/// Snapshot of one active schedule, as exposed to the management surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActiveSchedule {
    pub id: String,
    pub name: String,
    pub cron_expr: String,
    pub timezone: String,
    pub next_run_time: Option<DateTime<Utc>>,
    pub dag_nodes: usize,
}

struct ActiveJob {
    schedule: Schedule,
    handle: JoinHandle<()>,
}

struct Inner {
    store: Arc<dyn MetadataStore>,
    executor: DagExecutor,
    enabled: bool,
    poll_interval: Duration,
    active: RwLock<HashMap<String, ActiveJob>>,
    poll_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    firings: Arc<Mutex<JoinSet<()>>>,
    running: AtomicBool,
}

/// Fires enabled schedules at their cron instants and keeps the job set
/// reconciled with the metadata store.
///
/// Cheap to clone: clones share the active job set and lifecycle state.
#[derive(Clone)]
pub struct CronScheduler {
    inner: Arc<Inner>,
}

impl CronScheduler {
    /// Creates a stopped scheduler.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        executor: DagExecutor,
        enabled: bool,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                executor,
                enabled,
                poll_interval,
                active: RwLock::new(HashMap::new()),
                poll_task: parking_lot::Mutex::new(None),
                firings: Arc::new(Mutex::new(JoinSet::new())),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Loads the enabled schedules, installs their cron jobs, and begins
    /// the reconciliation loop.
    ///
    /// A no-op when the scheduler is disabled by configuration or already
    /// running.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if !self.inner.enabled {
            info!("Scheduler disabled by configuration");
            return Ok(());
        }
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Starting scheduler");

        match self.sync_schedules().await {
            Ok(report) => {
                debug!(added = report.added, "Initial schedule sync complete");
            }
            Err(e) => {
                self.inner.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }

        let poll_interval = self.inner.poll_interval;
        // The loop holds only a weak handle so a dropped scheduler winds
        // down instead of being kept alive by its own poll task.
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let scheduler = CronScheduler { inner };
                match scheduler.sync_schedules().await {
                    Ok(report) => {
                        if report != SyncReport::default() {
                            info!(
                                added = report.added,
                                removed = report.removed,
                                refreshed = report.refreshed,
                                "Reconciled schedules"
                            );
                        }
                    }
                    Err(e) => error!(error = %e, "Schedule reconciliation failed"),
                }
            }
        });
        *self.inner.poll_task.lock() = Some(handle);

        let active_jobs = self.inner.active.read().await.len();
        info!(active_jobs, "Scheduler started");
        Ok(())
    }

    /// Cancels the reconciliation loop, removes every cron job, and waits
    /// up to the shutdown grace for in-flight firings. A no-op when
    /// already stopped.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping scheduler");

        if let Some(handle) = self.inner.poll_task.lock().take() {
            handle.abort();
        }

        {
            let mut active = self.inner.active.write().await;
            for (_, job) in active.drain() {
                job.handle.abort();
            }
        }

        let mut firings = self.inner.firings.lock().await;
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        loop {
            match tokio::time::timeout_at(deadline, firings.join_next()).await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => {
                    warn!("Abandoning in-flight firings after shutdown grace");
                    firings.abort_all();
                    break;
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Whether `start()` has run and `stop()` has not.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Runs the schedule immediately with a `manual` trigger, returning
    /// the new execution id. Schedules not in the active set are loaded
    /// from the store's enabled set.
    pub async fn trigger_manual(
        &self,
        schedule_id: &str,
        params: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Uuid, SchedulerError> {
        let schedule = {
            let active = self.inner.active.read().await;
            active.get(schedule_id).map(|job| job.schedule.clone())
        };

        let schedule = match schedule {
            Some(schedule) => schedule,
            None => self
                .inner
                .store
                .list_enabled_schedules()
                .await?
                .into_iter()
                .find(|s| s.id == schedule_id)
                .ok_or_else(|| SchedulerError::ScheduleNotFound(schedule_id.to_string()))?,
        };

        info!(schedule_id = %schedule_id, "Manual trigger");

        let execution_id = self
            .inner
            .executor
            .submit_schedule(schedule, TriggerKind::Manual, params)
            .await?;
        Ok(execution_id)
    }

    /// Snapshots of the active schedules, in id order.
    pub async fn get_active_schedules(&self) -> Vec<ActiveSchedule> {
        let active = self.inner.active.read().await;
        let mut schedules: Vec<ActiveSchedule> = active
            .values()
            .map(|job| ActiveSchedule {
                id: job.schedule.id.clone(),
                name: job.schedule.name.clone(),
                cron_expr: job.schedule.cron_expr.clone(),
                timezone: job.schedule.timezone.clone(),
                next_run_time: next_occurrence(&job.schedule).ok(),
                dag_nodes: job.schedule.dag.len(),
            })
            .collect();
        schedules.sort_by(|a, b| a.id.cmp(&b.id));
        schedules
    }

    /// Reconciles the active job set with the store's enabled schedules.
    ///
    /// Normally driven by the poll loop; exposed so embedders (and tests)
    /// can force a reconciliation pass.
    pub async fn sync_schedules(&self) -> Result<SyncReport, SchedulerError> {
        let db_schedules = self.inner.store.list_enabled_schedules().await?;
        let mut report = SyncReport::default();

        {
            let mut active = self.inner.active.write().await;

            let db_ids: HashSet<&str> = db_schedules.iter().map(|s| s.id.as_str()).collect();
            let stale: Vec<String> = active
                .keys()
                .filter(|id| !db_ids.contains(id.as_str()))
                .cloned()
                .collect();
            for schedule_id in stale {
                if let Some(job) = active.remove(&schedule_id) {
                    job.handle.abort();
                    info!(
                        schedule_id = %schedule_id,
                        schedule_name = %job.schedule.name,
                        "Removed schedule job"
                    );
                    report.removed += 1;
                }
            }

            for schedule in db_schedules {
                match active.get(&schedule.id) {
                    None => {
                        if self.install_job(&mut active, schedule) {
                            report.added += 1;
                        }
                    }
                    Some(job) if job.schedule.job_differs(&schedule) => {
                        if let Some(job) = active.remove(&schedule.id) {
                            job.handle.abort();
                        }
                        if self.install_job(&mut active, schedule) {
                            report.refreshed += 1;
                        }
                    }
                    Some(_) => {}
                }
            }
        }

        self.update_next_run_times().await;
        Ok(report)
    }

    /// Installs a cron job for `schedule`. Returns false (and logs) when
    /// the schedule's cron expression or timezone is unusable.
    fn install_job(&self, active: &mut HashMap<String, ActiveJob>, schedule: Schedule) -> bool {
        match self.spawn_job(schedule.clone()) {
            Ok(handle) => {
                info!(
                    schedule_id = %schedule.id,
                    schedule_name = %schedule.name,
                    cron_expr = %schedule.cron_expr,
                    "Added schedule job"
                );
                active.insert(schedule.id.clone(), ActiveJob { schedule, handle });
                true
            }
            Err(e) => {
                error!(
                    schedule_id = %schedule.id,
                    error = %e,
                    "Failed to add schedule job"
                );
                false
            }
        }
    }

    fn spawn_job(&self, schedule: Schedule) -> Result<JoinHandle<()>, SchedulerError> {
        let tz: Tz = schedule
            .timezone
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(schedule.timezone.clone()))?;
        let cron = Cron::new(&schedule.cron_expr)
            .parse()
            .map_err(|e| SchedulerError::InvalidCron {
                expr: schedule.cron_expr.clone(),
                reason: e.to_string(),
            })?;

        let store = self.inner.store.clone();
        let executor = self.inner.executor.clone();
        let firings = self.inner.firings.clone();

        Ok(tokio::spawn(async move {
            loop {
                let now = Utc::now().with_timezone(&tz);
                let next = match cron.find_next_occurrence(&now, false) {
                    Ok(next) => next.with_timezone(&Utc),
                    Err(e) => {
                        warn!(
                            schedule_id = %schedule.id,
                            error = %e,
                            "No further cron occurrences; job exiting"
                        );
                        break;
                    }
                };

                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;

                let lateness = Utc::now().signed_duration_since(next);
                if lateness.num_seconds() > MISFIRE_GRACE_SECS {
                    warn!(
                        schedule_id = %schedule.id,
                        late_secs = lateness.num_seconds(),
                        "Dropping missed firing"
                    );
                    continue;
                }

                let store = store.clone();
                let executor = executor.clone();
                let schedule = schedule.clone();
                let mut firings = firings.lock().await;
                // Reap firings that already finished so the set stays small.
                while firings.try_join_next().is_some() {}
                firings.spawn(fire_schedule(store, executor, schedule));
            }
        }))
    }

    /// Recomputes and persists `next_run_at` for every active schedule.
    async fn update_next_run_times(&self) {
        let active = self.inner.active.read().await;
        for (schedule_id, job) in active.iter() {
            match next_occurrence(&job.schedule) {
                Ok(next) => {
                    if let Err(e) = self
                        .inner
                        .store
                        .update_schedule_next_run(schedule_id, next)
                        .await
                    {
                        error!(
                            schedule_id = %schedule_id,
                            error = %e,
                            "Failed to update next run time"
                        );
                    }
                }
                Err(e) => {
                    error!(
                        schedule_id = %schedule_id,
                        error = %e,
                        "Failed to compute next run time"
                    );
                }
            }
        }
    }
}

/// One scheduled firing: record the wall time, execute the DAG, swallow
/// failures so future firings are unaffected.
async fn fire_schedule(store: Arc<dyn MetadataStore>, executor: DagExecutor, schedule: Schedule) {
    info!(
        schedule_id = %schedule.id,
        schedule_name = %schedule.name,
        "Executing schedule"
    );

    if let Err(e) = store.update_schedule_last_run(&schedule.id, Utc::now()).await {
        error!(
            schedule_id = %schedule.id,
            error = %e,
            "Failed to record last run time"
        );
    }

    match executor
        .execute_schedule(&schedule, TriggerKind::Scheduled, None)
        .await
    {
        Ok(execution_id) => {
            info!(
                schedule_id = %schedule.id,
                execution_id = %execution_id,
                "Schedule execution completed"
            );
        }
        Err(e) => {
            error!(
                schedule_id = %schedule.id,
                error = %e,
                "Schedule execution failed"
            );
        }
    }
}

/// Computes a schedule's next fire instant: the next cron occurrence
/// evaluated in the schedule's timezone, returned in UTC.
pub fn next_occurrence(schedule: &Schedule) -> Result<DateTime<Utc>, SchedulerError> {
    let tz: Tz = schedule
        .timezone
        .parse()
        .map_err(|_| SchedulerError::InvalidTimezone(schedule.timezone.clone()))?;
    let cron = Cron::new(&schedule.cron_expr)
        .parse()
        .map_err(|e| SchedulerError::InvalidCron {
            expr: schedule.cron_expr.clone(),
            reason: e.to_string(),
        })?;

    let now = Utc::now().with_timezone(&tz);
    let next = cron
        .find_next_occurrence(&now, false)
        .map_err(|e| SchedulerError::InvalidCron {
            expr: schedule.cron_expr.clone(),
            reason: e.to_string(),
        })?;
    Ok(next.with_timezone(&Utc))
}
