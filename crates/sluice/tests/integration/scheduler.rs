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

//! Scheduler scenarios: reconciliation, manual triggers, lifecycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;

use sluice::scheduler::SyncReport;
use sluice::{
    CronScheduler, DagExecutor, ExecutionStatus, MemoryStore, MetadataStore, SchedulerError,
    TriggerKind,
};

use crate::fixtures::*;

/// A scheduler over a fresh store, with a poll interval long enough that
/// only explicit `sync_schedules` calls reconcile.
fn scheduler_harness() -> (Arc<MemoryStore>, CronScheduler) {
    let store = Arc::new(MemoryStore::new());
    let executor = DagExecutor::new(
        store.clone() as Arc<dyn MetadataStore>,
        Arc::new(test_registry()),
        10,
    );
    let scheduler = CronScheduler::new(
        store.clone() as Arc<dyn MetadataStore>,
        executor,
        true,
        Duration::from_secs(3600),
    );
    (store, scheduler)
}

#[tokio::test]
async fn start_installs_jobs_for_enabled_schedules() {
    let (store, scheduler) = scheduler_harness();
    store.insert_schedule(schedule("a", "0 2 * * *", vec![]));
    store.insert_schedule(schedule("b", "0 3 * * *", vec![]));
    let mut disabled = schedule("c", "0 4 * * *", vec![]);
    disabled.enabled = false;
    store.insert_schedule(disabled);

    scheduler.start().await.unwrap();
    assert!(scheduler.is_running());

    let active = scheduler.get_active_schedules().await;
    let ids: Vec<&str> = active.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(active.iter().all(|s| s.next_run_time.is_some()));

    scheduler.stop().await;
    assert!(!scheduler.is_running());
    assert!(scheduler.get_active_schedules().await.is_empty());
}

#[tokio::test]
async fn reconciliation_applies_adds_and_removals() {
    let (store, scheduler) = scheduler_harness();
    store.insert_schedule(schedule("a", "0 2 * * *", vec![]));
    store.insert_schedule(schedule("b", "0 3 * * *", vec![]));
    scheduler.start().await.unwrap();

    // Operator disables B and adds C between polls.
    store.set_schedule_enabled("b", false);
    store.insert_schedule(schedule("c", "0 4 * * *", vec![]));

    let report = scheduler.sync_schedules().await.unwrap();
    assert_eq!(
        report,
        SyncReport {
            added: 1,
            removed: 1,
            refreshed: 0
        }
    );

    let ids: Vec<String> = scheduler
        .get_active_schedules()
        .await
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec!["a", "c"]);

    // C's next fire instant was written back to the store.
    assert!(store.get_schedule("c").unwrap().next_run_at.is_some());

    scheduler.stop().await;
}

#[tokio::test]
async fn reconciliation_is_idempotent() {
    let (store, scheduler) = scheduler_harness();
    store.insert_schedule(schedule("a", "0 2 * * *", vec![]));
    scheduler.start().await.unwrap();

    let first = scheduler.sync_schedules().await.unwrap();
    let second = scheduler.sync_schedules().await.unwrap();
    assert_eq!(first, SyncReport::default());
    assert_eq!(second, SyncReport::default());

    scheduler.stop().await;
}

#[tokio::test]
async fn cron_change_reinstalls_the_job() {
    let (store, scheduler) = scheduler_harness();
    store.insert_schedule(schedule("a", "0 2 * * *", vec![]));
    scheduler.start().await.unwrap();

    let mut changed = store.get_schedule("a").unwrap();
    changed.cron_expr = "0 8 * * *".to_string();
    store.insert_schedule(changed);

    let report = scheduler.sync_schedules().await.unwrap();
    assert_eq!(report.refreshed, 1);
    assert_eq!(report.added, 0);

    let active = scheduler.get_active_schedules().await;
    assert_eq!(active[0].cron_expr, "0 8 * * *");

    // The stored next_run_at reflects the new expression.
    let next = store.get_schedule("a").unwrap().next_run_at.unwrap();
    assert_eq!(next.hour(), 8);
    assert_eq!(next.minute(), 0);

    scheduler.stop().await;
}

#[tokio::test]
async fn unusable_schedule_is_not_installed() {
    let (store, scheduler) = scheduler_harness();
    store.insert_schedule(schedule("ok", "0 2 * * *", vec![]));
    store.insert_schedule(schedule("bad", "not a cron", vec![]));

    scheduler.start().await.unwrap();

    let ids: Vec<String> = scheduler
        .get_active_schedules()
        .await
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec!["ok"], "invalid cron must not break reconciliation");

    scheduler.stop().await;
}

#[tokio::test]
async fn manual_trigger_runs_an_active_schedule() {
    let (store, scheduler) = scheduler_harness();
    store.insert_pipeline(noop_pipeline("noop"));
    store.insert_schedule(schedule("a", "0 2 * * *", vec![node("n1", "noop", &[])]));
    scheduler.start().await.unwrap();

    let execution_id = scheduler.trigger_manual("a", None).await.unwrap();
    let execution = wait_for_terminal(&store, execution_id).await;
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(execution.trigger, TriggerKind::Manual);
    assert_eq!(execution.schedule_id.as_deref(), Some("a"));

    scheduler.stop().await;
}

#[tokio::test]
async fn manual_trigger_falls_through_to_the_store() {
    let (store, scheduler) = scheduler_harness();
    store.insert_pipeline(noop_pipeline("noop"));
    store.insert_schedule(schedule("unseen", "0 2 * * *", vec![node("n1", "noop", &[])]));

    // Scheduler never started: the schedule is not in the active set.
    let execution_id = scheduler.trigger_manual("unseen", None).await.unwrap();
    let execution = wait_for_terminal(&store, execution_id).await;
    assert_eq!(execution.status, ExecutionStatus::Success);
}

#[tokio::test]
async fn manual_trigger_of_unknown_schedule_fails() {
    let (_store, scheduler) = scheduler_harness();
    let err = scheduler.trigger_manual("ghost", None).await.unwrap_err();
    assert!(matches!(err, SchedulerError::ScheduleNotFound(ref id) if id == "ghost"));
}

#[tokio::test]
async fn disabled_scheduler_start_is_a_noop() {
    let store = Arc::new(MemoryStore::new());
    store.insert_schedule(schedule("a", "0 2 * * *", vec![]));
    let executor = DagExecutor::new(
        store.clone() as Arc<dyn MetadataStore>,
        Arc::new(test_registry()),
        10,
    );
    let scheduler = CronScheduler::new(
        store.clone() as Arc<dyn MetadataStore>,
        executor,
        false,
        Duration::from_secs(3600),
    );

    scheduler.start().await.unwrap();
    assert!(!scheduler.is_running());
    assert!(scheduler.get_active_schedules().await.is_empty());
}

#[tokio::test]
async fn repeated_start_and_stop_are_noops() {
    let (store, scheduler) = scheduler_harness();
    store.insert_schedule(schedule("a", "0 2 * * *", vec![]));

    scheduler.start().await.unwrap();
    scheduler.start().await.unwrap();
    assert_eq!(scheduler.get_active_schedules().await.len(), 1);

    scheduler.stop().await;
    scheduler.stop().await;
    assert!(!scheduler.is_running());
}
