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

use chrono::TimeZone;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use timus::dal::FailOutcome;
use timus::{
    Classification, FailureCategory, InvalidTaskError, NewTask, Priority, QueueError, TaskStatus,
    UniversalTimestamp,
};
use tokio::sync::Barrier;
use tracing_test::traced_test;

use crate::fixtures::test_queue;

fn transient() -> Classification {
    Classification::of(FailureCategory::Transient)
}

/// Concurrent claimers never receive the same task, and every task is handed
/// out exactly once.
#[tokio::test]
async fn test_concurrent_claims_are_exclusive() {
    let fixture = test_queue().await;

    const NUM_TASKS: usize = 20;
    let mut created = HashSet::new();
    for i in 0..NUM_TASKS {
        let id = fixture
            .queue
            .enqueue(NewTask::new(format!("concurrent task {}", i)))
            .await
            .expect("Failed to enqueue");
        created.insert(id);
    }

    const NUM_WORKERS: usize = 8;
    let barrier = Arc::new(Barrier::new(NUM_WORKERS));
    let mut handles = Vec::new();

    for _ in 0..NUM_WORKERS {
        let queue = fixture.queue.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut claimed = Vec::new();
            while let Some(task) = queue.claim_next().await.expect("claim failed") {
                assert_eq!(task.status, TaskStatus::InProgress);
                claimed.push(task.id);
            }
            claimed
        }));
    }

    let mut all_claimed = Vec::new();
    for handle in handles {
        all_claimed.extend(handle.await.expect("Worker panicked"));
    }

    let unique: HashSet<_> = all_claimed.iter().copied().collect();
    assert_eq!(
        all_claimed.len(),
        unique.len(),
        "a task was claimed by more than one worker"
    );
    assert_eq!(unique, created);

    let stats = fixture.queue.stats().await.unwrap();
    assert_eq!(stats.in_progress, NUM_TASKS as u64);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_claims_follow_priority_then_fifo() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    let low = queue
        .enqueue(NewTask::new("tidy downloads").priority(Priority::Low))
        .await
        .unwrap();
    let critical = queue
        .enqueue(NewTask::new("disk almost full").priority(Priority::Critical))
        .await
        .unwrap();
    let normal_first = queue.enqueue(NewTask::new("daily digest")).await.unwrap();
    let normal_second = queue.enqueue(NewTask::new("weekly digest")).await.unwrap();

    let mut order = Vec::new();
    while let Some(task) = queue.claim_next().await.unwrap() {
        order.push(task.id);
    }
    assert_eq!(order, vec![critical, normal_first, normal_second, low]);
}

#[tokio::test]
async fn test_future_tasks_wait_for_run_at() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    let later = queue
        .enqueue(
            NewTask::new("remind me tomorrow")
                .priority(Priority::Critical)
                .run_at(UniversalTimestamp::now().plus(Duration::from_secs(3600))),
        )
        .await
        .unwrap();
    assert!(queue.claim_next().await.unwrap().is_none());

    // A ready task of lower priority is still served first.
    let ready = queue
        .enqueue(NewTask::new("check mail").priority(Priority::Low))
        .await
        .unwrap();
    assert_eq!(queue.claim_next().await.unwrap().unwrap().id, ready);
    assert!(queue.claim_next().await.unwrap().is_none());
    assert_eq!(queue.get(later).await.unwrap().status, TaskStatus::Pending);

    let soon = queue
        .enqueue(
            NewTask::new("short timer")
                .run_at(UniversalTimestamp::now().plus(Duration::from_millis(200))),
        )
        .await
        .unwrap();
    assert!(queue.claim_next().await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(queue.claim_next().await.unwrap().unwrap().id, soon);
}

/// Delays far beyond year 9999 clamp to the last storable instant, so the task
/// stays pending and the rest of the queue keeps working.
#[tokio::test]
async fn test_far_future_run_at_stays_pending() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    let far = queue
        .enqueue(
            NewTask::new("far future")
                .run_at(UniversalTimestamp::now().plus(Duration::from_secs(3_000_000 * 86_400))),
        )
        .await
        .unwrap();

    assert!(queue.claim_next().await.unwrap().is_none());
    let stored = queue.get(far).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Pending);
    assert_eq!(
        stored.run_at.unwrap().to_storage(),
        "9999-12-31T23:59:59.999999Z"
    );

    let beyond = UniversalTimestamp(
        chrono::Utc
            .with_ymd_and_hms(10240, 7, 6, 10, 0, 0)
            .unwrap(),
    );
    let err = queue
        .enqueue(NewTask::new("unrepresentable").run_at(beyond))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::InvalidTask(InvalidTaskError::RunAtOutOfRange(_))
    ));

    let ready = queue.enqueue(NewTask::new("check mail")).await.unwrap();
    assert_eq!(queue.claim_next().await.unwrap().unwrap().id, ready);
    assert_eq!(queue.list(None, 10).await.unwrap().len(), 2);
    assert_eq!(queue.stats().await.unwrap().pending, 1);
}

#[tokio::test]
async fn test_retry_budget_is_never_exceeded() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    let id = queue
        .enqueue(NewTask::new("flaky upstream").max_retries(2))
        .await
        .unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        let task = queue.claim_next().await.unwrap().expect("task should be ready");
        assert!(task.retry_count <= task.max_retries);
        outcomes.push(
            queue
                .fail(id, "connection reset", transient(), None)
                .await
                .unwrap(),
        );
    }

    assert_eq!(
        outcomes,
        vec![
            FailOutcome::Requeued { retry_count: 1 },
            FailOutcome::Requeued { retry_count: 2 },
            FailOutcome::Failed,
        ]
    );

    let task = queue.get(id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_count, 2);
    assert_eq!(task.error.as_deref(), Some("connection reset"));
    assert!(task.completed_at.is_some());
    assert!(queue.claim_next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_auth_failure_is_terminal_immediately() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    let id = queue
        .enqueue(NewTask::new("read my inbox").max_retries(5))
        .await
        .unwrap();
    queue.claim_next().await.unwrap().unwrap();

    let outcome = queue
        .fail(
            id,
            "401 invalid api key",
            Classification::of(FailureCategory::Auth),
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome, FailOutcome::Failed);

    let task = queue.get(id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_count, 0);
}

#[tokio::test]
async fn test_requeue_honours_backoff_run_at() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    let id = queue.enqueue(NewTask::new("rate limited")).await.unwrap();
    queue.claim_next().await.unwrap().unwrap();

    let retry_at = UniversalTimestamp::now().plus(Duration::from_secs(600));
    queue
        .fail(
            id,
            "429",
            Classification::of(FailureCategory::RateLimited),
            Some(retry_at),
        )
        .await
        .unwrap();

    let task = queue.get(id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(
        task.run_at.map(|t| t.to_storage()),
        Some(retry_at.to_storage())
    );
    assert!(task.started_at.is_none());
    assert!(queue.claim_next().await.unwrap().is_none());
}

#[tokio::test]
#[traced_test]
async fn test_completion_is_idempotent() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    let id = queue.enqueue(NewTask::new("write haiku")).await.unwrap();
    queue.claim_next().await.unwrap().unwrap();

    let result = json!({"agent": "creative", "output": "autumn moonlight"});
    assert!(queue.complete(id, &result).await.unwrap());
    let first = queue.get(id).await.unwrap();

    assert!(!queue
        .complete(id, &json!({"output": "something else"}))
        .await
        .unwrap());
    let second = queue.get(id).await.unwrap();

    assert_eq!(second.status, TaskStatus::Completed);
    assert_eq!(second.result, Some(result));
    assert_eq!(second.completed_at, first.completed_at);
    assert!(logs_contain("Ignoring completion for task that is not in_progress"));

    // Failing a finished task is ignored as well.
    let outcome = queue.fail(id, "late", transient(), None).await.unwrap();
    assert_eq!(outcome, FailOutcome::Ignored);
    assert_eq!(queue.get(id).await.unwrap().status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_completion_clears_previous_error() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    let id = queue.enqueue(NewTask::new("fetch weather")).await.unwrap();
    queue.claim_next().await.unwrap().unwrap();
    queue.fail(id, "timeout", transient(), None).await.unwrap();
    queue.claim_next().await.unwrap().unwrap();
    queue.complete(id, &json!("sunny")).await.unwrap();

    let task = queue.get(id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.retry_count, 1);
    assert!(task.error.is_none());
}

/// enqueue -> claim -> transient failure -> requeue -> claim -> transient
/// failure -> terminal.
#[tokio::test]
async fn test_summarize_log_scenario() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    let id = queue
        .enqueue(
            NewTask::new("summarize log")
                .priority(Priority::High)
                .max_retries(1),
        )
        .await
        .unwrap();

    let task = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(task.id, id);
    assert_eq!(task.status, TaskStatus::InProgress);
    assert!(task.started_at.is_some());

    let outcome = queue.fail(id, "503 upstream", transient(), None).await.unwrap();
    assert_eq!(outcome, FailOutcome::Requeued { retry_count: 1 });
    let task = queue.get(id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.retry_count, 1);

    let task = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(task.id, id);

    let outcome = queue.fail(id, "503 upstream", transient(), None).await.unwrap();
    assert_eq!(outcome, FailOutcome::Failed);
    let task = queue.get(id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_count, 1);
}

#[tokio::test]
async fn test_invalid_tasks_are_not_persisted() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    let err = queue.enqueue(NewTask::new("   ")).await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::InvalidTask(InvalidTaskError::EmptyDescription)
    ));

    let err = queue
        .enqueue(NewTask::new("x".repeat(40 * 1024)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::InvalidTask(InvalidTaskError::DescriptionTooLong { .. })
    ));

    let err = queue
        .enqueue(NewTask::new("retry forever").max_retries(1000))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::InvalidTask(InvalidTaskError::RetryBudgetTooLarge { .. })
    ));

    assert_eq!(queue.stats().await.unwrap().total(), 0);
}

#[tokio::test]
async fn test_task_round_trips_through_storage() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    let run_at = UniversalTimestamp::from_rfc3339("2020-05-01T12:00:00.123456Z").unwrap();
    let id = queue
        .enqueue(
            NewTask::new("analyse sales.csv")
                .priority(Priority::High)
                .target_agent(timus::AgentKind::Data)
                .run_at(run_at)
                .max_retries(4)
                .with_meta("source", "scheduler")
                .with_meta("attempt_budget", 4),
        )
        .await
        .unwrap();

    let task = queue.get(id).await.unwrap();
    assert_eq!(task.description, "analyse sales.csv");
    assert_eq!(task.priority, Priority::High);
    assert_eq!(task.target_agent, Some(timus::AgentKind::Data));
    assert_eq!(task.run_at, Some(run_at));
    assert_eq!(task.max_retries, 4);
    assert_eq!(task.metadata["source"], json!("scheduler"));
    assert_eq!(task.metadata["attempt_budget"], json!(4));

    let missing = timus::UniversalUuid::new_v4();
    assert!(matches!(
        queue.get(missing).await,
        Err(QueueError::NotFound(id)) if id == missing
    ));
}

#[tokio::test]
async fn test_list_and_stats() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    for i in 0..3 {
        queue
            .enqueue(NewTask::new(format!("task {}", i)))
            .await
            .unwrap();
    }
    let urgent = queue
        .enqueue(NewTask::new("urgent").priority(Priority::Critical))
        .await
        .unwrap();

    let claimed = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(claimed.id, urgent);
    queue.complete(urgent, &json!("done")).await.unwrap();

    let all = queue.list(None, 10).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].id, urgent);

    let pending = queue.list(Some(TaskStatus::Pending), 2).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|t| t.status == TaskStatus::Pending));

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.pending, 3);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.total(), 4);
}
