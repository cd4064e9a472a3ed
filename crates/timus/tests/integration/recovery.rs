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

use std::time::Duration;
use timus::queue::RECOVERED_TASK_ERROR;
use timus::{NewTask, TaskStatus};

use crate::fixtures::test_queue;

#[tokio::test]
async fn test_stale_claims_are_requeued_or_failed() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    let with_budget = queue
        .enqueue(NewTask::new("nightly backup check").max_retries(2))
        .await
        .unwrap();
    let out_of_budget = queue
        .enqueue(NewTask::new("one-shot upload").max_retries(0))
        .await
        .unwrap();
    let fresh = queue.enqueue(NewTask::new("still running")).await.unwrap();
    let untouched = queue.enqueue(NewTask::new("not claimed")).await.unwrap();

    for _ in 0..3 {
        queue.claim_next().await.unwrap().unwrap();
    }
    fixture
        .backdate_start(with_budget, Duration::from_secs(2 * 3600))
        .await;
    fixture
        .backdate_start(out_of_budget, Duration::from_secs(2 * 3600))
        .await;

    let report = queue
        .recover_stale(Duration::from_secs(30 * 60))
        .await
        .unwrap();
    assert_eq!(report.requeued, vec![with_budget]);
    assert_eq!(report.abandoned, vec![out_of_budget]);

    let task = queue.get(with_budget).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.retry_count, 1);
    assert!(task.started_at.is_none());
    assert_eq!(task.error.as_deref(), Some(RECOVERED_TASK_ERROR));

    let task = queue.get(out_of_budget).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_count, 0);
    assert!(task.completed_at.is_some());
    assert_eq!(task.error.as_deref(), Some(RECOVERED_TASK_ERROR));

    assert_eq!(
        queue.get(fresh).await.unwrap().status,
        TaskStatus::InProgress
    );
    assert_eq!(queue.get(untouched).await.unwrap().status, TaskStatus::Pending);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.in_progress, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_recovery_with_nothing_stale_is_a_no_op() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    queue.enqueue(NewTask::new("fresh claim")).await.unwrap();
    queue.claim_next().await.unwrap().unwrap();

    let report = queue
        .recover_stale(Duration::from_secs(30 * 60))
        .await
        .unwrap();
    assert!(report.is_empty());
    assert_eq!(queue.stats().await.unwrap().in_progress, 1);
}

#[tokio::test]
async fn test_repeated_recovery_respects_retry_budget() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    let id = queue
        .enqueue(NewTask::new("crashes the runner").max_retries(1))
        .await
        .unwrap();

    for expected in [TaskStatus::Pending, TaskStatus::Failed] {
        queue.claim_next().await.unwrap().unwrap();
        fixture.backdate_start(id, Duration::from_secs(3600)).await;
        queue
            .recover_stale(Duration::from_secs(60))
            .await
            .unwrap();

        let task = queue.get(id).await.unwrap();
        assert_eq!(task.status, expected);
        assert!(task.retry_count <= task.max_retries);
    }
}
