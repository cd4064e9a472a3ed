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

use serde_json::json;
use std::time::Duration;
use timus::{Classification, FailureCategory, NewTask, QueueError};

use crate::fixtures::test_queue;

const DAY: Duration = Duration::from_secs(24 * 3600);

#[tokio::test]
async fn test_purge_removes_only_old_finished_tasks() {
    let fixture = test_queue().await;
    let queue = &fixture.queue;

    let old_completed = queue.enqueue(NewTask::new("old report")).await.unwrap();
    let old_failed = queue.enqueue(NewTask::new("old failure")).await.unwrap();
    let recent = queue.enqueue(NewTask::new("recent report")).await.unwrap();

    queue.claim_next().await.unwrap().unwrap();
    queue.complete(old_completed, &json!("ok")).await.unwrap();
    queue.claim_next().await.unwrap().unwrap();
    queue
        .fail(
            old_failed,
            "bad key",
            Classification::of(FailureCategory::Auth),
            None,
        )
        .await
        .unwrap();
    queue.claim_next().await.unwrap().unwrap();
    queue.complete(recent, &json!("ok")).await.unwrap();

    fixture.backdate_completion(old_completed, 40 * DAY).await;
    fixture.backdate_completion(old_failed, 31 * DAY).await;

    let pending = queue.enqueue(NewTask::new("queued")).await.unwrap();

    let would_delete = queue.purge_finished(30 * DAY, true).await.unwrap();
    assert_eq!(would_delete, 2);
    assert_eq!(queue.stats().await.unwrap().total(), 4);

    let deleted = queue.purge_finished(30 * DAY, false).await.unwrap();
    assert_eq!(deleted, 2);

    assert!(matches!(
        queue.get(old_completed).await,
        Err(QueueError::NotFound(_))
    ));
    assert!(matches!(
        queue.get(old_failed).await,
        Err(QueueError::NotFound(_))
    ));
    assert!(queue.get(recent).await.is_ok());
    assert!(queue.get(pending).await.is_ok());

    assert_eq!(queue.purge_finished(30 * DAY, false).await.unwrap(), 0);
}
