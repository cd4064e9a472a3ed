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

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use timus::agent::ExecutorRegistry;
use timus::dispatcher::LogNotifier;
use timus::{
    AgentCatalog, AgentExecutor, AgentFailure, AgentKind, DispatchConfig, FailoverDispatcher,
    NewTask, Runner, RunnerConfig, TaskStatus, TickOutcome, UniversalTimestamp,
};
use timus::loop_guard::Action;

use crate::fixtures::{test_queue, ScriptedExecutor, TestQueue};

fn dispatcher(executor: Arc<dyn AgentExecutor>) -> FailoverDispatcher {
    FailoverDispatcher::new(
        Arc::new(AgentCatalog::default()),
        ExecutorRegistry::new().with_default(executor),
        Arc::new(LogNotifier),
        DispatchConfig::builder()
            .base_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
            .build(),
    )
}

fn runner(fixture: &TestQueue, executor: Arc<dyn AgentExecutor>) -> Runner {
    let config = RunnerConfig::builder()
        .heartbeat_interval(Duration::from_secs(60))
        .retry_base_delay(Duration::from_secs(30))
        .build();
    Runner::new(fixture.queue.clone(), dispatcher(executor), config)
}

#[tokio::test]
async fn test_tick_on_empty_queue_is_idle() {
    let fixture = test_queue().await;
    let runner = runner(&fixture, ScriptedExecutor::succeeding("unused"));

    assert_eq!(runner.tick().await, TickOutcome::Idle);
}

#[tokio::test]
async fn test_tick_completes_task_with_result_payload() {
    let fixture = test_queue().await;
    let executor = ScriptedExecutor::succeeding("Refactored into three functions.");
    let runner = runner(&fixture, executor.clone());

    let id = fixture
        .queue
        .enqueue(NewTask::new("refactor this python script"))
        .await
        .unwrap();

    assert_eq!(runner.tick().await, TickOutcome::Completed(id));
    assert_eq!(executor.calls(), 1);

    let task = fixture.queue.get(id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    let result = task.result.expect("completed task should carry a result");
    assert_eq!(result["agent"], "developer");
    assert_eq!(result["output"], "Refactored into three functions.");
    assert_eq!(result["agents_attempted"], serde_json::json!(["developer"]));
    assert_eq!(result["loop_guard"]["looping"], false);
}

#[tokio::test]
async fn test_tick_fails_task_on_auth_error() {
    let fixture = test_queue().await;
    let executor = ScriptedExecutor::failing(AgentFailure::Auth("invalid api key".into()));
    let runner = runner(&fixture, executor.clone());

    let id = fixture
        .queue
        .enqueue(NewTask::new("check my email").max_retries(3))
        .await
        .unwrap();

    assert_eq!(runner.tick().await, TickOutcome::Failed(id));
    // Auth is neither retried nor failed over.
    assert_eq!(executor.calls(), 1);

    let task = fixture.queue.get(id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_count, 0);

    let error: Value = serde_json::from_str(task.error.as_deref().unwrap()).unwrap();
    assert_eq!(error["category"], "auth");
    assert_eq!(error["agents_attempted"], serde_json::json!(["communication"]));
}

#[tokio::test]
async fn test_failed_task_records_loop_flag() {
    let fixture = test_queue().await;
    let executor = ScriptedExecutor::new(|_, run| {
        for _ in 0..5 {
            run.record(Action::spatial("click", 640.0, 360.0));
        }
        Err(AgentFailure::Auth("revoked".into()))
    });
    let runner = runner(&fixture, executor);

    let id = fixture
        .queue
        .enqueue(NewTask::new("click through the settings page").target_agent(AgentKind::Visual))
        .await
        .unwrap();

    assert_eq!(runner.tick().await, TickOutcome::Failed(id));

    let task = fixture.queue.get(id).await.unwrap();
    let error: Value = serde_json::from_str(task.error.as_deref().unwrap()).unwrap();
    assert_eq!(error["category"], "auth");
    assert_eq!(error["loop_guard"]["looping"], true);
    assert_eq!(error["loop_guard"]["runs"][0]["agent"], "visual");
}

#[tokio::test]
async fn test_tick_requeues_retriable_failure_with_backoff() {
    let fixture = test_queue().await;
    let executor = ScriptedExecutor::failing(AgentFailure::Network("connection reset".into()));
    let runner = runner(&fixture, executor);

    let id = fixture
        .queue
        .enqueue(
            NewTask::new("ping the status page")
                .target_agent(AgentKind::Shell)
                .max_retries(2),
        )
        .await
        .unwrap();

    let before = UniversalTimestamp::now();
    assert_eq!(runner.tick().await, TickOutcome::Requeued(id));

    let task = fixture.queue.get(id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.retry_count, 1);
    let run_at = task.run_at.expect("requeued task should be delayed");
    assert!(run_at.0 >= before.0 + chrono::Duration::seconds(29));

    // Not ready until the backoff elapses.
    assert_eq!(runner.tick().await, TickOutcome::Idle);
}

#[tokio::test]
async fn test_run_recovers_then_processes_until_shutdown() {
    let fixture = test_queue().await;

    let stale = fixture
        .queue
        .enqueue(NewTask::new("interrupted by a crash"))
        .await
        .unwrap();
    fixture.queue.claim_next().await.unwrap().unwrap();
    fixture
        .backdate_start(stale, Duration::from_secs(2 * 3600))
        .await;

    let runner = runner(&fixture, ScriptedExecutor::succeeding("done"));
    let handle = runner.handle();
    let join = tokio::spawn(async move { runner.run().await });

    wait_for_status(&fixture, stale, TaskStatus::Completed).await;
    let task = fixture.queue.get(stale).await.unwrap();
    assert_eq!(task.retry_count, 1);

    // A trigger wakes the runner long before its heartbeat.
    let id = fixture
        .queue
        .enqueue(NewTask::new("new arrival"))
        .await
        .unwrap();
    handle.trigger();
    wait_for_status(&fixture, id, TaskStatus::Completed).await;

    handle.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), join)
        .await
        .expect("runner did not stop")
        .expect("runner panicked");
    assert!(result.is_ok());
}

async fn wait_for_status(fixture: &TestQueue, id: timus::UniversalUuid, status: TaskStatus) {
    for _ in 0..100 {
        if fixture.queue.get(id).await.unwrap().status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {} never reached {}", id, status);
}
