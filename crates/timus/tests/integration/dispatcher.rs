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

use std::sync::{Arc, Mutex};
use std::time::Duration;
use timus::agent::ExecutorRegistry;
use timus::dispatcher::{FailureNotice, LogNotifier};
use timus::error::NotifyError;
use timus::{
    AgentCatalog, AgentFailure, AgentKind, DispatchConfig, DispatchOutcome, FailoverDispatcher,
    FailureCategory, NewTask, Notifier,
};

use crate::fixtures::{test_queue, ScriptedExecutor};

#[derive(Default)]
struct CollectingNotifier {
    notices: Mutex<Vec<FailureNotice>>,
}

#[async_trait::async_trait]
impl Notifier for CollectingNotifier {
    async fn notify_failure(&self, notice: &FailureNotice) -> Result<(), NotifyError> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

fn fast_config() -> DispatchConfig {
    DispatchConfig::builder()
        .base_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .build()
}

fn timeout() -> AgentFailure {
    AgentFailure::Timeout {
        after: Duration::from_secs(60),
    }
}

/// research -> reasoning -> executor, with the first two always timing out.
#[tokio::test]
async fn test_failover_walks_the_chain_for_a_claimed_task() {
    let fixture = test_queue().await;
    let id = fixture
        .queue
        .enqueue(NewTask::new("compare three laptops").target_agent(AgentKind::Research))
        .await
        .unwrap();
    let task = fixture.queue.claim_next().await.unwrap().unwrap();
    assert_eq!(task.id, id);

    let research = ScriptedExecutor::failing(timeout());
    let reasoning = ScriptedExecutor::failing(timeout());
    let executor = ScriptedExecutor::succeeding("Laptop B is the best value.");

    let dispatcher = FailoverDispatcher::new(
        Arc::new(AgentCatalog::default()),
        ExecutorRegistry::new()
            .register(AgentKind::Research, research.clone())
            .register(AgentKind::Reasoning, reasoning.clone())
            .register(AgentKind::Executor, executor.clone()),
        Arc::new(LogNotifier),
        fast_config(),
    );

    let success = match dispatcher.dispatch(&task).await {
        DispatchOutcome::Completed(success) => success,
        DispatchOutcome::Failed(failure) => panic!("dispatch failed: {:?}", failure),
    };

    assert_eq!(success.agent, AgentKind::Executor);
    assert_eq!(
        success.agents_attempted(),
        vec![AgentKind::Research, AgentKind::Reasoning, AgentKind::Executor]
    );
    assert_eq!(research.calls(), 3);
    assert_eq!(reasoning.calls(), 3);
    assert_eq!(executor.calls(), 1);

    assert!(fixture
        .queue
        .complete(task.id, &success.result_payload())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_total_failure_notifies_operator_once() {
    let fixture = test_queue().await;
    fixture
        .queue
        .enqueue(NewTask::new("generate a logo").target_agent(AgentKind::Visual))
        .await
        .unwrap();
    let task = fixture.queue.claim_next().await.unwrap().unwrap();

    let notifier = Arc::new(CollectingNotifier::default());
    let dispatcher = FailoverDispatcher::new(
        Arc::new(AgentCatalog::default()),
        ExecutorRegistry::new().with_default(ScriptedExecutor::failing(
            AgentFailure::ContentRejected("blocked by safety filter".into()),
        )),
        notifier.clone(),
        fast_config(),
    );

    let failure = match dispatcher.dispatch(&task).await {
        DispatchOutcome::Failed(failure) => failure,
        DispatchOutcome::Completed(success) => panic!("unexpected success: {:?}", success),
    };

    assert_eq!(
        failure.classification.category,
        FailureCategory::ContentRejected
    );
    assert!(!failure.classification.retriable);
    // Content rejections stop the chain at the first agent.
    assert_eq!(failure.agents_attempted, vec![AgentKind::Visual]);

    let notices = notifier.notices.lock().unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].task_id, task.id);
    assert_eq!(notices[0].agents_attempted, vec![AgentKind::Visual]);
}
