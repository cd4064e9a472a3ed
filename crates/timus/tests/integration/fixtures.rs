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

//! Shared setup: every test gets its own migrated SQLite file in a temp dir.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use timus::agent::AgentRequest;
use timus::database::schema::tasks;
use timus::dispatcher::AgentRun;
use timus::{
    AgentExecutor, AgentFailure, AgentOutput, Database, TaskQueue, UniversalTimestamp,
    UniversalUuid,
};

pub struct TestQueue {
    pub queue: TaskQueue,
    pub database: Database,
    _dir: TempDir,
}

impl TestQueue {
    /// Rewrites a task's `started_at`, simulating a claim made `ago` in the past.
    pub async fn backdate_start(&self, id: UniversalUuid, ago: Duration) {
        use diesel::prelude::*;

        let started_at = UniversalTimestamp::now().minus(ago).to_storage();
        let key = id.to_storage();
        let conn = self.database.get_connection().await.unwrap();
        conn.interact(move |conn| {
            diesel::update(tasks::table.find(key))
                .set(tasks::started_at.eq(Some(started_at)))
                .execute(conn)
        })
        .await
        .unwrap()
        .unwrap();
    }

    /// Rewrites a task's `completed_at`.
    pub async fn backdate_completion(&self, id: UniversalUuid, ago: Duration) {
        use diesel::prelude::*;

        let completed_at = UniversalTimestamp::now().minus(ago).to_storage();
        let key = id.to_storage();
        let conn = self.database.get_connection().await.unwrap();
        conn.interact(move |conn| {
            diesel::update(tasks::table.find(key))
                .set(tasks::completed_at.eq(Some(completed_at)))
                .execute(conn)
        })
        .await
        .unwrap()
        .unwrap();
    }
}

pub async fn test_queue() -> TestQueue {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("timus-test.db");
    let url = path.to_str().expect("temp path is not UTF-8");
    let database = Database::try_new(url).expect("Failed to open database");
    database
        .run_migrations()
        .await
        .expect("Failed to run migrations");

    TestQueue {
        queue: TaskQueue::new(database.clone()),
        database,
        _dir: dir,
    }
}

type Handler = dyn Fn(&AgentRequest, &mut AgentRun) -> Result<AgentOutput, AgentFailure>
    + Send
    + Sync;

/// Executor driven by a closure. Counts its calls.
pub struct ScriptedExecutor {
    handler: Box<Handler>,
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new(
        handler: impl Fn(&AgentRequest, &mut AgentRun) -> Result<AgentOutput, AgentFailure>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn succeeding(output: &'static str) -> Arc<Self> {
        Self::new(move |_, _| Ok(AgentOutput::from(output)))
    }

    pub fn failing(failure: AgentFailure) -> Arc<Self> {
        Self::new(move |_, _| Err(failure.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        request: &AgentRequest,
        run: &mut AgentRun,
    ) -> Result<AgentOutput, AgentFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.handler)(request, run)
    }
}
