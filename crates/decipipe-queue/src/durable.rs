// crates/decipipe-queue/src/durable.rs
// ============================================================================
// Module: Durable File Queue
// Description: Append-only, crash-recoverable local QueueAdapter.
// Purpose: Stand in for a durable broker (Kafka/SQS-shaped) without taking
//          on an external service dependency; messages survive process
//          restarts until explicitly acknowledged.
// Dependencies: tokio (fs, io-util), parking_lot, decipipe-model
// ============================================================================

//! ## Overview
//! Pushes are appended as one JSON line each to a log file; acks are
//! appended as one id each to a companion `.acked` file. On construction,
//! [`DurableFileQueue::open`] replays both files: every logged message
//! whose id is not in the acked set is requeued. This gives at-least-once
//! delivery across restarts with a crash window of "flush before return":
//! a connection loss is simply retried on the next poll.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use decipipe_model::DecisionEvent;
use decipipe_model::EventEnvelope;
use decipipe_model::Run;
use decipipe_model::Step;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use tokio::fs::File;
use tokio::fs::OpenOptions;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::Mutex as AsyncMutex;

use crate::QueueAdapter;
use crate::QueueError;
use crate::QueueMessage;

#[derive(Serialize, Deserialize)]
struct LoggedMessage {
    message_id: String,
    envelope: EventEnvelope,
}

struct State {
    ready: VecDeque<QueueMessage>,
    in_flight: HashMap<String, QueueMessage>,
    next_id: u64,
}

/// Append-only, file-backed [`QueueAdapter`].
pub struct DurableFileQueue {
    state: Mutex<State>,
    log: AsyncMutex<File>,
    acked: AsyncMutex<File>,
}

impl DurableFileQueue {
    /// Opens (creating if absent) the queue's log files at `dir`, replaying
    /// any unacknowledged messages from a previous run.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Unreachable`] if the log files cannot be
    /// opened or read.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, QueueError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| QueueError::Unreachable(err.to_string()))?;
        let log_path = dir.join("queue.log.jsonl");
        let acked_path = dir.join("queue.acked.jsonl");

        let acked_ids = read_acked_ids(&acked_path).await?;
        let (ready, next_id) = replay_log(&log_path, &acked_ids).await?;

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
            .map_err(|err| QueueError::Unreachable(err.to_string()))?;
        let acked = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&acked_path)
            .await
            .map_err(|err| QueueError::Unreachable(err.to_string()))?;

        Ok(Self {
            state: Mutex::new(State {
                ready,
                in_flight: HashMap::new(),
                next_id,
            }),
            log: AsyncMutex::new(log),
            acked: AsyncMutex::new(acked),
        })
    }

    async fn enqueue(&self, envelope: EventEnvelope) -> Result<(), QueueError> {
        let message_id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            format!("durable-{id}")
        };
        let logged = LoggedMessage {
            message_id: message_id.clone(),
            envelope,
        };
        let mut line = serde_json::to_vec(&logged)
            .map_err(|err| QueueError::Rejected(err.to_string()))?;
        line.push(b'\n');
        {
            let mut log = self.log.lock().await;
            log.write_all(&line).await.map_err(|err| QueueError::Unreachable(err.to_string()))?;
            log.flush().await.map_err(|err| QueueError::Unreachable(err.to_string()))?;
        }
        self.state.lock().ready.push_back(QueueMessage {
            message_id,
            envelope: logged.envelope,
        });
        Ok(())
    }

    /// Number of messages neither delivered nor acknowledged, for tests and
    /// metrics.
    #[must_use]
    pub fn depth(&self) -> usize {
        let state = self.state.lock();
        state.ready.len() + state.in_flight.len()
    }
}

async fn read_acked_ids(path: &Path) -> Result<std::collections::HashSet<String>, QueueError> {
    let Ok(file) = File::open(path).await else {
        return Ok(std::collections::HashSet::new());
    };
    let mut lines = BufReader::new(file).lines();
    let mut ids = std::collections::HashSet::new();
    while let Some(line) = lines.next_line().await.map_err(|err| QueueError::Unreachable(err.to_string()))? {
        if !line.is_empty() {
            ids.insert(line);
        }
    }
    Ok(ids)
}

async fn replay_log(
    path: &Path,
    acked_ids: &std::collections::HashSet<String>,
) -> Result<(VecDeque<QueueMessage>, u64), QueueError> {
    let Ok(file) = File::open(path).await else {
        return Ok((VecDeque::new(), 0));
    };
    let mut lines = BufReader::new(file).lines();
    let mut ready = VecDeque::new();
    let mut max_seen: u64 = 0;
    while let Some(line) = lines.next_line().await.map_err(|err| QueueError::Unreachable(err.to_string()))? {
        if line.is_empty() {
            continue;
        }
        let logged: LoggedMessage =
            serde_json::from_str(&line).map_err(|err| QueueError::Unreachable(err.to_string()))?;
        if let Some(numeric) = logged.message_id.strip_prefix("durable-").and_then(|n| n.parse::<u64>().ok())
        {
            max_seen = max_seen.max(numeric + 1);
        }
        if !acked_ids.contains(&logged.message_id) {
            ready.push_back(QueueMessage {
                message_id: logged.message_id,
                envelope: logged.envelope,
            });
        }
    }
    Ok((ready, max_seen))
}

#[async_trait]
impl QueueAdapter for DurableFileQueue {
    async fn push_decision_event(&self, event: DecisionEvent) -> Result<(), QueueError> {
        self.enqueue(EventEnvelope::Decision(event)).await
    }

    async fn push_decision_events(&self, events: Vec<DecisionEvent>) -> Result<(), QueueError> {
        self.enqueue(EventEnvelope::Decisions(events)).await
    }

    async fn push_run(&self, run: Run) -> Result<(), QueueError> {
        self.enqueue(EventEnvelope::Run(Box::new(run))).await
    }

    async fn push_step(&self, step: Step) -> Result<(), QueueError> {
        self.enqueue(EventEnvelope::Step(Box::new(step))).await
    }

    async fn poll(&self, batch_size: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let mut state = self.state.lock();
        let mut batch = Vec::with_capacity(batch_size.min(state.ready.len()));
        while batch.len() < batch_size {
            let Some(message) = state.ready.pop_front() else {
                break;
            };
            state.in_flight.insert(message.message_id.clone(), message.clone());
            batch.push(message);
        }
        Ok(batch)
    }

    async fn ack(&self, message_id: &str) -> Result<(), QueueError> {
        let removed = self.state.lock().in_flight.remove(message_id);
        if removed.is_none() {
            return Err(QueueError::UnknownMessage(message_id.to_string()));
        }
        let mut line = message_id.as_bytes().to_vec();
        line.push(b'\n');
        let mut acked = self.acked.lock().await;
        acked.write_all(&line).await.map_err(|err| QueueError::Unreachable(err.to_string()))?;
        acked.flush().await.map_err(|err| QueueError::Unreachable(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::expect_used,
        clippy::unwrap_used,
        reason = "Test assertions use expect/unwrap for clarity."
    )]

    use decipipe_model::EventId;
    use decipipe_model::ItemId;
    use decipipe_model::Outcome;
    use decipipe_model::RunId;
    use decipipe_model::StepId;
    use decipipe_model::Timestamp;
    use serde_json::Value;
    use tempfile::tempdir;

    use super::*;

    fn sample_event() -> DecisionEvent {
        DecisionEvent {
            event_id: EventId::new("evt-1"),
            step_id: StepId::new("step-1"),
            run_id: RunId::new("run-1"),
            outcome: Outcome::Kept,
            item_id: ItemId::new("item-1"),
            input: Value::Null,
            output: None,
            reason: "kept".to_string(),
            score: None,
            metadata: None,
            timestamp: Timestamp::from_unix_millis(0),
        }
    }

    #[tokio::test]
    async fn unacked_messages_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let queue = DurableFileQueue::open(dir.path()).await.unwrap();
            queue.push_decision_event(sample_event()).await.unwrap();
            let batch = queue.poll(10).await.unwrap();
            assert_eq!(batch.len(), 1);
            // Deliberately not acked, simulating a crash before ack.
        }
        let reopened = DurableFileQueue::open(dir.path()).await.unwrap();
        assert_eq!(reopened.depth(), 1);
        let batch = reopened.poll(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        reopened.ack(&batch[0].message_id).await.unwrap();
        assert_eq!(reopened.depth(), 0);
    }

    #[tokio::test]
    async fn acked_messages_do_not_reappear_after_reopen() {
        let dir = tempdir().unwrap();
        let first_id = {
            let queue = DurableFileQueue::open(dir.path()).await.unwrap();
            queue.push_decision_event(sample_event()).await.unwrap();
            let batch = queue.poll(10).await.unwrap();
            queue.ack(&batch[0].message_id).await.unwrap();
            batch[0].message_id.clone()
        };
        let reopened = DurableFileQueue::open(dir.path()).await.unwrap();
        assert_eq!(reopened.depth(), 0);
        queue_id_is_unknown_on_ack(&reopened, &first_id).await;
    }

    async fn queue_id_is_unknown_on_ack(queue: &DurableFileQueue, id: &str) {
        assert!(matches!(queue.ack(id).await, Err(QueueError::UnknownMessage(_))));
    }
}
