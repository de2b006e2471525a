//! Job queue and admission controller.
//!
//! All bookkeeping (waiting order, per-operator counters, held accounts)
//! lives behind one mutex, so admission decisions are made atomically.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tubeferry_core::config::queue::QueueConfig;
use tubeferry_core::error::AppError;
use tubeferry_core::result::AppResult;
use tubeferry_core::types::{AccountId, JobId, JobOutcome, JobState, OperatorId};
use tubeferry_entity::job::{JobRecord, JobView};

/// A job handed to a worker.
#[derive(Debug, Clone)]
pub struct Admission {
    /// The admitted job.
    pub job_id: JobId,
    /// Snapshot of the job's record at admission time.
    pub record: JobRecord,
    /// Cancelled when the operator cancels the job or the pipeline stops.
    pub cancel: CancellationToken,
}

/// What a cancel request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was still waiting and is now canceled.
    Dequeued {
        /// State before cancellation.
        from: JobState,
    },
    /// The job is running; its worker will stop at the next checkpoint.
    Signalled,
}

/// Queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs waiting for a slot.
    pub waiting: usize,
    /// Jobs holding a slot.
    pub active: usize,
    /// Accounts whose jobs are held after revocation.
    pub held_accounts: usize,
}

#[derive(Debug)]
struct Entry {
    record: JobRecord,
    seq: u64,
    cancel: Option<CancellationToken>,
    cancel_requested: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: HashMap<JobId, Entry>,
    /// Waiting jobs in submission order.
    waiting: BTreeMap<u64, JobId>,
    active: usize,
    active_by_operator: HashMap<OperatorId, usize>,
    held_accounts: HashSet<AccountId>,
    next_seq: u64,
    closed: bool,
}

/// FIFO admission with a global cap N and a per-operator cap M.
#[derive(Debug)]
pub struct AdmissionQueue {
    state: Mutex<QueueState>,
    global: usize,
    per_operator: usize,
    /// Parent of every job's cancellation token.
    parent: CancellationToken,
    /// Signalled whenever a job record changes.
    changed: Notify,
}

impl AdmissionQueue {
    /// Create an empty queue.
    pub fn new(config: &QueueConfig, parent: CancellationToken) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            global: config.global_concurrency.max(1),
            per_operator: config.per_operator_concurrency.max(1),
            parent,
            changed: Notify::new(),
        }
    }

    /// Append a pending job behind every job already waiting.
    pub async fn enqueue(&self, record: JobRecord) -> AppResult<JobId> {
        let job_id = record.job.id;
        if record.job.state != JobState::Pending {
            return Err(AppError::internal(format!(
                "job {job_id} is {} and cannot be queued",
                record.job.state
            )));
        }
        let mut state = self.state.lock().await;
        if state.entries.contains_key(&job_id) {
            return Err(AppError::conflict(format!("job {job_id} is already queued")));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.waiting.insert(seq, job_id);
        state.entries.insert(
            job_id,
            Entry {
                record,
                seq,
                cancel: None,
                cancel_requested: false,
            },
        );
        debug!(job_id = %job_id, position = state.waiting.len(), "Job queued");
        drop(state);
        self.changed.notify_waiters();
        Ok(job_id)
    }

    /// Take the oldest waiting job that fits under both caps, if any.
    ///
    /// Operators at their cap and accounts that are held are skipped, so a
    /// long bulk batch from one operator cannot starve the others.
    pub async fn admit(&self) -> Option<Admission> {
        let mut state = self.state.lock().await;
        if state.closed || state.active >= self.global {
            return None;
        }

        let (seq, job_id) = state
            .waiting
            .iter()
            .find(|(_, id)| {
                state.entries.get(id).is_some_and(|entry| {
                    let job = &entry.record.job;
                    let running = state
                        .active_by_operator
                        .get(&job.operator_id)
                        .copied()
                        .unwrap_or(0);
                    running < self.per_operator && !state.held_accounts.contains(&job.account_id)
                })
            })
            .map(|(seq, id)| (*seq, *id))?;

        state.waiting.remove(&seq);
        let QueueState {
            entries,
            active,
            active_by_operator,
            ..
        } = &mut *state;
        let entry = entries.get_mut(&job_id)?;
        let token = self.parent.child_token();
        entry.cancel = Some(token.clone());
        *active += 1;
        *active_by_operator
            .entry(entry.record.job.operator_id.clone())
            .or_insert(0) += 1;

        debug!(
            job_id = %job_id,
            operator_id = %entry.record.job.operator_id,
            active = *active,
            "Job admitted"
        );
        Some(Admission {
            job_id,
            record: entry.record.clone(),
            cancel: token,
        })
    }

    /// Return an admitted job's slot.
    pub async fn release(&self, job_id: &JobId) {
        let mut state = self.state.lock().await;
        let QueueState {
            entries,
            active,
            active_by_operator,
            ..
        } = &mut *state;
        let Some(entry) = entries.get_mut(job_id) else {
            return;
        };
        if entry.cancel.take().is_none() {
            return;
        }
        *active = active.saturating_sub(1);
        if let Some(count) = active_by_operator.get_mut(&entry.record.job.operator_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                active_by_operator.remove(&entry.record.job.operator_id);
            }
        }
        drop(state);
        self.changed.notify_waiters();
    }

    /// Cancel a job.
    ///
    /// A waiting job is canceled on the spot without ever being admitted.
    /// A running job has its token cancelled and finishes on its worker.
    pub async fn cancel(&self, job_id: &JobId) -> AppResult<CancelOutcome> {
        let mut state = self.state.lock().await;
        let QueueState {
            entries, waiting, ..
        } = &mut *state;
        let entry = entries
            .get_mut(job_id)
            .ok_or_else(|| AppError::not_found(format!("job {job_id} not found")))?;

        if entry.record.job.state.is_terminal() {
            return Err(AppError::conflict(format!(
                "job {job_id} is already {}",
                entry.record.job.state
            )));
        }

        entry.cancel_requested = true;
        let outcome = match &entry.cancel {
            Some(token) => {
                token.cancel();
                CancelOutcome::Signalled
            }
            None => {
                waiting.remove(&entry.seq);
                let from = entry.record.job.finish(JobOutcome::Canceled)?;
                CancelOutcome::Dequeued { from }
            }
        };
        drop(state);
        self.changed.notify_waiters();
        Ok(outcome)
    }

    /// Whether the operator asked to cancel this job.
    pub async fn is_cancel_requested(&self, job_id: &JobId) -> bool {
        self.state
            .lock()
            .await
            .entries
            .get(job_id)
            .is_some_and(|e| e.cancel_requested)
    }

    /// Mutate a job's record under the queue lock.
    pub async fn update<R>(
        &self,
        job_id: &JobId,
        f: impl FnOnce(&mut JobRecord) -> R,
    ) -> AppResult<R> {
        let mut state = self.state.lock().await;
        let entry = state
            .entries
            .get_mut(job_id)
            .ok_or_else(|| AppError::not_found(format!("job {job_id} not found")))?;
        let result = f(&mut entry.record);
        drop(state);
        self.changed.notify_waiters();
        Ok(result)
    }

    /// Snapshot of a job's record.
    pub async fn record(&self, job_id: &JobId) -> Option<JobRecord> {
        self.state
            .lock()
            .await
            .entries
            .get(job_id)
            .map(|e| e.record.clone())
    }

    /// Status view of one job.
    pub async fn view(&self, job_id: &JobId) -> Option<JobView> {
        self.state
            .lock()
            .await
            .entries
            .get(job_id)
            .map(|e| JobView::from(&e.record.job))
    }

    /// Status views of every known job, in submission order.
    pub async fn views(&self) -> Vec<JobView> {
        let state = self.state.lock().await;
        let mut entries: Vec<&Entry> = state.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries
            .into_iter()
            .map(|e| JobView::from(&e.record.job))
            .collect()
    }

    /// Ids of jobs currently holding a slot.
    pub async fn active_ids(&self) -> Vec<JobId> {
        let state = self.state.lock().await;
        let mut active: Vec<(u64, JobId)> = state
            .entries
            .iter()
            .filter(|(_, e)| e.cancel.is_some())
            .map(|(id, e)| (e.seq, *id))
            .collect();
        active.sort();
        active.into_iter().map(|(_, id)| id).collect()
    }

    /// Ids of waiting jobs, oldest first.
    pub async fn waiting_ids(&self) -> Vec<JobId> {
        self.state.lock().await.waiting.values().copied().collect()
    }

    /// Stop dispatching the account's waiting jobs.
    pub async fn hold_account(&self, account_id: &AccountId) -> bool {
        self.state
            .lock()
            .await
            .held_accounts
            .insert(account_id.clone())
    }

    /// Resume dispatching the account's waiting jobs.
    pub async fn release_account(&self, account_id: &AccountId) -> bool {
        self.state.lock().await.held_accounts.remove(account_id)
    }

    /// Stop admitting jobs. Waiting jobs stay queued.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
    }

    /// Current counters.
    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            waiting: state.waiting.len(),
            active: state.active,
            held_accounts: state.held_accounts.len(),
        }
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait_terminal(&self, job_id: &JobId) -> AppResult<JobView> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let view = self
                .view(job_id)
                .await
                .ok_or_else(|| AppError::not_found(format!("job {job_id} not found")))?;
            if view.state.is_terminal() {
                return Ok(view);
            }
            notified.await;
        }
    }
}
