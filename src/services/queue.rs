use loco_rs::app::AppContext;
use loco_rs::worker::AppWorker;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::VoucherSettings;
use crate::errors::ClaimError;
use crate::models::voucher_claim::{ClaimJob, ClaimResult};
use crate::services::kv::KvStore;
use crate::workers::claim::ClaimWorker;

pub const QUEUE_NAME: &str = "claims";

const STATS_KEY: &str = "queue:stats";
const COMPLETED_INDEX: &str = "queue:index:completed";
const FAILED_INDEX: &str = "queue:index:failed";

fn job_key(request_id: &str) -> String {
    format!("queue:job:{}", request_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "queued" => Some(Self::Queued),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    pub user_id: Option<Uuid>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ClaimResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
}

impl JobStatus {
    /// Job records are scoped to their owner; lookups by other callers treat
    /// the job as absent.
    pub fn owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == Some(user_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueCounts {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
    pub delayed: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    Duplicate,
}

/// Durable FIFO of claim jobs. Delivery rides the sidekiq queue; job identity,
/// dedup and per-job state live in KV hashes keyed by request id.
pub struct ClaimQueue {
    kv: KvStore,
    pub max_attempts: u32,
    success_retention_secs: u64,
    failed_retention_secs: u64,
    success_retention_entries: usize,
    failed_retention_entries: usize,
}

impl ClaimQueue {
    pub fn new(kv: KvStore, settings: &VoucherSettings) -> Self {
        Self {
            kv,
            max_attempts: settings.queue_max_attempts,
            success_retention_secs: settings.queue_success_retention_secs,
            failed_retention_secs: settings.queue_failed_retention_secs,
            success_retention_entries: settings.queue_success_retention_entries,
            failed_retention_entries: settings.queue_failed_retention_entries,
        }
    }

    /// Enqueue a claim job. The job id is the request id; a second enqueue
    /// with the same id is dropped silently, which is what makes client
    /// retries safe on the queued path.
    pub async fn enqueue(
        &self,
        ctx: &AppContext,
        job: &ClaimJob,
    ) -> Result<EnqueueOutcome, ClaimError> {
        let key = job_key(&job.request_id);
        let fresh = self
            .kv
            .hset_nx(&key, "state", JobState::Queued.as_str())
            .await?;
        if !fresh {
            tracing::debug!(request_id = %job.request_id, "duplicate claim job ignored");
            return Ok(EnqueueOutcome::Duplicate);
        }

        let payload = serde_json::to_string(job)
            .map_err(|e| ClaimError::Internal(anyhow::Error::new(e)))?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(&key, "payload", payload.as_str())
            .hset(&key, "user_id", job.user_id.to_string().as_str())
            .hset(
                &key,
                "enqueued_at",
                chrono::Utc::now().timestamp().to_string().as_str(),
            )
            .expire(&key, self.failed_retention_secs as i64);
        let _: redis::Value = self.kv.pipeline(&pipe).await?;

        ClaimWorker::perform_later(ctx, job.clone())
            .await
            .map_err(|e| ClaimError::Internal(anyhow::Error::new(e)))?;

        tracing::info!(request_id = %job.request_id, user_id = %job.user_id, "claim job enqueued");
        Ok(EnqueueOutcome::Enqueued)
    }

    pub async fn get(&self, request_id: &str) -> Result<Option<JobStatus>, ClaimError> {
        let fields = self.kv.hgetall(&job_key(request_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let state = fields
            .get("state")
            .and_then(|raw| JobState::parse(raw))
            .unwrap_or(JobState::Queued);
        let attempts = fields
            .get("attempts")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        let user_id = fields
            .get("user_id")
            .and_then(|raw| Uuid::parse_str(raw).ok());
        let result = fields
            .get("result")
            .and_then(|raw| serde_json::from_str(raw).ok());
        let fail_reason = fields.get("fail_reason").cloned();
        Ok(Some(JobStatus {
            state,
            user_id,
            attempts,
            result,
            fail_reason,
        }))
    }

    /// Called by the worker when it picks the job up; returns the attempt
    /// number, starting at 1.
    pub async fn begin_attempt(&self, request_id: &str) -> Result<u32, ClaimError> {
        let key = job_key(request_id);
        let attempts = self.kv.hincr(&key, "attempts", 1).await?;
        if attempts == 1 {
            self.kv.hincr(STATS_KEY, "active", 1).await?;
        }
        self.kv.hset(&key, "state", JobState::Active.as_str()).await?;
        Ok(attempts as u32)
    }

    pub async fn mark_completed(
        &self,
        request_id: &str,
        result: &ClaimResult,
    ) -> Result<(), ClaimError> {
        let key = job_key(request_id);
        let raw = serde_json::to_string(result)
            .map_err(|e| ClaimError::Internal(anyhow::Error::new(e)))?;
        let now = chrono::Utc::now().timestamp();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(&key, "state", JobState::Completed.as_str())
            .hset(&key, "result", raw.as_str())
            .expire(&key, self.success_retention_secs as i64)
            .hincr(STATS_KEY, "completed", 1)
            .hincr(STATS_KEY, "active", -1)
            .zadd(COMPLETED_INDEX, request_id, now);
        let _: redis::Value = self.kv.pipeline(&pipe).await?;
        self.trim(COMPLETED_INDEX, self.success_retention_entries)
            .await
    }

    pub async fn mark_failed(&self, request_id: &str, reason: &str) -> Result<(), ClaimError> {
        let key = job_key(request_id);
        let now = chrono::Utc::now().timestamp();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(&key, "state", JobState::Failed.as_str())
            .hset(&key, "fail_reason", reason)
            .expire(&key, self.failed_retention_secs as i64)
            .hincr(STATS_KEY, "failed", 1)
            .hincr(STATS_KEY, "active", -1)
            .zadd(FAILED_INDEX, request_id, now);
        let _: redis::Value = self.kv.pipeline(&pipe).await?;
        self.trim(FAILED_INDEX, self.failed_retention_entries).await
    }

    /// Entry-count retention: drop the oldest job records beyond the cap.
    /// Time-based retention rides the per-key TTLs.
    async fn trim(&self, index: &str, cap: usize) -> Result<(), ClaimError> {
        let total = self.kv.zcard(index).await?;
        let excess = total - cap as i64;
        if excess <= 0 {
            return Ok(());
        }
        let victims = self.kv.zrange(index, 0, (excess - 1) as isize).await?;
        let keys: Vec<String> = victims.iter().map(|rid| job_key(rid)).collect();
        self.kv.del_many(&keys).await?;
        self.kv.zremrangebyrank(index, 0, (excess - 1) as isize).await?;
        Ok(())
    }

    pub async fn counts(&self) -> Result<QueueCounts, ClaimError> {
        let waiting = self.kv.llen(&format!("queue:{}", QUEUE_NAME)).await?;
        let delayed =
            self.kv.zcard("retry").await? + self.kv.zcard("schedule").await?;
        let stats = self.kv.hgetall(STATS_KEY).await?;
        let read = |field: &str| -> i64 {
            stats
                .get(field)
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(0)
        };
        Ok(QueueCounts {
            waiting,
            active: read("active").max(0),
            completed: read("completed"),
            failed: read("failed"),
            delayed,
        })
    }
}
