use std::time::Duration;

use async_trait::async_trait;
use loco_rs::prelude::*;
use loco_rs::worker::{AppWorker, Worker};

use crate::models::voucher_claim::ClaimJob;
use crate::services::claim_service::ClaimService;
use crate::services::queue::QUEUE_NAME;
use crate::services::store::StoreGateway;
use crate::services::Services;

const THROTTLE_KEY: &str = "rate:worker:claims";
const THROTTLE_MAX_WAIT: Duration = Duration::from_secs(5);

/// Drains the claim queue and runs the authoritative transaction. Concurrency
/// comes from the worker-pool configuration; throughput is additionally
/// capped by a per-second window shared across worker processes.
pub struct ClaimWorker {
    pub ctx: AppContext,
}

impl AppWorker<ClaimJob> for ClaimWorker {
    fn build(ctx: &AppContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl Worker<ClaimJob> for ClaimWorker {
    fn opts() -> sidekiq::WorkerOpts<ClaimJob, Self> {
        sidekiq::WorkerOpts::new().queue(QUEUE_NAME)
    }

    async fn perform(
        &self,
        args: ClaimJob,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        let services = Services::shared().await?;
        let store = StoreGateway::new(self.ctx.db.clone());

        // Concurrency bound: jobs beyond the cap wait here until a slot
        // frees. The semaphore is never closed, so acquisition only fails if
        // the process is tearing down.
        let _permit = match services.worker_permits.acquire().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!("worker permit pool closed, proceeding unbounded");
                None
            }
        };

        Self::throttle(services).await;

        let attempt = services.queue.begin_attempt(&args.request_id).await?;
        tracing::info!(
            request_id = %args.request_id,
            user_id = %args.user_id,
            attempt,
            "processing claim job"
        );

        match ClaimService::run_authoritative(&store, services, &args).await {
            Ok(result) => {
                services.queue.mark_completed(&args.request_id, &result).await?;
                Ok(())
            }
            Err(err) if err.is_internal() => {
                if attempt >= services.queue.max_attempts {
                    tracing::error!(
                        request_id = %args.request_id,
                        error = %err,
                        "claim job exhausted retries"
                    );
                    services
                        .queue
                        .mark_failed(&args.request_id, &err.client_message(true))
                        .await?;
                    return Ok(());
                }
                // Exponential backoff from 1s, then hand the job back for
                // redelivery
                let delay = Duration::from_secs(1u64 << (attempt.saturating_sub(1)).min(4));
                tokio::time::sleep(delay).await;
                Err(err.into())
            }
            Err(domain) => {
                // Domain outcomes are final; retrying cannot change them
                tracing::warn!(
                    request_id = %args.request_id,
                    user_id = %args.user_id,
                    reason = %domain,
                    "claim job rejected"
                );
                services
                    .queue
                    .mark_failed(&args.request_id, &domain.to_string())
                    .await?;
                Ok(())
            }
        }
    }
}

impl ClaimWorker {
    /// Blocks the job until the shared per-second window admits it, bounded
    /// so a broken window cannot stall the pool.
    async fn throttle(services: &Services) {
        let per_sec = services.settings.worker_rate_per_sec;
        let waited_since = std::time::Instant::now();
        loop {
            match services.limiter.fixed_window(THROTTLE_KEY, per_sec, 1).await {
                Ok(decision) if decision.allowed => return,
                Ok(_) => {
                    if waited_since.elapsed() > THROTTLE_MAX_WAIT {
                        tracing::warn!("worker throttle wait exceeded, proceeding");
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "worker throttle probe failed, proceeding");
                    return;
                }
            }
        }
    }
}
