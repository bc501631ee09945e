//! Client-side polling loop for the QR provider.
//!
//! Ticks the status check at a fixed interval until the provider reports
//! approval, with a hard ceiling so an abandoned payment does not poll
//! forever. Cancellation is drop-based: when the owning view is torn down,
//! dropping the returned future stops the loop.

use std::time::Duration;

use crate::error::LovepageError;
use crate::provider::{PaymentAdapter, ProofResult};

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            ceiling: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Approved { draft_id: String },
    Rejected { status: String },
    TimedOut,
}

/// Poll the provider until the payment resolves or the ceiling passes.
///
/// Transient provider errors are treated like `Pending` — the polling path
/// surfaces them as normal non-error conditions and keeps trying until the
/// ceiling.
pub async fn poll_until_approved<A: PaymentAdapter>(
    adapter: &A,
    payment_id: &str,
    config: &PollConfig,
) -> Result<PollOutcome, LovepageError> {
    let deadline = tokio::time::Instant::now() + config.ceiling;
    loop {
        match adapter.verify_proof(payment_id).await {
            Ok(ProofResult::Approved { draft_id }) => {
                return Ok(PollOutcome::Approved { draft_id })
            }
            Ok(ProofResult::Rejected { status }) => return Ok(PollOutcome::Rejected { status }),
            Ok(ProofResult::Pending) => {}
            Err(e) => {
                tracing::debug!(payment_id, error = %e, "status check failed, will retry");
            }
        }
        if tokio::time::Instant::now() + config.interval > deadline {
            tracing::warn!(payment_id, "polling ceiling reached");
            return Ok(PollOutcome::TimedOut);
        }
        tokio::time::sleep(config.interval).await;
    }
}
