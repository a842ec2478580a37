//! Shared outbound dispatch path.
//!
//! Every producer of outbound messages (API requests, the scheduler, the
//! auto-reply engine) funnels through [`dispatch_job`], so validation and
//! state checks are applied uniformly regardless of where a message came
//! from.

use std::sync::Arc;

use tracing::{debug, warn};

use courier_common::{JobOutcome, OutboundJob};

use crate::{error::SendError, registry::SessionRegistry};

/// Resolve the job's tenant and attempt the send, mapping every failure
/// mode to a [`JobOutcome`]. Never panics and never blocks on an absent
/// tenant.
pub async fn dispatch_job(registry: &Arc<SessionRegistry>, job: &OutboundJob) -> JobOutcome {
    let Some(supervisor) = registry.lookup(&job.tenant).await else {
        warn!(
            tenant = %job.tenant,
            job_id = %job.job_id,
            "dropping job for unknown tenant"
        );
        return JobOutcome::NotFound;
    };

    match supervisor.send(&job.recipient, &job.body).await {
        Ok(message_id) => {
            debug!(
                tenant = %job.tenant,
                job_id = %job.job_id,
                source = ?job.source,
                message_id,
                "job dispatched"
            );
            JobOutcome::Sent { message_id }
        },
        Err(SendError::NotConnected { .. }) => JobOutcome::NotConnected,
        Err(e @ (SendError::InvalidRecipient | SendError::EmptyBody)) => JobOutcome::Invalid {
            reason: e.to_string(),
        },
        Err(e @ (SendError::Timeout | SendError::Transport { .. })) => JobOutcome::Transport {
            reason: e.to_string(),
        },
    }
}
