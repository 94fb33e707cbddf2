use super::classifier::classify;
use super::executor::Fetcher;
use super::{AttemptOutcome, AttemptRecord, Candidate, Resolution};
use std::time::{Duration, Instant};

/// Try `candidates` in order, one at a time, until one yields a payload.
///
/// Never fails: exhaustion is reported as [`Resolution::Exhausted`] carrying
/// one record per candidate in planner order. Dropping the returned future
/// drops the in-flight fetch with it.
pub async fn resolve(fetcher: &dyn Fetcher, candidates: Vec<Candidate>, timeout: Duration) -> Resolution {
    let total = candidates.len();
    let mut attempts = Vec::with_capacity(total);

    for (idx, candidate) in candidates.into_iter().enumerate() {
        let endpoint = candidate.url();
        tracing::debug!(attempt = idx + 1, total, endpoint = %endpoint, "trying candidate");

        let started = Instant::now();
        let outcome = match fetcher.fetch(&candidate, timeout).await {
            Ok(response) => classify(&response),
            Err(e) => {
                let elapsed = started.elapsed();
                tracing::warn!(endpoint = %endpoint, elapsed_ms = elapsed.as_millis() as u64, error = %e, "candidate unreachable");
                attempts.push(AttemptRecord {
                    candidate,
                    outcome: AttemptOutcome::Transport(e),
                    elapsed,
                });
                continue;
            }
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(data) => {
                tracing::info!(endpoint = %endpoint, attempt = idx + 1, elapsed_ms = elapsed.as_millis() as u64, "resolved");
                attempts.push(AttemptRecord {
                    candidate: candidate.clone(),
                    outcome: AttemptOutcome::Accepted,
                    elapsed,
                });
                return Resolution::Resolved { candidate, data, attempts };
            }
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, elapsed_ms = elapsed.as_millis() as u64, error = %e, "candidate rejected");
                attempts.push(AttemptRecord {
                    candidate,
                    outcome: AttemptOutcome::Rejected(e),
                    elapsed,
                });
            }
        }
    }

    tracing::warn!(total, "all candidates failed");
    Resolution::Exhausted { attempts }
}
