//! Broadcast retry loop
//!
//! Submission failures are either terminal (returned immediately) or
//! retryable, as decided by a per-chain classifier over the structured RPC
//! error. Retryable failures are retried after a fixed delay until the
//! attempt budget runs out. A classifier may ask for the lenient submission
//! mode, which then stays on for every later attempt.
//!
//! Dropping the returned future stops the loop; requests already sent are
//! not recalled, so the outcome must then be treated as unknown.

use std::future::Future;
use std::time::Duration;

use crate::error::{ClientError, VaultError};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            delay: Duration::from_secs(1),
        }
    }
}

/// Verdict of a chain's broadcast error classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    Terminal,
    /// Try again; `lenient` switches later attempts to the lenient mode
    Again { lenient: bool },
}

/// Classifier for chains without retryable submission errors
pub fn never_retry(_: &ClientError) -> Retry {
    Retry::Terminal
}

fn upstream_message(err: &ClientError) -> String {
    match err {
        ClientError::Rpc { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// Run `submit` until it succeeds, fails terminally, or the budget is spent
///
/// `submit` receives the current lenient flag.
pub async fn broadcast_with_retry<T, F, Fut, C>(
    policy: &RetryPolicy,
    mut submit: F,
    classify: C,
) -> Result<T>
where
    F: FnMut(bool) -> Fut,
    Fut: Future<Output = std::result::Result<T, ClientError>>,
    C: Fn(&ClientError) -> Retry,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut lenient = false;
    let mut last_message = String::new();

    for attempt in 1..=max_attempts {
        match submit(lenient).await {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("✅ Broadcast accepted on attempt {}/{}", attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(err) => match classify(&err) {
                Retry::Terminal => {
                    log::error!("Broadcast failed: {}", err);
                    return Err(VaultError::Client(err));
                }
                Retry::Again { lenient: switch } => {
                    log::warn!(
                        "🔁 Broadcast attempt {}/{} hit retryable error: {}",
                        attempt,
                        max_attempts,
                        err
                    );
                    last_message = upstream_message(&err);
                    lenient |= switch;
                    if attempt < max_attempts {
                        tokio::time::sleep(policy.delay).await;
                    }
                }
            },
        }
    }

    log::error!(
        "Broadcast gave up after {} attempts: {}",
        max_attempts,
        last_message
    );
    Err(VaultError::RetryExhausted {
        attempts: max_attempts,
        last_message,
    })
}
