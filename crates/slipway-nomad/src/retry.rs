use std::future::Future;

/// Bounded-attempt retry for transient cluster API failures.
///
/// `attempts` is the TOTAL number of tries; `1` means a single attempt and
/// no retry. Values below 1 are clamped to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
}

impl RetryPolicy {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Run `op` until it succeeds or the attempt budget is exhausted; the final
/// error is returned to the caller.
pub async fn with_attempts<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= policy.attempts() => return Err(err),
            Err(err) => {
                tracing::debug!("attempt {attempt}/{} failed: {err}", policy.attempts());
                attempt += 1;
            }
        }
    }
}
