use std::time::Duration;

use drydock_client::entities::error::ErrorKind;

use crate::error::AppError;

/// Distinguishes *why* an attempt was transient, so an exhausted retry loop
/// can map back to the right `ErrorKind` (spec §7: `RateLimit` vs.
/// `UpstreamTransient` are reported separately).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
  /// 429 Too Many Requests.
  RateLimit,
  /// 5xx or a network-level failure (timeout, connection reset, DNS, ...).
  ServerError,
}

/// Outcome of a single attempt at a retryable operation (spec §4.2: "transient
/// HTTP errors (429, 5xx, network) are retried with exponential backoff up to
/// 3 attempts; non-transient errors (401/403/404) are terminal").
pub enum Attempt<T> {
  Ok(T),
  /// Terminal failure -- do not retry. Used for 401/403/404.
  Terminal(anyhow::Error),
  /// Transient failure. `retry_after` overrides the backoff when the server
  /// sent one (spec §4.2: "must honour the header verbatim").
  Transient {
    error: anyhow::Error,
    retry_after: Option<Duration>,
    kind: TransientKind,
  },
}

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Runs `op` up to [`MAX_ATTEMPTS`] times, honouring `Retry-After` verbatim
/// when present and otherwise backing off exponentially. TODO: surface
/// attempt count in the returned error for observability.
pub async fn with_retry<T, F, Fut>(op: F) -> Result<T, AppError>
where
  F: Fn() -> Fut,
  Fut: std::future::Future<Output = Attempt<T>>,
{
  let mut last_err: Option<anyhow::Error> = None;
  let mut last_kind = TransientKind::ServerError;
  for attempt in 0..MAX_ATTEMPTS {
    match op().await {
      Attempt::Ok(value) => return Ok(value),
      Attempt::Terminal(e) => {
        return Err(AppError::new(ErrorKind::UpstreamNotFound, e));
      }
      Attempt::Transient { error, retry_after, kind } => {
        last_err = Some(error);
        last_kind = kind;
        if attempt + 1 == MAX_ATTEMPTS {
          break;
        }
        let delay = retry_after.unwrap_or(BASE_BACKOFF * 2u32.pow(attempt));
        tokio::time::sleep(delay).await;
      }
    }
  }
  let kind = match last_kind {
    TransientKind::RateLimit => ErrorKind::RateLimit,
    TransientKind::ServerError => ErrorKind::UpstreamTransient,
  };
  Err(AppError::new(
    kind,
    last_err.unwrap_or_else(|| anyhow::anyhow!("retryable operation failed")),
  ))
}

/// Parses a `Retry-After` header value, which per RFC 9110 is either a
/// delay in seconds or an HTTP-date. Only the seconds form is handled;
/// an HTTP-date falls back to the exponential default.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
  value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
