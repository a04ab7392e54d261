use serde::{Deserialize, Serialize};

/// Error taxonomy by *kind*, not type name (spec §7). Every error surfaced
/// to the HTTP API carries one of these so the client can route it (e.g.
/// rate-limit -> dedicated component).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  #[error("validation error")]
  Validation,
  #[error("upstream authentication error")]
  UpstreamAuth,
  #[error("upstream not found")]
  UpstreamNotFound,
  #[error("upstream transient error")]
  UpstreamTransient,
  #[error("rate limited")]
  RateLimit,
  #[error("conflict")]
  Conflict,
  #[error("fatal error")]
  Fatal,
  #[error("not found")]
  NotFound,
  #[error("unauthorized")]
  Unauthorized,
  #[error("forbidden")]
  Forbidden,
}

impl ErrorKind {
  /// Maps a kind to the HTTP status code spec §6.4/§7 assign it.
  pub fn status_code(&self) -> u16 {
    match self {
      ErrorKind::Validation => 400,
      ErrorKind::Unauthorized => 401,
      ErrorKind::Forbidden => 403,
      ErrorKind::NotFound | ErrorKind::UpstreamNotFound => 404,
      ErrorKind::Conflict => 409,
      ErrorKind::RateLimit => 429,
      ErrorKind::UpstreamAuth
      | ErrorKind::UpstreamTransient
      | ErrorKind::Fatal => 500,
    }
  }
}

/// Body of an error response returned by the HTTP API (spec §7: "must
/// include a kind tag so the client can route").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
  pub kind: ErrorKind,
  pub message: String,
}
