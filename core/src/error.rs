use axum::{Json, http::StatusCode, response::IntoResponse};
use drydock_client::entities::error::{ApiErrorBody, ErrorKind};

/// Every error that crosses the HTTP boundary carries a [`ErrorKind`] tag
/// (spec §7), wrapping the underlying `anyhow::Error` chain for logging.
#[derive(Debug)]
pub struct AppError {
  pub kind: ErrorKind,
  pub source: anyhow::Error,
}

impl AppError {
  pub fn new(kind: ErrorKind, source: anyhow::Error) -> Self {
    Self { kind, source }
  }

  pub fn validation(msg: impl Into<String>) -> Self {
    Self::new(ErrorKind::Validation, anyhow::anyhow!(msg.into()))
  }

  pub fn not_found(msg: impl Into<String>) -> Self {
    Self::new(ErrorKind::NotFound, anyhow::anyhow!(msg.into()))
  }

  pub fn conflict(msg: impl Into<String>) -> Self {
    Self::new(ErrorKind::Conflict, anyhow::anyhow!(msg.into()))
  }

  pub fn unauthorized(msg: impl Into<String>) -> Self {
    Self::new(ErrorKind::Unauthorized, anyhow::anyhow!(msg.into()))
  }

  pub fn forbidden(msg: impl Into<String>) -> Self {
    Self::new(ErrorKind::Forbidden, anyhow::anyhow!(msg.into()))
  }

  pub fn fatal(source: anyhow::Error) -> Self {
    Self::new(ErrorKind::Fatal, source)
  }
}

impl std::fmt::Display for AppError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:#}", self.source)
  }
}

impl std::error::Error for AppError {}

/// Anything not explicitly tagged propagates as a 500 `Fatal`, matching
/// spec §7's "database unavailable, schema migration failed" bucket for
/// unexpected failures.
impl From<anyhow::Error> for AppError {
  fn from(source: anyhow::Error) -> Self {
    Self::new(ErrorKind::Fatal, source)
  }
}

impl From<sqlx::Error> for AppError {
  fn from(source: sqlx::Error) -> Self {
    Self::new(ErrorKind::Fatal, source.into())
  }
}

impl From<reqwest::Error> for AppError {
  fn from(source: reqwest::Error) -> Self {
    Self::new(ErrorKind::Fatal, source.into())
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> axum::response::Response {
    if self.kind.status_code() >= 500 {
      tracing::error!("request failed | {:#}", self.source);
    } else {
      tracing::warn!("request rejected | {:#}", self.source);
    }
    let status = StatusCode::from_u16(self.kind.status_code())
      .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ApiErrorBody {
      kind: self.kind,
      message: format!("{:#}", self.source),
    };
    (status, Json(body)).into_response()
  }
}

pub type AppResult<T> = Result<T, AppError>;
