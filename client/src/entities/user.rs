use serde::{Deserialize, Serialize};

/// Minimal user record. Account management itself (password/OAuth flows,
/// avatars, color scheme) is out of scope per spec §1 — this exists only so
/// every other table has a `user_id` to be scoped by, and so the session
/// boundary described in spec §6.4 has something to authenticate against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub id: i64,
  pub username: String,
  #[serde(skip_serializing)]
  pub password_hash: String,
  pub is_admin: bool,
  pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
  pub token: String,
  pub user_id: i64,
  pub created_at: String,
  pub expires_at: String,
}
