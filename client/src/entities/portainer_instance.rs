use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
  Password,
  Apikey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortainerInstance {
  pub id: i64,
  pub user_id: i64,
  pub name: String,
  pub url: String,
  pub auth_type: AuthType,
  pub username: Option<String>,
  pub password: Option<String>,
  pub api_key: Option<String>,
  pub display_order: i64,
  pub ip_address: Option<String>,
}

/// Request body for creating/updating an instance. Never carries `id`/`user_id` —
/// those are assigned by the owning handler, never taken from client input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortainerInstanceInput {
  pub name: String,
  pub url: String,
  pub auth_type: AuthType,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub password: Option<String>,
  #[serde(default)]
  pub api_key: Option<String>,
  #[serde(default)]
  pub display_order: i64,
  #[serde(default)]
  pub ip_address: Option<String>,
}
