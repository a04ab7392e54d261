use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenProvider {
  Github,
  Gitlab,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryAccessToken {
  pub id: i64,
  pub user_id: i64,
  pub provider: TokenProvider,
  pub name: String,
  #[serde(skip_serializing)]
  pub access_token: String,
  pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryAccessTokenInput {
  pub provider: TokenProvider,
  pub name: String,
  pub access_token: String,
}
