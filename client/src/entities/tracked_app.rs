use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
  Docker,
  Github,
  Gitlab,
}

/// An upstream application whose release stream is watched independently
/// of any running container (spec §3, GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedApp {
  pub id: i64,
  pub user_id: i64,
  pub name: String,
  pub image_name: Option<String>,
  pub github_repo: Option<String>,
  pub source_type: SourceType,
  pub repository_token_id: Option<i64>,
  pub current_version: Option<String>,
  pub current_digest: Option<String>,
  pub latest_version: Option<String>,
  pub latest_digest: Option<String>,
  pub current_version_publish_date: Option<String>,
  pub latest_version_publish_date: Option<String>,
  pub last_checked: Option<String>,
}

impl TrackedApp {
  pub fn has_update(&self) -> bool {
    match (&self.current_digest, &self.latest_digest) {
      (Some(c), Some(l)) => {
        crate::digest::normalize(c) != crate::digest::normalize(l)
          || (crate::digest::normalize(c).is_none()
            && c != l)
      }
      _ => {
        matches!(
          (&self.current_version, &self.latest_version),
          (Some(c), Some(l)) if c != l
        )
      }
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedAppInput {
  pub name: String,
  pub image_name: Option<String>,
  pub github_repo: Option<String>,
  pub source_type: SourceType,
  pub repository_token_id: Option<i64>,
}
