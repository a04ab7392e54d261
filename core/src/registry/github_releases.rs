use std::time::Duration;

use drydock_client::entities::registry_version::RegistryProvider;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::retry::{self, Attempt};
use crate::error::AppResult;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct Release {
  tag_name: String,
  published_at: Option<String>,
}

/// Outcome for a `TrackedApp(sourceType=github)` (spec §4.2).
pub struct LatestRelease {
  pub version: Option<String>,
  pub published_at: Option<String>,
  pub exists: bool,
}

/// `owner_repo` is `owner/name`, as stored in `TrackedApp.githubRepo`.
pub async fn latest_release(
  client: &Client,
  owner_repo: &str,
  token: Option<&str>,
) -> AppResult<LatestRelease> {
  let url = format!("https://api.github.com/repos/{owner_repo}/releases/latest");
  retry::with_retry(|| async {
    let mut req = client
      .get(&url)
      .header("Accept", "application/vnd.github+json")
      .header("User-Agent", "drydock")
      .timeout(HTTP_TIMEOUT);
    if let Some(token) = token {
      req = req.bearer_auth(token);
    }
    let res = match req.send().await {
      Ok(res) => res,
      Err(e) => {
        return Attempt::Transient {
          error: e.into(),
          retry_after: None,
          kind: retry::TransientKind::ServerError,
        };
      }
    };
    let status = res.status();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
      let retry_after = res
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(retry::parse_retry_after);
      let kind = if status == StatusCode::TOO_MANY_REQUESTS {
        retry::TransientKind::RateLimit
      } else {
        retry::TransientKind::ServerError
      };
      return Attempt::Transient {
        error: anyhow::anyhow!("github releases api returned {status}"),
        retry_after,
        kind,
      };
    }
    if status == StatusCode::NOT_FOUND
      || status == StatusCode::UNAUTHORIZED
      || status == StatusCode::FORBIDDEN
    {
      return Attempt::Ok(LatestRelease {
        version: None,
        published_at: None,
        exists: false,
      });
    }
    if !status.is_success() {
      return Attempt::Terminal(anyhow::anyhow!(
        "unexpected github releases response {status}"
      ));
    }
    match res.json::<Release>().await {
      Ok(release) => Attempt::Ok(LatestRelease {
        version: Some(release.tag_name),
        published_at: release.published_at,
        exists: true,
      }),
      Err(e) => Attempt::Terminal(e.into()),
    }
  })
  .await
}

pub const PROVIDER: RegistryProvider = RegistryProvider::GithubReleases;
