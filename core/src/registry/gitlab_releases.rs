use std::time::Duration;

use drydock_client::entities::registry_version::RegistryProvider;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::retry::{self, Attempt};
use crate::error::AppResult;
use crate::registry::github_releases::LatestRelease;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct Release {
  tag_name: String,
  released_at: Option<String>,
}

/// `project_path` is the URL-encoded `namespace/project` path (spec §4.2,
/// "analogous" to GitHub Releases).
pub async fn latest_release(
  client: &Client,
  project_path: &str,
  token: Option<&str>,
) -> AppResult<LatestRelease> {
  let encoded = project_path.replace('/', "%2F");
  let url = format!("https://gitlab.com/api/v4/projects/{encoded}/releases");
  retry::with_retry(|| async {
    let mut req = client.get(&url).timeout(HTTP_TIMEOUT);
    if let Some(token) = token {
      req = req.header("PRIVATE-TOKEN", token);
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
        error: anyhow::anyhow!("gitlab releases api returned {status}"),
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
        "unexpected gitlab releases response {status}"
      ));
    }
    match res.json::<Vec<Release>>().await {
      Ok(releases) => {
        let latest = releases.into_iter().next();
        Attempt::Ok(LatestRelease {
          exists: latest.is_some(),
          version: latest.as_ref().map(|r| r.tag_name.clone()),
          published_at: latest.and_then(|r| r.released_at),
        })
      }
      Err(e) => Attempt::Terminal(e.into()),
    }
  })
  .await
}

pub const PROVIDER: RegistryProvider = RegistryProvider::GitlabReleases;
