//! Shared OCI Distribution v2 manifest-digest lookup, used by the Docker
//! Hub, GHCR, and GitLab Container Registry clients (spec §4.2). All three
//! speak the same `HEAD /v2/<repo>/manifests/<tag>` + bearer-token-exchange
//! protocol; only the host and default auth scope differ.

use std::time::Duration;

use drydock_client::entities::registry_version::ResolvedVersion;
use reqwest::{Client, StatusCode};

use super::retry::{self, Attempt};
use crate::error::AppResult;

const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, application/vnd.docker.distribution.manifest.list.v2+json, application/vnd.oci.image.manifest.v1+json, application/vnd.oci.image.index.v1+json";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct OciLookup<'a> {
  pub client: &'a Client,
  /// e.g. `registry-1.docker.io`, `ghcr.io`, `registry.gitlab.com`.
  pub host: &'a str,
  pub repository: &'a str,
  pub tag: &'a str,
  /// Static bearer token (GHCR/GitLab private repos); `None` falls back to
  /// the registry's own anonymous-token exchange (Docker Hub, public GHCR).
  pub static_token: Option<&'a str>,
}

/// Resolves the manifest digest for `repository:tag`. A missing or
/// unreachable manifest is reported as `exists_in_registry=false` rather
/// than an error -- only transient failures (429/5xx/network) retry.
pub async fn resolve_digest(lookup: OciLookup<'_>) -> AppResult<ResolvedVersion> {
  let url = format!(
    "https://{}/v2/{}/manifests/{}",
    lookup.host, lookup.repository, lookup.tag
  );

  let result = retry::with_retry(|| async {
    let mut req = lookup
      .client
      .head(&url)
      .header("Accept", MANIFEST_ACCEPT)
      .timeout(HTTP_TIMEOUT);
    if let Some(token) = lookup.static_token {
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

    if res.status() == StatusCode::UNAUTHORIZED && lookup.static_token.is_none() {
      let www_auth = res
        .headers()
        .get("www-authenticate")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
      let token = match exchange_anonymous_token(
        lookup.client,
        &www_auth,
        lookup.repository,
      )
      .await
      {
        Some(t) => t,
        None => {
          return Attempt::Ok(ResolvedVersion {
            exists_in_registry: false,
            ..Default::default()
          });
        }
      };
      let res = match lookup
        .client
        .head(&url)
        .header("Accept", MANIFEST_ACCEPT)
        .bearer_auth(&token)
        .timeout(HTTP_TIMEOUT)
        .send()
        .await
      {
        Ok(res) => res,
        Err(e) => {
        return Attempt::Transient {
          error: e.into(),
          retry_after: None,
          kind: retry::TransientKind::ServerError,
        };
      }
      };
      return classify(res).await;
    }

    classify(res).await
  })
  .await?;

  Ok(result)
}

async fn classify(res: reqwest::Response) -> Attempt<ResolvedVersion> {
  let status = res.status();
  if status == StatusCode::TOO_MANY_REQUESTS {
    let retry_after = res
      .headers()
      .get("retry-after")
      .and_then(|v| v.to_str().ok())
      .and_then(super::retry::parse_retry_after);
    return Attempt::Transient {
      error: anyhow::anyhow!("registry rate-limited the manifest request"),
      retry_after,
      kind: retry::TransientKind::RateLimit,
    };
  }
  if status.is_server_error() {
    return Attempt::Transient {
      error: anyhow::anyhow!("registry returned {status}"),
      retry_after: None,
      kind: retry::TransientKind::ServerError,
    };
  }
  if status == StatusCode::UNAUTHORIZED
    || status == StatusCode::FORBIDDEN
    || status == StatusCode::NOT_FOUND
  {
    return Attempt::Ok(ResolvedVersion {
      exists_in_registry: false,
      ..Default::default()
    });
  }
  if !status.is_success() {
    return Attempt::Terminal(anyhow::anyhow!(
      "unexpected registry response {status}"
    ));
  }
  let digest = res
    .headers()
    .get("docker-content-digest")
    .and_then(|v| v.to_str().ok())
    .and_then(drydock_client::digest::normalize);
  Attempt::Ok(ResolvedVersion {
    latest_digest: digest,
    exists_in_registry: true,
    ..Default::default()
  })
}

/// Parses a `Www-Authenticate: Bearer realm="...",service="..."` challenge
/// and exchanges it for an anonymous pull token (spec §4.2 "Docker Hub ...
/// anonymous by default").
async fn exchange_anonymous_token(
  client: &Client,
  www_auth: &str,
  repository: &str,
) -> Option<String> {
  let realm = capture(www_auth, r#"realm="([^"]+)""#)?;
  let service = capture(www_auth, r#"service="([^"]+)""#).unwrap_or_default();
  let scope = format!("repository:{repository}:pull");
  let res = client
    .get(&realm)
    .query(&[("service", service.as_str()), ("scope", scope.as_str())])
    .timeout(HTTP_TIMEOUT)
    .send()
    .await
    .ok()?;
  if !res.status().is_success() {
    return None;
  }
  let body: serde_json::Value = res.json().await.ok()?;
  body
    .get("token")
    .or_else(|| body.get("access_token"))
    .and_then(|v| v.as_str())
    .map(str::to_string)
}

fn capture(haystack: &str, pattern: &str) -> Option<String> {
  regex::Regex::new(pattern)
    .ok()?
    .captures(haystack)?
    .get(1)
    .map(|m| m.as_str().to_string())
}
