//! Portainer client (spec §4.3, C3). One instance per `PortainerInstance`;
//! callers hold one [`PortainerClient`] per instance for the lifetime of a
//! poll or upgrade.

mod inspect;

use std::{sync::Arc, time::Duration};

use drydock_client::entities::{
  container::ObservedContainer, portainer_instance::{AuthType, PortainerInstance},
};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

pub use inspect::ContainerInspect;

use crate::error::{AppError, AppResult};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct PortainerClient {
  instance: PortainerInstance,
  http: Client,
  /// Cached JWT for `authType=password`; re-authenticated on first use and
  /// on any 401 (spec §4.3: "refresh on 401").
  jwt: RwLock<Option<String>>,
}

#[derive(Deserialize)]
struct AuthResponse {
  jwt: String,
}

#[derive(Deserialize)]
struct Endpoint {
  #[serde(rename = "Id")]
  id: i64,
}

#[derive(Deserialize)]
struct ContainerSummary {
  #[serde(rename = "Id")]
  id: String,
}

impl PortainerClient {
  pub fn new(instance: PortainerInstance, http: Client) -> Arc<Self> {
    Arc::new(Self { instance, http, jwt: RwLock::new(None) })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.instance.url.trim_end_matches('/'), path)
  }

  async fn authenticate(&self) -> AppResult<()> {
    let username = self.instance.username.as_deref().unwrap_or_default();
    let password = self.instance.password.as_deref().unwrap_or_default();
    let res = self
      .http
      .post(self.url("/api/auth"))
      .json(&serde_json::json!({ "Username": username, "Password": password }))
      .timeout(HTTP_TIMEOUT)
      .send()
      .await
      .map_err(|e| AppError::new(drydock_client::entities::error::ErrorKind::UpstreamAuth, e.into()))?;
    if !res.status().is_success() {
      return Err(AppError::new(
        drydock_client::entities::error::ErrorKind::UpstreamAuth,
        anyhow::anyhow!("portainer auth failed: {}", res.status()),
      ));
    }
    let body: AuthResponse = res.json().await?;
    *self.jwt.write().await = Some(body.jwt);
    Ok(())
  }

  /// Attaches the configured auth to a request builder, authenticating
  /// lazily on first use for `authType=password` instances.
  async fn authed(&self, mut req: reqwest::RequestBuilder) -> AppResult<reqwest::RequestBuilder> {
    match self.instance.auth_type {
      AuthType::Apikey => {
        let key = self.instance.api_key.as_deref().unwrap_or_default();
        req = req.header("X-API-Key", key);
      }
      AuthType::Password => {
        if self.jwt.read().await.is_none() {
          self.authenticate().await?;
        }
        let token = self.jwt.read().await.clone().unwrap_or_default();
        req = req.bearer_auth(token);
      }
    }
    Ok(req)
  }

  /// Sends `req`, retrying once after a fresh `authenticate()` on 401
  /// (password auth only -- an api-key 401 is terminal).
  async fn send(&self, build: impl Fn() -> reqwest::RequestBuilder) -> AppResult<reqwest::Response> {
    let req = self.authed(build()).await?;
    let res = req
      .timeout(HTTP_TIMEOUT)
      .send()
      .await
      .map_err(|e| AppError::new(drydock_client::entities::error::ErrorKind::UpstreamTransient, e.into()))?;
    if res.status() == reqwest::StatusCode::UNAUTHORIZED
      && self.instance.auth_type == AuthType::Password
    {
      self.authenticate().await?;
      let retried = self.authed(build()).await?;
      return retried
        .timeout(HTTP_TIMEOUT)
        .send()
        .await
        .map_err(|e| AppError::new(drydock_client::entities::error::ErrorKind::UpstreamTransient, e.into()));
    }
    Ok(res)
  }

  pub async fn list_endpoint_ids(&self) -> AppResult<Vec<i64>> {
    let res = self.send(|| self.http.get(self.url("/api/endpoints"))).await?;
    let endpoints: Vec<Endpoint> = res.json().await?;
    Ok(endpoints.into_iter().map(|e| e.id).collect())
  }

  async fn list_container_ids(&self, endpoint_id: i64) -> AppResult<Vec<String>> {
    let path = format!("/api/endpoints/{endpoint_id}/docker/containers/json?all=true");
    let res = self.send(|| self.http.get(self.url(&path))).await?;
    let summaries: Vec<ContainerSummary> = res.json().await?;
    Ok(summaries.into_iter().map(|c| c.id).collect())
  }

  pub async fn inspect_container(
    &self,
    endpoint_id: i64,
    container_id: &str,
  ) -> AppResult<ContainerInspect> {
    let path = format!(
      "/api/endpoints/{endpoint_id}/docker/containers/{container_id}/json"
    );
    let res = self.send(|| self.http.get(self.url(&path))).await?;
    Ok(res.json().await?)
  }

  /// Iterates every endpoint and container, inspecting each to produce the
  /// observed snapshot the cache/detector layer merges against the DB
  /// (spec §4.3 "list endpoints / containers").
  pub async fn poll_all(&self) -> AppResult<Vec<ObservedContainer>> {
    let mut out = Vec::new();
    for endpoint_id in self.list_endpoint_ids().await? {
      let container_ids = match self.list_container_ids(endpoint_id).await {
        Ok(ids) => ids,
        Err(_) => continue,
      };
      for container_id in container_ids {
        match self.inspect_container(endpoint_id, &container_id).await {
          Ok(inspect) => out.push(inspect.into_observed(endpoint_id)),
          Err(_) => continue,
        }
      }
    }
    Ok(out)
  }

  /// Duplicates the container's full inspect config, swaps the image, and
  /// replaces it in place: stop, remove, pull, create, start (spec §4.3
  /// "Recreate container"). Returns the new container id.
  pub async fn recreate_container(
    &self,
    endpoint_id: i64,
    container_id: &str,
    new_image: &str,
  ) -> AppResult<String> {
    let inspect = self.inspect_container(endpoint_id, container_id).await?;
    let name = inspect.name.trim_start_matches('/').to_string();
    let create_body = inspect.to_create_body(new_image);

    self.pull_image(endpoint_id, new_image).await?;

    let stop_path = format!(
      "/api/endpoints/{endpoint_id}/docker/containers/{container_id}/stop"
    );
    let _ = self.send(|| self.http.post(self.url(&stop_path))).await?;

    let remove_path = format!(
      "/api/endpoints/{endpoint_id}/docker/containers/{container_id}?v=true"
    );
    let _ = self.send(|| self.http.delete(self.url(&remove_path))).await?;

    let create_path = format!(
      "/api/endpoints/{endpoint_id}/docker/containers/create?name={name}"
    );
    let res = self
      .send(|| self.http.post(self.url(&create_path)).json(&create_body))
      .await?;
    if !res.status().is_success() {
      return Err(AppError::new(
        drydock_client::entities::error::ErrorKind::UpstreamTransient,
        anyhow::anyhow!("failed to create recreated container: {}", res.status()),
      ));
    }
    #[derive(Deserialize)]
    struct CreateResponse {
      #[serde(rename = "Id")]
      id: String,
    }
    let created: CreateResponse = res.json().await?;

    let start_path = format!(
      "/api/endpoints/{endpoint_id}/docker/containers/{}/start",
      created.id
    );
    let _ = self.send(|| self.http.post(self.url(&start_path))).await?;
    Ok(created.id)
  }

  async fn pull_image(&self, endpoint_id: i64, image: &str) -> AppResult<()> {
    // `fromImage` takes the Docker Engine API's own `name[:tag]`/`name@digest`
    // qualifier directly -- a digest pull must not be split into a separate
    // `tag` param, or the engine falls back to pulling `:latest`.
    let (from_image, tag) = match image.rsplit_once('@') {
      Some(_) => (image.to_string(), None),
      None => match image.rsplit_once(':') {
        Some((repo, tag)) => (repo.to_string(), Some(tag.to_string())),
        None => (image.to_string(), None),
      },
    };
    let mut path = format!(
      "/api/endpoints/{endpoint_id}/docker/images/create?fromImage={from_image}"
    );
    if let Some(tag) = tag {
      path.push_str(&format!("&tag={tag}"));
    }
    let _ = self.send(|| self.http.post(self.url(&path))).await?;
    Ok(())
  }

  /// Best-effort: failures are swallowed, matching spec §4.3 "Prune unused
  /// images ... best-effort; used for the unused images counter".
  pub async fn prune_images(&self, endpoint_id: i64) -> u64 {
    let path = format!("/api/endpoints/{endpoint_id}/docker/images/prune");
    #[derive(Deserialize, Default)]
    struct PruneResponse {
      #[serde(rename = "ImagesDeleted", default)]
      images_deleted: Option<Vec<serde_json::Value>>,
    }
    let Ok(res) = self.send(|| self.http.post(self.url(&path))).await else {
      return 0;
    };
    res
      .json::<PruneResponse>()
      .await
      .ok()
      .and_then(|r| r.images_deleted)
      .map(|v| v.len() as u64)
      .unwrap_or(0)
  }
}
