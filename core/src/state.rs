//! Application context (spec §9): one value threaded through every request
//! and job handler instead of package-level mutable globals. Grounded on
//! the teacher's `state.rs`, which plays the same role for its `db_client`/
//! `jwt_client` singletons -- reworked here as a single `Clone`-able struct
//! since axum's `State` extractor wants one.

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;
use drydock_client::entities::portainer_instance::PortainerInstance;
use reqwest::Client;

use crate::{cache::ContainerCache, config::app_config, db::Db, portainer::PortainerClient};

#[derive(Clone)]
pub struct AppState {
  pub db: Arc<Db>,
  pub http: Client,
  pub cache: Arc<ContainerCache>,
  /// Live Portainer connections, keyed by `portainer_instance_id`. A
  /// `DashMap` so instance CRUD (api layer) and the scheduler/cache reads
  /// can touch it concurrently without a shared lock.
  portainer_clients: Arc<DashMap<i64, Arc<PortainerClient>>>,
}

impl AppState {
  pub async fn new(db: Db) -> anyhow::Result<Self> {
    let http = Client::builder()
      .timeout(std::time::Duration::from_secs(app_config().http_timeout_secs))
      .build()?;
    let db = Arc::new(db);
    let portainer_clients = Arc::new(DashMap::new());
    let state = Self { db, http, cache: Arc::new(ContainerCache::new()), portainer_clients };
    state.reload_portainer_clients().await?;
    Ok(state)
  }

  /// Rebuilds the whole `portainer_clients` map from the database -- called
  /// at startup and after any instance create/update/delete.
  pub async fn reload_portainer_clients(&self) -> anyhow::Result<()> {
    let instances = crate::db::portainer_instances::list_all(&self.db).await?;
    self.portainer_clients.clear();
    for instance in instances {
      self.insert_portainer_client(instance);
    }
    Ok(())
  }

  pub fn insert_portainer_client(&self, instance: PortainerInstance) {
    let id = instance.id;
    self.portainer_clients.insert(id, PortainerClient::new(instance, self.http.clone()));
  }

  pub fn remove_portainer_client(&self, instance_id: i64) {
    self.portainer_clients.remove(&instance_id);
  }

  /// A point-in-time copy, since the engine/cache modules were written
  /// against a plain `HashMap` (they never mutate it, only look clients up).
  pub fn portainer_clients_snapshot(&self) -> HashMap<i64, Arc<PortainerClient>> {
    self.portainer_clients.iter().map(|e| (*e.key(), e.value().clone())).collect()
  }

  pub fn portainer_client(&self, instance_id: i64) -> Option<Arc<PortainerClient>> {
    self.portainer_clients.get(&instance_id).map(|e| e.value().clone())
  }
}
