//! At-most-one supervisor per tenant.

use std::{collections::HashMap, sync::Arc};

use {tokio::sync::RwLock, tracing::info};

use courier_events::EventPipeline;

use crate::{
    client::ProtocolClient,
    credentials::CredentialStore,
    supervisor::{ConnectionSupervisor, SupervisorConfig},
};

/// Owns every live [`ConnectionSupervisor`] keyed by tenant.
///
/// All provisioning and teardown goes through here so that two racing
/// provision calls can never produce two connections for one tenant.
pub struct SessionRegistry {
    client: Arc<dyn ProtocolClient>,
    credentials: Arc<dyn CredentialStore>,
    pipeline: Arc<EventPipeline>,
    config: SupervisorConfig,
    supervisors: RwLock<HashMap<String, Arc<ConnectionSupervisor>>>,
}

impl SessionRegistry {
    pub fn new(
        client: Arc<dyn ProtocolClient>,
        credentials: Arc<dyn CredentialStore>,
        pipeline: Arc<EventPipeline>,
        config: SupervisorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            credentials,
            pipeline,
            config,
            supervisors: RwLock::new(HashMap::new()),
        })
    }

    /// Return the tenant's supervisor, creating it when absent.
    ///
    /// Idempotent: a second call for a live tenant returns the existing
    /// supervisor untouched. A supervisor that was already cancelled (a
    /// release raced us) is replaced with a fresh one rather than handed
    /// back.
    pub async fn acquire(
        &self,
        tenant: &str,
        owner: &str,
        display_name: Option<String>,
    ) -> Arc<ConnectionSupervisor> {
        let mut supervisors = self.supervisors.write().await;
        if let Some(existing) = supervisors.get(tenant) {
            if !existing.is_cancelled() {
                return Arc::clone(existing);
            }
        }

        let supervisor = ConnectionSupervisor::spawn(
            tenant,
            owner,
            display_name,
            self.config.clone(),
            Arc::clone(&self.client),
            Arc::clone(&self.credentials),
            Arc::clone(&self.pipeline),
        );
        supervisors.insert(tenant.to_string(), Arc::clone(&supervisor));
        info!(tenant, owner, "session provisioned");
        supervisor
    }

    pub async fn lookup(&self, tenant: &str) -> Option<Arc<ConnectionSupervisor>> {
        self.supervisors.read().await.get(tenant).cloned()
    }

    /// Tear down the tenant's session: cancel its supervisor, wait for the
    /// task to exit, then drain and retire its event queue. Returns false
    /// when the tenant has no session.
    pub async fn release(&self, tenant: &str) -> bool {
        let supervisor = { self.supervisors.read().await.get(tenant).cloned() };
        let Some(supervisor) = supervisor else {
            return false;
        };

        // Shutdown happens outside the map lock; other tenants keep moving.
        supervisor.shutdown().await;

        {
            let mut supervisors = self.supervisors.write().await;
            if supervisors
                .get(tenant)
                .is_some_and(|current| Arc::ptr_eq(current, &supervisor))
            {
                supervisors.remove(tenant);
            }
        }
        self.pipeline.retire(tenant).await;
        info!(tenant, "session released");
        true
    }

    pub async fn tenants(&self) -> Vec<String> {
        self.supervisors.read().await.keys().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.supervisors.read().await.len()
    }

    /// Release every session. Used on process shutdown.
    pub async fn shutdown_all(&self) {
        let tenants = self.tenants().await;
        for tenant in tenants {
            self.release(&tenant).await;
        }
    }
}
