//! Cluster gateway
//!
//! Opens a transient control-plane session from a decrypted kubeconfig.
//! The control plane sits behind [`ControlPlane`] so sessions can be driven
//! by an in-memory implementation in tests; [`KubeControlPlane`] is the
//! kube-rs backed one.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::error::{GatewayError, GatewayResult};
use super::types::{ClusterInfo, ExecOutput, PodReference, PodSelector};

/// Operations a gateway session needs from a cluster's API server
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Server git version, e.g. `v1.29.3`
    async fn server_version(&self) -> GatewayResult<String>;

    async fn node_count(&self) -> GatewayResult<u32>;

    /// Names of pods in `namespace` matching `label_selector`, in API order
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> GatewayResult<Vec<String>>;

    /// Run `command` in the pod's default container and wait for it to exit
    async fn exec(&self, pod: &PodReference, command: &[String]) -> GatewayResult<ExecOutput>;
}

/// Builds a control plane from kubeconfig text
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, credential: &str) -> GatewayResult<Box<dyn ControlPlane>>;
}

/// kube-rs control plane
pub struct KubeControlPlane {
    client: Client,
    api_server: String,
}

impl std::fmt::Debug for KubeControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeControlPlane")
            .field("api_server", &self.api_server)
            .finish()
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn server_version(&self) -> GatewayResult<String> {
        let version = self.client.apiserver_version().await?;
        Ok(version.git_version)
    }

    async fn node_count(&self) -> GatewayResult<u32> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node_list = nodes.list(&ListParams::default()).await?;

        Ok(node_list.items.len() as u32)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> GatewayResult<Vec<String>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod_list = pods
            .list(&ListParams::default().labels(label_selector))
            .await?;

        Ok(pod_list
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .collect())
    }

    async fn exec(&self, pod: &PodReference, command: &[String]) -> GatewayResult<ExecOutput> {
        super::exec::exec_in_pod(&self.client, pod, command).await
    }
}

/// Connects to clusters with kube-rs
#[derive(Debug, Clone)]
pub struct KubeConnector {
    connect_timeout: Duration,
}

impl KubeConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for KubeConnector {
    async fn connect(&self, credential: &str) -> GatewayResult<Box<dyn ControlPlane>> {
        let kubeconfig = Kubeconfig::from_yaml(credential).map_err(|e| {
            GatewayError::InvalidCredentialFormat(format!("Failed to parse kubeconfig: {}", e))
        })?;

        let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| {
                GatewayError::InvalidCredentialFormat(format!("Failed to create config: {}", e))
            })?;
        config.connect_timeout = Some(self.connect_timeout);

        let api_server = config.cluster_url.to_string();
        let client = Client::try_from(config).map_err(|e| {
            GatewayError::ConnectionError(format!("Failed to create client: {}", e))
        })?;

        debug!(api_server = %api_server, "Kubernetes client created");

        Ok(Box::new(KubeControlPlane { client, api_server }))
    }
}

/// Opens gateway sessions; one session per operation, never pooled
#[derive(Clone)]
pub struct ClusterGateway {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
}

impl ClusterGateway {
    pub fn new(connector: Arc<dyn Connector>, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
        }
    }

    /// Gateway backed by kube-rs
    pub fn kube(connect_timeout: Duration) -> Self {
        Self::new(Arc::new(KubeConnector::new(connect_timeout)), connect_timeout)
    }

    pub async fn open(&self, credential: &str) -> GatewayResult<GatewaySession> {
        let plane = tokio::time::timeout(self.connect_timeout, self.connector.connect(credential))
            .await
            .map_err(|_| {
                GatewayError::ConnectionError(format!(
                    "timed out after {}s while connecting",
                    self.connect_timeout.as_secs()
                ))
            })??;

        debug!("Gateway session opened");
        Ok(GatewaySession { plane })
    }
}

impl std::fmt::Debug for ClusterGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterGateway")
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// A live connection to one cluster's control plane.
///
/// Owns the client; dropping the session releases it.
pub struct GatewaySession {
    plane: Box<dyn ControlPlane>,
}

impl GatewaySession {
    pub async fn cluster_info(&self) -> GatewayResult<ClusterInfo> {
        let (version, node_count) =
            tokio::try_join!(self.plane.server_version(), self.plane.node_count())?;

        Ok(ClusterInfo {
            version,
            node_count,
        })
    }

    /// Locate the pod to run commands in.
    ///
    /// The first pod matching the primary selector wins. Otherwise the first
    /// pod matching the fallback selector whose name contains the marker.
    pub async fn find_pod(&self, selector: &PodSelector) -> GatewayResult<PodReference> {
        let primary = self
            .plane
            .list_pods(&selector.namespace, &selector.primary)
            .await?;

        if let Some(pod_name) = primary.into_iter().next() {
            return Ok(PodReference {
                namespace: selector.namespace.clone(),
                pod_name,
            });
        }

        debug!(
            namespace = %selector.namespace,
            selector = %selector.fallback,
            "No pod for primary selector, trying fallback"
        );

        let fallback = self
            .plane
            .list_pods(&selector.namespace, &selector.fallback)
            .await?;

        fallback
            .into_iter()
            .find(|name| name.contains(&selector.marker))
            .map(|pod_name| PodReference {
                namespace: selector.namespace.clone(),
                pod_name,
            })
            .ok_or_else(|| GatewayError::PodNotFound {
                namespace: selector.namespace.clone(),
                selector: format!(
                    "{} or {} with name containing '{}'",
                    selector.primary, selector.fallback, selector.marker
                ),
            })
    }

    pub(crate) fn control_plane(&self) -> &dyn ControlPlane {
        self.plane.as_ref()
    }
}

impl Drop for GatewaySession {
    fn drop(&mut self) {
        debug!("Gateway session released");
    }
}

impl std::fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySession").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubPlane {
        pods: HashMap<String, Vec<String>>,
        drops: Arc<AtomicUsize>,
    }

    impl Drop for StubPlane {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ControlPlane for StubPlane {
        async fn server_version(&self) -> GatewayResult<String> {
            Ok("v1.30.1".to_string())
        }

        async fn node_count(&self) -> GatewayResult<u32> {
            Ok(3)
        }

        async fn list_pods(&self, _namespace: &str, selector: &str) -> GatewayResult<Vec<String>> {
            Ok(self.pods.get(selector).cloned().unwrap_or_default())
        }

        async fn exec(&self, _pod: &PodReference, _command: &[String]) -> GatewayResult<ExecOutput> {
            Ok(ExecOutput::default())
        }
    }

    struct StubConnector {
        pods: HashMap<String, Vec<String>>,
        drops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for StubConnector {
        async fn connect(&self, credential: &str) -> GatewayResult<Box<dyn ControlPlane>> {
            if credential.is_empty() {
                return Err(GatewayError::InvalidCredentialFormat("empty".into()));
            }
            Ok(Box::new(StubPlane {
                pods: self.pods.clone(),
                drops: self.drops.clone(),
            }))
        }
    }

    fn gateway(pods: &[(&str, &[&str])]) -> (ClusterGateway, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        let pods = pods
            .iter()
            .map(|(sel, names)| {
                (
                    sel.to_string(),
                    names.iter().map(|n| n.to_string()).collect(),
                )
            })
            .collect();
        let connector = StubConnector {
            pods,
            drops: drops.clone(),
        };
        (
            ClusterGateway::new(Arc::new(connector), Duration::from_secs(5)),
            drops,
        )
    }

    #[tokio::test]
    async fn test_primary_selector_first_match_wins() {
        let (gw, _) = gateway(&[(
            "component=etcd",
            &["etcd-master-1", "etcd-master-2"],
        )]);
        let session = gw.open("kubeconfig").await.unwrap();

        let pod = session.find_pod(&PodSelector::default()).await.unwrap();
        assert_eq!(pod.pod_name, "etcd-master-1");
        assert_eq!(pod.namespace, "kube-system");
    }

    #[tokio::test]
    async fn test_fallback_selector_requires_marker() {
        let (gw, _) = gateway(&[(
            "tier=control-plane",
            &["kube-apiserver-cp1", "etcd-cp1", "etcd-cp2"],
        )]);
        let session = gw.open("kubeconfig").await.unwrap();

        let pod = session.find_pod(&PodSelector::default()).await.unwrap();
        assert_eq!(pod.pod_name, "etcd-cp1");
    }

    #[tokio::test]
    async fn test_pod_not_found() {
        let (gw, _) = gateway(&[("tier=control-plane", &["kube-apiserver-cp1"])]);
        let session = gw.open("kubeconfig").await.unwrap();

        let err = session.find_pod(&PodSelector::default()).await.unwrap_err();
        assert!(matches!(err, GatewayError::PodNotFound { .. }));
    }

    #[tokio::test]
    async fn test_cluster_info() {
        let (gw, _) = gateway(&[]);
        let session = gw.open("kubeconfig").await.unwrap();

        let info = session.cluster_info().await.unwrap();
        assert_eq!(info.version, "v1.30.1");
        assert_eq!(info.node_count, 3);
    }

    #[tokio::test]
    async fn test_session_releases_once() {
        let (gw, drops) = gateway(&[]);

        let session = gw.open("kubeconfig").await.unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(session);
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        // Early return path: the session is dropped with the error
        let result: GatewayResult<()> = async {
            let session = gw.open("kubeconfig").await?;
            session.find_pod(&PodSelector::default()).await?;
            Ok(())
        }
        .await;
        assert!(result.is_err());
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connector_error_propagates() {
        let (gw, _) = gateway(&[]);
        let err = gw.open("").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidCredentialFormat(_)));
    }

    #[tokio::test]
    async fn test_kube_connector_rejects_garbage() {
        let connector = KubeConnector::new(Duration::from_secs(1));
        let result = connector.connect("::: not a kubeconfig [").await;
        assert!(matches!(
            result.err(),
            Some(GatewayError::InvalidCredentialFormat(_))
        ));
    }
}
