//! Common test utilities and helpers
//!
//! `FakeCluster` stands in for a Kubernetes control plane whose etcd pod
//! interprets the etcdctl command lines the service sends.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use kubetcd_api::audit::AuditSink;
use kubetcd_api::encryption::{CredentialVault, EncryptionKey};
use kubetcd_api::etcd::{ClusterTarget, EtcdContext, EtcdKeyService, EtcdSettings};
use kubetcd_api::kubernetes::{
    ClusterGateway, Connector, ControlPlane, ExecOutput, GatewayError, GatewayResult,
    PodReference,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const KUBECONFIG: &str = "apiVersion: v1\nkind: Config\nclusters: []\ncontexts: []\nusers: []\n";
pub const ETCD_POD: &str = "etcd-control-plane-0";
pub const SERVER_VERSION: &str = "v1.30.2";

#[derive(Default)]
struct FakeState {
    data: BTreeMap<String, String>,
    pods: HashMap<String, Vec<String>>,
    failing_ops: HashSet<String>,
    exec_delay: Option<Duration>,
    connections: usize,
    commands: Vec<Vec<String>>,
    exec_pods: Vec<String>,
}

/// In-memory cluster with an etcd pod
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCluster {
    /// Cluster whose etcd pod carries `component=etcd`
    pub fn new() -> Self {
        let cluster = Self::default();
        cluster.set_pods("component=etcd", &[ETCD_POD]);
        cluster
    }

    /// Cluster with no pods at all
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set_pods(&self, selector: &str, names: &[&str]) {
        self.state.lock().unwrap().pods.insert(
            selector.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        );
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .data
            .insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.state.lock().unwrap().data.get(key).cloned()
    }

    /// Make every etcdctl call whose first word is `op` exit non-zero
    pub fn fail_op(&self, op: &str) {
        self.state.lock().unwrap().failing_ops.insert(op.to_string());
    }

    pub fn set_exec_delay(&self, delay: Duration) {
        self.state.lock().unwrap().exec_delay = Some(delay);
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Pod each command ran in, in order
    pub fn exec_pods(&self) -> Vec<String> {
        self.state.lock().unwrap().exec_pods.clone()
    }

    fn run_etcdctl(&self, argv: &[String]) -> ExecOutput {
        let mut state = self.state.lock().unwrap();
        state.commands.push(argv.to_vec());

        // etcdctl plus four connection flags
        let args: Vec<&str> = argv.iter().skip(5).map(String::as_str).collect();
        let Some(op) = args.first().copied() else {
            return failure("no command");
        };

        if state.failing_ops.contains(op) {
            return failure("etcdserver: request failed");
        }

        let (flags, operands) = match args.iter().position(|a| *a == "--") {
            Some(idx) => (&args[1..idx], &args[idx + 1..]),
            None => (&args[1..], &args[args.len()..]),
        };
        let has = |flag: &str| flags.iter().any(|f| *f == flag);

        match op {
            "get" => {
                let prefix = operands[0];
                let limit = flags
                    .iter()
                    .find_map(|f| f.strip_prefix("--limit="))
                    .and_then(|l| l.parse::<usize>().ok())
                    .unwrap_or(usize::MAX);
                let matches: Vec<(&String, &String)> = state
                    .data
                    .range(prefix.to_string()..)
                    .take_while(|(k, _)| {
                        if has("--prefix") {
                            k.starts_with(prefix)
                        } else {
                            k.as_str() == prefix
                        }
                    })
                    .take(limit)
                    .collect();

                if has("--keys-only") {
                    ok(matches.iter().map(|(k, _)| format!("{}\n\n", k)).collect())
                } else {
                    let b64 = base64::engine::general_purpose::STANDARD;
                    let kvs: Vec<serde_json::Value> = matches
                        .iter()
                        .map(|(k, v)| {
                            serde_json::json!({
                                "key": b64.encode(k.as_bytes()),
                                "value": b64.encode(v.as_bytes()),
                                "mod_revision": 7,
                            })
                        })
                        .collect();
                    let count = kvs.len();
                    ok(serde_json::json!({"header": {"revision": 7}, "kvs": kvs, "count": count})
                        .to_string())
                }
            }
            "put" => {
                state
                    .data
                    .insert(operands[0].to_string(), operands[1].to_string());
                ok("OK\n".to_string())
            }
            "del" => {
                let target = operands[0].to_string();
                let before = state.data.len();
                if has("--prefix") {
                    state.data.retain(|k, _| !k.starts_with(&target));
                } else {
                    state.data.remove(&target);
                }
                ok(format!("{}\n", before - state.data.len()))
            }
            "endpoint" if args.get(1) == Some(&"health") => ok(
                r#"[{"endpoint":"https://127.0.0.1:2379","health":true,"took":"1.2ms"}]"#.to_string(),
            ),
            "endpoint" => ok(
                r#"[{"Endpoint":"https://127.0.0.1:2379","Status":{"version":"3.5.12","dbSize":2048}}]"#
                    .to_string(),
            ),
            "member" => ok(r#"{"members":[{"ID":1,"name":"control-plane-0"}]}"#.to_string()),
            other => failure(&format!("unknown command '{}'", other)),
        }
    }
}

fn ok(stdout: String) -> ExecOutput {
    ExecOutput {
        stdout,
        stderr: String::new(),
        exit_code: 0,
    }
}

fn failure(stderr: &str) -> ExecOutput {
    ExecOutput {
        stdout: String::new(),
        stderr: format!("Error: {}\n", stderr),
        exit_code: 1,
    }
}

struct FakePlane {
    cluster: FakeCluster,
}

#[async_trait]
impl ControlPlane for FakePlane {
    async fn server_version(&self) -> GatewayResult<String> {
        Ok(SERVER_VERSION.to_string())
    }

    async fn node_count(&self) -> GatewayResult<u32> {
        Ok(3)
    }

    async fn list_pods(&self, _namespace: &str, label_selector: &str) -> GatewayResult<Vec<String>> {
        let state = self.cluster.state.lock().unwrap();
        Ok(state.pods.get(label_selector).cloned().unwrap_or_default())
    }

    async fn exec(&self, pod: &PodReference, command: &[String]) -> GatewayResult<ExecOutput> {
        let delay = {
            let mut state = self.cluster.state.lock().unwrap();
            state.exec_pods.push(pod.pod_name.clone());
            state.exec_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.cluster.run_etcdctl(command))
    }
}

/// Accepts any YAML mapping that names an apiVersion
pub struct FakeConnector {
    cluster: FakeCluster,
}

impl FakeConnector {
    pub fn new(cluster: FakeCluster) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, credential: &str) -> GatewayResult<Box<dyn ControlPlane>> {
        if !credential.contains("apiVersion") {
            return Err(GatewayError::InvalidCredentialFormat(
                "missing apiVersion".to_string(),
            ));
        }

        self.cluster.state.lock().unwrap().connections += 1;
        Ok(Box::new(FakePlane {
            cluster: self.cluster.clone(),
        }))
    }
}

pub fn test_vault() -> CredentialVault {
    CredentialVault::new(EncryptionKey::derive("integration-test-secret"))
}

pub fn fake_gateway(cluster: &FakeCluster) -> ClusterGateway {
    ClusterGateway::new(
        Arc::new(FakeConnector::new(cluster.clone())),
        Duration::from_secs(2),
    )
}

pub fn etcd_context(
    cluster: &FakeCluster,
    audit: Arc<dyn AuditSink>,
    command_timeout: Duration,
) -> Arc<EtcdContext> {
    Arc::new(EtcdContext {
        gateway: fake_gateway(cluster),
        vault: test_vault(),
        audit,
        settings: EtcdSettings {
            command_timeout,
            ..EtcdSettings::default()
        },
    })
}

/// Service for cluster 1 acting as `tester`
pub fn key_service(ctx: &Arc<EtcdContext>) -> EtcdKeyService {
    let encrypted_credential = ctx.vault.seal(KUBECONFIG).unwrap();
    EtcdKeyService::new(
        ctx.clone(),
        ClusterTarget {
            cluster_id: 1,
            user_id: Some("tester".to_string()),
            encrypted_credential,
        },
    )
}
