//! etcdctl command lines and output parsing
//!
//! Every command is `etcdctl` followed by the trusted connection prefix and
//! then the operation's arguments. Positional keys always come after `--` so
//! a key or value starting with `-` is never read as a flag.

use base64::Engine;
use kubetcd_common::etcd::KvEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ETCDCTL: &str = "etcdctl";

/// Connection flags passed to every etcdctl invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtcdctlConfig {
    pub endpoint: String,
    pub cacert: String,
    pub cert: String,
    pub key: String,
}

impl Default for EtcdctlConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://127.0.0.1:2379".to_string(),
            cacert: "/etc/kubernetes/pki/etcd/ca.crt".to_string(),
            cert: "/etc/kubernetes/pki/etcd/server.crt".to_string(),
            key: "/etc/kubernetes/pki/etcd/server.key".to_string(),
        }
    }
}

impl EtcdctlConfig {
    /// Full argv: program, connection prefix, then `args`
    pub fn command(&self, args: Vec<String>) -> Vec<String> {
        let mut argv = Vec::with_capacity(args.len() + 5);
        argv.push(ETCDCTL.to_string());
        argv.push(format!("--endpoints={}", self.endpoint));
        argv.push(format!("--cacert={}", self.cacert));
        argv.push(format!("--cert={}", self.cert));
        argv.push(format!("--key={}", self.key));
        argv.extend(args);
        argv
    }
}

pub fn list_args(prefix: &str, keys_only: bool, limit: u32) -> Vec<String> {
    let mut args = vec!["get".to_string(), "--prefix".to_string()];
    if keys_only {
        args.push("--keys-only".to_string());
    } else {
        args.push("--write-out=json".to_string());
    }
    args.push(format!("--limit={}", limit));
    args.push("--".to_string());
    args.push(prefix.to_string());
    args
}

/// Single key in JSON form so binary values and trailing newlines survive
pub fn get_args(key: &str) -> Vec<String> {
    vec![
        "get".to_string(),
        "--write-out=json".to_string(),
        "--".to_string(),
        key.to_string(),
    ]
}

pub fn put_args(key: &str, value: &str) -> Vec<String> {
    vec![
        "put".to_string(),
        "--".to_string(),
        key.to_string(),
        value.to_string(),
    ]
}

pub fn delete_args(key: &str, prefix: bool) -> Vec<String> {
    let mut args = vec!["del".to_string()];
    if prefix {
        args.push("--prefix".to_string());
    }
    args.push("--".to_string());
    args.push(key.to_string());
    args
}

pub fn endpoint_health_args() -> Vec<String> {
    vec![
        "endpoint".to_string(),
        "health".to_string(),
        "--write-out=json".to_string(),
    ]
}

pub fn endpoint_status_args() -> Vec<String> {
    vec![
        "endpoint".to_string(),
        "status".to_string(),
        "--write-out=json".to_string(),
    ]
}

pub fn member_list_args() -> Vec<String> {
    vec![
        "member".to_string(),
        "list".to_string(),
        "--write-out=json".to_string(),
    ]
}

/// Keys from `get --keys-only`: one per line, blank separator lines dropped
pub fn parse_key_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    kvs: Vec<RangeKv>,
}

#[derive(Debug, Deserialize)]
struct RangeKv {
    key: String,
    #[serde(default)]
    value: String,
}

/// Entries from `get --write-out=json`, where keys and values are base64
pub fn parse_json_listing(output: &str) -> Result<Vec<KvEntry>, String> {
    let response: RangeResponse = serde_json::from_str(output.trim())
        .map_err(|e| format!("unexpected etcdctl JSON output: {}", e))?;

    response
        .kvs
        .into_iter()
        .map(|kv| {
            let key = String::from_utf8_lossy(&decode_base64(&kv.key)?).into_owned();
            let (value, binary) = match String::from_utf8(decode_base64(&kv.value)?) {
                Ok(text) => (text, false),
                Err(e) => (
                    base64::engine::general_purpose::STANDARD.encode(e.into_bytes()),
                    true,
                ),
            };
            Ok(KvEntry { key, value, binary })
        })
        .collect()
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, String> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| format!("invalid base64 in etcdctl output: {}", e))
}

/// Number of deleted keys printed by `del`
pub fn parse_delete_count(output: &str) -> Result<u64, String> {
    let trimmed = output.trim();
    trimmed
        .parse()
        .map_err(|_| format!("unexpected etcdctl delete output: '{}'", trimmed))
}

/// Parsed JSON, or the raw text when it is not JSON
pub fn parse_json_or_raw(output: &str) -> Value {
    serde_json::from_str(output.trim()).unwrap_or_else(|_| Value::String(output.to_string()))
}
