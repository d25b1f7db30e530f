use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::core::fanout;
use crate::core::process;

const SSH_TIMEOUT: Duration = Duration::from_secs(60);

/// Remote JSON-RPC queries against the node's local RPC port.
const NODE_ROLES_QUERY: &str = r#"curl -s -H 'Content-Type: application/json' -d '{"id":1,"jsonrpc":"2.0","method":"system_nodeRoles","params":[]}' http://localhost:9933"#;
const NODE_HEALTH_QUERY: &str = r#"curl -s -H 'Content-Type: application/json' -d '{"id":1,"jsonrpc":"2.0","method":"system_health","params":[]}' http://localhost:9933"#;

fn lock_query(chain: &str) -> String {
    format!("consul kv get -detailed {}/validator", chain)
}

/// SSH access to the provisioned instances.
#[derive(Debug, Clone)]
pub struct SshSession {
    pub user: String,
    pub key_file: PathBuf,
}

impl SshSession {
    pub async fn exec(&self, ip: &str, command: &str) -> Result<String> {
        let key = self.key_file.to_string_lossy().to_string();
        let target = format!("{}@{}", self.user, ip);
        let args = [
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "LogLevel=ERROR",
            "-i",
            &key,
            &target,
            command,
        ];
        process::run_command("ssh", &args, SSH_TIMEOUT).await
    }
}

/// Generate a throwaway RSA keypair for the test machines. Returns the
/// private key path and the public key line.
pub async fn generate_ssh_keypair(dir: &Path) -> Result<(PathBuf, String)> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let key_path = dir.join("failcheck_rsa");
    let pub_path = key_path.with_extension("pub");
    // ssh-keygen refuses to overwrite.
    let _ = tokio::fs::remove_file(&key_path).await;
    let _ = tokio::fs::remove_file(&pub_path).await;

    let key = key_path.to_string_lossy().to_string();
    process::run_command(
        "ssh-keygen",
        &["-t", "rsa", "-b", "4096", "-N", "", "-q", "-f", &key],
        Duration::from_secs(60),
    )
    .await?;
    let public = tokio::fs::read_to_string(&pub_path)
        .await
        .with_context(|| format!("Failed to read {}", pub_path.display()))?;
    Ok((key_path, public.trim().to_string()))
}

// --- Parsers over the remote textual output ---

/// Held locks in `consul kv get -detailed` output: one `Session` row per
/// lock; a missing or dash session means the key is unlocked.
pub fn parse_lock_count(output: &str) -> u32 {
    output
        .lines()
        .filter(|line| {
            let mut parts = line.split_whitespace();
            parts.next() == Some("Session")
                && parts.next().map_or(false, |session| session != "-")
        })
        .count() as u32
}

/// (alive, total) rows of a `consul members` table.
pub fn parse_alive_members(output: &str) -> (usize, usize) {
    let mut alive = 0;
    let mut total = 0;
    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        total += 1;
        if fields[2] == "alive" {
            alive += 1;
        }
    }
    (alive, total)
}

#[derive(Deserialize)]
struct RpcEnvelope<T> {
    result: T,
}

/// Roles reported by the node; `Authority` marks the active validator.
pub fn parse_node_roles(json: &str) -> Result<Vec<String>> {
    let envelope: RpcEnvelope<Vec<String>> =
        serde_json::from_str(json).context("Invalid node-roles response")?;
    Ok(envelope.result)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealth {
    pub peers: u64,
    pub is_syncing: bool,
    #[serde(default)]
    pub should_have_peers: bool,
}

impl NodeHealth {
    pub fn is_healthy(&self) -> bool {
        !self.is_syncing && (!self.should_have_peers || self.peers >= 1)
    }
}

pub fn parse_node_health(json: &str) -> Result<NodeHealth> {
    let envelope: RpcEnvelope<NodeHealth> =
        serde_json::from_str(json).context("Invalid health response")?;
    Ok(envelope.result)
}

/// A viable failover cluster is an odd number of instances, three or more.
pub fn check_instance_count(count: usize) -> Result<()> {
    if count < 3 {
        bail!(
            "minimum viable instance count (3) not reached: {} running",
            count
        );
    }
    if count % 2 == 0 {
        bail!("even number of instances running: {}", count);
    }
    Ok(())
}

// --- Cluster-wide checks, one SSH probe per instance ---

/// Every instance must see exactly one Consul lock.
pub async fn consul_lock_check(session: &SshSession, ips: &[String], chain: &str) -> Result<()> {
    let session = session.clone();
    let query = lock_query(chain);
    let counts = fanout::collect_all(ips.to_vec(), move |ip| {
        let session = session.clone();
        let query = query.clone();
        async move {
            let output = session
                .exec(&ip, &query)
                .await
                .with_context(|| format!("consul lock query on {}", ip))?;
            Ok::<u32, anyhow::Error>(parse_lock_count(&output))
        }
    })
    .await?;

    for (ip, count) in &counts {
        if *count != 1 {
            bail!(
                "instance {} sees {} consul lock(s), expected exactly 1",
                ip,
                count
            );
        }
    }
    info!(
        instances = counts.len(),
        "consul lock check passed: each node sees exactly 1 lock"
    );
    Ok(())
}

/// Every instance must see the whole cluster alive.
pub async fn consul_members_check(session: &SshSession, ips: &[String]) -> Result<()> {
    let expected = ips.len();
    let session = session.clone();
    let members = fanout::collect_all(ips.to_vec(), move |ip| {
        let session = session.clone();
        async move {
            let output = session
                .exec(&ip, "consul members")
                .await
                .with_context(|| format!("consul members on {}", ip))?;
            Ok::<(usize, usize), anyhow::Error>(parse_alive_members(&output))
        }
    })
    .await?;

    for (ip, (alive, total)) in &members {
        if *total != expected || *alive != expected {
            bail!(
                "instance {} sees {}/{} members alive, expected {}/{}",
                ip,
                alive,
                total,
                expected,
                expected
            );
        }
    }
    info!(
        instances = expected,
        "consul members check passed: all nodes see the full healthy cluster"
    );
    Ok(())
}

/// Exactly one instance may run in validator (Authority) mode.
pub async fn leader_check(session: &SshSession, ips: &[String]) -> Result<()> {
    let session = session.clone();
    let roles = fanout::collect_all(ips.to_vec(), move |ip| {
        let session = session.clone();
        async move {
            let output = session
                .exec(&ip, NODE_ROLES_QUERY)
                .await
                .with_context(|| format!("node-roles query on {}", ip))?;
            let roles = parse_node_roles(&output)?;
            Ok::<bool, anyhow::Error>(roles.iter().any(|r| r == "Authority"))
        }
    })
    .await?;

    let leaders: Vec<&String> = roles
        .iter()
        .filter(|(_, is_leader)| **is_leader)
        .map(|(ip, _)| ip)
        .collect();
    if leaders.len() != 1 {
        bail!(
            "expected exactly 1 leader, found {}: [{}]",
            leaders.len(),
            leaders
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    info!(leader = %leaders[0], "leader check passed: exactly 1 validator found");
    Ok(())
}

/// Every instance's node must report itself healthy.
pub async fn node_health_check(session: &SshSession, ips: &[String]) -> Result<()> {
    let session = session.clone();
    let health = fanout::collect_all(ips.to_vec(), move |ip| {
        let session = session.clone();
        async move {
            let output = session
                .exec(&ip, NODE_HEALTH_QUERY)
                .await
                .with_context(|| format!("health query on {}", ip))?;
            parse_node_health(&output)
        }
    })
    .await?;

    let unhealthy: Vec<String> = health
        .iter()
        .filter(|(_, h)| !h.is_healthy())
        .map(|(ip, h)| format!("{} (peers={}, syncing={})", ip, h.peers, h.is_syncing))
        .collect();
    if !unhealthy.is_empty() {
        bail!("unhealthy instances: {}", unhealthy.join(", "));
    }
    info!(
        instances = health.len(),
        "node health check passed: all instances are healthy"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCKED_KV: &str = "\
CreateIndex      1234
Flags            0
Key              westend/validator
LockIndex        1
ModifyIndex      1290
Session          b1c0e1d4-5a90-2f1e-0392-aabbccddeeff
Value            node-1";

    const UNLOCKED_KV: &str = "\
CreateIndex      1234
Flags            0
Key              westend/validator
LockIndex        0
ModifyIndex      1290
Session          -
Value            node-1";

    const MEMBERS: &str = "\
Node    Address          Status  Type    Build  Protocol  DC   Segment
node-1  10.0.0.1:8301    alive   server  1.9.5  2         dc1  <all>
node-2  10.0.0.2:8301    alive   server  1.9.5  2         dc1  <all>
node-3  10.0.0.3:8301    left    server  1.9.5  2         dc1  <all>";

    #[test]
    fn lock_count_on_held_lock() {
        assert_eq!(parse_lock_count(LOCKED_KV), 1);
    }

    #[test]
    fn lock_count_on_released_lock() {
        assert_eq!(parse_lock_count(UNLOCKED_KV), 0);
    }

    #[test]
    fn lock_count_on_empty_output() {
        assert_eq!(parse_lock_count(""), 0);
    }

    #[test]
    fn members_table_counts_alive_rows() {
        assert_eq!(parse_alive_members(MEMBERS), (2, 3));
    }

    #[test]
    fn members_table_empty() {
        assert_eq!(parse_alive_members("Node Address Status"), (0, 0));
    }

    #[test]
    fn node_roles_authority() {
        let json = r#"{"jsonrpc":"2.0","result":["Authority"],"id":1}"#;
        let roles = parse_node_roles(json).unwrap();
        assert_eq!(roles, vec!["Authority"]);
    }

    #[test]
    fn node_roles_rejects_garbage() {
        assert!(parse_node_roles("not json").is_err());
    }

    #[test]
    fn node_health_parses_and_judges() {
        let json =
            r#"{"jsonrpc":"2.0","result":{"peers":2,"isSyncing":false,"shouldHavePeers":true},"id":1}"#;
        let health = parse_node_health(json).unwrap();
        assert!(health.is_healthy());

        let json =
            r#"{"jsonrpc":"2.0","result":{"peers":0,"isSyncing":false,"shouldHavePeers":true},"id":1}"#;
        assert!(!parse_node_health(json).unwrap().is_healthy());

        let json =
            r#"{"jsonrpc":"2.0","result":{"peers":2,"isSyncing":true,"shouldHavePeers":true},"id":1}"#;
        assert!(!parse_node_health(json).unwrap().is_healthy());
    }

    #[test]
    fn lone_dev_node_without_peers_is_healthy() {
        let json =
            r#"{"jsonrpc":"2.0","result":{"peers":0,"isSyncing":false,"shouldHavePeers":false},"id":1}"#;
        assert!(parse_node_health(json).unwrap().is_healthy());
    }

    #[test]
    fn instance_count_must_be_odd_and_viable() {
        assert!(check_instance_count(3).is_ok());
        assert!(check_instance_count(5).is_ok());
        assert!(check_instance_count(1).is_err());
        assert!(check_instance_count(2).is_err());
        assert!(check_instance_count(4).is_err());
        assert!(check_instance_count(0).is_err());
    }

    #[test]
    fn lock_query_is_scoped_to_the_chain() {
        assert_eq!(
            lock_query("westend"),
            "consul kv get -detailed westend/validator"
        );
    }
}
