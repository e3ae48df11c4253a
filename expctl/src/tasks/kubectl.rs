use crate::env::Env;
use anyhow::Result;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    env, fs,
    io::Write,
    path::Path,
    process::{Command, Stdio},
    thread, time,
};

/// Phases after which a pod will not change its scheduling anymore.
const SETTLED_POD_PHASES: [&str; 3] = ["Running", "Succeeded", "Failed"];
const POLL_INTERVAL: time::Duration = time::Duration::from_secs(2);
pub const MINICLUSTER_RESOURCE: &str = "miniclusters.flux-framework.org";

#[derive(Debug, Deserialize)]
struct PodList {
    items: Vec<PodItem>,
}

#[derive(Debug, Deserialize)]
struct PodItem {
    metadata: PodMetadata,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize)]
struct PodMetadata {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    phase: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pod {
    pub name: String,
    pub phase: String,
}

pub fn get_kubectl_cmd() -> String {
    env::var("EXPCTL_KUBECTL").unwrap_or_else(|_| "kubectl".to_string())
}

fn check_output(cmd: &str, output: &std::process::Output) -> Result<String> {
    match output.status.code() {
        Some(0) => {}
        Some(code) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = format!("{cmd}: exited with error (code: {code}): {stderr}");
            error!("{reason}");
            anyhow::bail!(reason);
        }
        None => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = format!("{cmd}: killed by signal: {stderr}");
            error!("{reason}");
            anyhow::bail!(reason);
        }
    }

    String::from_utf8(output.stdout.clone()).map_err(|e| {
        let reason = format!("{cmd}: output is not utf-8 (error={e:?})");
        error!("{reason}");
        anyhow::anyhow!(reason)
    })
}

/// # Description
///
/// Run a `kubectl` command and return its standard output. The command is
/// split with shell rules, so quoted arguments (e.g. JSONPath expressions)
/// are preserved.
pub fn run_kubectl_cmd(cmd: &str) -> Result<String> {
    debug!("{}(kubectl): running kubectl command: {cmd}", Env::SYS_NAME);
    let args = shell_words::split(cmd).map_err(|e| {
        let reason = format!("error splitting kubectl command (cmd={cmd}, error={e:?})");
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;

    let output = Command::new(get_kubectl_cmd())
        .args(&args)
        .output()
        .map_err(|e| {
            let reason = format!("failed to execute kubectl (cmd={cmd}, error={e:?})");
            error!("{reason}");
            anyhow::anyhow!(reason)
        })?;

    check_output(&format!("kubectl {cmd}"), &output)
}

/// Feed a manifest to `kubectl apply` through stdin.
pub fn apply_manifest(manifest: &str) -> Result<()> {
    let mut kubectl = Command::new(get_kubectl_cmd())
        .arg("apply")
        .arg("-f")
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            let reason = format!("failed to start kubectl apply (error={e:?})");
            error!("{reason}");
            anyhow::anyhow!(reason)
        })?;

    kubectl
        .stdin
        .as_mut()
        .ok_or_else(|| anyhow::anyhow!("failed to open stdin for kubectl"))?
        .write_all(manifest.as_bytes())
        .map_err(|e| {
            let reason = format!("failed to feed kubectl through stdin (error={e:?})");
            error!("{reason}");
            anyhow::anyhow!(reason)
        })?;

    let output = kubectl.wait_with_output()?;
    let stdout = check_output("kubectl apply -f -", &output)?;
    info!("{}", stdout.trim());

    Ok(())
}

/// Delete a MiniCluster, including its indexed job, config maps and service.
pub fn delete_minicluster(name: &str) -> Result<()> {
    let stdout = run_kubectl_cmd(&format!("delete {MINICLUSTER_RESOURCE} {name} --wait=true"))?;
    info!("{}", stdout.trim());
    Ok(())
}

pub fn parse_pod_list(json: &str) -> Result<Vec<Pod>> {
    let pods: PodList = serde_json::from_str(json).map_err(|e| {
        let reason = format!("error parsing pod list (error={e:?})");
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;

    Ok(pods
        .items
        .into_iter()
        .map(|item| Pod {
            name: item.metadata.name,
            phase: item.status.phase.unwrap_or_else(|| "Unknown".to_string()),
        })
        .collect())
}

pub fn list_pods(namespace: &str, selector: &str) -> Result<Vec<Pod>> {
    let output = run_kubectl_cmd(&format!("-n {namespace} get pods -l {selector} -o json"))?;
    parse_pod_list(&output)
}

/// Whether all `num_expected` pods exist and have left the pending phase.
pub fn pods_settled(pods: &[Pod], num_expected: usize) -> bool {
    pods.len() == num_expected
        && pods
            .iter()
            .all(|pod| SETTLED_POD_PHASES.contains(&pod.phase.as_str()))
}

/// # Description
///
/// Block until `num_expected` pods with label `app=<label>` are running or
/// done. There is no timeout, a MiniCluster that never schedules stalls the
/// experiment.
pub fn wait_for_pods(namespace: &str, label: &str, num_expected: usize) -> Result<Vec<Pod>> {
    loop {
        let pods = list_pods(namespace, &format!("app={label}"))?;
        debug!(
            "{}(kubectl): waiting for {num_expected} pods (label: {label}), phases: {:?}",
            Env::SYS_NAME,
            pods.iter().map(|pod| pod.phase.as_str()).collect::<Vec<_>>()
        );

        if pods_settled(&pods, num_expected) {
            return Ok(pods);
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// The lead broker of a MiniCluster is the pod with index zero.
pub fn leader_pod<'a>(pods: &'a [Pod], label: &str) -> Option<&'a Pod> {
    let zero_index = format!("{label}-0");
    pods.iter().find(|pod| pod.name.starts_with(&zero_index))
}

/// # Description
///
/// Follow the log of a pod until its container exits, retrying while the
/// container is not ready to serve logs or the log is still empty.
pub fn wait_for_logs(namespace: &str, pod: &str) -> Result<String> {
    loop {
        match run_kubectl_cmd(&format!("-n {namespace} logs -f {pod}")) {
            Ok(log) if !log.trim().is_empty() => return Ok(log),
            Ok(_) => debug!("{}(kubectl): empty log for {pod}", Env::SYS_NAME),
            Err(e) => warn!("{}(kubectl): log for {pod} not ready yet: {e}", Env::SYS_NAME),
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Save the node configuration of the cluster.
pub fn save_nodes(path: &Path) -> Result<()> {
    let output = run_kubectl_cmd("get nodes -o json")?;
    let nodes: serde_json::Value = serde_json::from_str(&output)?;

    fs::write(path, serde_json::to_string_pretty(&nodes)?).map_err(|e| {
        let reason = format!("error writing nodes (path={}, error={e:?})", path.display());
        error!("{reason}");
        anyhow::anyhow!(reason)
    })
}

/// # Description
///
/// Substitute `${VAR}` placeholders in a YAML template with `envsubst`.
pub fn template_yaml(yaml_path: &Path, env_vars: &BTreeMap<&str, String>) -> Result<String> {
    let yaml_content = fs::read_to_string(yaml_path).map_err(|e| {
        let reason = format!(
            "error reading template (path={}, error={e:?})",
            yaml_path.display()
        );
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;

    let mut envsubst_cmd = Command::new("envsubst");
    for (key, value) in env_vars {
        envsubst_cmd.env(key, value);
    }

    let mut envsubst = envsubst_cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            let reason = format!("failed to start envsubst (error={e:?})");
            error!("{reason}");
            anyhow::anyhow!(reason)
        })?;

    envsubst
        .stdin
        .as_mut()
        .ok_or_else(|| anyhow::anyhow!("failed to open stdin for envsubst"))?
        .write_all(yaml_content.as_bytes())?;

    let result = envsubst.wait_with_output()?;
    check_output("envsubst", &result)
}
