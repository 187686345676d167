use crate::errors::LifecycleError;
use crate::manifest::NodeManifest;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{instrument, warn};

/// Substrings an external provisioning CLI is expected to emit on stderr
/// when the failure is a backend capacity problem rather than a request
/// error — these map to `ProvisioningUnavailable` (503) instead of a hard
/// failure, since retrying later is the right response (§4.9, §7).
const TRANSIENT_FAILURE_MARKERS: &[&str] = &["quota", "capacity unavailable", "not enabled", "no instances"];

#[derive(Debug, Clone)]
pub enum ProvisionOutcome {
    Launched { endpoint: Option<String> },
    Terminated,
    Status(String),
}

/// Thin wrapper around an external node-provisioning binary. The binary's
/// name and argument shape are operator-configured; this type only owns
/// the process-spawning and output-classification contract (§4.9).
pub struct OrchestratorCli {
    binary_path: String,
}

impl OrchestratorCli {
    pub fn new(binary_path: String) -> Self {
        Self { binary_path }
    }

    #[instrument(skip(self, manifest))]
    pub async fn launch_node(&self, manifest: &NodeManifest) -> Result<ProvisionOutcome, LifecycleError> {
        let rendered = manifest.render()?;
        let output = self.run(&["launch", "--manifest-stdin"], Some(rendered)).await?;
        let endpoint = output
            .lines()
            .find_map(|line| line.strip_prefix("endpoint="))
            .map(|s| s.trim().to_string());
        Ok(ProvisionOutcome::Launched { endpoint })
    }

    #[instrument(skip(self))]
    pub async fn terminate_node(&self, cluster_name: &str) -> Result<ProvisionOutcome, LifecycleError> {
        self.run(&["terminate", cluster_name], None).await?;
        Ok(ProvisionOutcome::Terminated)
    }

    #[instrument(skip(self))]
    pub async fn status(&self, cluster_name: &str) -> Result<ProvisionOutcome, LifecycleError> {
        let output = self.run(&["status", cluster_name], None).await?;
        Ok(ProvisionOutcome::Status(output))
    }

    async fn run(&self, args: &[&str], stdin_payload: Option<String>) -> Result<String, LifecycleError> {
        let mut command = Command::new(&self.binary_path);
        command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if stdin_payload.is_some() {
            command.stdin(Stdio::piped());
        }

        let mut child = command.spawn()?;

        if let Some(payload) = stdin_payload {
            let mut stdin = child.stdin.take().expect("stdin was requested via Stdio::piped");
            stdin.write_all(payload.as_bytes()).await?;
            drop(stdin);
        }

        let output = child.wait_with_output().await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            let lower = stderr.to_lowercase();
            if TRANSIENT_FAILURE_MARKERS.iter().any(|m| lower.contains(m)) {
                warn!(stderr = %stderr, "provisioning backend reported a transient failure");
                Err(LifecycleError::ProvisioningUnavailable(stderr))
            } else {
                Err(LifecycleError::ProvisioningUnavailable(format!(
                    "provisioning command exited with {}: {stderr}",
                    output.status
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_quota_stderr_as_transient() {
        let stderr = "Error: quota exceeded for region us-east-1";
        assert!(TRANSIENT_FAILURE_MARKERS.iter().any(|m| stderr.to_lowercase().contains(m)));
    }

    #[tokio::test]
    async fn launch_runs_real_binary_and_parses_endpoint() {
        let cli = OrchestratorCli::new("/bin/echo".into());
        let manifest = NodeManifest {
            cluster_name: "cic-aws-us-east-1-ab12cd".into(),
            provider: "aws".into(),
            region_code: "us-east-1".into(),
            instance_typename: "g5.xlarge".into(),
            model_canonical_name: "llama-3.1-70b".into(),
            tenant_id: None,
            spot: false,
            gpu_type: "auto".into(),
            gpu_count: 0,
            disk_size_gib: 100,
            vllm_args: Vec::new(),
            streamer_concurrency: 1,
            streamer_memory_limit_bytes: 0,
            gpu_memory_utilization: 0.9,
            use_runai_streamer: false,
            engine_version: "latest".into(),
            accelerator_runtime_version: "latest".into(),
        };
        // /bin/echo ignores stdin and just echoes its argv, so there is no
        // `endpoint=` line — this exercises the "no endpoint parsed" path.
        let outcome = cli.launch_node(&manifest).await.unwrap();
        assert!(matches!(outcome, ProvisionOutcome::Launched { endpoint: None }));
    }
}
