use crate::errors::LifecycleError;
use std::fmt::Write as _;

/// Allowed characters in any manifest field. Provider/region/instance-type
/// names and cluster names are operator-controlled, but they ultimately
/// flow into a file handed to an external CLI — the allowlist keeps a
/// stray field from breaking out of its YAML scalar.
fn is_safe_scalar_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '/')
}

fn escape_scalar(field: &str, value: &str) -> Result<String, LifecycleError> {
    if value.is_empty() {
        return Err(LifecycleError::InvalidManifest(format!("{field} must not be empty")));
    }
    if !value.chars().all(is_safe_scalar_char) {
        return Err(LifecycleError::InvalidManifest(format!(
            "{field} contains a character outside the allowed set: {value:?}"
        )));
    }
    Ok(value.to_string())
}

/// vLLM flags a `NodeConfig` may set. Enforced by flag name, not just by
/// escaping values — an unlisted flag is rejected outright so a caller
/// can never smuggle an arbitrary CLI switch into the rendered manifest
/// (§4.9, §9 security note).
pub const VLLM_ARG_ALLOWLIST: &[&str] = &[
    "max-model-len",
    "max-num-seqs",
    "tensor-parallel-size",
    "pipeline-parallel-size",
    "dtype",
    "quantization",
    "kv-cache-dtype",
    "swap-space",
    "enforce-eager",
    "trust-remote-code",
    "disable-log-requests",
];

pub const DEFAULT_STREAMER_CONCURRENCY: u32 = 32;
pub const DEFAULT_STREAMER_MEMORY_LIMIT_BYTES: u64 = 5 * 1024 * 1024 * 1024;
pub const DEFAULT_GPU_MEMORY_UTILIZATION: f64 = 0.95;
pub const DEFAULT_USE_RUNAI_STREAMER: bool = true;

/// Validates every `(flag, value)` pair against `VLLM_ARG_ALLOWLIST` and
/// escapes the value, returning the pairs in their original order so the
/// rendered `run` section is deterministic.
fn validate_vllm_args(args: &[(String, String)]) -> Result<Vec<(String, String)>, LifecycleError> {
    args.iter()
        .map(|(flag, value)| {
            if !VLLM_ARG_ALLOWLIST.contains(&flag.as_str()) {
                return Err(LifecycleError::InvalidManifest(format!(
                    "vLLM flag --{flag} is not in the allowlist"
                )));
            }
            let value = escape_scalar(&format!("vllm_arg[{flag}]"), value)?;
            Ok((flag.clone(), value))
        })
        .collect()
}

/// The declarative provisioning request handed to the orchestrator CLI for
/// one node — the `NodeConfig` of §4.9, rendered as a minimal
/// `resources`/`setup`/`run` YAML document (§6) rather than built with a
/// full YAML library, since the field set is fixed and every value is
/// allowlist-validated before it is written.
pub struct NodeManifest {
    pub cluster_name: String,
    pub provider: String,
    pub region_code: String,
    pub instance_typename: String,
    pub model_canonical_name: String,
    pub tenant_id: Option<String>,
    pub spot: bool,
    pub gpu_type: String,
    pub gpu_count: u32,
    pub disk_size_gib: u32,
    pub vllm_args: Vec<(String, String)>,
    pub streamer_concurrency: u32,
    pub streamer_memory_limit_bytes: u64,
    pub gpu_memory_utilization: f64,
    pub use_runai_streamer: bool,
    pub engine_version: String,
    pub accelerator_runtime_version: String,
}

impl NodeManifest {
    /// True when `gpu_type` is the literal `auto` sentinel — the only
    /// case in which `gpu_count` is not required (§4.9).
    fn gpu_is_auto(&self) -> bool {
        self.gpu_type.eq_ignore_ascii_case("auto")
    }

    pub fn render(&self) -> Result<String, LifecycleError> {
        if !self.gpu_is_auto() && self.gpu_count == 0 {
            return Err(LifecycleError::InvalidManifest(
                "gpu_count is required when gpu_type is not \"auto\"".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.gpu_memory_utilization) {
            return Err(LifecycleError::InvalidManifest(
                "gpu_memory_utilization must be between 0.0 and 1.0".to_string(),
            ));
        }

        let cluster_name = escape_scalar("cluster_name", &self.cluster_name)?;
        let provider = escape_scalar("provider", &self.provider)?;
        let region_code = escape_scalar("region_code", &self.region_code)?;
        let instance_typename = escape_scalar("instance_typename", &self.instance_typename)?;
        let model_canonical_name = escape_scalar("model_canonical_name", &self.model_canonical_name)?;
        let gpu_type = escape_scalar("gpu_type", &self.gpu_type)?;
        let engine_version = escape_scalar("engine_version", &self.engine_version)?;
        let accelerator_runtime_version = escape_scalar("accelerator_runtime_version", &self.accelerator_runtime_version)?;
        let vllm_args = validate_vllm_args(&self.vllm_args)?;

        let mut out = String::new();

        let _ = writeln!(out, "resources:");
        let _ = writeln!(out, "  cloud: {provider}");
        let _ = writeln!(out, "  region: {region_code}");
        let _ = writeln!(out, "  instance_type: {instance_typename}");
        let _ = writeln!(out, "  gpu_type: {gpu_type}");
        let _ = writeln!(out, "  gpu_count: {}", self.gpu_count);
        let _ = writeln!(out, "  disk_size_gib: {}", self.disk_size_gib);
        let _ = writeln!(out, "  spot: {}", self.spot);

        let _ = writeln!(out, "setup:");
        let _ = writeln!(out, "  engine_version: {engine_version}");
        let _ = writeln!(out, "  accelerator_runtime_version: {accelerator_runtime_version}");
        let _ = writeln!(out, "  install: |");
        let _ = writeln!(out, "    install-engine --version {engine_version}");
        let _ = writeln!(
            out,
            "    install-accelerator-runtime --version {accelerator_runtime_version}"
        );

        let _ = writeln!(out, "run:");
        let _ = writeln!(out, "  cluster_name: {cluster_name}");
        let _ = writeln!(out, "  model: {model_canonical_name}");
        if let Some(tenant_id) = &self.tenant_id {
            let tenant_id = escape_scalar("tenant_id", tenant_id)?;
            let _ = writeln!(out, "  tenant_id: {tenant_id}");
        }
        let _ = writeln!(out, "  gpu_memory_utilization: {}", self.gpu_memory_utilization);
        let _ = writeln!(out, "  use_runai_streamer: {}", self.use_runai_streamer);
        let _ = writeln!(out, "  streamer_concurrency: {}", self.streamer_concurrency);
        let _ = writeln!(out, "  streamer_memory_limit_bytes: {}", self.streamer_memory_limit_bytes);
        let _ = writeln!(out, "  credentials_from_env: true");
        if vllm_args.is_empty() {
            let _ = writeln!(out, "  vllm_args: []");
        } else {
            let _ = writeln!(out, "  vllm_args:");
            for (flag, value) in &vllm_args {
                let _ = writeln!(out, "    - {flag}: {value}");
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NodeManifest {
        NodeManifest {
            cluster_name: "cic-aws-us-east-1-ab12cd".into(),
            provider: "aws".into(),
            region_code: "us-east-1".into(),
            instance_typename: "g5.xlarge".into(),
            model_canonical_name: "llama-3.1-70b".into(),
            tenant_id: None,
            spot: true,
            gpu_type: "A10G".into(),
            gpu_count: 1,
            disk_size_gib: 200,
            vllm_args: vec![("max-model-len".into(), "8192".into())],
            streamer_concurrency: DEFAULT_STREAMER_CONCURRENCY,
            streamer_memory_limit_bytes: DEFAULT_STREAMER_MEMORY_LIMIT_BYTES,
            gpu_memory_utilization: DEFAULT_GPU_MEMORY_UTILIZATION,
            use_runai_streamer: DEFAULT_USE_RUNAI_STREAMER,
            engine_version: "0.6.3".into(),
            accelerator_runtime_version: "12.4".into(),
        }
    }

    #[test]
    fn renders_every_required_field() {
        let rendered = sample().render().unwrap();
        assert!(rendered.contains("cluster_name: cic-aws-us-east-1-ab12cd"));
        assert!(rendered.contains("gpu_type: A10G"));
        assert!(rendered.contains("gpu_count: 1"));
        assert!(rendered.contains("disk_size_gib: 200"));
        assert!(rendered.contains("streamer_concurrency: 32"));
        assert!(rendered.contains("streamer_memory_limit_bytes: 5368709120"));
        assert!(rendered.contains("gpu_memory_utilization: 0.95"));
        assert!(rendered.contains("use_runai_streamer: true"));
        assert!(rendered.contains("- max-model-len: 8192"));
        assert!(!rendered.contains("tenant_id"));
    }

    #[test]
    fn renders_resources_setup_run_sections() {
        let rendered = sample().render().unwrap();
        let resources_at = rendered.find("resources:").unwrap();
        let setup_at = rendered.find("setup:").unwrap();
        let run_at = rendered.find("run:").unwrap();
        assert!(resources_at < setup_at);
        assert!(setup_at < run_at);
    }

    #[test]
    fn rejects_fields_with_unsafe_characters() {
        let mut manifest = sample();
        manifest.provider = "aws\nmalicious: true".into();
        assert!(matches!(manifest.render(), Err(LifecycleError::InvalidManifest(_))));
    }

    #[test]
    fn rejects_empty_field() {
        let mut manifest = sample();
        manifest.region_code = String::new();
        assert!(manifest.render().is_err());
    }

    #[test]
    fn rejects_vllm_flags_outside_the_allowlist() {
        let mut manifest = sample();
        manifest.vllm_args = vec![("exec".into(), "rm -rf /".into())];
        assert!(matches!(manifest.render(), Err(LifecycleError::InvalidManifest(_))));
    }

    #[test]
    fn rejects_vllm_values_with_shell_metacharacters() {
        let mut manifest = sample();
        manifest.vllm_args = vec![("max-model-len".into(), "8192; rm -rf /".into())];
        assert!(matches!(manifest.render(), Err(LifecycleError::InvalidManifest(_))));
    }

    #[test]
    fn requires_gpu_count_unless_gpu_type_is_auto() {
        let mut manifest = sample();
        manifest.gpu_type = "A10G".into();
        manifest.gpu_count = 0;
        assert!(manifest.render().is_err());

        manifest.gpu_type = "auto".into();
        assert!(manifest.render().is_ok());
    }

    #[test]
    fn rejects_gpu_memory_utilization_outside_unit_range() {
        let mut manifest = sample();
        manifest.gpu_memory_utilization = 1.5;
        assert!(manifest.render().is_err());
    }
}
