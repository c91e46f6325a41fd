//! Artifact extraction from a live environment.
//!
//! Produces a directory of per-pod, per-container log dumps for a
//! namespace, and a guarded file upload into a running pod. Extraction
//! is fail-fast: the first pod that cannot be dumped aborts the whole
//! operation.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use regex::Regex;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

use crate::cluster::ClusterOps;
use crate::error::{EnvError, Result};

/// Expected shape of a pod copy destination.
const DESTINATION_PATTERN: &str = r".*?/.*?:.*";

/// Log dump handle for one namespace.
pub struct Artifacts<'a> {
    cluster: &'a dyn ClusterOps,
    namespace: String,
    pods: Vec<k8s_openapi::api::core::v1::Pod>,
}

impl<'a> Artifacts<'a> {
    /// Snapshot the pod population of a namespace.
    pub async fn new(cluster: &'a dyn ClusterOps, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let pods = cluster.list_pods(&namespace, "").await?;
        Ok(Self {
            cluster,
            namespace,
            pods,
        })
    }

    /// Dump a bounded log tail of every container of every pod to
    /// `<dir>/<namespace>/<pod>_<container>.log`.
    ///
    /// Returns the per-namespace directory. Any single extraction
    /// failure is fatal to the whole dump.
    pub async fn dump(&self, dir: &Path) -> Result<PathBuf> {
        let out_dir = dir.join(&self.namespace);
        fs::create_dir_all(&out_dir).await?;
        info!(namespace = %self.namespace, dir = %out_dir.display(), "dumping pod logs");

        for pod in &self.pods {
            let Some(pod_name) = pod.metadata.name.as_deref() else {
                continue;
            };
            let containers = pod
                .spec
                .as_ref()
                .map(|spec| spec.containers.as_slice())
                .unwrap_or(&[]);
            for container in containers {
                let log = self
                    .cluster
                    .pod_log_tail(&self.namespace, pod_name, &container.name)
                    .await?;
                let file = out_dir.join(format!("{pod_name}_{}.log", container.name));
                debug!(pod = %pod_name, container = %container.name, "writing log dump");
                fs::write(&file, log).await?;
            }
        }
        Ok(out_dir)
    }
}

/// Check a copy destination against `NAMESPACE/POD_NAME:folder/FILE_NAME`.
pub fn validate_destination(destination: &str) -> Result<()> {
    let pattern =
        Regex::new(DESTINATION_PATTERN).map_err(|err| EnvError::Config(err.to_string()))?;
    if !pattern.is_match(destination) {
        return Err(EnvError::BadCopyDestination(destination.to_string()));
    }
    Ok(())
}

/// Copy a local file into a container of a running pod.
///
/// The destination must be a proper cluster path of the form
/// `NAMESPACE/POD_NAME:folder/FILE_NAME`; anything else is rejected
/// before touching the cluster.
pub async fn copy_to_pod(src: &str, destination: &str, container: &str) -> Result<()> {
    validate_destination(destination)?;

    // kubectl cp wants NAMESPACE/POD:path already, matching the
    // validated destination verbatim.
    info!(src = %src, destination = %destination, container = %container, "uploading file to pod");
    let output = Command::new("kubectl")
        .args(["cp", src, destination, "-c", container])
        .stdin(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(EnvError::Deploy {
            component: destination.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn well_formed_destination_passes() {
        assert!(validate_destination("env-1/node-0:logs/out.txt").is_ok());
    }

    #[test]
    fn destination_without_colon_is_rejected() {
        let err = validate_destination("env-1/node-0").unwrap_err();
        assert!(matches!(err, EnvError::BadCopyDestination(_)));
    }

    #[test]
    fn destination_without_namespace_is_rejected() {
        let err = validate_destination("node-0:logs/out.txt").unwrap_err();
        assert!(matches!(err, EnvError::BadCopyDestination(_)));
    }
}
