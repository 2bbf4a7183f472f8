// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Mount readiness scripts delivered through ConfigMaps and run as postStart hooks.

use crate::context::ClusterResources;
use crate::inject::Error;
use crate::types::v1alpha1::dataset::Dataset;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub mod app;
pub mod sidecar;

const SCRIPT_FILE_MODE: i32 = 0o755;

/// A script file and where it lands inside a container.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptGeneratorHelper {
    pub config_map_name: String,
    pub namespace: String,
    pub volume_name: &'static str,
    pub script_file_name: &'static str,
    pub script_mount_path: &'static str,
    pub script_content: &'static str,
}

impl ScriptGeneratorHelper {
    /// ConfigMap carrying the script. When a dataset is given it owns the
    /// ConfigMap and labels it with its id.
    pub fn build_config_map(&self, dataset: Option<&Dataset>) -> corev1::ConfigMap {
        corev1::ConfigMap {
            metadata: metav1::ObjectMeta {
                name: Some(self.config_map_name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: dataset.map(Dataset::id_labels),
                owner_references: dataset.map(|d| vec![d.new_owner_ref()]),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                self.script_file_name.to_string(),
                self.script_content.to_string(),
            )])),
            ..Default::default()
        }
    }

    pub fn volume(&self) -> corev1::Volume {
        corev1::Volume {
            name: self.volume_name.to_string(),
            config_map: Some(corev1::ConfigMapVolumeSource {
                name: self.config_map_name.clone(),
                default_mode: Some(SCRIPT_FILE_MODE),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn volume_mount(&self) -> corev1::VolumeMount {
        corev1::VolumeMount {
            name: self.volume_name.to_string(),
            mount_path: self.script_mount_path.to_string(),
            sub_path: Some(self.script_file_name.to_string()),
            read_only: Some(true),
            ..Default::default()
        }
    }

    /// `bash -c "time <script> <args> >> /proc/1/fd/1"`; output goes to the
    /// container's main process so it shows up in the container log.
    ///
    /// Arguments are positional: an empty argument followed by a non-empty one
    /// is passed as `''`, trailing empty arguments are dropped.
    pub fn post_start_handler(&self, args: &[&str]) -> corev1::LifecycleHandler {
        let used = args
            .iter()
            .rposition(|a| !a.is_empty())
            .map_or(0, |last| last + 1);
        let invocation = std::iter::once(self.script_mount_path.to_string())
            .chain(args[..used].iter().map(|a| shell_quote(a)))
            .collect::<Vec<_>>()
            .join(" ");
        corev1::LifecycleHandler {
            exec: Some(corev1::ExecAction {
                command: Some(vec![
                    "bash".to_string(),
                    "-c".to_string(),
                    format!("time {invocation} >> /proc/1/fd/1"),
                ]),
            }),
            ..Default::default()
        }
    }

    /// Creates the ConfigMap unless it exists. A concurrent create is not an
    /// error; an existing ConfigMap is never updated.
    pub async fn ensure_config_map(
        &self,
        resources: &dyn ClusterResources,
        dataset: Option<&Dataset>,
    ) -> Result<(), Error> {
        let (name, namespace) = (&self.config_map_name, &self.namespace);
        if resources.config_map_exists(name, namespace).await? {
            debug!(configmap = %name, namespace = %namespace, "script configmap exists");
            return Ok(());
        }

        match resources
            .create_config_map(&self.build_config_map(dataset))
            .await
        {
            Ok(()) => {
                info!(configmap = %name, namespace = %namespace, "created script configmap");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                info!(configmap = %name, namespace = %namespace, "script configmap created concurrently");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Single-quotes `arg` for bash unless it only holds path-safe characters.
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-:=,+@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::common::DATASET_ID;

    fn helper() -> ScriptGeneratorHelper {
        ScriptGeneratorHelper {
            config_map_name: "prod-configmap".to_string(),
            namespace: "prod-ns".to_string(),
            volume_name: "poststart-config",
            script_file_name: "startup.sh",
            script_mount_path: "/opt/scripts/startup.sh",
            script_content: "echo 'hello world'",
        }
    }

    #[test]
    fn test_config_map_owned_by_dataset() {
        let dataset = crate::tests::create_test_dataset("my-dataset", "prod-ns");
        let cm = helper().build_config_map(Some(&dataset));

        assert_eq!(cm.metadata.name.as_deref(), Some("prod-configmap"));
        assert_eq!(cm.metadata.namespace.as_deref(), Some("prod-ns"));
        assert_eq!(
            cm.data.unwrap().get("startup.sh").map(String::as_str),
            Some("echo 'hello world'")
        );
        assert_eq!(
            cm.metadata.labels.unwrap().get(DATASET_ID).map(String::as_str),
            Some("prod-ns-my-dataset")
        );
        let owners = cm.metadata.owner_references.unwrap();
        assert_eq!(owners[0].uid, "uid-my-dataset");
    }

    #[test]
    fn test_volume_and_mount() {
        let helper = helper();
        let volume = helper.volume();
        let source = volume.config_map.unwrap();
        assert_eq!(volume.name, "poststart-config");
        assert_eq!(source.name, "prod-configmap");
        assert_eq!(source.default_mode, Some(0o755));

        let mount = helper.volume_mount();
        assert_eq!(mount.mount_path, "/opt/scripts/startup.sh");
        assert_eq!(mount.sub_path.as_deref(), Some("startup.sh"));
        assert_eq!(mount.read_only, Some(true));
    }

    fn shell_command(handler: corev1::LifecycleHandler) -> String {
        handler.exec.unwrap().command.unwrap()[2].clone()
    }

    #[test]
    fn test_post_start_keeps_argument_positions() {
        let helper = helper();
        assert_eq!(
            shell_command(helper.post_start_handler(&["/mnt", "", "path-a"])),
            "time /opt/scripts/startup.sh /mnt '' path-a >> /proc/1/fd/1"
        );
        assert_eq!(
            shell_command(helper.post_start_handler(&["/mnt", "jindo", ""])),
            "time /opt/scripts/startup.sh /mnt jindo >> /proc/1/fd/1"
        );
        assert_eq!(
            shell_command(helper.post_start_handler(&[])),
            "time /opt/scripts/startup.sh >> /proc/1/fd/1"
        );
    }

    #[test]
    fn test_post_start_quotes_arguments() {
        let handler = helper().post_start_handler(&["/mnt/my data", "it's", "jindo"]);
        assert_eq!(
            shell_command(handler),
            r"time /opt/scripts/startup.sh '/mnt/my data' 'it'\''s' jindo >> /proc/1/fd/1"
        );
    }

    #[tokio::test]
    async fn test_ensure_config_map_is_create_only() {
        let resources = crate::tests::FakeResources::default();
        let helper = helper();

        helper.ensure_config_map(&resources, None).await.unwrap();
        assert_eq!(resources.created_config_maps(), vec!["prod-ns/prod-configmap"]);

        helper.ensure_config_map(&resources, None).await.unwrap();
        assert_eq!(resources.created_config_maps().len(), 1);

        let racing = crate::tests::FakeResources::default().with_create_race();
        helper.ensure_config_map(&racing, None).await.unwrap();
    }
}
