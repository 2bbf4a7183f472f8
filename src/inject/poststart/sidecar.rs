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

use super::ScriptGeneratorHelper;
use crate::types::runtime::RuntimeInfo;
use k8s_openapi::api::core::v1 as corev1;

pub const CHECK_MOUNT_VOLUME_NAME: &str = "check-mount";
pub const CHECK_MOUNT_SCRIPT_FILE: &str = "check-mount.sh";
pub const CHECK_MOUNT_SCRIPT_PATH: &str = "/check-mount.sh";

const PRIVILEGED_SCRIPT: &str = r#"#!/bin/bash

set -ex

ConditionPathIsMountPoint="$1"
MountType="$2"
SubPath="$3"

# jindo mounts show up under their fuse driver name
if [[ "$MountType" == "jindo" ]]; then
    MountType="fuse.jindofs-fuse"
fi

count=0
while ! mount | grep "$ConditionPathIsMountPoint" | grep "$MountType"
do
    sleep 3
    count=$((count + 1))
    if test $count -eq 10
    then
        echo "timed out waiting for $ConditionPathIsMountPoint to be mounted"
        exit 1
    fi
done

if [[ -n "$SubPath" ]]; then
    if [[ ! -d "$ConditionPathIsMountPoint/$SubPath" ]]; then
        echo "sub path [$SubPath] does not exist under $ConditionPathIsMountPoint"
        exit 2
    fi
fi

echo "succeed in checking mount point $ConditionPathIsMountPoint"
"#;

const UNPRIVILEGED_SCRIPT: &str = r#"#!/bin/bash

set -ex

count=0
while ! /tools/ioctl_sync
do
    sleep 3
    count=$((count + 1))
    if test $count -eq 10
    then
        echo "timed out waiting for the fuse device to be ready"
        exit 1
    fi
done

echo "succeed in checking fuse device"
"#;

/// Readiness check run as the fuse sidecar's postStart hook.
///
/// The privileged variant watches the mount table for the fuse mount point.
/// An unprivileged sidecar cannot observe host mounts, so its variant asks the
/// virtual fuse device through the ioctl helper instead.
#[derive(Clone, Debug)]
pub struct SidecarScriptGenerator {
    helper: ScriptGeneratorHelper,
    mount_path: String,
    fs_type: String,
    sub_path: String,
    unprivileged: bool,
}

impl SidecarScriptGenerator {
    /// `mount_path` is the fuse mount directory inside the sidecar; it is
    /// ignored in unprivileged mode.
    pub fn new(runtime: &RuntimeInfo, mount_path: &str, unprivileged: bool) -> Self {
        let mount_info = runtime
            .fuse_template
            .as_ref()
            .map(|t| t.fuse_mount_info.clone())
            .unwrap_or_default();
        let (config_map_name, script_content) = if unprivileged {
            (
                format!(
                    "{}-{}-check-mount-unprivileged",
                    runtime.name, runtime.runtime_type
                ),
                UNPRIVILEGED_SCRIPT,
            )
        } else {
            (
                format!("{}-{}-check-mount", runtime.name, runtime.runtime_type),
                PRIVILEGED_SCRIPT,
            )
        };

        Self {
            helper: ScriptGeneratorHelper {
                config_map_name,
                namespace: runtime.namespace.clone(),
                volume_name: CHECK_MOUNT_VOLUME_NAME,
                script_file_name: CHECK_MOUNT_SCRIPT_FILE,
                script_mount_path: CHECK_MOUNT_SCRIPT_PATH,
                script_content,
            },
            mount_path: mount_path.to_string(),
            fs_type: mount_info.fs_type,
            sub_path: mount_info.sub_path.unwrap_or_default(),
            unprivileged,
        }
    }

    pub fn helper(&self) -> &ScriptGeneratorHelper {
        &self.helper
    }

    pub fn post_start_handler(&self) -> corev1::LifecycleHandler {
        if self.unprivileged {
            self.helper.post_start_handler(&[])
        } else {
            self.helper
                .post_start_handler(&[&self.mount_path, &self.fs_type, &self.sub_path])
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn command(handler: corev1::LifecycleHandler) -> String {
        handler.exec.unwrap().command.unwrap().join(" ")
    }

    #[test]
    fn test_privileged_generator() {
        let runtime = crate::tests::jindo_runtime("big-data", "duplicate");
        let generator = SidecarScriptGenerator::new(&runtime, "/jfs", false);

        assert_eq!(generator.helper().config_map_name, "duplicate-jindo-check-mount");
        assert_eq!(generator.helper().namespace, "big-data");
        assert!(generator.helper().script_content.contains("fuse.jindofs-fuse"));
        assert_eq!(
            command(generator.post_start_handler()),
            "bash -c time /check-mount.sh /jfs jindo >> /proc/1/fd/1"
        );
    }

    #[test]
    fn test_privileged_generator_with_subpath() {
        let mut runtime = crate::tests::jindo_runtime("big-data", "duplicate");
        if let Some(t) = runtime.fuse_template.as_mut() {
            t.fuse_mount_info.sub_path = Some("path-a".to_string());
        }
        let generator = SidecarScriptGenerator::new(&runtime, "/jfs", false);
        assert_eq!(
            command(generator.post_start_handler()),
            "bash -c time /check-mount.sh /jfs jindo path-a >> /proc/1/fd/1"
        );
    }

    #[test]
    fn test_unprivileged_generator() {
        let runtime = crate::tests::jindo_runtime("big-data", "duplicate");
        let generator = SidecarScriptGenerator::new(&runtime, "", true);

        assert_eq!(
            generator.helper().config_map_name,
            "duplicate-jindo-check-mount-unprivileged"
        );
        assert!(generator.helper().script_content.contains("/tools/ioctl_sync"));
        assert_eq!(
            command(generator.post_start_handler()),
            "bash -c time /check-mount.sh >> /proc/1/fd/1"
        );
    }
}
