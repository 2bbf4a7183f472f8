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
use k8s_openapi::api::core::v1 as corev1;

pub const APP_SCRIPT_CONFIG_MAP_NAME: &str = "check-fluid-mount-ready";
pub const APP_SCRIPT_VOLUME_NAME: &str = "check-fluid-mount-ready";
pub const APP_SCRIPT_FILE: &str = "check-fluid-mount-ready.sh";
pub const APP_SCRIPT_PATH: &str = "/check-fluid-mount-ready.sh";

const APP_SCRIPT: &str = r#"#!/bin/bash

set -e

MountPaths="$1"
MountTypes="$2"

IFS=':' read -r -a paths <<< "$MountPaths"
IFS=':' read -r -a types <<< "$MountTypes"

if [[ ${#paths[@]} -ne ${#types[@]} ]]; then
    echo "mount paths and mount types do not pair up"
    exit 1
fi

for index in "${!paths[@]}"; do
    path="${paths[$index]}"
    type="${types[$index]}"
    if [[ "$type" == "jindo" ]]; then
        type="fuse.jindofs-fuse"
    fi

    count=0
    while ! cat /proc/self/mountinfo | grep " $path " | grep "$type"
    do
        sleep 3
        count=$((count + 1))
        if test $count -eq 10
        then
            echo "timed out waiting for $path ($type) to be mounted"
            exit 1
        fi
    done
    echo "$path ($type) is ready"
done

echo "succeed in checking mount points $MountPaths"
"#;

/// The app-wide readiness script: one ConfigMap per namespace, shared by
/// every dataset.
#[derive(Clone, Debug)]
pub struct AppScriptGenerator {
    helper: ScriptGeneratorHelper,
}

impl AppScriptGenerator {
    pub fn new(namespace: &str) -> Self {
        Self {
            helper: ScriptGeneratorHelper {
                config_map_name: APP_SCRIPT_CONFIG_MAP_NAME.to_string(),
                namespace: namespace.to_string(),
                volume_name: APP_SCRIPT_VOLUME_NAME,
                script_file_name: APP_SCRIPT_FILE,
                script_mount_path: APP_SCRIPT_PATH,
                script_content: APP_SCRIPT,
            },
        }
    }

    pub fn helper(&self) -> &ScriptGeneratorHelper {
        &self.helper
    }

    /// `mount_paths` and `mount_types` are colon-joined and pair up by position.
    pub fn post_start_handler(&self, mount_paths: &str, mount_types: &str) -> corev1::LifecycleHandler {
        self.helper.post_start_handler(&[mount_paths, mount_types])
    }
}
