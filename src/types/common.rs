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

//! Pod labels, annotations and the injection options derived from them.

use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

pub const DOMAIN: &str = "fluid.io";
pub const TRUE: &str = "true";

/// Set by users on pods that want fuse sidecars.
pub const INJECT_SERVERLESS: &str = const_str::concat!("serverless.", DOMAIN, "/inject");

/// Set by the injector once a pod spec has been mutated.
pub const INJECT_SIDECAR_DONE: &str = const_str::concat!("done.sidecar.", DOMAIN, "/inject");

/// Label or annotation selecting the mutation platform.
pub const SERVERLESS_PLATFORM: &str = const_str::concat!("serverless.", DOMAIN, "/platform");

pub const INJECT_CACHE_DIR: &str = const_str::concat!("cachedir.sidecar.", DOMAIN, "/inject");

pub const INJECT_UNPRIVILEGED_SIDECAR: &str =
    const_str::concat!("unprivileged.sidecar.", DOMAIN, "/inject");

pub const SKIP_SIDECAR_POST_START_INJECT: &str =
    const_str::concat!("poststart.sidecar.", DOMAIN, "/skip-inject");

pub const INJECT_APP_POST_START: &str = const_str::concat!("app.poststart.", DOMAIN, "/inject");

pub const SIDECAR_INJECTION_MODE: &str =
    const_str::concat!("sidecar.", DOMAIN, "/injection-mode");

pub const HOST_MOUNT_PATH_MODE: &str =
    const_str::concat!("default.fuse.sidecar.", DOMAIN, "/host-mount-path-mode");

pub const CONTAINER_DATASET_MAPPING_PREFIX: &str =
    const_str::concat!("container-dataset-mapping.sidecar.", DOMAIN, "/");

pub const DATASET_ID: &str = const_str::concat!(DOMAIN, "/dataset-id");

pub const PROMETHEUS_SCRAPE: &str = "prometheus.io/scrape";

/// Strategy used to rewrite a pod spec.
#[derive(
    Default, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    #[default]
    Default,
    Unprivileged,
    Vineyard,
}

/// Where injected fuse containers are placed.
/// - Default: regular container, plus a short-lived init twin when init containers need the dataset
/// - NativeSidecar: a single init container with `restartPolicy: Always`
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum SidecarInjectionMode {
    #[default]
    #[strum(serialize = "default")]
    Default,

    #[strum(serialize = "native-sidecar")]
    NativeSidecar,
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum HostPathMode {
    #[default]
    #[strum(serialize = "default")]
    Default,

    #[strum(serialize = "random-suffix")]
    RandomSuffix,
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct FuseSidecarInjectOption {
    pub enable_cache_dir: bool,
    pub enable_unprivileged_sidecar: bool,
    pub skip_sidecar_post_start_inject: bool,
    pub sidecar_injection_mode: SidecarInjectionMode,
}

impl FuseSidecarInjectOption {
    /// Resolves the options once per pod from its labels and annotations.
    pub fn from_meta(meta: &metav1::ObjectMeta, platform: Platform) -> Self {
        let labels = meta.labels.as_ref();
        Self {
            enable_cache_dir: is_true(labels, INJECT_CACHE_DIR),
            enable_unprivileged_sidecar: platform == Platform::Unprivileged
                || is_true(labels, INJECT_UNPRIVILEGED_SIDECAR),
            skip_sidecar_post_start_inject: is_true(labels, SKIP_SIDECAR_POST_START_INJECT),
            sidecar_injection_mode: meta
                .annotations
                .as_ref()
                .and_then(|a| a.get(SIDECAR_INJECTION_MODE))
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        }
    }
}

pub fn is_true(map: Option<&BTreeMap<String, String>>, key: &str) -> bool {
    map.and_then(|m| m.get(key))
        .is_some_and(|v| v.eq_ignore_ascii_case(TRUE))
}

pub fn serverless_enabled(meta: &metav1::ObjectMeta) -> bool {
    is_true(meta.labels.as_ref(), INJECT_SERVERLESS)
}

pub fn injection_done(meta: &metav1::ObjectMeta) -> bool {
    is_true(meta.labels.as_ref(), INJECT_SIDECAR_DONE)
}

pub fn app_post_start_enabled(meta: &metav1::ObjectMeta) -> bool {
    is_true(meta.labels.as_ref(), INJECT_APP_POST_START)
}

pub fn host_path_mode(meta: &metav1::ObjectMeta) -> HostPathMode {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(HOST_MOUNT_PATH_MODE))
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

/// The platform named on the pod, labels taking precedence over annotations.
pub fn platform_value(meta: &metav1::ObjectMeta) -> Option<&str> {
    meta.labels
        .as_ref()
        .and_then(|l| l.get(SERVERLESS_PLATFORM))
        .or_else(|| {
            meta.annotations
                .as_ref()
                .and_then(|a| a.get(SERVERLESS_PLATFORM))
        })
        .map(String::as_str)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn meta(labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> metav1::ObjectMeta {
        let to_map = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        };
        metav1::ObjectMeta {
            labels: Some(to_map(labels)),
            annotations: Some(to_map(annotations)),
            ..Default::default()
        }
    }

    #[test]
    fn test_label_keys() {
        assert_eq!(INJECT_SERVERLESS, "serverless.fluid.io/inject");
        assert_eq!(INJECT_SIDECAR_DONE, "done.sidecar.fluid.io/inject");
        assert_eq!(
            CONTAINER_DATASET_MAPPING_PREFIX,
            "container-dataset-mapping.sidecar.fluid.io/"
        );
    }

    #[test]
    fn test_options_from_labels() {
        let m = meta(
            &[
                (INJECT_CACHE_DIR, "true"),
                (SKIP_SIDECAR_POST_START_INJECT, "True"),
            ],
            &[(SIDECAR_INJECTION_MODE, "native-sidecar")],
        );
        let option = FuseSidecarInjectOption::from_meta(&m, Platform::Default);
        assert!(option.enable_cache_dir);
        assert!(!option.enable_unprivileged_sidecar);
        assert!(option.skip_sidecar_post_start_inject);
        assert_eq!(
            option.sidecar_injection_mode,
            SidecarInjectionMode::NativeSidecar
        );
    }

    #[test]
    fn test_unprivileged_platform_forces_unprivileged_sidecar() {
        let option =
            FuseSidecarInjectOption::from_meta(&meta(&[], &[]), Platform::Unprivileged);
        assert!(option.enable_unprivileged_sidecar);
        assert!(!option.enable_cache_dir);
    }

    #[test]
    fn test_platform_value_prefers_labels() {
        let m = meta(
            &[(SERVERLESS_PLATFORM, "unprivileged")],
            &[(SERVERLESS_PLATFORM, "default")],
        );
        assert_eq!(platform_value(&m), Some("unprivileged"));
        assert_eq!("Vineyard".parse::<Platform>().unwrap(), Platform::Vineyard);
        assert!("unknown".parse::<Platform>().is_err());
    }

    #[test]
    fn test_host_path_mode() {
        let m = meta(&[], &[(HOST_MOUNT_PATH_MODE, "random-suffix")]);
        assert_eq!(host_path_mode(&m), HostPathMode::RandomSuffix);
        assert_eq!(host_path_mode(&meta(&[], &[])), HostPathMode::Default);
    }
}
