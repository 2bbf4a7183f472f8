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

//! Volume name conflict resolution and prefix-based trimming.

use super::{Error, FLUID_PREFIX, VolumeNameExhaustedSnafu};
use k8s_openapi::api::core::v1 as corev1;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::debug;

pub const MAX_RENAME_RETRIES: usize = 100;

/// Replaces the first `-`-separated segment of `name` with `prefix`.
/// A name without `-` gets the prefix prepended instead.
pub fn replace_prefix(name: &str, prefix: &str) -> String {
    match name.split_once('-') {
        Some((_, rest)) => format!("{prefix}-{rest}"),
        None => format!("{prefix}-{name}"),
    }
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

/// Finds a name for `name` that `taken` rejects: first `fluid-<rest>`, then up
/// to [`MAX_RENAME_RETRIES`] attempts of `fluid-<xyz>-<rest>` with a random
/// three character tag.
pub fn randomize_new_volume_name<F>(name: &str, taken: F) -> Result<String, Error>
where
    F: Fn(&str) -> bool,
{
    let mut candidate = replace_prefix(name, FLUID_PREFIX);
    let mut retries = 0;
    while taken(&candidate) {
        if retries >= MAX_RENAME_RETRIES {
            return VolumeNameExhaustedSnafu {
                name: candidate,
                retries,
            }
            .fail();
        }
        let prefix = format!("{FLUID_PREFIX}-{}", random_alphanumeric(3));
        candidate = replace_prefix(name, &prefix);
        retries += 1;
    }
    debug!(original = name, renamed = %candidate, retries, "resolved volume name conflict");
    Ok(candidate)
}

pub fn has_prefix(name: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| name.starts_with(p))
}

pub fn trim_volumes(volumes: &mut Vec<corev1::Volume>, prefixes: &[&str]) {
    volumes.retain(|v| !has_prefix(&v.name, prefixes));
}

pub fn trim_volume_mounts(container: &mut corev1::Container, prefixes: &[&str]) {
    if let Some(mounts) = container.volume_mounts.as_mut() {
        mounts.retain(|m| !has_prefix(&m.name, prefixes));
    }
}
