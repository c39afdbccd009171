// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Build and version information of the binary.
//!
//! The git details are injected at build time through the `APISERVER_GIT_*` and
//! `APISERVER_BUILD_DATE` environment variables and default to placeholders otherwise.

use serde::Serialize;
use std::fmt;

/// Placeholder for build details that were not provided at build time.
const UNKNOWN: &str = "unknown";

/// Version details of the running binary.
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    /// Version of the code, as described by git or the package version.
    pub git_version: &'static str,

    /// Commit the binary was built from.
    pub git_commit: &'static str,

    /// Whether the tree had local modifications at build time: `clean` or `dirty`.
    pub git_tree_state: &'static str,

    /// Time at which the binary was built.
    pub build_date: &'static str,

    /// Compiler used to build the binary.
    pub compiler: &'static str,

    /// Target platform of the binary, as `os/arch`.
    pub platform: String,
}

impl Info {
    /// Gets the version details of the running binary.
    pub fn get() -> Self {
        Self {
            git_version: option_env!("APISERVER_GIT_VERSION").unwrap_or(env!("CARGO_PKG_VERSION")),
            git_commit: option_env!("APISERVER_GIT_COMMIT").unwrap_or(UNKNOWN),
            git_tree_state: option_env!("APISERVER_GIT_TREE_STATE").unwrap_or(UNKNOWN),
            build_date: option_env!("APISERVER_BUILD_DATE").unwrap_or(UNKNOWN),
            compiler: "rustc",
            platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("gitVersion", self.git_version),
            ("gitCommit", self.git_commit),
            ("gitTreeState", self.git_tree_state),
            ("buildDate", self.build_date),
            ("compiler", self.compiler),
            ("platform", self.platform.as_str()),
        ];
        for (name, value) in rows {
            writeln!(f, "{:<14} {}", format!("{}:", name), value)?;
        }
        Ok(())
    }
}
