// Copyright 2025 WordTree Authors
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

//! # WordTree CLI
//!
//! Command-line interface for running WordTree nodes.
//!
//! - `wordtree root`: start the root of a tree and inject a text file as a job
//! - `wordtree worker`: join an existing tree through its root
//!
//! This library holds the pieces of the binary that are worth testing on
//! their own: reading a job from disk, choosing the node's address and
//! rendering counts.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use wordtree_node::{HostResolver, StaticHost, UdpProbeResolver, WordCount};

/// Environment variable consulted when `--host` is not given
pub const HOST_ENV: &str = "WORDTREE_HOST";

/// Reads a text file and splits it into whitespace-separated words.
///
/// # Errors
///
/// Returns an error naming the file if it cannot be read or is not UTF-8.
pub fn read_words(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    Ok(text.split_whitespace().map(str::to_string).collect())
}

/// Picks this node's address: the `--host` flag, else `WORDTREE_HOST`,
/// else the address the OS routes outbound traffic through.
pub fn resolve_host(flag: Option<IpAddr>) -> Result<IpAddr> {
    let from_env = std::env::var(HOST_ENV).ok();
    resolve_host_from(flag, from_env.as_deref(), &UdpProbeResolver::default())
}

/// [`resolve_host`] with its inputs made explicit.
pub fn resolve_host_from(
    flag: Option<IpAddr>,
    from_env: Option<&str>,
    fallback: &dyn HostResolver,
) -> Result<IpAddr> {
    if let Some(addr) = flag {
        return Ok(StaticHost(addr).resolve()?);
    }

    if let Some(value) = from_env.map(str::trim).filter(|v| !v.is_empty()) {
        let addr: IpAddr = value
            .parse()
            .with_context(|| format!("{} is not an IP address: '{}'", HOST_ENV, value))?;
        return Ok(addr);
    }

    fallback
        .resolve()
        .context("Could not determine this node's address; pass --host")
}

/// Renders one count as a JSON object with keys in sorted order.
pub fn render_counts(counts: &WordCount) -> Result<String> {
    let sorted: BTreeMap<&str, usize> = counts.iter().map(|(w, c)| (w.as_str(), *c)).collect();
    Ok(serde_json::to_string(&sorted)?)
}
