// CI build context and the version stamp printed by runtime images

use crate::assertions::{expect_contains, expect_not_contains};
use regex::Regex;
use std::sync::OnceLock;

pub const ENV_AGENT_OS: &str = "AGENT_OS";
pub const ENV_SOURCE_VERSION: &str = "BUILD_SOURCEVERSION";
pub const ENV_BUILD_NUMBER: &str = "BUILD_BUILDNUMBER";

/// Printed by images built without a CI context
const UNSTAMPED_MARKER: &str = ".unspecified, Commit: unspecified";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiContext {
    pub agent_os: Option<String>,
    pub commit: Option<String>,
    pub build_number: Option<String>,
}

impl CiContext {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the context from an arbitrary lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            agent_os: get(ENV_AGENT_OS),
            commit: get(ENV_SOURCE_VERSION),
            build_number: get(ENV_BUILD_NUMBER),
        }
    }

    /// Running on a CI agent. Local runs skip version stamp checks.
    pub fn is_ci(&self) -> bool {
        self.agent_os.is_some()
    }

    /// `base_version` followed by the build number
    pub fn expected_version(&self, base_version: &str) -> String {
        format!(
            "{}{}",
            base_version,
            self.build_number.as_deref().unwrap_or_default()
        )
    }
}

/// `Version: <version>, Commit: <commit>` as printed by `oryx --version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStamp {
    pub version: String,
    pub commit: String,
}

fn stamp_regex() -> &'static Regex {
    static STAMP: OnceLock<Regex> = OnceLock::new();
    STAMP.get_or_init(|| {
        Regex::new(r"Version:\s*([^,\s]+),\s*Commit:\s*([^,\s]+)")
            .unwrap_or_else(|e| panic!("invalid version stamp pattern: {}", e))
    })
}

pub fn parse_version_stamp(output: &str) -> Option<VersionStamp> {
    stamp_regex().captures(output).map(|caps| VersionStamp {
        version: caps[1].to_string(),
        commit: caps[2].to_string(),
    })
}

/// Check that `output` carries the stamp of the current CI build
pub fn check_version_stamp(output: &str, ci: &CiContext, base_version: &str) -> anyhow::Result<()> {
    expect_not_contains(output, UNSTAMPED_MARKER)?;

    if let Some(commit) = &ci.commit {
        expect_contains(output, commit)?;
    }
    expect_contains(output, &ci.expected_version(base_version))?;

    Ok(())
}
