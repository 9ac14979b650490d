//! Package manager front ends that can drive a reinstall.

use serde::{Deserialize, Serialize};

/// Which APT front end runs the install, refresh and repair commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PackageTool {
    /// apt-get, the stable scripting interface
    #[default]
    #[serde(rename = "apt-get")]
    AptGet,
    /// apt, the interactive front end
    #[serde(rename = "apt")]
    Apt,
}

impl PackageTool {
    /// Executable name looked up in PATH.
    pub fn program(&self) -> &'static str {
        match self {
            Self::AptGet => "apt-get",
            Self::Apt => "apt",
        }
    }

    /// Arguments that reinstall `packages`.
    ///
    /// With `force` set the packages are reinstalled even though they are
    /// already at the candidate version.
    pub fn install_args(&self, packages: &[String], force: bool, assume_yes: bool) -> Vec<String> {
        let mut args = vec!["install".to_string()];
        if force {
            args.push("--reinstall".to_string());
        }
        if assume_yes {
            args.push("--assume-yes".to_string());
        }
        args.extend(packages.iter().cloned());
        args
    }

    /// Arguments that refresh the package lists.
    pub fn update_args(&self) -> Vec<String> {
        vec!["update".to_string()]
    }

    /// Arguments that let the tool repair broken dependencies.
    pub fn fix_broken_args(&self, assume_yes: bool) -> Vec<String> {
        let mut args = vec!["--fix-broken".to_string(), "install".to_string()];
        if assume_yes {
            args.push("--assume-yes".to_string());
        }
        args
    }
}

impl std::fmt::Display for PackageTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.program())
    }
}
