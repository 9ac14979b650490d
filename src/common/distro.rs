use std::fs;
use std::path::Path;

/// Operating system detected from /etc/os-release, reduced to what decides
/// whether dpkg and apt drive the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatingSystem {
    /// Debian
    Debian,
    /// Ubuntu
    Ubuntu,
    /// Pop!_OS (Ubuntu-based)
    PopOS,
    /// Linux Mint (Ubuntu/Debian-based)
    LinuxMint,
    /// Raspberry Pi OS (Debian-based)
    Raspbian,
    /// Any other distribution, with its ID
    Other(String),
    /// Unknown distribution, with the reason detection failed
    Unknown(String),
}

impl OperatingSystem {
    /// Detect the current operating system from /etc/os-release
    pub fn detect() -> Self {
        let os_release_path = Path::new("/etc/os-release");
        if !os_release_path.exists() {
            return Self::Unknown("No /etc/os-release found".to_string());
        }

        match fs::read_to_string(os_release_path) {
            Ok(content) => Self::parse_os_release(&content),
            Err(_) => Self::Unknown("Failed to read /etc/os-release".to_string()),
        }
    }

    /// Parse os-release content and return the detected OS
    fn parse_os_release(content: &str) -> Self {
        let mut id = String::new();
        let mut id_like = String::new();

        for line in content.lines() {
            if let Some(val) = line.strip_prefix("ID=") {
                id = val.trim_matches('"').to_string();
            } else if let Some(val) = line.strip_prefix("ID_LIKE=") {
                id_like = val.trim_matches('"').to_string();
            }
        }

        match id.as_str() {
            "debian" => Self::Debian,
            "ubuntu" => Self::Ubuntu,
            "pop" => Self::PopOS,
            "linuxmint" => Self::LinuxMint,
            "raspbian" => Self::Raspbian,
            _ => {
                // Derivatives announce their family through ID_LIKE
                let family: Vec<&str> = id_like.split_whitespace().collect();
                if family.contains(&"ubuntu") {
                    Self::Ubuntu
                } else if family.contains(&"debian") {
                    Self::Debian
                } else if id.is_empty() {
                    Self::Unknown("No ID in /etc/os-release".to_string())
                } else {
                    Self::Other(id)
                }
            }
        }
    }

    /// Returns true for Debian and everything built on it.
    pub fn is_debian_based(&self) -> bool {
        matches!(
            self,
            Self::Debian | Self::Ubuntu | Self::PopOS | Self::LinuxMint | Self::Raspbian
        )
    }

    /// Get a human-readable name for this OS.
    pub fn name(&self) -> &str {
        match self {
            Self::Debian => "Debian",
            Self::Ubuntu => "Ubuntu",
            Self::PopOS => "Pop!_OS",
            Self::LinuxMint => "Linux Mint",
            Self::Raspbian => "Raspberry Pi OS",
            Self::Other(id) => id,
            Self::Unknown(_) => "Unknown",
        }
    }
}
