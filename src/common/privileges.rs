use sudo::RunningAs;
use thiserror::Error;

/// Reinstalling packages rewrites the dpkg database, which only root may do.
pub fn require_root(current: RunningAs) -> Result<(), PrivilegeError> {
    match current {
        RunningAs::Root => Ok(()),
        RunningAs::User | RunningAs::Suid => Err(PrivilegeError::NeedRoot),
    }
}

#[derive(Debug, Error)]
pub enum PrivilegeError {
    #[error("This operation requires root privileges (try running it with sudo)")]
    NeedRoot,
}
