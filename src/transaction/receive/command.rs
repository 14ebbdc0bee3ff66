use bstr::ByteSlice;

use crate::capability::GitCapability;
use crate::error::DepGitError;
use crate::sha::HashValue;

/// `<old> <new> <ref>` as sent by the client during command intake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveCommand {
    pub old: HashValue,
    pub new: HashValue,
    pub ref_name: String,
}

impl ReceiveCommand {
    pub fn is_delete(&self) -> bool {
        self.new.is_zero()
    }
    pub fn is_update(&self) -> bool {
        !self.is_delete()
    }
    pub fn is_create(&self) -> bool {
        self.old.is_zero()
    }

    /// Parses one command payload. The first command of a push may carry the
    /// client's capability list after a NUL byte.
    pub fn parse(line: &[u8]) -> Result<(Self, Option<Vec<GitCapability>>), DepGitError> {
        let invalid = || DepGitError::InvalidCommand(line.to_str_lossy().into_owned());
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let (command, capabilities) = match line.split_once_str(b"\0") {
            Some((command, caps)) => {
                let caps = caps.to_str().map_err(|_| invalid())?;
                (command, Some(GitCapability::parse_list(caps)))
            }
            None => (line, None),
        };
        let command = command.to_str().map_err(|_| invalid())?;
        let mut parts = command.splitn(3, ' ');
        let (Some(old), Some(new), Some(ref_name)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        if ref_name.is_empty() {
            return Err(invalid());
        }
        let old: HashValue = old.parse().map_err(|_| invalid())?;
        let new: HashValue = new.parse().map_err(|_| invalid())?;
        Ok((
            ReceiveCommand {
                old,
                new,
                ref_name: ref_name.to_string(),
            },
            capabilities,
        ))
    }
}
