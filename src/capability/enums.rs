use std::fmt::Display;

/// Capability tokens exchanged during ref advertisement and command intake.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GitCapability {
    SideBand,
    SideBand64k,
    OfsDelta,
    ThinPack,
    NoProgress,
    ReportStatus,
    ReportStatusV2,
    DeleteRefs,
    Quiet,
    Atomic,
    PushOptions,
    Agent(String),
    ObjectFormat(String),
    Symref(String, String),
    Other(String),
}

impl GitCapability {
    pub fn parse(s: &str) -> Self {
        match s {
            "side-band" => Self::SideBand,
            "side-band-64k" => Self::SideBand64k,
            "ofs-delta" => Self::OfsDelta,
            "thin-pack" => Self::ThinPack,
            "no-progress" => Self::NoProgress,
            "report-status" => Self::ReportStatus,
            "report-status-v2" => Self::ReportStatusV2,
            "delete-refs" => Self::DeleteRefs,
            "quiet" => Self::Quiet,
            "atomic" => Self::Atomic,
            "push-options" => Self::PushOptions,
            _ => {
                if let Some(agent) = s.strip_prefix("agent=") {
                    Self::Agent(agent.to_string())
                } else if let Some(format) = s.strip_prefix("object-format=") {
                    Self::ObjectFormat(format.to_string())
                } else if let Some((from, to)) =
                    s.strip_prefix("symref=").and_then(|symref| symref.split_once(':'))
                {
                    Self::Symref(from.to_string(), to.to_string())
                } else {
                    Self::Other(s.to_string())
                }
            }
        }
    }

    /// Splits a space separated capability list as sent after the NUL byte.
    pub fn parse_list(list: &str) -> Vec<GitCapability> {
        list.split_ascii_whitespace().map(Self::parse).collect()
    }

    pub fn agent() -> GitCapability {
        GitCapability::Agent(format!("depgit/{}", env!("CARGO_PKG_VERSION")))
    }

    /// Advertised by `git-receive-pack`.
    pub fn receive() -> Vec<GitCapability> {
        vec![
            GitCapability::ReportStatus,
            GitCapability::DeleteRefs,
            GitCapability::SideBand64k,
            GitCapability::OfsDelta,
            GitCapability::Quiet,
            GitCapability::agent(),
            GitCapability::ObjectFormat("sha1".to_string()),
        ]
    }

    /// Advertised by `git-upload-pack`, which only lists refs.
    pub fn upload() -> Vec<GitCapability> {
        vec![
            GitCapability::agent(),
            GitCapability::ObjectFormat("sha1".to_string()),
        ]
    }

    pub fn join(capabilities: &[GitCapability]) -> String {
        capabilities
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Display for GitCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SideBand => f.write_str("side-band"),
            Self::SideBand64k => f.write_str("side-band-64k"),
            Self::OfsDelta => f.write_str("ofs-delta"),
            Self::ThinPack => f.write_str("thin-pack"),
            Self::NoProgress => f.write_str("no-progress"),
            Self::ReportStatus => f.write_str("report-status"),
            Self::ReportStatusV2 => f.write_str("report-status-v2"),
            Self::DeleteRefs => f.write_str("delete-refs"),
            Self::Quiet => f.write_str("quiet"),
            Self::Atomic => f.write_str("atomic"),
            Self::PushOptions => f.write_str("push-options"),
            Self::Agent(agent) => write!(f, "agent={}", agent),
            Self::ObjectFormat(format) => write!(f, "object-format={}", format),
            Self::Symref(from, to) => write!(f, "symref={}:{}", from, to),
            Self::Other(s) => f.write_str(s),
        }
    }
}
