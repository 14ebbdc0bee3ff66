use crate::error::DepGitError;

/// Shell style glob over full ref names. An empty pattern matches everything.
#[derive(Clone, Debug)]
pub struct BranchPattern {
    matcher: Option<glob::Pattern>,
}

impl BranchPattern {
    pub fn new(pattern: Option<&str>) -> Result<Self, DepGitError> {
        let matcher = match pattern.map(str::trim) {
            None | Some("") => None,
            Some(p) => Some(glob::Pattern::new(p).map_err(|e| {
                DepGitError::BadData(format!("invalid branch pattern {:?}: {}", p, e))
            })?),
        };
        Ok(BranchPattern { matcher })
    }

    pub fn any() -> Self {
        BranchPattern { matcher: None }
    }

    pub fn matches(&self, branch: &str) -> bool {
        match &self.matcher {
            None => true,
            Some(pattern) => pattern.matches(branch),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.matcher.as_ref().map(|p| p.as_str())
    }
}
