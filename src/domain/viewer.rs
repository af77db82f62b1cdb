//! Request viewer identity.
//!
//! Identity is supplied by an external authentication layer and passed
//! explicitly into every service call. Equality is always handle-based.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    Known { handle: String },
}

impl Viewer {
    pub fn known(handle: impl Into<String>) -> Self {
        Self::Known {
            handle: handle.into(),
        }
    }

    pub fn handle(&self) -> Option<&str> {
        match self {
            Viewer::Anonymous => None,
            Viewer::Known { handle } => Some(handle.as_str()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Viewer::Anonymous)
    }

    /// Canonical identity equality: handle string comparison.
    pub fn is_handle(&self, other: &str) -> bool {
        self.handle() == Some(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_has_no_handle() {
        assert!(Viewer::Anonymous.handle().is_none());
        assert!(!Viewer::Anonymous.is_handle("anyone"));
    }

    #[test]
    fn identity_equality_is_handle_based() {
        let viewer = Viewer::known("leo");
        assert!(viewer.is_handle("leo"));
        assert!(!viewer.is_handle("Leo"));
    }
}
