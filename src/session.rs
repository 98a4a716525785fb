use crate::prelude::*;

/// Identifies an anonymous visitor across requests. Minted by the server, kept by the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, derive_more::From, Deserialize, Serialize)]
#[serde(transparent)]
pub(crate) struct SessionId(String);

impl SessionId {
    pub(crate) fn mint() -> Self {
        Self(format!("session_{}", Uuid::new_v4().simple()))
    }

    /// `None` for blank input.
    pub(crate) fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        (!s.is_empty()).then(|| Self(s.to_owned()))
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_unique() {
        let a = SessionId::mint();
        let b = SessionId::mint();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("session_"));
        assert_eq!(a.as_str().len(), "session_".len() + 32);
    }

    #[test]
    fn parse_rejects_blank() {
        assert_eq!(SessionId::parse(""), None);
        assert_eq!(SessionId::parse("   "), None);
        assert_eq!(SessionId::parse(" session_1 ").map(|id| id.to_string()), Some(format!("session_1")));
    }
}
