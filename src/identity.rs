//! Identity keys: `"<subject>:<scope>"`

/// Subject shared by callers that carry no address and no user id
pub const UNKNOWN_SUBJECT: &str = "unknown";

/// Scope used when the caller names none
pub const DEFAULT_SCOPE: &str = "default";

/// Who is being rate limited
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Subject {
    /// Client network address
    Address(Box<str>),
    /// Authenticated user id
    User(Box<str>),
    /// Nothing to attribute the request to
    Unknown,
}

impl Subject {
    /// Prefer the network address, then the user id, then [`Subject::Unknown`].
    ///
    /// Blank values count as absent.
    pub fn resolve(address: Option<&str>, user_id: Option<&str>) -> Self {
        fn present(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|v| !v.is_empty())
        }

        if let Some(address) = present(address) {
            Self::Address(address.into())
        } else if let Some(user_id) = present(user_id) {
            Self::User(user_id.into())
        } else {
            Self::Unknown
        }
    }

    /// Text used in the identity key
    pub fn as_str(&self) -> &str {
        match self {
            Self::Address(address) => address,
            Self::User(user_id) => user_id,
            Self::Unknown => UNKNOWN_SUBJECT,
        }
    }
}

/// Router key for one subject under one scope
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey(Box<str>);

impl IdentityKey {
    /// Build `"<subject>:<scope>"`; an empty scope becomes [`DEFAULT_SCOPE`]
    pub fn new(subject: &Subject, scope: &str) -> Self {
        let scope = if scope.is_empty() { DEFAULT_SCOPE } else { scope };
        Self(format!("{}:{}", subject.as_str(), scope).into_boxed_str())
    }

    /// Key text as sent to the router
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for IdentityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentityKey({})", self.0)
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_precedence() {
        assert_eq!(
            Subject::resolve(Some("203.0.113.9"), Some("user-7")),
            Subject::Address("203.0.113.9".into())
        );
        assert_eq!(Subject::resolve(None, Some("user-7")), Subject::User("user-7".into()));
        assert_eq!(Subject::resolve(Some("  "), Some("user-7")), Subject::User("user-7".into()));
        assert_eq!(Subject::resolve(None, Some("")), Subject::Unknown);
    }

    #[test]
    fn test_key_format() {
        let subject = Subject::resolve(Some("203.0.113.9"), None);
        assert_eq!(IdentityKey::new(&subject, "comments:create").as_str(), "203.0.113.9:comments:create");
        assert_eq!(IdentityKey::new(&Subject::Unknown, "").as_str(), "unknown:default");
    }
}
