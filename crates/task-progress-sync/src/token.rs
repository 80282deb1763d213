//! Access token sources.

use parking_lot::RwLock;

/// Supplies the bearer token appended to the socket URL.
///
/// Read once per `open()`, so a token refreshed between attempts is picked
/// up by the next reconnect.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// A fixed token, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl TokenSource for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone().filter(|t| !t.is_empty())
    }
}

/// A token the host updates as it refreshes credentials.
#[derive(Debug, Default)]
pub struct SharedToken {
    token: RwLock<Option<String>>,
}

impl SharedToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl TokenSource for SharedToken {
    fn access_token(&self) -> Option<String> {
        self.token.read().clone().filter(|t| !t.is_empty())
    }
}

impl<F> TokenSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn access_token(&self) -> Option<String> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_token() {
        assert_eq!(StaticToken::new("abc").access_token().as_deref(), Some("abc"));
        assert!(StaticToken::none().access_token().is_none());
        assert!(StaticToken::new("").access_token().is_none());
    }

    #[test]
    fn test_shared_token_refresh() {
        let token = SharedToken::default();
        assert!(token.access_token().is_none());

        token.set("first");
        assert_eq!(token.access_token().as_deref(), Some("first"));
        token.set("refreshed");
        assert_eq!(token.access_token().as_deref(), Some("refreshed"));
        token.clear();
        assert!(token.access_token().is_none());
    }

    #[test]
    fn test_closure_source() {
        let source = || Some("from-closure".to_string());
        assert_eq!(source.access_token().as_deref(), Some("from-closure"));
    }
}
