//! # Authentication
//!
//! Resolves named identities to bearer tokens by logging in against the
//! service under test. Tokens are minted lazily, cached per identity for the
//! whole run and replaced wholesale when a step asks for a fresh one.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::HarnessError;
use crate::http::{HttpExecutor, HttpMethod, PreparedRequest};

/// Which login endpoint a credential uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginKind {
    #[default]
    User,
    Admin,
}

impl LoginKind {
    pub fn endpoint(self) -> &'static str {
        match self {
            LoginKind::User => "user/login",
            LoginKind::Admin => "user/admin-login",
        }
    }
}

/// Login input for one identity. Never persisted beyond the run.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(alias = "email")]
    pub identity: String,
    #[serde(alias = "password")]
    pub secret: String,
    #[serde(default)]
    pub login: LoginKind,
}

impl Credential {
    pub fn user(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
            login: LoginKind::User,
        }
    }

    pub fn admin(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
            login: LoginKind::Admin,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .field("login", &self.login)
            .finish()
    }
}

/// A bearer token. Immutable once minted.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub owning_identity: String,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("owning_identity", &self.owning_identity)
            .finish()
    }
}

/// Holds credentials by name and the tokens minted for them.
#[derive(Debug)]
pub struct AuthGateway {
    executor: HttpExecutor,
    credentials: BTreeMap<String, Credential>,
    tokens: BTreeMap<String, Token>,
}

impl AuthGateway {
    pub fn new(executor: HttpExecutor) -> Self {
        Self {
            executor,
            credentials: BTreeMap::new(),
            tokens: BTreeMap::new(),
        }
    }

    /// Registers `credential` under `name`, replacing any earlier one and
    /// dropping its cached token.
    pub fn register(&mut self, name: impl Into<String>, credential: Credential) {
        let name = name.into();
        self.tokens.remove(&name);
        self.credentials.insert(name, credential);
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.credentials.keys().map(String::as_str)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.credentials.contains_key(name)
    }

    pub fn cached(&self, name: &str) -> Option<&Token> {
        self.tokens.get(name)
    }

    /// Logs in with `credential`. Does not touch the cache.
    ///
    /// A non-2xx answer or a response without a `token` string is an
    /// [`HarnessError::Auth`] carrying the status and body verbatim. An
    /// unreachable provider is one too, with no status.
    pub async fn authenticate(
        &self,
        name: &str,
        credential: &Credential,
    ) -> Result<Token, HarnessError> {
        let request =
            PreparedRequest::new(HttpMethod::Post, credential.login.endpoint()).json(json!({
                "email": credential.identity,
                "password": credential.secret,
            }));

        debug!(identity = %name, endpoint = credential.login.endpoint(), "logging in");

        let response = self.executor.send(&request).await.map_err(|err| match err {
            HarnessError::Transport { message, .. } => HarnessError::Auth {
                identity: name.to_string(),
                status: None,
                body: message,
            },
            other => other,
        })?;

        let rejected = || HarnessError::Auth {
            identity: name.to_string(),
            status: Some(response.status),
            body: response.raw_body.clone(),
        };

        if !response.is_success() {
            return Err(rejected());
        }

        let value = response
            .json()
            .and_then(|body| body.get("token"))
            .and_then(|token| token.as_str())
            .filter(|token| !token.is_empty())
            .ok_or_else(rejected)?;

        info!(identity = %name, "authenticated");
        Ok(Token {
            value: value.to_string(),
            owning_identity: name.to_string(),
        })
    }

    /// The cached token for `name`, logging in on first use.
    pub async fn token(&mut self, name: &str) -> Result<Token, HarnessError> {
        if let Some(token) = self.tokens.get(name) {
            return Ok(token.clone());
        }
        self.refresh(name).await
    }

    /// Re-authenticates `name` and replaces its cached token.
    pub async fn refresh(&mut self, name: &str) -> Result<Token, HarnessError> {
        let credential = self
            .credentials
            .get(name)
            .ok_or_else(|| HarnessError::Definition(format!("Unknown identity `{name}`")))?;
        let token = self.authenticate(name, credential).await?;
        self.tokens.insert(name.to_string(), token.clone());
        Ok(token)
    }

    /// Drops every cached token.
    pub fn clear(&mut self) {
        self.tokens.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;

    #[test]
    fn login_endpoints() {
        assert_eq!(LoginKind::User.endpoint(), "user/login");
        assert_eq!(LoginKind::Admin.endpoint(), "user/admin-login");
    }

    #[test]
    fn secrets_never_show_in_debug_output() {
        let credential = Credential::user("john.doe@example.com", "password123");
        let printed = format!("{credential:?}");
        assert!(printed.contains("john.doe@example.com"));
        assert!(!printed.contains("password123"));

        let token = Token {
            value: "eyJhbGciOi".into(),
            owning_identity: "user".into(),
        };
        assert!(!format!("{token:?}").contains("eyJhbGciOi"));
    }

    #[test]
    fn credential_accepts_login_field_names() {
        let credential: Credential = serde_json::from_str(
            r#"{"email": "admin@gmail.com", "password": "admin123", "login": "admin"}"#,
        )
        .unwrap();
        assert_eq!(credential, Credential::admin("admin@gmail.com", "admin123"));
    }

    #[tokio::test]
    async fn unknown_identity_is_a_definition_error() {
        let executor =
            HttpExecutor::new(&HarnessConfig::for_testing("http://127.0.0.1:9")).unwrap();
        let mut gateway = AuthGateway::new(executor);
        let err = gateway.token("nobody").await.unwrap_err();
        assert!(matches!(err, HarnessError::Definition(_)));
    }

    #[test]
    fn register_replaces_and_lists() {
        let executor =
            HttpExecutor::new(&HarnessConfig::for_testing("http://127.0.0.1:9")).unwrap();
        let mut gateway = AuthGateway::new(executor);
        gateway.register("user", Credential::user("a@example.com", "x"));
        gateway.register("admin", Credential::admin("admin@gmail.com", "y"));
        assert_eq!(gateway.identities().collect::<Vec<_>>(), vec!["admin", "user"]);
        assert!(gateway.is_registered("user"));
        assert!(gateway.cached("user").is_none());
    }
}
