//! transport::auth
//!
//! Credential lookup for sessions.
//!
//! Providers are consulted in order and the first one that knows an
//! identity for the realm wins. Passwords are never logged and are redacted
//! from `Debug` output.

use std::fmt;

use tracing::debug;

/// Default environment variable holding the username.
pub const USERNAME_ENV: &str = "SVNBRIDGE_USERNAME";

/// Default environment variable holding the password.
pub const PASSWORD_ENV: &str = "SVNBRIDGE_PASSWORD";

/// An identity for one authentication realm.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// A source of credentials.
pub trait CredentialProvider: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// First identity to try for `realm`, if this provider has one.
    fn first_credentials(&self, realm: &str) -> Option<Credentials>;
}

/// Always answers with a fixed username and no password.
#[derive(Debug, Clone)]
pub struct StaticUsernameProvider {
    username: String,
}

impl StaticUsernameProvider {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

impl CredentialProvider for StaticUsernameProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    fn first_credentials(&self, _realm: &str) -> Option<Credentials> {
        Some(Credentials {
            username: self.username.clone(),
            password: None,
        })
    }
}

/// Reads the identity from environment variables.
pub struct EnvCredentialProvider {
    lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl EnvCredentialProvider {
    /// Read `SVNBRIDGE_USERNAME` and `SVNBRIDGE_PASSWORD` from the process
    /// environment.
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Use a custom variable lookup instead of the process environment.
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvCredentialProvider").finish_non_exhaustive()
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn name(&self) -> &'static str {
        "env"
    }

    fn first_credentials(&self, _realm: &str) -> Option<Credentials> {
        let username = (self.lookup)(USERNAME_ENV).filter(|u| !u.is_empty())?;
        Some(Credentials {
            username,
            password: (self.lookup)(PASSWORD_ENV),
        })
    }
}

/// Ordered list of providers.
#[derive(Default)]
pub struct CredentialChain {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl CredentialChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chain used when nothing is configured: environment, then the
    /// configured username if any.
    pub fn standard(username: Option<&str>) -> Self {
        let mut chain = Self::new().with(EnvCredentialProvider::new());
        if let Some(username) = username {
            chain = chain.with(StaticUsernameProvider::new(username));
        }
        chain
    }

    pub fn with(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Ask each provider in turn.
    pub fn first_credentials(&self, realm: &str) -> Option<Credentials> {
        self.providers.iter().find_map(|provider| {
            let found = provider.first_credentials(realm);
            if let Some(creds) = &found {
                debug!(provider = provider.name(), username = %creds.username, realm, "credentials found");
            }
            found
        })
    }
}

impl fmt::Debug for CredentialChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.name()))
            .finish()
    }
}
