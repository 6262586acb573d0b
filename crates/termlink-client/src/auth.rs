//! Credentials.
//!
//! A [`Credential`] is an opaque source of authentication material. The
//! session manager only ever calls [`Credential::resolve`], so password, key
//! and agent credentials are interchangeable from its point of view.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use russh_keys::key::KeyPair;
use tracing::debug;

use termlink_core::{Error, Result};

/// Environment variable naming the SSH agent socket.
pub const AGENT_SOCKET_ENV: &str = "SSH_AUTH_SOCK";

/// Authentication material handed to a connector.
#[derive(Clone)]
pub enum AuthMaterial {
    Password(String),
    KeyPair(Arc<KeyPair>),
    /// Sign with the identities held by the agent listening on `socket`.
    Agent { socket: PathBuf },
}

impl AuthMaterial {
    /// SSH method name this material authenticates with.
    pub fn method(&self) -> &'static str {
        match self {
            AuthMaterial::Password(_) => "password",
            AuthMaterial::KeyPair(_) => "publickey",
            AuthMaterial::Agent { .. } => "agent",
        }
    }
}

impl fmt::Debug for AuthMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMaterial::Password(_) => f.write_str("Password(<redacted>)"),
            AuthMaterial::KeyPair(_) => f.write_str("KeyPair(<redacted>)"),
            AuthMaterial::Agent { socket } => {
                f.debug_struct("Agent").field("socket", socket).finish()
            }
        }
    }
}

/// Source of authentication material.
#[async_trait]
pub trait Credential: Send + Sync {
    /// Short method name used in error messages.
    fn name(&self) -> &str;

    /// Produce the material to authenticate with.
    ///
    /// Failures should be reported as [`Error::Credential`].
    async fn resolve(&self) -> Result<AuthMaterial>;
}

fn credential_error(name: &str, message: impl fmt::Display) -> Error {
    Error::Credential {
        name: name.to_string(),
        message: message.to_string(),
    }
}

/// Password authentication.
#[derive(Clone)]
pub struct PasswordCredential {
    password: String,
}

impl PasswordCredential {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

impl fmt::Debug for PasswordCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordCredential(<redacted>)")
    }
}

#[async_trait]
impl Credential for PasswordCredential {
    fn name(&self) -> &str {
        "password"
    }

    async fn resolve(&self) -> Result<AuthMaterial> {
        Ok(AuthMaterial::Password(self.password.clone()))
    }
}

/// Private key file authentication.
#[derive(Clone)]
pub struct KeyCredential {
    path: PathBuf,
    passphrase: Option<String>,
}

impl KeyCredential {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            passphrase: None,
        }
    }

    /// Decrypt the key with `passphrase`.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl fmt::Debug for KeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCredential")
            .field("path", &self.path)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl Credential for KeyCredential {
    fn name(&self) -> &str {
        "publickey"
    }

    async fn resolve(&self) -> Result<AuthMaterial> {
        debug!(path = %self.path.display(), "Loading identity file");
        let key_data = tokio::fs::read(&self.path).await.map_err(|e| {
            credential_error(
                self.name(),
                format!("failed to read {}: {}", self.path.display(), e),
            )
        })?;

        let key_pair = russh_keys::decode_secret_key(
            &String::from_utf8_lossy(&key_data),
            self.passphrase.as_deref(),
        )
        .map_err(|e| credential_error(self.name(), format!("failed to decode private key: {}", e)))?;

        Ok(AuthMaterial::KeyPair(Arc::new(key_pair)))
    }
}

/// SSH agent authentication.
#[derive(Debug, Clone, Default)]
pub struct AgentCredential {
    socket: Option<PathBuf>,
}

impl AgentCredential {
    /// Agent at an explicit socket path.
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: Some(socket.into()),
        }
    }

    /// Agent advertised by `SSH_AUTH_SOCK`, if any.
    pub fn from_env() -> Self {
        Self {
            socket: std::env::var_os(AGENT_SOCKET_ENV)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Whether an agent socket is known.
    pub fn is_available(&self) -> bool {
        self.socket.is_some()
    }
}

#[async_trait]
impl Credential for AgentCredential {
    fn name(&self) -> &str {
        "agent"
    }

    async fn resolve(&self) -> Result<AuthMaterial> {
        match &self.socket {
            Some(socket) => Ok(AuthMaterial::Agent {
                socket: socket.clone(),
            }),
            None => Err(credential_error(
                self.name(),
                format!("{} not set, agent unavailable", AGENT_SOCKET_ENV),
            )),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn password_resolves() {
        let credential = PasswordCredential::new("hunter2");
        let material = credential.resolve().await.unwrap();
        assert!(matches!(material, AuthMaterial::Password(ref p) if p == "hunter2"));
        assert_eq!(material.method(), "password");
    }

    #[test]
    fn debug_redacts_secrets() {
        let credential = PasswordCredential::new("hunter2");
        assert!(!format!("{:?}", credential).contains("hunter2"));
        let material = AuthMaterial::Password("hunter2".into());
        assert!(!format!("{:?}", material).contains("hunter2"));
        let key = KeyCredential::new("/tmp/id").with_passphrase("secret");
        assert!(!format!("{:?}", key).contains("secret"));
    }

    #[tokio::test]
    async fn missing_key_file_is_credential_error() {
        let dir = tempfile::tempdir().unwrap();
        let credential = KeyCredential::new(dir.path().join("id_ed25519"));
        let err = credential.resolve().await.unwrap_err();
        assert!(matches!(err, Error::Credential { ref name, .. } if name == "publickey"));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn garbage_key_file_is_credential_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_rsa");
        std::fs::write(&path, "not a key").unwrap();
        let err = KeyCredential::new(&path).resolve().await.unwrap_err();
        assert!(err.to_string().starts_with("authentication failed (method: publickey)"));
    }

    #[tokio::test]
    async fn agent_without_socket_fails() {
        let credential = AgentCredential::default();
        assert!(!credential.is_available());
        let err = credential.resolve().await.unwrap_err();
        assert!(matches!(err, Error::Credential { ref name, .. } if name == "agent"));
    }

    #[tokio::test]
    async fn agent_with_socket_resolves() {
        let credential = AgentCredential::new("/run/agent.sock");
        let material = credential.resolve().await.unwrap();
        assert!(
            matches!(material, AuthMaterial::Agent { ref socket } if socket.ends_with("agent.sock"))
        );
    }
}
