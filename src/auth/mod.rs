// src/auth/mod.rs

//! Negotiate (SPNEGO-style) authentication for the session handshake.
//!
//! Runs once per connection attempt, and only when a principal is
//! configured. The negotiated header is attached to the initial handshake
//! request and never re-sent per message.
//!
//! The GSS mechanics sit behind [`GssBackend`] so the retry and release
//! rules here are independent of the Kerberos library in use. With the
//! `kerberos` feature, [`krb5::Krb5Backend`] provides a real implementation.

#[cfg(feature = "kerberos")]
pub mod krb5;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info, warn};

use crate::errors::{BridgeError, Result};

/// Authentication settings from the `[remote]` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub principal: Option<String>,
    pub keytab: Option<PathBuf>,
    /// Service part of the target identity, e.g. `HTTP`.
    pub service: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            principal: None,
            keytab: None,
            service: "HTTP".to_string(),
        }
    }
}

/// Where the client credential comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Keytab { path: PathBuf, principal: String },
    TicketCache { principal: String },
}

impl CredentialSource {
    /// `None` when no principal is configured (unauthenticated session).
    pub fn from_settings(settings: &AuthSettings) -> Option<Self> {
        let principal = settings.principal.clone()?;
        Some(match &settings.keytab {
            Some(path) => CredentialSource::Keytab {
                path: path.clone(),
                principal,
            },
            None => CredentialSource::TicketCache { principal },
        })
    }

    pub fn principal(&self) -> &str {
        match self {
            CredentialSource::Keytab { principal, .. } => principal,
            CredentialSource::TicketCache { principal } => principal,
        }
    }
}

/// Obtains client credentials.
pub trait GssBackend: Send + Sync {
    fn login(&self, source: &CredentialSource) -> anyhow::Result<Box<dyn GssCredential>>;
}

/// A logged-in credential able to answer a negotiation challenge.
pub trait GssCredential: Send {
    /// Produce the initial context token for `target` (`service@host[:port]`).
    fn initiate(&mut self, target: &str) -> anyhow::Result<Vec<u8>>;

    /// Release the credential context.
    fn logout(&mut self);
}

/// Backend used when the crate is built without Kerberos support.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBackend;

impl GssBackend for UnsupportedBackend {
    fn login(&self, source: &CredentialSource) -> anyhow::Result<Box<dyn GssCredential>> {
        anyhow::bail!(
            "cannot authenticate principal '{}': built without the `kerberos` feature",
            source.principal()
        )
    }
}

/// The GSS backend compiled into this build.
pub fn default_backend() -> Arc<dyn GssBackend> {
    #[cfg(feature = "kerberos")]
    {
        Arc::new(krb5::Krb5Backend)
    }
    #[cfg(not(feature = "kerberos"))]
    {
        Arc::new(UnsupportedBackend)
    }
}

/// Result of a successful negotiation.
///
/// Holds the credential until [`Negotiated::release`] (or drop), which the
/// session calls once the handshake response has arrived.
pub struct Negotiated {
    header: String,
    credential: Option<Box<dyn GssCredential>>,
}

impl fmt::Debug for Negotiated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiated")
            .field("released", &self.credential.is_none())
            .finish_non_exhaustive()
    }
}

impl Negotiated {
    /// Value of the `Authorization` header.
    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn release(&mut self) {
        if let Some(mut credential) = self.credential.take() {
            credential.logout();
            debug!("released negotiation credential");
        }
    }
}

impl Drop for Negotiated {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Clone)]
pub struct Negotiator {
    source: CredentialSource,
    service: String,
    backend: Arc<dyn GssBackend>,
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("source", &self.source)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl Negotiator {
    pub fn new(source: CredentialSource, service: impl Into<String>, backend: Arc<dyn GssBackend>) -> Self {
        Self {
            source,
            service: service.into(),
            backend,
        }
    }

    /// `None` when no principal is configured.
    pub fn from_settings(settings: &AuthSettings, backend: Arc<dyn GssBackend>) -> Option<Self> {
        CredentialSource::from_settings(settings)
            .map(|source| Self::new(source, settings.service.clone(), backend))
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    /// Negotiate a header for `host:port`.
    ///
    /// Some intermediaries rewrite the port, so a failure against
    /// `service@host:port` is retried once against `service@host`. If both
    /// fail, the first (more specific) error is returned. On failure the
    /// credential is released before returning.
    pub fn negotiate(&self, host: &str, port: u16) -> Result<Negotiated> {
        let mut credential = self.backend.login(&self.source).map_err(|e| {
            BridgeError::NegotiationFailure(format!(
                "login for '{}' failed: {e:#}",
                self.source.principal()
            ))
        })?;

        let full_target = format!("{}@{}:{}", self.service, host, port);
        let token = match credential.initiate(&full_target) {
            Ok(token) => token,
            Err(first) => {
                let host_target = format!("{}@{}", self.service, host);
                warn!(
                    target_identity = %full_target,
                    error = %first,
                    "negotiation failed; retrying without port"
                );
                match credential.initiate(&host_target) {
                    Ok(token) => token,
                    Err(second) => {
                        debug!(target_identity = %host_target, error = %second, "retry without port failed");
                        credential.logout();
                        return Err(BridgeError::NegotiationFailure(format!(
                            "{full_target}: {first:#}"
                        )));
                    }
                }
            }
        };

        info!(principal = %self.source.principal(), host, "negotiated session credential");
        Ok(Negotiated {
            header: format!("Negotiate {}", STANDARD.encode(token)),
            credential: Some(credential),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Script {
        accept: Vec<String>,
        attempts: Mutex<Vec<String>>,
        logouts: Mutex<usize>,
    }

    struct ScriptedBackend(Arc<Script>);
    struct ScriptedCredential(Arc<Script>);

    impl GssBackend for ScriptedBackend {
        fn login(&self, _source: &CredentialSource) -> anyhow::Result<Box<dyn GssCredential>> {
            Ok(Box::new(ScriptedCredential(Arc::clone(&self.0))))
        }
    }

    impl GssCredential for ScriptedCredential {
        fn initiate(&mut self, target: &str) -> anyhow::Result<Vec<u8>> {
            self.0.attempts.lock().unwrap().push(target.to_string());
            if self.0.accept.iter().any(|t| t == target) {
                Ok(b"token".to_vec())
            } else {
                anyhow::bail!("no key for {target}")
            }
        }

        fn logout(&mut self) {
            *self.0.logouts.lock().unwrap() += 1;
        }
    }

    fn negotiator(script: &Arc<Script>) -> Negotiator {
        Negotiator::new(
            CredentialSource::TicketCache {
                principal: "etl@EXAMPLE.COM".to_string(),
            },
            "HTTP",
            Arc::new(ScriptedBackend(Arc::clone(script))),
        )
    }

    #[test]
    fn no_principal_means_no_negotiator() {
        let settings = AuthSettings::default();
        assert!(Negotiator::from_settings(&settings, default_backend()).is_none());
    }

    #[test]
    fn keytab_requires_principal() {
        let settings = AuthSettings {
            principal: Some("etl".to_string()),
            keytab: Some(PathBuf::from("/etc/etl.keytab")),
            ..AuthSettings::default()
        };
        assert!(matches!(
            CredentialSource::from_settings(&settings),
            Some(CredentialSource::Keytab { .. })
        ));
    }

    #[test]
    fn first_attempt_uses_host_and_port() {
        let script = Arc::new(Script {
            accept: vec!["HTTP@daemon:53000".to_string()],
            ..Script::default()
        });
        let mut negotiated = negotiator(&script).negotiate("daemon", 53000).unwrap();
        assert_eq!(negotiated.header(), format!("Negotiate {}", STANDARD.encode(b"token")));
        assert_eq!(script.attempts.lock().unwrap().len(), 1);

        negotiated.release();
        negotiated.release();
        assert_eq!(*script.logouts.lock().unwrap(), 1);
    }

    #[test]
    fn retries_without_port_after_failure() {
        let script = Arc::new(Script {
            accept: vec!["HTTP@daemon".to_string()],
            ..Script::default()
        });
        let negotiated = negotiator(&script).negotiate("daemon", 53000).unwrap();
        drop(negotiated);
        assert_eq!(
            *script.attempts.lock().unwrap(),
            vec!["HTTP@daemon:53000".to_string(), "HTTP@daemon".to_string()]
        );
        assert_eq!(*script.logouts.lock().unwrap(), 1);
    }

    #[test]
    fn double_failure_surfaces_first_error_and_logs_out() {
        let script = Arc::new(Script::default());
        let err = negotiator(&script).negotiate("daemon", 53000).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("HTTP@daemon:53000"), "{message}");
        assert!(message.ends_with("no key for HTTP@daemon:53000"), "{message}");
        assert_eq!(*script.logouts.lock().unwrap(), 1);
    }
}
