// src/auth/krb5.rs

//! Kerberos backend over `cross-krb5`.

use std::ffi::OsStr;
use std::path::Path;

use cross_krb5::{ClientCtx, InitiateFlags, PendingClientCtx};
use tracing::debug;

use super::{CredentialSource, GssBackend, GssCredential};

/// Environment variable the Kerberos library reads the client keytab from.
///
/// The process owner sets it before starting; a keytab login only checks
/// that it names the configured keytab.
const CLIENT_KEYTAB_ENV: &str = "KRB5_CLIENT_KTNAME";

#[derive(Debug, Default, Clone, Copy)]
pub struct Krb5Backend;

impl GssBackend for Krb5Backend {
    fn login(&self, source: &CredentialSource) -> anyhow::Result<Box<dyn GssCredential>> {
        if let CredentialSource::Keytab { path, .. } = source {
            anyhow::ensure!(path.is_file(), "keytab {:?} does not exist", path);
            check_keytab_env(path, std::env::var_os(CLIENT_KEYTAB_ENV).as_deref())?;
            debug!(keytab = ?path, "using client keytab");
        }
        Ok(Box::new(Krb5Credential {
            principal: source.principal().to_string(),
            pending: None,
        }))
    }
}

/// `KRB5_CLIENT_KTNAME` may be a bare path or carry a `FILE:` prefix.
fn check_keytab_env(path: &Path, env_value: Option<&OsStr>) -> anyhow::Result<()> {
    let Some(value) = env_value else {
        anyhow::bail!("keytab {:?} configured but {CLIENT_KEYTAB_ENV} is not set", path);
    };
    let value = value.to_string_lossy();
    let named = Path::new(value.strip_prefix("FILE:").unwrap_or(&value));
    anyhow::ensure!(
        named == path,
        "{CLIENT_KEYTAB_ENV} names {:?}, but the job is configured for keytab {:?}",
        named,
        path
    );
    Ok(())
}

struct Krb5Credential {
    principal: String,
    pending: Option<PendingClientCtx>,
}

impl GssCredential for Krb5Credential {
    fn initiate(&mut self, target: &str) -> anyhow::Result<Vec<u8>> {
        // `service@host` → `service/host`, the principal form Kerberos expects.
        let target = target.replacen('@', "/", 1);
        let (pending, token) =
            ClientCtx::new(InitiateFlags::empty(), Some(&self.principal), &target, None)?;
        self.pending = Some(pending);
        Ok(token.to_vec())
    }

    fn logout(&mut self) {
        self.pending.take();
    }
}
