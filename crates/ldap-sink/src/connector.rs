use crate::connection::LdapConnection;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings};
use std::time::Duration;
use sync_core::{DirectoryConnection, DirectoryConnector, DirectoryCredentials};
use tracing::{debug, warn};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// LDAP result code for invalidCredentials.
const INVALID_CREDENTIALS: u32 = 49;

/// Opens LDAP connections, one per handler invocation.
#[derive(Debug, Clone)]
pub struct LdapConnector {
    connect_timeout: Duration,
    starttls: bool,
}

impl Default for LdapConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            starttls: false,
        }
    }
}

impl LdapConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Upgrade plain `ldap://` connections with StartTLS before binding.
    pub fn with_starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn bind(&self, credentials: &DirectoryCredentials) -> Result<Box<dyn DirectoryConnection>> {
        debug!("connecting to {}", credentials.url);

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.connect_timeout)
            .set_starttls(self.starttls);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &credentials.url)
            .await
            .with_context(|| format!("Failed to connect to LDAP server at {}", credentials.url))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection driver error: {e}");
            }
        });

        let result = ldap
            .simple_bind(&credentials.bind_dn, &credentials.bind_password)
            .await
            .with_context(|| format!("LDAP bind failed for {}", credentials.bind_dn))?;
        if result.rc == INVALID_CREDENTIALS {
            bail!("invalid credentials for {}", credentials.bind_dn);
        }
        result
            .success()
            .with_context(|| format!("LDAP bind failed for {}", credentials.bind_dn))?;

        debug!("bound to {} as {}", credentials.url, credentials.bind_dn);
        Ok(Box::new(LdapConnection::new(ldap)))
    }
}
