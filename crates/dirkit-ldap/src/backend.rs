//! Transport backed by `ldap3`.

use crate::config::TransportOptions;
use crate::transport::{
    Connector, DirectoryTransport, Modification, RawEntry, Reply, SearchScope, ALL_ATTRIBUTES,
};
use crate::Result;
use async_trait::async_trait;
use dirkit_core::{Error, ResultCode};
use ldap3::controls::{Control, ControlType, PostRead, RawControl, ReadEntryResp};
use ldap3::result::SearchResult;
use ldap3::{LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fs;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Connector dialling real directory servers through `ldap3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3Connector;

impl Ldap3Connector {
    /// Creates a new connector instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for Ldap3Connector {
    async fn connect(
        &self,
        uri: &str,
        options: &TransportOptions,
    ) -> Result<Box<dyn DirectoryTransport>> {
        let settings = build_ldap_settings(options)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, uri)
            .await
            .map_err(|err| Error::Connection {
                uri: uri.to_string(),
                message: err.to_string(),
            })?;
        ldap3::drive!(conn);
        debug!(uri, starttls = options.starttls, "directory connection established");
        Ok(Box::new(Ldap3Transport {
            inner: ldap,
            operation_timeout: options.operation_timeout(),
        }))
    }
}

struct Ldap3Transport {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

#[async_trait]
impl DirectoryTransport for Ldap3Transport {
    async fn simple_bind(&mut self, identity: &str, secret: &str) -> Result<Reply<()>> {
        let result = within(
            self.operation_timeout,
            "bind",
            identity,
            self.inner.simple_bind(identity, secret),
        )
        .await?;
        Ok(reply(result, ()))
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Reply<Vec<RawEntry>>> {
        let SearchResult(entries, result) = within(
            self.operation_timeout,
            "search",
            base,
            self.inner
                .search(base, scope.into(), filter, attributes.to_vec()),
        )
        .await?;
        let entries = entries
            .into_iter()
            .filter(|entry| !entry.is_ref() && !entry.is_intermediate())
            .map(SearchEntry::construct)
            .map(|entry| RawEntry {
                dn: entry.dn,
                attrs: entry.attrs.into_iter().collect(),
                bin_attrs: entry.bin_attrs.into_iter().collect(),
            })
            .collect();
        Ok(reply(result, entries))
    }

    async fn add(
        &mut self,
        path: &str,
        attributes: &[(String, Vec<Vec<u8>>)],
    ) -> Result<Reply<Option<RawEntry>>> {
        let attrs = attributes
            .iter()
            .map(|(name, values)| {
                (
                    name.as_bytes().to_vec(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                )
            })
            .collect::<Vec<_>>();

        let result = within(
            self.operation_timeout,
            "add",
            path,
            self.inner
                .with_controls(post_read_control())
                .add(path, attrs),
        )
        .await?;
        let written = post_read(path, &result.ctrls);
        Ok(reply(result, written))
    }

    async fn modify(
        &mut self,
        path: &str,
        modifications: &[Modification],
    ) -> Result<Reply<Option<RawEntry>>> {
        let mods = modifications
            .iter()
            .map(|m| {
                Mod::Replace(
                    m.attribute.as_bytes().to_vec(),
                    m.values.iter().cloned().collect::<HashSet<_>>(),
                )
            })
            .collect::<Vec<_>>();

        let result = within(
            self.operation_timeout,
            "modify",
            path,
            self.inner
                .with_controls(post_read_control())
                .modify(path, mods),
        )
        .await?;
        let written = post_read(path, &result.ctrls);
        Ok(reply(result, written))
    }

    async fn delete(&mut self, path: &str) -> Result<Reply<()>> {
        let result = within(
            self.operation_timeout,
            "delete",
            path,
            self.inner.delete(path),
        )
        .await?;
        Ok(reply(result, ()))
    }

    async fn rename(
        &mut self,
        path: &str,
        new_rdn: &str,
        new_parent: &str,
        delete_old_rdn: bool,
    ) -> Result<Reply<()>> {
        let result = within(
            self.operation_timeout,
            "move",
            path,
            self.inner
                .modifydn(path, new_rdn, delete_old_rdn, Some(new_parent)),
        )
        .await?;
        Ok(reply(result, ()))
    }

    async fn unbind(&mut self) -> Result<()> {
        within(self.operation_timeout, "unbind", "", self.inner.unbind()).await
    }
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Self::Base,
            SearchScope::OneLevel => Self::OneLevel,
            SearchScope::Subtree => Self::Subtree,
        }
    }
}

async fn within<F, T>(limit: Duration, operation: &'static str, path: &str, request: F) -> Result<T>
where
    F: Future<Output = ldap3::result::Result<T>>,
{
    timeout(limit, request)
        .await
        .map_err(|_| {
            Error::Timeout(format!(
                "{operation} on `{path}` timed out after {}s",
                limit.as_secs()
            ))
        })?
        .map_err(|err| map_ldap_error(operation, path, &err))
}

fn map_ldap_error(operation: &'static str, path: &str, err: &LdapError) -> Error {
    Error::Transport {
        operation,
        path: path.to_string(),
        message: err.to_string(),
    }
}

fn reply<T>(result: ldap3::LdapResult, payload: T) -> Reply<T> {
    Reply {
        status: ResultCode::from_code(result.rc),
        matched: result.matched,
        message: result.text,
        referrals: result.refs,
        payload,
    }
}

/// Critical post-read request for every user attribute of the written entry.
fn post_read_control() -> RawControl {
    let mut control = PostRead::new(vec![ALL_ATTRIBUTES]);
    control.crit = true;
    control
}

/// Entry echoed back by the post-read control, addressed at `path`.
fn post_read(path: &str, controls: &[Control]) -> Option<RawEntry> {
    controls.iter().find_map(|control| match control {
        Control(Some(ControlType::PostReadResp), raw) => {
            let entry: ReadEntryResp = raw.parse();
            Some(RawEntry {
                dn: path.to_string(),
                attrs: entry.attrs.into_iter().collect(),
                bin_attrs: entry.bin_attrs.into_iter().collect(),
            })
        }
        _ => None,
    })
}

fn build_ldap_settings(options: &TransportOptions) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new()
        .set_conn_timeout(options.connection_timeout())
        .set_starttls(options.starttls);

    if !options.tls_verify {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| Error::Config(format!("failed to construct TLS connector: {err}")))?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = &options.tls_ca_cert {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::Config(format!(
                "failed to read directory CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::Config(format!("invalid directory CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| Error::Config(format!("failed to load directory CA certificate: {err}")))?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}
