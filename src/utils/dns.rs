//! Mail-exchanger resolution with a shared TTL cache.

use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::TokioAsyncResolver;

/// A host a domain designates for receiving its mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailExchanger {
    pub host: String,
    pub preference: u16,
}

/// Raw MX lookup.
///
/// `Ok(vec![])` is the authoritative "no mail hosts" answer; transient
/// failures come back as [`AppError::TransientNetworkFailure`] or
/// [`AppError::Timeout`].
#[async_trait]
pub trait MxLookup: Send + Sync {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MailExchanger>>;
}

/// [`MxLookup`] backed by trust-dns.
pub struct DnsMxLookup {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl DnsMxLookup {
    pub fn from_config(config: &Config) -> Result<Self> {
        let ips: Vec<IpAddr> = config
            .dns_servers
            .iter()
            .map(|s| s.parse::<IpAddr>())
            .collect::<std::result::Result<_, _>>()?;

        if ips.is_empty() {
            tracing::debug!(target: "dns_task", "Initialised resolver with default name servers");
            return Ok(Self::build(ResolverConfig::default(), config.dns_timeout));
        }
        Ok(Self::with_name_servers(&ips, 53, config.dns_timeout))
    }

    /// Resolver that queries only `ips` on `port`, over UDP with TCP fallback.
    pub fn with_name_servers(ips: &[IpAddr], port: u16, timeout: Duration) -> Self {
        tracing::debug!(target: "dns_task", "Initialised resolver with {} name servers", ips.len());
        let group = NameServerConfigGroup::from_ips_clear(ips, port, true);
        Self::build(ResolverConfig::from_parts(None, vec![], group), timeout)
    }

    fn build(resolver_config: ResolverConfig, timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 2;
        Self {
            resolver: TokioAsyncResolver::tokio(resolver_config, opts),
            timeout,
        }
    }
}

/// Only NXDOMAIN and an empty NOERROR answer say the domain has no MX records.
fn is_authoritative_code(code: ResponseCode) -> bool {
    matches!(code, ResponseCode::NXDomain | ResponseCode::NoError)
}

/// True when `error` is a definitive "no such records" from a name server.
///
/// trust-dns also reports SERVFAIL and REFUSED as `NoRecordsFound`; those
/// describe the server, not the domain, and must not be cached.
pub(crate) fn is_authoritative_absence(error: &ResolveError) -> bool {
    match error.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => is_authoritative_code(*response_code),
        _ => false,
    }
}

#[async_trait]
impl MxLookup for DnsMxLookup {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MailExchanger>> {
        // Outer bound covers every resolver attempt.
        let lookup = tokio::time::timeout(self.timeout * 3, self.resolver.mx_lookup(domain))
            .await
            .map_err(|_| AppError::Timeout(format!("MX lookup for {}", domain)))?;

        match lookup {
            Ok(answer) => Ok(answer
                .iter()
                .map(|mx| MailExchanger {
                    host: mx.exchange().to_utf8().trim_end_matches('.').to_string(),
                    preference: mx.preference(),
                })
                .collect()),
            Err(e) if is_authoritative_absence(&e) => {
                tracing::info!(target: "dns_task", "No MX records for {}: {}", domain, e);
                Ok(Vec::new())
            }
            Err(e) => {
                tracing::warn!(target: "dns_task", "MX lookup for {} failed: {}", domain, e);
                Err(AppError::TransientNetworkFailure(format!(
                    "MX lookup for {} failed: {}",
                    domain, e
                )))
            }
        }
    }
}

/// Resolves a domain to its mail hosts in priority order, caching authoritative answers.
pub struct MxResolver {
    lookup: Arc<dyn MxLookup>,
    ttl: Duration,
    cache: Mutex<HashMap<String, (Instant, Vec<String>)>>,
}

impl MxResolver {
    pub fn new(lookup: Arc<dyn MxLookup>, ttl: Duration) -> Self {
        Self {
            lookup,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Arc::new(DnsMxLookup::from_config(config)?),
            config.mx_cache_ttl,
        ))
    }

    fn cached(&self, domain: &str) -> Option<Vec<String>> {
        let mut cache = self.cache.lock();
        let entry = cache
            .get(domain)
            .map(|(at, hosts)| (at.elapsed() < self.ttl, hosts.clone()));
        match entry {
            Some((true, hosts)) => Some(hosts),
            Some((false, _)) => {
                cache.remove(domain);
                None
            }
            None => None,
        }
    }

    /// Returns mail host names ordered by preference. An empty list means the
    /// domain accepts no mail. Transient failures are not cached.
    pub async fn resolve(&self, domain: &str) -> Result<Vec<String>> {
        if let Some(hosts) = self.cached(domain) {
            tracing::trace!(target: "dns_task", "MX cache hit for {}", domain);
            return Ok(hosts);
        }

        let mut records = self.lookup.lookup_mx(domain).await?;
        records.sort_by_key(|mx| mx.preference);

        // RFC 7505 null MX: a single "." exchange means no mail is accepted.
        let hosts: Vec<String> = records
            .into_iter()
            .map(|mx| mx.host)
            .filter(|host| !host.is_empty() && host != ".")
            .fold(Vec::new(), |mut acc, host| {
                if !acc.contains(&host) {
                    acc.push(host);
                }
                acc
            });

        tracing::debug!(target: "dns_task", "Resolved {} mail hosts for {}: {:?}", hosts.len(), domain, hosts);
        self.cache
            .lock()
            .insert(domain.to_string(), (Instant::now(), hosts.clone()));
        Ok(hosts)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::UdpSocket;

    /// Scripted lookup: answers per domain, counting calls.
    pub(crate) struct StubLookup {
        pub answers: HashMap<String, Vec<MailExchanger>>,
        pub transient: bool,
        pub calls: AtomicUsize,
    }

    impl StubLookup {
        pub(crate) fn with(domain: &str, hosts: &[(&str, u16)]) -> Self {
            let mut answers = HashMap::new();
            answers.insert(
                domain.to_string(),
                hosts
                    .iter()
                    .map(|(h, p)| MailExchanger {
                        host: h.to_string(),
                        preference: *p,
                    })
                    .collect(),
            );
            Self {
                answers,
                transient: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MxLookup for StubLookup {
        async fn lookup_mx(&self, domain: &str) -> Result<Vec<MailExchanger>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.transient {
                return Err(AppError::TransientNetworkFailure("SERVFAIL".into()));
            }
            Ok(self.answers.get(domain).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn hosts_come_back_in_preference_order() {
        let lookup = Arc::new(StubLookup::with(
            "acme.com",
            &[("backup.acme.com", 20), ("mx1.acme.com", 5), ("mx2.acme.com", 10)],
        ));
        let resolver = MxResolver::new(lookup, Duration::from_secs(60));
        let hosts = resolver.resolve("acme.com").await.unwrap();
        assert_eq!(hosts, ["mx1.acme.com", "mx2.acme.com", "backup.acme.com"]);
    }

    #[tokio::test]
    async fn missing_records_are_empty_and_cached() {
        let lookup = Arc::new(StubLookup::with("acme.com", &[("mx.acme.com", 10)]));
        let resolver = MxResolver::new(lookup.clone(), Duration::from_secs(60));

        assert!(resolver.resolve("nomail.test").await.unwrap().is_empty());
        assert!(resolver.resolve("nomail.test").await.unwrap().is_empty());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn null_mx_means_no_mail() {
        let lookup = Arc::new(StubLookup::with("parked.test", &[(".", 0)]));
        let resolver = MxResolver::new(lookup, Duration::from_secs(60));
        assert!(resolver.resolve("parked.test").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_failures_are_not_cached() {
        let lookup = Arc::new(StubLookup {
            transient: true,
            ..StubLookup::with("acme.com", &[])
        });
        let resolver = MxResolver::new(lookup.clone(), Duration::from_secs(60));

        assert!(resolver.resolve("acme.com").await.unwrap_err().is_transient());
        assert!(resolver.resolve("acme.com").await.is_err());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }

    /// Echoes the question back with no records and the given RCODE.
    fn empty_reply(query: &[u8], rcode: u8) -> Option<Vec<u8>> {
        let mut end = 12;
        while *query.get(end)? != 0 {
            end += 1 + query[end] as usize;
        }
        end += 1 + 4;
        if end > query.len() {
            return None;
        }
        let mut reply = query[..end].to_vec();
        reply[2] = 0x80 | (query[2] & 0x79);
        reply[3] = 0x80 | rcode;
        reply[4..6].copy_from_slice(&[0, 1]);
        reply[6..12].fill(0);
        Some(reply)
    }

    /// Loopback name server that answers every query with `rcode`.
    async fn spawn_name_server(rcode: u8) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 1500];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                if let Some(reply) = empty_reply(&buf[..len], rcode) {
                    let _ = socket.send_to(&reply, peer).await;
                }
            }
        });
        addr
    }

    fn lookup_against(addr: SocketAddr) -> DnsMxLookup {
        DnsMxLookup::with_name_servers(&[addr.ip()], addr.port(), Duration::from_millis(500))
    }

    #[test]
    fn only_nxdomain_and_noerror_are_authoritative() {
        assert!(is_authoritative_code(ResponseCode::NXDomain));
        assert!(is_authoritative_code(ResponseCode::NoError));
        assert!(!is_authoritative_code(ResponseCode::ServFail));
        assert!(!is_authoritative_code(ResponseCode::Refused));
    }

    #[tokio::test]
    async fn server_failure_is_transient_and_not_cached() {
        let addr = spawn_name_server(2).await;
        let err = lookup_against(addr).lookup_mx("acme.test").await.unwrap_err();
        assert!(err.is_transient(), "SERVFAIL must be retryable, got {err}");

        let resolver = MxResolver::new(Arc::new(lookup_against(addr)), Duration::from_secs(60));
        assert!(resolver.resolve("acme.test").await.is_err());
        assert!(resolver.cached("acme.test").is_none());
    }

    #[tokio::test]
    async fn nxdomain_means_no_mail_hosts() {
        let addr = spawn_name_server(3).await;
        let hosts = lookup_against(addr).lookup_mx("acme.test").await.unwrap();
        assert!(hosts.is_empty());
    }

    #[tokio::test]
    async fn expired_entries_are_refreshed() {
        let lookup = Arc::new(StubLookup::with("acme.com", &[("mx.acme.com", 10)]));
        let resolver = MxResolver::new(lookup.clone(), Duration::ZERO);
        resolver.resolve("acme.com").await.unwrap();
        resolver.resolve("acme.com").await.unwrap();
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }
}
