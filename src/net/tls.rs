//! TLS configuration and certificate loading.
//!
//! All configured certificates are served from a single rustls
//! configuration. The certificate is chosen by the client's SNI against
//! each certificate's host names: the configured `sni_names` when given,
//! otherwise the DNS subjectAltNames of the leaf certificate (its common
//! name when it has none). The first configured certificate is the default.

use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::aws_lc_rs;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use rustls_pemfile::{certs, private_key};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::config::{CertificateConfig, TlsConfig};

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("no certificates configured")]
    NoCertificates,

    #[error("failed to load certificate {path}: {message}")]
    Certificate { path: String, message: String },

    #[error("failed to load private key {path}: {message}")]
    PrivateKey { path: String, message: String },

    #[error("invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let err = |message: String| TlsError::Certificate {
        path: path.display().to_string(),
        message,
    };
    let file = File::open(path).map_err(|e| err(e.to_string()))?;
    let chain = certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| err(e.to_string()))?;
    if chain.is_empty() {
        return Err(err("no certificates found in file".to_string()));
    }
    Ok(chain)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let err = |message: String| TlsError::PrivateKey {
        path: path.display().to_string(),
        message,
    };
    let file = File::open(path).map_err(|e| err(e.to_string()))?;
    private_key(&mut BufReader::new(file))
        .map_err(|e| err(e.to_string()))?
        .ok_or_else(|| err("no private key found in file".to_string()))
}

/// DNS subjectAltNames of `leaf`, or its common names when it has none.
fn certificate_names(leaf: &CertificateDer<'_>) -> Result<Vec<String>, String> {
    let (_, cert) = X509Certificate::from_der(leaf.as_ref()).map_err(|e| e.to_string())?;
    let mut names: Vec<String> = match cert.subject_alternative_name() {
        Ok(Some(san)) => san
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect(),
        Ok(None) => Vec::new(),
        Err(e) => return Err(e.to_string()),
    };
    if names.is_empty() {
        names = cert
            .subject()
            .iter_common_name()
            .filter_map(|cn| cn.as_str().ok())
            .map(str::to_string)
            .collect();
    }
    Ok(names)
}

/// Load one certificate/key pair and the host names it answers for.
fn load_entry(config: &CertificateConfig) -> Result<(Vec<String>, Arc<CertifiedKey>), TlsError> {
    let chain = load_certificates(&config.cert_path)?;
    let names = if config.sni_names.is_empty() {
        certificate_names(&chain[0]).map_err(|message| TlsError::Certificate {
            path: config.cert_path.display().to_string(),
            message,
        })?
    } else {
        config.sni_names.clone()
    };

    let key = load_private_key(&config.key_path)?;
    let signing_key = aws_lc_rs::sign::any_supported_type(&key).map_err(|e| TlsError::PrivateKey {
        path: config.key_path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok((names, Arc::new(CertifiedKey::new(chain, signing_key))))
}

/// Exact names match exactly; `*.suffix` matches one extra label.
fn sni_matches(pattern: &str, hostname: &str) -> bool {
    if pattern.eq_ignore_ascii_case(hostname) {
        return true;
    }
    match pattern.strip_prefix("*.") {
        Some(suffix) => hostname
            .split_once('.')
            .is_some_and(|(label, rest)| !label.is_empty() && rest.eq_ignore_ascii_case(suffix)),
        None => false,
    }
}

/// Picks a certificate by SNI.
pub struct SniResolver {
    entries: Vec<(Vec<String>, Arc<CertifiedKey>)>,
}

impl std::fmt::Debug for SniResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SniResolver")
            .field(
                "names",
                &self.entries.iter().map(|(names, _)| names).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl SniResolver {
    /// Load every configured certificate in order.
    pub fn from_config(config: &TlsConfig) -> Result<Self, TlsError> {
        if config.certificates.is_empty() {
            return Err(TlsError::NoCertificates);
        }

        let mut entries = Vec::with_capacity(config.certificates.len());
        for cert in &config.certificates {
            let (names, key) = load_entry(cert)?;
            if names.is_empty() {
                tracing::warn!(cert_path = %cert.cert_path.display(), "Certificate has no host names, only usable as default");
            }
            tracing::info!(cert_path = %cert.cert_path.display(), names = ?names, "Loaded certificate");
            entries.push((names, key));
        }
        Ok(Self { entries })
    }

    fn index_for(&self, sni: Option<&str>) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        let Some(sni) = sni else {
            return Some(0);
        };
        let found = self
            .entries
            .iter()
            .position(|(names, _)| names.iter().any(|n| sni_matches(n, sni)));
        if found.is_none() {
            tracing::debug!(sni = %sni, "No certificate for SNI, using default");
        }
        Some(found.unwrap_or(0))
    }
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.index_for(client_hello.server_name())
            .map(|i| Arc::clone(&self.entries[i].1))
    }
}

/// Build the listener's TLS configuration from every configured certificate.
pub fn load_tls_config(config: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    let resolver = SniResolver::from_config(config)?;
    let mut server_config = ServerConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(resolver));
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(RustlsConfig::from_config(Arc::new(server_config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn sni_exact_and_wildcard() {
        assert!(sni_matches("example.com", "example.com"));
        assert!(sni_matches("example.com", "EXAMPLE.com"));
        assert!(!sni_matches("example.com", "www.example.com"));
        assert!(sni_matches("*.example.com", "www.example.com"));
        assert!(!sni_matches("*.example.com", "example.com"));
        assert!(!sni_matches("*.example.com", "a.b.example.com"));
    }

    #[test]
    fn missing_certificate_file_is_an_error() {
        let config = TlsConfig {
            certificates: vec![CertificateConfig {
                cert_path: PathBuf::from("/nonexistent/cert.pem"),
                key_path: PathBuf::from("/nonexistent/key.pem"),
                sni_names: vec![],
            }],
        };
        assert!(matches!(
            load_tls_config(&config),
            Err(TlsError::Certificate { .. })
        ));
    }

    #[test]
    fn empty_config_is_an_error() {
        assert!(matches!(
            load_tls_config(&TlsConfig::default()),
            Err(TlsError::NoCertificates)
        ));
    }

    fn write_certificate(dir: &Path, file: &str, params: rcgen::CertificateParams) -> CertificateConfig {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        let cert_path = dir.join(format!("{file}.crt"));
        let key_path = dir.join(format!("{file}.key"));
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();
        CertificateConfig {
            cert_path,
            key_path,
            sni_names: vec![],
        }
    }

    fn san_certificate(dir: &Path, file: &str, names: &[&str]) -> CertificateConfig {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        write_certificate(dir, file, rcgen::CertificateParams::new(names).unwrap())
    }

    #[test]
    fn names_come_from_certificate_sans() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = SniResolver::from_config(&TlsConfig {
            certificates: vec![
                san_certificate(dir.path(), "a", &["a.local"]),
                san_certificate(dir.path(), "b", &["b.local", "*.b.local"]),
            ],
        })
        .unwrap();

        assert_eq!(resolver.index_for(Some("a.local")), Some(0));
        assert_eq!(resolver.index_for(Some("b.local")), Some(1));
        assert_eq!(resolver.index_for(Some("api.b.local")), Some(1));
        assert_eq!(resolver.index_for(Some("unknown.local")), Some(0));
        assert_eq!(resolver.index_for(None), Some(0));
    }

    #[test]
    fn common_name_used_without_sans() {
        let dir = tempfile::tempdir().unwrap();
        let mut params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "cn.local");
        let resolver = SniResolver::from_config(&TlsConfig {
            certificates: vec![
                san_certificate(dir.path(), "a", &["a.local"]),
                write_certificate(dir.path(), "cn", params),
            ],
        })
        .unwrap();

        assert_eq!(resolver.index_for(Some("cn.local")), Some(1));
    }

    #[test]
    fn configured_names_override_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let mut second = san_certificate(dir.path(), "b", &["b.local"]);
        second.sni_names = vec!["other.local".into()];
        let resolver = SniResolver::from_config(&TlsConfig {
            certificates: vec![san_certificate(dir.path(), "a", &["a.local"]), second],
        })
        .unwrap();

        assert_eq!(resolver.index_for(Some("other.local")), Some(1));
        assert_eq!(resolver.index_for(Some("b.local")), Some(0));
    }

    #[test]
    fn builds_rustls_config_from_generated_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let config = TlsConfig {
            certificates: vec![san_certificate(dir.path(), "a", &["a.local"])],
        };
        assert!(load_tls_config(&config).is_ok());
    }

    #[test]
    fn empty_pem_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        std::fs::write(&cert, "").unwrap();
        assert!(matches!(
            load_certificates(&cert),
            Err(TlsError::Certificate { .. })
        ));
    }
}
