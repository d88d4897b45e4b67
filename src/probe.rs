//! Handshake driver and chain selection.
//!
//! The probe opens one TLS connection and records, from inside the
//! certificate verification hook, the chain the server sent and the chain
//! the path builder validated against the local trust store. The connection
//! is closed as soon as the handshake is done.

use crate::error::{Error, Result};
use crate::types::{Certificate, Chain, ChainSource, Endpoint};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::Resumption;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, TrustAnchor, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme};
use std::net::{Shutdown, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Settings for a single probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Complete the handshake even when the chain does not validate.
    pub insecure: bool,
    /// PEM bundle of additional trusted roots.
    pub extra_roots: Option<PathBuf>,
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self {
            insecure: true,
            extra_roots: None,
        }
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_extra_roots(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_roots = Some(path.into());
        self
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The chains observed during one handshake.
#[derive(Debug, Clone, Default)]
pub struct Chains {
    verified: Vec<Chain>,
    peer: Chain,
    longest: Option<ChainSource>,
}

impl Chains {
    /// Builds the chain set and selects the longest chain.
    pub fn from_parts(verified: Vec<Chain>, peer: Chain) -> Self {
        let longest = select_longest(&verified, &peer);
        Self {
            verified,
            peer,
            longest,
        }
    }

    /// Chains validated against the trust store, in the order the path
    /// builder produced them.
    pub fn verified(&self) -> &[Chain] {
        &self.verified
    }

    /// The chain exactly as the server sent it.
    pub fn peer(&self) -> &[Certificate] {
        &self.peer
    }

    pub fn longest_source(&self) -> Option<ChainSource> {
        self.longest
    }

    /// `"Verified <i>"` or `"Peer"`, `None` when every chain is empty.
    pub fn longest_name(&self) -> Option<String> {
        self.longest.map(|source| source.to_string())
    }

    /// The longest chain, borrowed from `verified` or `peer`.
    pub fn longest(&self) -> &[Certificate] {
        self.longest
            .and_then(|source| self.chain(source))
            .unwrap_or(&[])
    }

    pub fn chain(&self, source: ChainSource) -> Option<&[Certificate]> {
        match source {
            ChainSource::Verified(idx) => self.verified.get(idx).map(Vec::as_slice),
            ChainSource::Peer => Some(&self.peer),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.verified.iter().all(Vec::is_empty) && self.peer.is_empty()
    }
}

/// Picks the chain with the most certificates.
///
/// Verified chains are scanned in order and only a strictly longer chain
/// replaces the current pick, so the first verified chain wins a tie and
/// the peer chain is chosen only when it is longer than all of them.
pub fn select_longest(verified: &[Chain], peer: &[Certificate]) -> Option<ChainSource> {
    let mut longest = None;
    let mut len = 0;

    for (idx, chain) in verified.iter().enumerate() {
        if chain.len() > len {
            longest = Some(ChainSource::Verified(idx));
            len = chain.len();
        }
    }
    if peer.len() > len {
        longest = Some(ChainSource::Peer);
    }

    longest
}

pub struct Probe {
    config: ProbeConfig,
}

impl Probe {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Connects to `endpoint`, completes the handshake and returns the chains
    /// seen by the verification hook.
    pub fn collect_chains(&self, endpoint: &Endpoint) -> Result<Chains> {
        let roots = TrustStore::load(self.config.extra_roots.as_deref())?;
        debug!(anchors = roots.anchors.len(), "loaded trust store");

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let captured = Arc::new(Mutex::new(CapturedChains::default()));
        let verifier = ChainCapturingVerifier {
            roots,
            provider: Arc::clone(&provider),
            insecure: self.config.insecure,
            captured: Arc::clone(&captured),
        };

        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();
        config.resumption = Resumption::disabled();

        let server_name = ServerName::try_from(endpoint.host().to_string()).map_err(|e| {
            Error::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
        })?;

        let dial_error = |source| Error::Dial {
            endpoint: endpoint.to_string(),
            source,
        };

        debug!(%endpoint, insecure = self.config.insecure, "connecting");
        let mut sock = TcpStream::connect((endpoint.host(), endpoint.port())).map_err(dial_error)?;
        let mut conn = ClientConnection::new(Arc::new(config), server_name)?;

        while conn.is_handshaking() {
            conn.complete_io(&mut sock).map_err(dial_error)?;
        }
        debug!(
            %endpoint,
            version = ?conn.protocol_version(),
            "handshake complete"
        );

        conn.send_close_notify();
        while conn.wants_write() {
            if conn.write_tls(&mut sock).is_err() {
                break;
            }
        }
        let _ = sock.shutdown(Shutdown::Both);

        take_captured(&captured)?.into_chains()
    }
}

/// Empties the capture slot. A poisoned lock means the hook panicked
/// mid-write, so nothing in the slot can be trusted.
fn take_captured(captured: &Mutex<CapturedChains>) -> Result<CapturedChains> {
    captured
        .lock()
        .map(|mut slot| std::mem::take(&mut *slot))
        .map_err(|_| Error::Tls("certificate capture lock poisoned".to_string()))
}

/// DER copies of the chains seen by the hook.
#[derive(Debug, Default)]
struct CapturedChains {
    verified: Vec<Vec<Vec<u8>>>,
    peer: Vec<Vec<u8>>,
}

impl CapturedChains {
    fn into_chains(self) -> Result<Chains> {
        let verified = self
            .verified
            .into_iter()
            .map(parse_chain)
            .collect::<Result<Vec<_>>>()?;
        let peer = parse_chain(self.peer)?;

        Ok(Chains::from_parts(verified, peer))
    }
}

fn parse_chain(ders: Vec<Vec<u8>>) -> Result<Chain> {
    ders.into_iter().map(Certificate::from_der).collect()
}

/// Trust anchors together with the certificates they were taken from, so a
/// validated path can be completed with the full root certificate.
#[derive(Debug)]
struct TrustStore {
    certs: Vec<CertificateDer<'static>>,
    anchors: Vec<TrustAnchor<'static>>,
}

impl TrustStore {
    fn load(extra_roots: Option<&Path>) -> Result<Self> {
        let mut store = TrustStore {
            certs: Vec::new(),
            anchors: Vec::new(),
        };

        let native = rustls_native_certs::load_native_certs();
        for error in native.errors {
            warn!(%error, "error loading native root certificates");
        }
        for cert in native.certs {
            store.add(cert);
        }

        if let Some(path) = extra_roots {
            let data = std::fs::read(path).map_err(|e| {
                Error::TrustStore(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let blocks = pem::parse_many(&data).map_err(|e| {
                Error::TrustStore(format!("Failed to parse {}: {}", path.display(), e))
            })?;

            let mut added = 0;
            for block in blocks.into_iter().filter(|p| p.tag() == "CERTIFICATE") {
                if store.add(CertificateDer::from(block.into_contents())) {
                    added += 1;
                }
            }
            if added == 0 {
                return Err(Error::TrustStore(format!(
                    "No usable certificates in {}",
                    path.display()
                )));
            }
            debug!(path = %path.display(), added, "added extra roots");
        }

        Ok(store)
    }

    fn add(&mut self, cert: CertificateDer<'static>) -> bool {
        let anchor = webpki::anchor_from_trusted_cert(&cert).map(|a| a.to_owned());
        match anchor {
            Ok(anchor) => {
                self.anchors.push(anchor);
                self.certs.push(cert);
                true
            }
            Err(e) => {
                debug!(error = ?e, "skipping unusable root certificate");
                false
            }
        }
    }

    fn certificate_for(&self, anchor: &TrustAnchor<'_>) -> Option<&CertificateDer<'static>> {
        self.anchors
            .iter()
            .position(|a| {
                a.subject.as_ref() == anchor.subject.as_ref()
                    && a.subject_public_key_info.as_ref() == anchor.subject_public_key_info.as_ref()
            })
            .map(|idx| &self.certs[idx])
    }
}

/// Verifier that records what it sees before deciding.
///
/// The path builder runs on every handshake; `insecure` only decides whether
/// a failed validation aborts the handshake.
#[derive(Debug)]
struct ChainCapturingVerifier {
    roots: TrustStore,
    provider: Arc<CryptoProvider>,
    insecure: bool,
    captured: Arc<Mutex<CapturedChains>>,
}

impl ChainCapturingVerifier {
    fn build_path(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        now: UnixTime,
    ) -> std::result::Result<Vec<Vec<u8>>, rustls::Error> {
        let cert = webpki::EndEntityCert::try_from(end_entity).map_err(pki_error)?;

        let path = cert
            .verify_for_usage(
                self.provider.signature_verification_algorithms.all,
                &self.roots.anchors,
                intermediates,
                now,
                webpki::KeyUsage::server_auth(),
                None,
                None,
            )
            .map_err(pki_error)?;

        cert.verify_is_valid_for_subject_name(server_name)
            .map_err(pki_error)?;

        let mut chain = vec![end_entity.to_vec()];
        chain.extend(path.intermediate_certificates().map(|c| c.der().to_vec()));
        if let Some(root) = self.roots.certificate_for(path.anchor()) {
            chain.push(root.to_vec());
        }

        Ok(chain)
    }
}

impl ServerCertVerifier for ChainCapturingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let mut peer = Vec::with_capacity(intermediates.len() + 1);
        peer.push(end_entity.to_vec());
        peer.extend(intermediates.iter().map(|c| c.to_vec()));

        let outcome = self.build_path(end_entity, intermediates, server_name, now);

        let verified = match &outcome {
            Ok(chain) => vec![chain.clone()],
            Err(e) => {
                if self.insecure {
                    warn!(error = %e, "chain did not verify, continuing without a verified chain");
                }
                Vec::new()
            }
        };

        match self.captured.lock() {
            Ok(mut slot) => *slot = CapturedChains { verified, peer },
            Err(_) => {
                warn!("certificate capture lock poisoned, aborting handshake");
                return Err(rustls::Error::General(
                    "certificate capture lock poisoned".to_string(),
                ));
            }
        }

        match outcome {
            Err(e) if !self.insecure => Err(e),
            _ => Ok(ServerCertVerified::assertion()),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn pki_error(err: webpki::Error) -> rustls::Error {
    use rustls::CertificateError;

    match err {
        webpki::Error::BadDer => CertificateError::BadEncoding.into(),
        webpki::Error::UnknownIssuer => CertificateError::UnknownIssuer.into(),
        webpki::Error::InvalidSignatureForPublicKey => CertificateError::BadSignature.into(),
        other => rustls::Error::General(format!("certificate verification failed: {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_tie_prefers_first_verified_chain() {
        let pki = fixtures::TestPki::generate();
        let verified = vec![pki.chain(2), pki.chain(3)];
        let chains = Chains::from_parts(verified, pki.chain(3));

        assert_eq!(chains.longest_source(), Some(ChainSource::Verified(1)));
        assert_eq!(chains.longest_name().as_deref(), Some("Verified 1"));
        assert!(std::ptr::eq(
            chains.longest().as_ptr(),
            chains.verified()[1].as_ptr()
        ));
    }

    #[test]
    fn test_equal_lengths_keep_index_zero() {
        let pki = fixtures::TestPki::generate();
        let chains = Chains::from_parts(vec![pki.chain(3), pki.chain(3)], pki.chain(3));

        assert_eq!(chains.longest_name().as_deref(), Some("Verified 0"));
        assert_eq!(chains.longest().len(), 3);
    }

    #[test]
    fn test_strictly_longer_peer_wins() {
        let pki = fixtures::TestPki::generate();
        let chains = Chains::from_parts(vec![pki.chain(1), pki.chain(2)], pki.chain(3));

        assert_eq!(chains.longest_source(), Some(ChainSource::Peer));
        assert_eq!(chains.longest_name().as_deref(), Some("Peer"));
        assert!(std::ptr::eq(
            chains.longest().as_ptr(),
            chains.peer().as_ptr()
        ));
    }

    #[test]
    fn test_peer_only() {
        let pki = fixtures::TestPki::generate();
        let chains = Chains::from_parts(Vec::new(), pki.chain(2));

        assert_eq!(chains.longest_name().as_deref(), Some("Peer"));
        assert_eq!(chains.longest().len(), 2);
    }

    #[test]
    fn test_empty_chains() {
        let chains = Chains::from_parts(Vec::new(), Vec::new());

        assert!(chains.is_empty());
        assert!(chains.longest().is_empty());
        assert_eq!(chains.longest_source(), None);
        assert_eq!(chains.longest_name(), None);
    }

    #[test]
    fn test_empty_verified_entries_are_not_selected() {
        let chains = Chains::from_parts(vec![Vec::new(), Vec::new()], Vec::new());
        assert_eq!(chains.longest_name(), None);
    }

    #[test]
    fn test_chain_lookup() {
        let pki = fixtures::TestPki::generate();
        let chains = Chains::from_parts(vec![pki.chain(3)], pki.chain(2));

        assert_eq!(chains.chain(ChainSource::Verified(0)).map(<[_]>::len), Some(3));
        assert_eq!(chains.chain(ChainSource::Peer).map(<[_]>::len), Some(2));
        assert!(chains.chain(ChainSource::Verified(1)).is_none());
    }

    #[test]
    fn test_default_config_is_insecure() {
        let config = ProbeConfig::default();
        assert!(config.insecure);
        assert!(config.extra_roots.is_none());

        let config = config.with_insecure(false).with_extra_roots("roots.pem");
        assert!(!config.insecure);
        assert_eq!(config.extra_roots, Some(PathBuf::from("roots.pem")));
    }

    #[test]
    fn test_missing_extra_roots_file() {
        let result = TrustStore::load(Some(Path::new("/nonexistent/certsuck/roots.pem")));
        assert!(matches!(result, Err(Error::TrustStore(_))));
    }

    #[test]
    fn test_dial_failure_is_reported() {
        // Bind then drop a listener to get a port nothing listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let probe = Probe::new(ProbeConfig::default());
        let result = probe.collect_chains(&Endpoint::new("127.0.0.1", port));
        assert!(matches!(result, Err(Error::Dial { .. })));
    }
    fn poisoned_capture() -> Arc<Mutex<CapturedChains>> {
        let captured = Arc::new(Mutex::new(CapturedChains::default()));
        let slot = Arc::clone(&captured);
        let _ = std::thread::spawn(move || {
            let _guard = slot.lock().unwrap();
            panic!("hook panicked while holding the capture lock");
        })
        .join();
        captured
    }

    #[test]
    fn test_take_captured_empties_slot() {
        let captured = Mutex::new(CapturedChains {
            verified: Vec::new(),
            peer: vec![vec![0x30]],
        });

        assert_eq!(take_captured(&captured).unwrap().peer.len(), 1);
        assert!(take_captured(&captured).unwrap().peer.is_empty());
    }

    #[test]
    fn test_poisoned_capture_is_an_error() {
        let captured = poisoned_capture();
        assert!(matches!(take_captured(&captured), Err(Error::Tls(_))));
    }

    #[test]
    fn test_poisoned_capture_fails_handshake_even_when_insecure() {
        let pki = fixtures::TestPki::generate();
        let verifier = ChainCapturingVerifier {
            roots: TrustStore {
                certs: Vec::new(),
                anchors: Vec::new(),
            },
            provider: Arc::new(rustls::crypto::ring::default_provider()),
            insecure: true,
            captured: poisoned_capture(),
        };

        let leaf = CertificateDer::from(pki.leaf_der.clone());
        let server_name = ServerName::try_from("localhost").unwrap();
        let result =
            verifier.verify_server_cert(&leaf, &[], &server_name, &[], UnixTime::now());

        assert!(result.is_err());
    }
}
