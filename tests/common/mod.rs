//! Local TLS server and generated PKI shared by the integration tests.

#![allow(dead_code)]

use rcgen::{BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ServerConfig, ServerConnection};
use std::io::Write;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

pub struct TestPki {
    pub leaf_der: Vec<u8>,
    pub leaf_key: Vec<u8>,
    pub intermediate_der: Vec<u8>,
    pub root_der: Vec<u8>,
}

fn ca_params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::new(vec![]);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "Certsuck Test");
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
}

impl TestPki {
    pub fn generate() -> Self {
        let root = Certificate::from_params(ca_params("Certsuck Test Root")).unwrap();
        let intermediate =
            Certificate::from_params(ca_params("Certsuck Test Intermediate")).unwrap();

        let mut params = CertificateParams::new(vec!["localhost".to_string()]);
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "localhost");
        params.distinguished_name = dn;
        let leaf = Certificate::from_params(params).unwrap();

        Self {
            leaf_der: leaf.serialize_der_with_signer(&intermediate).unwrap(),
            leaf_key: leaf.serialize_private_key_der(),
            intermediate_der: intermediate.serialize_der_with_signer(&root).unwrap(),
            root_der: root.serialize_der().unwrap(),
        }
    }

    pub fn full_chain(&self) -> Vec<Vec<u8>> {
        vec![
            self.leaf_der.clone(),
            self.intermediate_der.clone(),
            self.root_der.clone(),
        ]
    }

    /// Writes the root as a PEM bundle usable as extra trust roots.
    pub fn root_pem_file(&self, dir: &std::path::Path) -> PathBuf {
        let path = dir.join("roots.pem");
        let mut file = std::fs::File::create(&path).unwrap();
        let block = pem::Pem::new("CERTIFICATE", self.root_der.clone());
        file.write_all(pem::encode(&block).as_bytes()).unwrap();
        path
    }
}

/// Accepts a single connection, completes the handshake with `chain` and
/// returns the port it listens on.
pub fn serve_once(pki: &TestPki, chain: Vec<Vec<u8>>) -> u16 {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let certs: Vec<CertificateDer<'static>> = chain.into_iter().map(CertificateDer::from).collect();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(pki.leaf_key.clone()));

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();
    let config = Arc::new(config);

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        let Ok((mut sock, _)) = listener.accept() else {
            return;
        };
        let Ok(mut conn) = ServerConnection::new(config) else {
            return;
        };
        while conn.is_handshaking() {
            if conn.complete_io(&mut sock).is_err() {
                return;
            }
        }
        let _ = conn.complete_io(&mut sock);
    });

    port
}
