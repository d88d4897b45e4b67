use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use x509_parser::prelude::*;

/// An X.509 certificate captured from a handshake.
///
/// The DER bytes are owned; the names are decoded once at construction so
/// the chain can outlive the TLS state it was copied from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    issuer: String,
    raw_subject: Vec<u8>,
    raw_issuer: Vec<u8>,
    not_before: String,
    not_after: String,
}

impl Certificate {
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self> {
        let der = der.into();
        let (_, x509) = X509Certificate::from_der(&der)?;

        let subject = format_dn(x509.subject());
        let issuer = format_dn(x509.issuer());
        let raw_subject = x509.subject().as_raw().to_vec();
        let raw_issuer = x509.issuer().as_raw().to_vec();
        let not_before = x509.validity().not_before.to_string();
        let not_after = x509.validity().not_after.to_string();

        Ok(Self {
            der,
            subject,
            issuer,
            raw_subject,
            raw_issuer,
            not_before,
            not_after,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn raw_subject(&self) -> &[u8] {
        &self.raw_subject
    }

    pub fn raw_issuer(&self) -> &[u8] {
        &self.raw_issuer
    }

    /// The certificate exactly as it was received, DER encoded.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn not_before(&self) -> &str {
        &self.not_before
    }

    pub fn not_after(&self) -> &str {
        &self.not_after
    }

    /// Self-issued check: the encoded issuer equals the encoded subject.
    ///
    /// The signature is not checked, so a certificate that merely names
    /// itself as issuer also counts as a root here.
    pub fn is_root(&self) -> bool {
        self.raw_issuer == self.raw_subject
    }
}

/// Ordered list of certificates, the server certificate at index 0.
pub type Chain = Vec<Certificate>;

/// Where a chain in a [`Chains`](crate::probe::Chains) came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainSource {
    Verified(usize),
    Peer,
}

impl fmt::Display for ChainSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainSource::Verified(idx) => write!(f, "Verified {}", idx),
            ChainSource::Peer => write!(f, "Peer"),
        }
    }
}

/// A `host:port` pair to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address without the port or IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::EndpointMissing);
        }

        let invalid = |reason: &str| Error::InvalidEndpoint {
            endpoint: s.to_string(),
            reason: reason.to_string(),
        };

        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid("missing host name"));
        }

        let port: u16 = port.parse().map_err(|_| invalid("invalid port number"))?;

        Ok(Endpoint::new(host, port))
    }
}

fn format_dn(dn: &X509Name) -> String {
    let mut parts = Vec::new();

    for rdn in dn.iter() {
        for attr in rdn.iter() {
            let oid = attr.attr_type().to_id_string();
            let value = attr.as_str().unwrap_or("?");

            let name = match oid.as_str() {
                "2.5.4.3" => "CN",
                "2.5.4.5" => "SERIALNUMBER",
                "2.5.4.6" => "C",
                "2.5.4.7" => "L",
                "2.5.4.8" => "ST",
                "2.5.4.9" => "STREET",
                "2.5.4.10" => "O",
                "2.5.4.11" => "OU",
                "2.5.4.17" => "POSTALCODE",
                "0.9.2342.19200300.100.1.25" => "DC",
                "1.2.840.113549.1.9.1" => "emailAddress",
                _ => {
                    parts.push(format!("{}={}", oid, value));
                    continue;
                }
            };

            parts.push(format!("{}={}", name, value));
        }
    }

    // Most specific attribute first, the way RFC 2253 strings read.
    parts.reverse();
    parts.join(", ")
}
