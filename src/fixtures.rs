//! Generated certificates for unit tests.

use crate::types::{Certificate, Chain};
use rcgen::{
    BasicConstraints, Certificate as RcgenCertificate, CertificateParams, DistinguishedName,
    DnType, DnValue, IsCa,
};

fn ca_params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::new(vec![]);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "Certsuck Test");
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
}

fn leaf_params(host: &str) -> CertificateParams {
    let mut params = CertificateParams::new(vec![host.to_string()]);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, host);
    params.distinguished_name = dn;
    params
}

/// Root, intermediate and server certificate, serialised once since every
/// signing run yields different bytes.
pub(crate) struct TestPki {
    pub leaf_der: Vec<u8>,
    pub intermediate_der: Vec<u8>,
    pub root_der: Vec<u8>,
}

impl TestPki {
    pub fn generate() -> Self {
        let root = RcgenCertificate::from_params(ca_params("Certsuck Test Root")).unwrap();
        let intermediate =
            RcgenCertificate::from_params(ca_params("Certsuck Test Intermediate")).unwrap();
        let leaf = RcgenCertificate::from_params(leaf_params("localhost")).unwrap();

        Self {
            leaf_der: leaf.serialize_der_with_signer(&intermediate).unwrap(),
            intermediate_der: intermediate.serialize_der_with_signer(&root).unwrap(),
            root_der: root.serialize_der().unwrap(),
        }
    }

    /// The first `len` certificates of leaf, intermediate, root.
    pub fn chain(&self, len: usize) -> Chain {
        [&self.leaf_der, &self.intermediate_der, &self.root_der]
            .into_iter()
            .take(len)
            .map(|der| Certificate::from_der(der.clone()).unwrap())
            .collect()
    }
}

/// A self-signed server certificate: index 0 and a root at the same time.
pub(crate) fn self_signed(host: &str) -> Certificate {
    let cert = RcgenCertificate::from_params(leaf_params(host)).unwrap();
    Certificate::from_der(cert.serialize_der().unwrap()).unwrap()
}

/// A certificate whose issuer and subject print the same but are encoded
/// with different string types.
pub(crate) fn look_alike_root() -> Certificate {
    let mut signer_params = ca_params("Same Name");
    signer_params.distinguished_name = DistinguishedName::new();
    signer_params
        .distinguished_name
        .push(DnType::CommonName, DnValue::Utf8String("Same Name".to_string()));
    let signer = RcgenCertificate::from_params(signer_params).unwrap();

    let mut params = CertificateParams::new(vec![]);
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::PrintableString("Same Name".to_string()),
    );
    params.distinguished_name = dn;
    let cert = RcgenCertificate::from_params(params).unwrap();

    Certificate::from_der(cert.serialize_der_with_signer(&signer).unwrap()).unwrap()
}
