//! PEM and DER export of a single chain.
//!
//! Both writers walk the chain through [`ExportFilter::select`], so the
//! server/root suppression rules are applied the same way for either format.

use crate::error::{Error, Result};
use crate::report::push_summary;
use crate::types::{Certificate, Endpoint};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// True when the certificate's encoded issuer equals its encoded subject.
pub fn is_root(cert: &Certificate) -> bool {
    cert.is_root()
}

/// Which certificates to leave out of an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportFilter {
    pub suppress_server: bool,
    pub suppress_root: bool,
}

/// A certificate that survived filtering.
#[derive(Debug, Clone, Copy)]
pub struct Selected<'a> {
    pub index: usize,
    pub cert: &'a Certificate,
    pub is_server: bool,
    pub is_root: bool,
}

impl ExportFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suppress_server(mut self, suppress: bool) -> Self {
        self.suppress_server = suppress;
        self
    }

    pub fn with_suppress_root(mut self, suppress: bool) -> Self {
        self.suppress_root = suppress;
        self
    }

    /// Walks the chain in order and drops index 0 and self-issued
    /// certificates as configured. The two rules are independent: a
    /// self-signed server certificate is both server and root.
    pub fn select<'a>(&self, chain: &'a [Certificate]) -> Vec<Selected<'a>> {
        chain
            .iter()
            .enumerate()
            .map(|(index, cert)| Selected {
                index,
                cert,
                is_server: index == 0,
                is_root: is_root(cert),
            })
            .filter(|s| !(s.is_server && self.suppress_server))
            .filter(|s| !(s.is_root && self.suppress_root))
            .collect()
    }
}

/// Writes a summary and a PEM block for every selected certificate.
pub fn write_pem<W: Write>(
    writer: &mut W,
    chain: &[Certificate],
    filter: &ExportFilter,
) -> Result<()> {
    for selected in filter.select(chain) {
        let mut block = String::new();
        if selected.is_server {
            block.push_str("Server certificate\n");
        }
        if selected.is_root {
            block.push_str("Root certificate\n");
        }
        push_summary(&mut block, selected.index, selected.cert);
        block.push_str(&pem_block(selected.cert));

        writer
            .write_all(block.as_bytes())
            .map_err(|source| Error::Encoding {
                subject: selected.cert.subject().to_string(),
                source,
            })?;
    }

    Ok(())
}

/// Convenience wrapper around [`write_pem`] for in-memory output.
pub fn format_pem(chain: &[Certificate], filter: &ExportFilter) -> Result<String> {
    let mut buffer = Vec::new();
    write_pem(&mut buffer, chain, filter)?;
    String::from_utf8(buffer).map_err(|e| Error::Serialization(e.to_string()))
}

fn pem_block(cert: &Certificate) -> String {
    let block = pem::Pem::new("CERTIFICATE", cert.der().to_vec());
    pem::encode_config(
        &block,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// Where DER files go and how they are named.
#[derive(Debug, Clone)]
pub struct DerOptions {
    pub output_dir: PathBuf,
    /// Defaults to `<host>-` when unset.
    pub file_prefix: Option<String>,
}

impl DerOptions {
    pub fn new() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_prefix: None,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.file_prefix = if prefix.is_empty() { None } else { Some(prefix) };
        self
    }

    fn prefix_for(&self, endpoint: &Endpoint) -> String {
        match &self.file_prefix {
            Some(prefix) => prefix.clone(),
            None => format!("{}-", endpoint.host()),
        }
    }

    /// `<output_dir>/<prefix><NN>.der`.
    pub fn file_path(&self, endpoint: &Endpoint, index: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}{:02}.der", self.prefix_for(endpoint), index))
    }
}

impl Default for DerOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes every selected certificate to its own DER file and returns the
/// paths in chain order.
///
/// Stops at the first failed write; files already written stay on disk.
pub fn write_der_files(
    chain: &[Certificate],
    endpoint: &Endpoint,
    options: &DerOptions,
    filter: &ExportFilter,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    for selected in filter.select(chain) {
        let path = options.file_path(endpoint, selected.index);
        write_file(&path, selected.cert.der()).map_err(|source| Error::FileWrite {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), subject = selected.cert.subject(), "wrote DER file");
        written.push(path);
    }

    Ok(written)
}

fn write_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)
}
