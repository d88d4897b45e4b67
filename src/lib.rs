//! Certsuck - collect the certificate chains a TLS server presents
//!
//! This library connects to a single `host:port`, records every chain the
//! handshake exposes and turns the most complete one into something useful:
//!
//! - A report of the verified chains and the chain the peer sent
//! - PEM output of the longest chain, optionally without server or root
//! - DER files named `<prefix><NN>.der`, ready for a trust store
//! - Import of those files into a Java trust store through `keytool`
//!
//! # Examples
//!
//! ## Showing the chains of a server
//!
//! ```no_run
//! use certsuck::probe::{Probe, ProbeConfig};
//! use certsuck::report::format_report;
//! use certsuck::types::Endpoint;
//!
//! let endpoint: Endpoint = "www.example.com:443".parse().unwrap();
//! let chains = Probe::new(ProbeConfig::default())
//!     .collect_chains(&endpoint)
//!     .unwrap();
//!
//! print!("{}", format_report(&chains));
//! println!("Longest: {:?}", chains.longest_name());
//! ```
//!
//! ## Exporting intermediates and root as DER files
//!
//! ```no_run
//! use certsuck::export::{write_der_files, DerOptions, ExportFilter};
//! use certsuck::probe::{Probe, ProbeConfig};
//! use certsuck::types::Endpoint;
//!
//! let endpoint: Endpoint = "www.example.com:443".parse().unwrap();
//! let chains = Probe::new(ProbeConfig::default().with_insecure(false))
//!     .collect_chains(&endpoint)
//!     .unwrap();
//!
//! let filter = ExportFilter::new().with_suppress_server(true);
//! let options = DerOptions::new().with_output_dir("certs");
//! let files = write_der_files(chains.longest(), &endpoint, &options, &filter).unwrap();
//! println!("wrote {} files", files.len());
//! ```

pub mod error;
pub mod export;
pub mod keytool;
pub mod probe;
pub mod report;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(test)]
mod fixtures;

pub use error::{Error, Result};

pub use export::{is_root, write_der_files, write_pem, DerOptions, ExportFilter};
pub use keytool::{CertImporter, ImportCert, ImportCerts, Keytool};
pub use probe::{Chains, Probe, ProbeConfig};
pub use report::{format_report, OutputFormat};
pub use types::{Certificate, Chain, ChainSource, Endpoint};
