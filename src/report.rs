//! Textual rendering of a [`Chains`] value.

use crate::error::{Error, Result};
use crate::probe::Chains;
use crate::types::{Certificate, ChainSource};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    #[cfg(feature = "json")]
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(OutputFormat::Text),
            #[cfg(feature = "json")]
            "json" => Ok(OutputFormat::Json),
            _ => Err(Error::InvalidInput(format!("Invalid format: {}", s))),
        }
    }
}

pub fn display_chains(chains: &Chains, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_report(chains)),
        #[cfg(feature = "json")]
        OutputFormat::Json => display_json(chains),
    }
}

/// One section per verified chain, then the peer chain when it is not empty.
///
/// Certificates keep their chain order and nothing is filtered.
pub fn format_report(chains: &Chains) -> String {
    let mut output = String::new();

    for (idx, chain) in chains.verified().iter().enumerate() {
        push_section(&mut output, ChainSource::Verified(idx), chain);
    }
    if !chains.peer().is_empty() {
        push_section(&mut output, ChainSource::Peer, chains.peer());
    }

    output
}

fn push_section(output: &mut String, source: ChainSource, chain: &[Certificate]) {
    let _ = writeln!(output, "{}", source);
    for (idx, cert) in chain.iter().enumerate() {
        push_summary(output, idx, cert);
    }
}

/// The two-line summary shared by the report and the PEM export.
pub(crate) fn push_summary(output: &mut String, idx: usize, cert: &Certificate) {
    let _ = writeln!(output, "{:2}  Subject: {}", idx, cert.subject());
    let _ = writeln!(output, "    Issuer:  {}", cert.issuer());
}

#[cfg(feature = "json")]
fn display_json(chains: &Chains) -> Result<String> {
    use serde::Serialize;

    #[derive(Serialize)]
    struct JsonCertificate<'a> {
        index: usize,
        subject: &'a str,
        issuer: &'a str,
        not_before: &'a str,
        not_after: &'a str,
        is_root: bool,
    }

    #[derive(Serialize)]
    struct JsonChain<'a> {
        name: String,
        certificates: Vec<JsonCertificate<'a>>,
    }

    #[derive(Serialize)]
    struct JsonChains<'a> {
        longest: Option<String>,
        chains: Vec<JsonChain<'a>>,
    }

    fn to_json(source: ChainSource, chain: &[Certificate]) -> JsonChain<'_> {
        JsonChain {
            name: source.to_string(),
            certificates: chain
                .iter()
                .enumerate()
                .map(|(index, cert)| JsonCertificate {
                    index,
                    subject: cert.subject(),
                    issuer: cert.issuer(),
                    not_before: cert.not_before(),
                    not_after: cert.not_after(),
                    is_root: cert.is_root(),
                })
                .collect(),
        }
    }

    let mut sections: Vec<JsonChain> = chains
        .verified()
        .iter()
        .enumerate()
        .map(|(idx, chain)| to_json(ChainSource::Verified(idx), chain))
        .collect();
    if !chains.peer().is_empty() {
        sections.push(to_json(ChainSource::Peer, chains.peer()));
    }

    let json = JsonChains {
        longest: chains.longest_name(),
        chains: sections,
    };

    Ok(serde_json::to_string_pretty(&json)?)
}
