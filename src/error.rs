use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("missing host: expected <host>:<port>")]
    EndpointMissing,

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("error connecting to {endpoint}: {source}")]
    Dial {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Certificate parsing error: {0}")]
    CertParse(String),

    #[error("Trust store error: {0}")]
    TrustStore(String),

    #[error("error encoding {subject}: {source}")]
    Encoding {
        subject: String,
        #[source]
        source: io::Error,
    },

    #[error("error writing DER file {}: {source}", path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("not enough aliases: {aliases} aliases for {files} files")]
    AliasCountMismatch { aliases: usize, files: usize },

    #[error("could not start {program}: {source}")]
    ToolSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed importing {file} ({status}): {output}")]
    ExternalTool {
        program: String,
        file: String,
        status: ExitStatus,
        output: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True when the error stems from what the caller supplied rather than
    /// from the network, the filesystem or an external tool.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::EndpointMissing
                | Error::InvalidEndpoint { .. }
                | Error::InvalidInput(_)
                | Error::AliasCountMismatch { .. }
        )
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::Tls(err.to_string())
    }
}

impl From<x509_parser::nom::Err<x509_parser::error::X509Error>> for Error {
    fn from(err: x509_parser::nom::Err<x509_parser::error::X509Error>) -> Self {
        Error::CertParse(format!("Failed to parse certificate: {}", err))
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
