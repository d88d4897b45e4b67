//! Import exported DER files into a Java trust store with `keytool`.

use crate::error::{Error, Result};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, info};

pub const KEYTOOL: &str = "keytool";
pub const DEFAULT_PASSWORD: &str = "changeit";

/// One `keytool -importcert` invocation.
#[derive(Debug, Clone)]
pub struct ImportCert {
    pub keystore: PathBuf,
    pub alias: Option<String>,
    pub file: PathBuf,
    pub storepass: String,
    pub keypass: String,
}

impl ImportCert {
    pub fn new(keystore: impl Into<PathBuf>, file: impl Into<PathBuf>) -> Self {
        Self {
            keystore: keystore.into(),
            alias: None,
            file: file.into(),
            storepass: DEFAULT_PASSWORD.to_string(),
            keypass: DEFAULT_PASSWORD.to_string(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The explicit alias, or one derived from the file name.
    pub fn alias(&self) -> String {
        match &self.alias {
            Some(alias) if !alias.is_empty() => alias.clone(),
            _ => alias_from_file(&self.file),
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-importcert".to_string(),
            "-keystore".to_string(),
            self.keystore.display().to_string(),
            "-alias".to_string(),
            self.alias(),
            "-file".to_string(),
            self.file.display().to_string(),
            "-storepass".to_string(),
            self.storepass.clone(),
            "-keypass".to_string(),
            self.keypass.clone(),
        ]
    }
}

/// File name with spaces replaced by underscores.
pub fn alias_from_file(file: &Path) -> String {
    file.file_name()
        .map(|name| name.to_string_lossy().replace(' ', "_"))
        .unwrap_or_default()
}

/// Anything that can add a certificate to a trust store.
pub trait CertImporter {
    fn import(&self, cert: &ImportCert) -> Result<()>;
}

/// Runs the `keytool` binary, answering its confirmation prompt with `y`.
#[derive(Debug, Clone)]
pub struct Keytool {
    program: PathBuf,
}

impl Keytool {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(KEYTOOL),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Keytool {
    fn default() -> Self {
        Self::new()
    }
}

impl CertImporter for Keytool {
    fn import(&self, cert: &ImportCert) -> Result<()> {
        let program = self.program.display().to_string();
        debug!(%program, alias = %cert.alias(), file = %cert.file.display(), "running keytool");

        let mut child = Command::new(&self.program)
            .args(cert.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::ToolSpawn {
                program: program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // Ends with a broken pipe once keytool exits.
            thread::spawn(move || {
                let _ = io::copy(&mut YesReader::new("y"), &mut stdin);
            });
        }

        let output = child.wait_with_output().map_err(|source| Error::ToolSpawn {
            program: program.clone(),
            source,
        })?;

        if !output.status.success() {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(Error::ExternalTool {
                program,
                file: cert.file.display().to_string(),
                status: output.status,
                output: text.trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Imports a batch of files into one store.
#[derive(Debug, Clone)]
pub struct ImportCerts {
    pub keystore: PathBuf,
    pub aliases: Vec<String>,
    pub files: Vec<PathBuf>,
    pub storepass: String,
    pub keypass: String,
}

impl ImportCerts {
    pub fn new(keystore: impl Into<PathBuf>, files: Vec<PathBuf>) -> Self {
        Self {
            keystore: keystore.into(),
            aliases: Vec::new(),
            files,
            storepass: DEFAULT_PASSWORD.to_string(),
            keypass: DEFAULT_PASSWORD.to_string(),
        }
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_passwords(mut self, storepass: impl Into<String>, keypass: impl Into<String>) -> Self {
        self.storepass = storepass.into();
        self.keypass = keypass.into();
        self
    }

    /// Imports the files in order and stops at the first failure; entries
    /// imported before it stay in the store.
    pub fn run(&self, importer: &dyn CertImporter) -> Result<()> {
        if !self.aliases.is_empty() && self.aliases.len() < self.files.len() {
            return Err(Error::AliasCountMismatch {
                aliases: self.aliases.len(),
                files: self.files.len(),
            });
        }

        for (idx, file) in self.files.iter().enumerate() {
            let alias = self
                .aliases
                .get(idx)
                .cloned()
                .unwrap_or_else(|| alias_from_file(file));

            let cert = ImportCert {
                keystore: self.keystore.clone(),
                alias: Some(alias),
                file: file.clone(),
                storepass: self.storepass.clone(),
                keypass: self.keypass.clone(),
            };
            importer.import(&cert)?;
            info!(keystore = %self.keystore.display(), alias = %cert.alias(), "imported certificate");
        }

        Ok(())
    }
}

/// Endless stream of the same line, for tools that prompt for confirmation.
#[derive(Debug)]
pub struct YesReader {
    line: Vec<u8>,
    pending: Vec<u8>,
}

impl YesReader {
    pub fn new(line: &str) -> Self {
        let line = if line.is_empty() { "y" } else { line };
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        Self {
            line: bytes,
            pending: Vec::new(),
        }
    }
}

impl Read for YesReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            self.pending.extend_from_slice(&self.line);
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}
