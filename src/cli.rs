#[cfg(feature = "cli")]
use crate::error::{Error, Result};
#[cfg(feature = "cli")]
use crate::export::{write_der_files, write_pem, DerOptions, ExportFilter};
#[cfg(feature = "cli")]
use crate::keytool::{ImportCerts, Keytool, DEFAULT_PASSWORD};
#[cfg(feature = "cli")]
use crate::probe::{Probe, ProbeConfig};
#[cfg(feature = "cli")]
use crate::report::{display_chains, OutputFormat};
#[cfg(feature = "cli")]
use crate::types::Endpoint;
#[cfg(feature = "cli")]
use clap::{ArgAction, Parser};
#[cfg(feature = "cli")]
use colored::Colorize;
#[cfg(feature = "cli")]
use std::io::{self, Write};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "certsuck")]
#[command(version, about = "Collect the certificate chains of a TLS server", long_about = None)]
pub struct Cli {
    #[arg(short = 'H', long, help = "Hostname plus port, e.g. example.com:443")]
    pub host: Option<String>,

    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        help = "Complete the handshake even if the chain does not verify"
    )]
    pub insecure: bool,

    #[arg(long, help = "Extra root certificates to verify the server with, PEM format")]
    pub cacerts: Option<PathBuf>,

    #[arg(short, long, default_value = "text", help = "Report format: text or json")]
    pub format: String,

    #[arg(long, help = "Show PEM output of the longest chain")]
    pub out: bool,

    #[arg(long, help = "Write DER files named <prefix><NN>.der")]
    pub der_out: bool,

    #[arg(long, default_value = ".", help = "Directory for the DER files")]
    pub der_dir: PathBuf,

    #[arg(long, help = "Prefix for the DER files [default: <host name>-]")]
    pub der_prefix: Option<String>,

    #[arg(long, help = "Omit the root certificate in PEM or DER output")]
    pub no_root: bool,

    #[arg(long, help = "Omit the server certificate in PEM or DER output")]
    pub no_server: bool,

    #[arg(long, help = "Import the DER files into this Java trust store")]
    pub keystore: Option<PathBuf>,

    #[arg(long = "alias", help = "Trust store alias, one per DER file")]
    pub aliases: Vec<String>,

    #[arg(long, default_value = DEFAULT_PASSWORD, help = "Trust store password")]
    pub storepass: String,

    #[arg(long, default_value = DEFAULT_PASSWORD, help = "Key password")]
    pub keypass: String,

    #[arg(long, help = "Show the options")]
    pub show_opts: bool,
}

#[cfg(feature = "cli")]
impl Cli {
    pub fn probe_config(&self) -> ProbeConfig {
        let config = ProbeConfig::new().with_insecure(self.insecure);
        match &self.cacerts {
            Some(path) => config.with_extra_roots(path),
            None => config,
        }
    }

    pub fn export_filter(&self) -> ExportFilter {
        ExportFilter::new()
            .with_suppress_server(self.no_server)
            .with_suppress_root(self.no_root)
    }

    pub fn der_options(&self) -> DerOptions {
        let options = DerOptions::new().with_output_dir(&self.der_dir);
        match &self.der_prefix {
            Some(prefix) => options.with_file_prefix(prefix.clone()),
            None => options,
        }
    }

    pub fn pretty_options(&self) -> String {
        let optional = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };

        format!(
            "  -host:       {}\n  -out:        {}\n  -no-root:    {}\n  -no-server:  {}\n  -insecure:   {}\n  -cacerts:    {}\n  -der-out:    {}\n  -der-prefix: {}\n  -der-dir:    {}\n  -keystore:   {}",
            self.host.as_deref().unwrap_or_default(),
            self.out,
            self.no_root,
            self.no_server,
            self.insecure,
            optional(&self.cacerts),
            self.der_out,
            self.der_prefix.as_deref().unwrap_or_default(),
            self.der_dir.display(),
            optional(&self.keystore),
        )
    }
}

#[cfg(feature = "cli")]
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run(&cli)
}

#[cfg(feature = "cli")]
pub fn run(cli: &Cli) -> Result<()> {
    if cli.show_opts {
        println!("{}\n{}", "Options:".bold(), cli.pretty_options());
    }

    let endpoint: Endpoint = cli.host.as_deref().unwrap_or_default().parse()?;
    let format: OutputFormat = cli.format.parse()?;

    if cli.keystore.is_some() && !cli.der_out {
        return Err(Error::InvalidInput(
            "--keystore requires --der-out".to_string(),
        ));
    }

    eprintln!(
        "{}",
        format!("Collecting certificate chains from {}...", endpoint).cyan()
    );

    let chains = Probe::new(cli.probe_config()).collect_chains(&endpoint)?;

    print!("{}", display_chains(&chains, format)?);

    if !cli.out && !cli.der_out {
        return Ok(());
    }

    let longest = chains.longest();
    if let Some(name) = chains.longest_name() {
        eprintln!("  {}: {} ({} certificates)", "Longest chain".cyan(), name, longest.len());
    }

    let filter = cli.export_filter();

    if cli.out {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        writeln!(out)?;
        write_pem(&mut out, longest, &filter)?;
    }

    if cli.der_out {
        let files = write_der_files(longest, &endpoint, &cli.der_options(), &filter)?;
        for file in &files {
            eprintln!("  {}: {}", "DER file".cyan(), file.display());
        }

        if let Some(keystore) = &cli.keystore {
            ImportCerts::new(keystore, files)
                .with_aliases(cli.aliases.clone())
                .with_passwords(cli.storepass.clone(), cli.keypass.clone())
                .run(&Keytool::new())?;

            eprintln!(
                "{} {}",
                "Certificates imported into".green().bold(),
                keystore.display()
            );
        }
    }

    Ok(())
}
