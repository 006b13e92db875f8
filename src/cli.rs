use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::client::{extract_project_id, is_public, HttpFetcher};
use crate::config::ExportConfig;
use crate::contract::{ApiRequest, Fetch};
use crate::export::{ExportReport, Exporter, Progress};
use crate::load_config::load_config;
use crate::paginate::expect_success;
use crate::stubs::StubFetcher;

/// CLI for osf-export: archive OSF projects as PDF documents.
#[derive(Parser)]
#[clap(
    name = "osf-export",
    version,
    about = "Export OSF projects, their components, files, contributors and wikis to PDF"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export every accessible project, or the one given by --url, to PDF files
    ExportProjects {
        /// Optional YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// Personal access token
        #[clap(long, env = "OSF_PAT", hide_env_values = true)]
        pat: Option<String>,
        /// Project URL or id; omit to export all your projects
        #[clap(long, default_value = "")]
        url: String,
        /// Folder to write the PDFs to
        #[clap(long)]
        folder: Option<PathBuf>,
        /// Use the bundled offline dataset instead of the API
        #[clap(long)]
        dryrun: bool,
        /// Talk to the test API host
        #[clap(long)]
        usetest: bool,
        /// Items requested per page
        #[clap(long)]
        page_size: Option<usize>,
        /// Skip projects that fail instead of stopping
        #[clap(long)]
        keep_going: bool,
    },
    /// Print the API root document as seen with the given token
    ShowUser {
        #[clap(long)]
        config: Option<PathBuf>,
        #[clap(long, env = "OSF_PAT", hide_env_values = true)]
        pat: Option<String>,
        #[clap(long)]
        usetest: bool,
    },
}

fn prompt_token() -> Result<String> {
    print!("Please input your personal access token for your OSF account: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Picks the transport: offline stubs, an authenticated client, or an
/// anonymous one for public single-project exports.
async fn build_fetcher(
    config: &ExportConfig,
    project_id: Option<&str>,
) -> Result<Box<dyn Fetch>> {
    if config.dry_run {
        tracing::info!("Dry run: reading bundled offline dataset");
        return Ok(Box::new(StubFetcher::bundled(&config.api_host())?));
    }
    if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
        return Ok(Box::new(HttpFetcher::new(token)?));
    }
    if let Some(id) = project_id {
        let anonymous = HttpFetcher::anonymous()?;
        let url = format!("{}/nodes/{id}/", config.api_host());
        if is_public(&anonymous, &url).await {
            return Ok(Box::new(anonymous));
        }
    }
    let token = prompt_token()?;
    Ok(Box::new(HttpFetcher::new(token)?))
}

async fn export_projects(config: ExportConfig, url: &str) -> Result<ExportReport> {
    let project_id = extract_project_id(url)?;
    let fetcher = build_fetcher(&config, project_id.as_deref()).await?;
    let exporter = Exporter::new(fetcher.as_ref(), &config, project_id);

    let report = exporter
        .run_with(|progress| match progress {
            Progress::Found(n) => println!("Found {n} projects."),
            Progress::Rendering(_) => println!("Generating PDF..."),
            Progress::Written(path) => println!("Wrote {}", path.display()),
        })
        .await?;
    Ok(report)
}

async fn show_user(config: ExportConfig) -> Result<()> {
    let fetcher: Box<dyn Fetch> = match config.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => Box::new(HttpFetcher::new(token)?),
        None => Box::new(HttpFetcher::new(prompt_token()?)?),
    };
    let url = format!("{}/", config.api_host());
    let response = fetcher.fetch(&ApiRequest::get(url.clone())).await?;
    let body = expect_success(&url, response)?;
    let document: serde_json::Value = serde_json::from_slice(&body)?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::ExportProjects {
            config,
            pat,
            url,
            folder,
            dryrun,
            usetest,
            page_size,
            keep_going,
        } => {
            let mut config = load_config(config.as_deref())?;
            if pat.is_some() {
                config.token = pat;
            }
            if folder.is_some() {
                config.output_dir = folder;
            }
            if let Some(size) = page_size {
                anyhow::ensure!(size > 0, "--page-size must be a positive integer");
                config.page_size = size;
            }
            config.dry_run |= dryrun;
            config.use_test_host |= usetest;
            config.keep_going |= keep_going;
            config.trace_loaded();

            let report = export_projects(config, &url).await?;
            println!("Export complete.\nReport:");
            println!("{:#?}", report);
            Ok(())
        }
        Commands::ShowUser {
            config,
            pat,
            usetest,
        } => {
            let mut config = load_config(config.as_deref())?;
            if pat.is_some() {
                config.token = pat;
            }
            config.use_test_host |= usetest;
            config.trace_loaded();
            show_user(config).await
        }
    }
}
