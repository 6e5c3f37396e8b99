use std::path::PathBuf;

use anyhow::Result;
use buildversions_core::auth::Credentials;
use buildversions_core::client::{ConfluenceClientConfig, PageTarget};
use buildversions_core::config::{
    BuildVersionsConfig, DEFAULT_CONFIG_PATH, DEFAULT_PAGE_NAME, load_config,
};
use buildversions_core::model::{BuildEntry, format_build_date};
use buildversions_core::publish::{PublishOptions, PublishReport, publish_build};
use buildversions_core::render::RenderOptions;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(
    name = "buildversions",
    about = "Record a build on the Confluence build versions page",
    disable_version_flag = true
)]
struct Cli {
    #[arg(long, value_name = "URL", help = "Confluence base URL")]
    confluence_url: String,
    #[arg(long, help = "The new version")]
    version: String,
    #[arg(long, help = "The environment the build was deployed to")]
    environment: String,
    #[arg(long, value_name = "TOKEN", help = "base64 encoded user:password pair")]
    auth: String,
    #[arg(long, help = "The application")]
    application_name: String,
    #[arg(long, help = "The page id")]
    page_id: String,
    #[arg(long, help = "The Confluence space key")]
    space_id: String,
    #[arg(long, default_value = "", help = "The latest commit")]
    commit: String,
    #[arg(long, default_value = DEFAULT_PAGE_NAME, help = "Page title used on write")]
    page_name: String,
    #[arg(
        long,
        value_name = "DD.MM.YYYY HH:MM",
        help = "Build date (defaults to local now)"
    )]
    timestamp: Option<String>,
    #[arg(long, help = "Print the new page body instead of writing it")]
    dry_run: bool,
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[arg(long, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let credentials = Credentials::decode(&cli.auth)?;

    let entry = BuildEntry {
        application: cli.application_name.clone(),
        environment: cli.environment.clone(),
        version: cli.version.clone(),
        commit: cli.commit.clone(),
        date: cli
            .timestamp
            .clone()
            .unwrap_or_else(|| format_build_date(&chrono::Local::now())),
    };
    let client_config = ConfluenceClientConfig {
        target: PageTarget {
            base_url: cli.confluence_url.clone(),
            page_id: cli.page_id.clone(),
            space_key: cli.space_id.clone(),
            title: cli.page_name.clone(),
        },
        credentials,
        user_agent: config.user_agent(),
        timeout_ms: config.timeout_ms(),
    };
    let options = PublishOptions {
        render: RenderOptions {
            commit_url_template: config.commit_url_template(),
        },
        dry_run: cli.dry_run,
    };

    if cli.diagnostics {
        println!("[diagnostics]\n{}", diagnostics(&cli, &config, &client_config));
    }

    let report = publish_build(client_config, &entry, &options)?;
    print_report(&entry, &report, cli.dry_run);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn diagnostics(
    cli: &Cli,
    config: &BuildVersionsConfig,
    client_config: &ConfluenceClientConfig,
) -> String {
    format!(
        "config_path={}\ncontent_url={}\nspace_key={}\npage_title={}\nusername={}\nuser_agent={}\ntimeout_ms={}\ncommit_url_template={}",
        cli.config.display(),
        client_config
            .target
            .content_url()
            .map(|url| url.to_string())
            .unwrap_or_else(|error| format!("<{error}>")),
        client_config.target.space_key,
        client_config.target.title,
        client_config.credentials.username,
        client_config.user_agent,
        client_config.timeout_ms,
        config.commit_url_template(),
    )
}

fn print_report(entry: &BuildEntry, report: &PublishReport, dry_run: bool) {
    if dry_run {
        println!("{}", report.markup);
        println!();
    }
    println!("build versions page");
    println!("application: {}", entry.application);
    println!("environment: {}", entry.environment);
    println!("version: {}", entry.version);
    println!(
        "commit: {}",
        if entry.commit.is_empty() {
            "<none>"
        } else {
            entry.commit.as_str()
        }
    );
    println!("build_date: {}", entry.date);
    println!("fetched_revision: {}", report.fetched_revision);
    println!(
        "written_revision: {}",
        report
            .written_revision
            .map(|revision| revision.to_string())
            .unwrap_or_else(|| "n/a (dry run)".to_string())
    );
    println!("applications: {}", report.applications);
    println!("existing_records: {}", report.existing_records);
    println!("environment_rows: {}", report.environment_rows);
    println!("requests: {}", report.request_count);
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    const REQUIRED: &[&str] = &[
        "buildversions",
        "--confluence-url",
        "https://confluence.example.org",
        "--version",
        "1.2.0",
        "--environment",
        "prod",
        "--auth",
        "Y2ktYm90OnNlY3JldA==",
        "--application-name",
        "gateway",
        "--page-id",
        "123456",
        "--space-id",
        "OPS",
    ];

    #[test]
    fn version_flag_carries_the_build_version() {
        let cli = Cli::try_parse_from(REQUIRED).expect("parse");
        assert_eq!(cli.version, "1.2.0");
        assert_eq!(cli.commit, "");
        assert_eq!(cli.page_name, "Build versions");
        assert!(!cli.dry_run);
        assert!(cli.timestamp.is_none());
    }

    #[test]
    fn optional_flags_override_defaults() {
        let mut args = REQUIRED.to_vec();
        args.extend([
            "--commit",
            "abc123",
            "--page-name",
            "Deployments",
            "--timestamp",
            "01.01.2024 10:00",
            "--dry-run",
        ]);
        let cli = Cli::try_parse_from(args).expect("parse");
        assert_eq!(cli.commit, "abc123");
        assert_eq!(cli.page_name, "Deployments");
        assert_eq!(cli.timestamp.as_deref(), Some("01.01.2024 10:00"));
        assert!(cli.dry_run);
    }

    #[test]
    fn missing_required_flag_is_an_error() {
        let args = &REQUIRED[..REQUIRED.len() - 2];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
