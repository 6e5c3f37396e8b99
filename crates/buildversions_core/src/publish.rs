use anyhow::{Context, Result};

use crate::client::{ConfluenceClient, ConfluenceClientConfig, PageApi};
use crate::model::BuildEntry;
use crate::parse::parse;
use crate::render::{RenderOptions, render_with, visible_records};

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub render: RenderOptions,
    /// Fetch and render but skip the write.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct PublishReport {
    pub fetched_revision: u64,
    /// `None` on a dry run.
    pub written_revision: Option<u64>,
    pub applications: usize,
    pub existing_records: usize,
    /// Rows the new page shows for the published application/environment.
    pub environment_rows: usize,
    pub markup: String,
    pub request_count: usize,
}

pub fn publish_build(
    client_config: ConfluenceClientConfig,
    entry: &BuildEntry,
    options: &PublishOptions,
) -> Result<PublishReport> {
    let mut client = ConfluenceClient::new(client_config)?;
    publish_build_with_api(&mut client, entry, options)
}

pub fn publish_build_with_api<A: PageApi>(
    api: &mut A,
    entry: &BuildEntry,
    options: &PublishOptions,
) -> Result<PublishReport> {
    entry.validate()?;

    let snapshot = api.fetch_page()?;
    let mut model =
        parse(Some(&snapshot.markup)).context("failed to read existing build table")?;
    let existing_records = model.record_count();
    if model.is_empty() && !snapshot.markup.trim().is_empty() {
        tracing::warn!(
            bytes = snapshot.markup.len(),
            "page has no build table, its current content will be replaced"
        );
    }
    tracing::info!(
        revision = snapshot.revision,
        applications = model.applications().count(),
        records = existing_records,
        "parsed page"
    );

    model.insert_entry(entry);
    let markup = render_with(&model, &options.render);
    let environment_rows =
        visible_records(model.records(&entry.application, &entry.environment)).len();

    let written_revision = if options.dry_run {
        tracing::info!("dry run, page not written");
        None
    } else {
        api.update_page(&markup, snapshot.revision)?;
        tracing::info!(revision = snapshot.revision + 1, "page written");
        Some(snapshot.revision + 1)
    };

    Ok(PublishReport {
        fetched_revision: snapshot.revision,
        written_revision,
        applications: model.applications().count(),
        existing_records,
        environment_rows,
        markup,
        request_count: api.request_count(),
    })
}
