use anyhow::Result;

use crate::markup::{Element, parse_fragment};
use crate::model::PageModel;

pub const CLASS_APPLICATION_BLOCK: &str = "application-versions-table";
pub const CLASS_APPLICATION_NAME: &str = "application-name";
pub const CLASS_VERSIONS_ROW: &str = "versions-row";
pub const CLASS_ENVIRONMENT: &str = "environment";
pub const CLASS_VERSION: &str = "version";
pub const CLASS_COMMIT: &str = "commit";
pub const CLASS_COMMIT_LINK: &str = "commit-link";
pub const CLASS_TIMESTAMP: &str = "timestamp";

/// Rebuild the page model from the stored page body.
///
/// Only the class-marked structure written by [`crate::render::render`] is read;
/// anything else on the page is ignored. A block or row missing one of its marked
/// cells is reported as malformed instead of being skipped.
pub fn parse(raw: Option<&str>) -> Result<PageModel> {
    let mut model = PageModel::new();
    let Some(raw) = raw else {
        return Ok(model);
    };
    if raw.is_empty() {
        return Ok(model);
    }

    let root = parse_fragment(raw);
    let blocks = root.find_class(CLASS_APPLICATION_BLOCK);
    for (block_index, block) in blocks.into_iter().enumerate() {
        let application = first_text(block, CLASS_APPLICATION_NAME).ok_or_else(|| {
            malformed(format!(
                "application block #{} has no `{CLASS_APPLICATION_NAME}` element",
                block_index + 1
            ))
        })?;

        let rows = block.find_class(CLASS_VERSIONS_ROW);
        for (row_index, row) in rows.into_iter().enumerate() {
            let locate = |class: &str| {
                first_text(row, class).ok_or_else(|| {
                    malformed(format!(
                        "row #{} of application `{application}` has no `{class}` cell",
                        row_index + 1
                    ))
                })
            };
            let environment = locate(CLASS_ENVIRONMENT)?;
            let date = locate(CLASS_TIMESTAMP)?;
            let version = locate(CLASS_VERSION)?;
            let commit = commit_text(row).ok_or_else(|| {
                malformed(format!(
                    "row #{} of application `{application}` has no `{CLASS_COMMIT}` cell",
                    row_index + 1
                ))
            })?;

            model.insert(&application, &environment, &version, &commit, &date);
        }
    }

    Ok(model)
}

/// Text of the first element carrying `class`; an element without text reads as "".
fn first_text(scope: &Element, class: &str) -> Option<String> {
    scope
        .find_class(class)
        .first()
        .map(|element| element.text().unwrap_or_default())
}

fn commit_text(row: &Element) -> Option<String> {
    let cells = row.find_class(CLASS_COMMIT);
    let cell = cells.first()?;
    let commit = cell
        .find_class(CLASS_COMMIT_LINK)
        .first()
        .and_then(|link| link.text())
        .unwrap_or_default();
    Some(commit)
}

fn malformed(detail: String) -> anyhow::Error {
    anyhow::anyhow!("malformed build versions markup: {detail}")
}
