use crate::markup::escape_html;
use crate::model::{ApplicationVersions, BuildRecord, MAX_ROWS_PER_ENVIRONMENT, PageModel};
use crate::parse::{
    CLASS_APPLICATION_BLOCK, CLASS_APPLICATION_NAME, CLASS_COMMIT, CLASS_COMMIT_LINK,
    CLASS_ENVIRONMENT, CLASS_TIMESTAMP, CLASS_VERSION, CLASS_VERSIONS_ROW,
};

pub const DEFAULT_COMMIT_URL_TEMPLATE: &str =
    "https://github.com/comoyo/dpa-gateway/commit/{commit}";

const TABLE_HEADER: &str =
    "<tr><th>Environment</th><th>Version</th><th>Commit</th><th>Build date</th></tr>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// `{commit}` is replaced with the commit id.
    pub commit_url_template: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            commit_url_template: DEFAULT_COMMIT_URL_TEMPLATE.to_string(),
        }
    }
}

pub fn render(model: &PageModel) -> String {
    render_with(model, &RenderOptions::default())
}

/// Render the page body: one wrapper per application, newest builds first, at most
/// [`MAX_ROWS_PER_ENVIRONMENT`] rows per environment.
pub fn render_with(model: &PageModel, options: &RenderOptions) -> String {
    let mut output = String::new();
    for (application, versions) in model.applications() {
        output.push_str(&application_wrapper(application, versions, options));
    }
    output
}

/// Records of one environment as they appear on the page.
pub fn visible_records(records: &[BuildRecord]) -> Vec<&BuildRecord> {
    let mut sorted = records.iter().collect::<Vec<_>>();
    // Stable, so equal dates keep insertion order.
    sorted.sort_by(|left, right| right.date.cmp(&left.date));
    sorted.truncate(MAX_ROWS_PER_ENVIRONMENT);
    sorted
}

fn application_wrapper(
    application: &str,
    versions: &ApplicationVersions,
    options: &RenderOptions,
) -> String {
    let mut rows = String::new();
    for (environment, records) in versions {
        for record in visible_records(records) {
            rows.push_str(&table_row(environment, record, options));
        }
    }
    format!(
        r#"<div class="{CLASS_APPLICATION_BLOCK}">{}{}</div><br></br>"#,
        application_paragraph(application),
        table(&rows)
    )
}

fn application_paragraph(application: &str) -> String {
    format!(
        r#"<p class="{CLASS_APPLICATION_NAME}">{}</p>"#,
        escape_html(application)
    )
}

fn table(rows: &str) -> String {
    format!("<table><tbody>{TABLE_HEADER}{rows}</tbody></table>")
}

fn table_row(environment: &str, record: &BuildRecord, options: &RenderOptions) -> String {
    format!(
        concat!(
            r#"<tr class="{row}">"#,
            r#"<td class="{environment_class}">{environment}</td>"#,
            r#"<td class="{version_class}">{version}</td>"#,
            r#"<td class="{commit_class}">{commit}</td>"#,
            r#"<td class="{timestamp_class}">{timestamp}</td>"#,
            "</tr>"
        ),
        row = CLASS_VERSIONS_ROW,
        environment_class = CLASS_ENVIRONMENT,
        environment = escape_html(environment),
        version_class = CLASS_VERSION,
        version = escape_html(&record.version),
        commit_class = CLASS_COMMIT,
        commit = commit_link(&record.commit, options),
        timestamp_class = CLASS_TIMESTAMP,
        timestamp = escape_html(&record.date),
    )
}

fn commit_link(commit: &str, options: &RenderOptions) -> String {
    let href = options
        .commit_url_template
        .replace("{commit}", &encode_path_segment(commit));
    format!(
        r#"<a class="{CLASS_COMMIT_LINK}" href="{}">{}</a>"#,
        escape_html(&href),
        escape_html(commit)
    )
}

/// Percent-encode `value` so it stays inside one URL path segment.
fn encode_path_segment(value: &str) -> String {
    // The form serializer writes spaces as `+` and escapes a literal `+` as `%2B`.
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
