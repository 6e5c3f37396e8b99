use std::collections::BTreeMap;

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDateTime, TimeZone};

/// Number of rows kept per environment when the page is rendered.
pub const MAX_ROWS_PER_ENVIRONMENT: usize = 10;

pub const BUILD_DATE_FORMAT: &str = "%d.%m.%Y %H:%M";

/// One observed build of an application in an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecord {
    pub version: String,
    pub commit: String,
    /// `DD.MM.YYYY HH:MM`; compared as a plain string when sorting.
    pub date: String,
}

/// Environment name to the builds recorded for it.
pub type ApplicationVersions = BTreeMap<String, Vec<BuildRecord>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageModel {
    applications: BTreeMap<String, ApplicationVersions>,
}

impl PageModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    pub fn applications(&self) -> impl Iterator<Item = (&str, &ApplicationVersions)> {
        self.applications
            .iter()
            .map(|(name, versions)| (name.as_str(), versions))
    }

    pub fn records(&self, application: &str, environment: &str) -> &[BuildRecord] {
        self.applications
            .get(application)
            .and_then(|versions| versions.get(environment))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn record_count(&self) -> usize {
        self.applications
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Append one build, creating the application and environment groups on demand.
    /// Identical builds are not collapsed.
    pub fn insert(
        &mut self,
        application: &str,
        environment: &str,
        version: &str,
        commit: &str,
        date: &str,
    ) {
        self.applications
            .entry(application.to_string())
            .or_default()
            .entry(environment.to_string())
            .or_default()
            .push(BuildRecord {
                version: version.to_string(),
                commit: commit.to_string(),
                date: date.to_string(),
            });
    }

    pub fn insert_entry(&mut self, entry: &BuildEntry) {
        self.insert(
            &entry.application,
            &entry.environment,
            &entry.version,
            &entry.commit,
            &entry.date,
        );
    }
}

/// A build about to be published, with the keys that place it in the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEntry {
    pub application: String,
    pub environment: String,
    pub version: String,
    pub commit: String,
    pub date: String,
}

impl BuildEntry {
    pub fn validate(&self) -> Result<()> {
        if self.application.trim().is_empty() {
            bail!("application name cannot be empty");
        }
        if self.environment.trim().is_empty() {
            bail!("environment cannot be empty");
        }
        parse_build_date(&self.date)?;
        Ok(())
    }
}

pub fn format_build_date<Tz: TimeZone>(value: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    value.format(BUILD_DATE_FORMAT).to_string()
}

/// Parse a build date, requiring the exact zero-padded shape since the raw string
/// is the sort key.
pub fn parse_build_date(value: &str) -> Result<NaiveDateTime> {
    let parsed = NaiveDateTime::parse_from_str(value, BUILD_DATE_FORMAT).ok();
    match parsed {
        Some(parsed) if parsed.format(BUILD_DATE_FORMAT).to_string() == value => Ok(parsed),
        _ => bail!("invalid build date: {value:?} (expected DD.MM.YYYY HH:MM)"),
    }
}
