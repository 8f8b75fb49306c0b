//! Parsing of `<kind>:<query>` source strings.
//!
//! Descriptors are cheap to build and never cached: callers parse the
//! configured string every time they load, so a configuration change is picked
//! up on restart without any extra state.

use std::fmt;
use std::path::Path;

use url::Url;

use crate::policy::errors::PolicyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Database,
    File,
    Http,
}

impl SourceKind {
    /// Configuration prefix for this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            SourceKind::Database => "database",
            SourceKind::File => "resource",
            SourceKind::Http => "api",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "database" => Some(SourceKind::Database),
            "resource" => Some(SourceKind::File),
            "api" => Some(SourceKind::Http),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Where policy rules come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    pub query: String,
}

impl SourceDescriptor {
    pub fn parse(raw: &str) -> Result<Self, PolicyError> {
        let (kind, query) = split_source(raw)?;
        let kind = SourceKind::from_prefix(&kind).ok_or_else(|| {
            PolicyError::UnsupportedSourceKind(format!(
                "{kind} (supported: database, resource, api)"
            ))
        })?;
        validate_query(kind, &query)?;
        tracing::debug!(kind = %kind, query = %query, "Parsed policy source");
        Ok(Self { kind, query })
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.query)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSourceKind {
    Database,
    Http,
}

impl VersionSourceKind {
    fn as_source_kind(self) -> SourceKind {
        match self {
            VersionSourceKind::Database => SourceKind::Database,
            VersionSourceKind::Http => SourceKind::Http,
        }
    }
}

/// Where the policy version token comes from. Static files have no version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSourceDescriptor {
    pub kind: VersionSourceKind,
    pub query: String,
}

impl VersionSourceDescriptor {
    pub fn parse(raw: &str) -> Result<Self, PolicyError> {
        let (kind, query) = split_source(raw)?;
        let kind = match SourceKind::from_prefix(&kind) {
            Some(SourceKind::Database) => VersionSourceKind::Database,
            Some(SourceKind::Http) => VersionSourceKind::Http,
            Some(SourceKind::File) | None => {
                return Err(PolicyError::UnsupportedSourceKind(format!(
                    "{kind} (supported for version sources: database, api)"
                )))
            }
        };
        validate_query(kind.as_source_kind(), &query)?;
        Ok(Self { kind, query })
    }
}

impl fmt::Display for VersionSourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_source_kind(), self.query)
    }
}

/// Splits on the first `:`, returning the lower-cased kind and trimmed query.
fn split_source(raw: &str) -> Result<(String, String), PolicyError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PolicyError::MalformedSource(
            "source string is empty".into(),
        ));
    }
    let (kind, query) = raw.split_once(':').ok_or_else(|| {
        PolicyError::MalformedSource(format!("expected `<kind>:<query>`, got `{raw}`"))
    })?;
    let kind = kind.trim().to_ascii_lowercase();
    let query = query.trim().to_string();
    if kind.is_empty() {
        return Err(PolicyError::MalformedSource(format!(
            "missing source kind in `{raw}`"
        )));
    }
    if query.is_empty() {
        return Err(PolicyError::MalformedSource(format!(
            "missing query for `{kind}` source"
        )));
    }
    Ok((kind, query))
}

fn validate_query(kind: SourceKind, query: &str) -> Result<(), PolicyError> {
    let invalid = |reason: &str| PolicyError::InvalidQueryForKind {
        kind: kind.to_string(),
        reason: reason.to_string(),
    };

    match kind {
        SourceKind::Database => {
            if !is_select_statement(query) {
                return Err(invalid("query must be a SELECT statement"));
            }
            // A single statement only; a trailing `;` is tolerated
            if query.trim_end_matches(';').contains(';') {
                return Err(invalid("query must contain a single statement"));
            }
        }
        SourceKind::File => {
            let is_csv = Path::new(query)
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if !is_csv {
                return Err(invalid("resource must be a .csv file"));
            }
        }
        SourceKind::Http => {
            let url = Url::parse(query).map_err(|_| invalid("query must be an absolute URL"))?;
            if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
                return Err(invalid("query must be an http:// or https:// URL"));
            }
        }
    }
    Ok(())
}

fn is_select_statement(query: &str) -> bool {
    let mut words = query.split_whitespace();
    words
        .next()
        .map(|w| w.eq_ignore_ascii_case("select"))
        .unwrap_or(false)
}
