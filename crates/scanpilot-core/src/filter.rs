//! Filter configuration and the read-only view filters evaluate against

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Phase, Result};
use crate::scan::Engine;

/// Attribute a declarative filter can constrain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAttribute {
    Status,
    State,
    Severity,
    Cwe,
    /// Vulnerability type, matched against the issue title
    Category,
}

impl FilterAttribute {
    pub const ALL: [FilterAttribute; 5] = [
        FilterAttribute::Status,
        FilterAttribute::State,
        FilterAttribute::Severity,
        FilterAttribute::Cwe,
        FilterAttribute::Category,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterAttribute::Status => "status",
            FilterAttribute::State => "state",
            FilterAttribute::Severity => "severity",
            FilterAttribute::Cwe => "cwe",
            FilterAttribute::Category => "category",
        }
    }
}

impl std::fmt::Display for FilterAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FilterAttribute {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "status" => Ok(FilterAttribute::Status),
            "state" => Ok(FilterAttribute::State),
            "severity" => Ok(FilterAttribute::Severity),
            "cwe" => Ok(FilterAttribute::Cwe),
            "category" | "type" => Ok(FilterAttribute::Category),
            other => Err(format!("unknown filter attribute '{}'", other)),
        }
    }
}

/// One allowed value for one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub attribute: FilterAttribute,
    pub value: String,
}

impl Filter {
    pub fn new(attribute: FilterAttribute, value: impl Into<String>) -> Self {
        Self {
            attribute,
            value: value.into(),
        }
    }
}

/// Filters for one engine's findings: declarative constraints or one
/// scripted predicate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFilters {
    /// Constraints, ANDed across attributes and ORed within one
    #[serde(default)]
    pub simple: Vec<Filter>,

    /// Boolean expression over `finding.<property>`
    #[serde(default)]
    pub scripted: Option<String>,
}

impl EngineFilters {
    pub fn simple(filters: Vec<Filter>) -> Self {
        Self {
            simple: filters,
            scripted: None,
        }
    }

    pub fn scripted(expression: impl Into<String>) -> Self {
        Self {
            simple: Vec::new(),
            scripted: Some(expression.into()),
        }
    }

    pub fn has_simple(&self) -> bool {
        !self.simple.is_empty()
    }

    pub fn has_scripted(&self) -> bool {
        self.scripted
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn is_unconstrained(&self) -> bool {
        !self.has_simple() && !self.has_scripted()
    }

    /// Declarative and scripted filters are mutually exclusive
    pub fn validate(&self, engine: Engine) -> Result<()> {
        if self.has_simple() && self.has_scripted() {
            return Err(Error::configuration(
                Phase::Filtering,
                format!(
                    "{} filters: simple filters and scripted filter cannot be used together. \
                     Please specify only one of them.",
                    engine.as_str().to_uppercase()
                ),
            ));
        }
        Ok(())
    }
}

/// Caller policy, kept separately per engine since SCA findings carry no
/// SAST triage state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfiguration {
    #[serde(default)]
    pub sast: EngineFilters,

    #[serde(default)]
    pub sca: EngineFilters,
}

impl FilterConfiguration {
    /// No constraints at all
    pub fn none() -> Self {
        Self::default()
    }

    pub fn sast(mut self, filters: EngineFilters) -> Self {
        self.sast = filters;
        self
    }

    pub fn sca(mut self, filters: EngineFilters) -> Self {
        self.sca = filters;
        self
    }

    pub fn for_engine(&self, engine: Engine) -> &EngineFilters {
        match engine {
            Engine::Sast => &self.sast,
            Engine::Sca => &self.sca,
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.sast.is_unconstrained() && self.sca.is_unconstrained()
    }

    pub fn validate(&self) -> Result<()> {
        self.sast.validate(Engine::Sast)?;
        self.sca.validate(Engine::Sca)
    }
}

/// Per-finding attributes exposed to filters, upper-cased
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterableView {
    pub id: Option<String>,
    pub category: Option<String>,
    pub cwe_id: Option<String>,
    pub severity: Option<String>,
    pub status: Option<String>,
    pub state: Option<String>,
}

impl FilterableView {
    /// Property names scripted filters may reference
    pub const PROPERTIES: [&'static str; 6] =
        ["id", "category", "cweId", "severity", "status", "state"];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn category(mut self, category: impl AsRef<str>) -> Self {
        self.category = Some(category.as_ref().to_uppercase());
        self
    }

    pub fn cwe_id(mut self, cwe_id: impl AsRef<str>) -> Self {
        self.cwe_id = Some(cwe_id.as_ref().to_uppercase());
        self
    }

    pub fn severity(mut self, severity: impl AsRef<str>) -> Self {
        self.severity = Some(severity.as_ref().to_uppercase());
        self
    }

    pub fn status(mut self, status: impl AsRef<str>) -> Self {
        self.status = Some(status.as_ref().to_uppercase());
        self
    }

    pub fn state(mut self, state: impl AsRef<str>) -> Self {
        self.state = Some(state.as_ref().to_uppercase());
        self
    }

    /// Value of a declaratively filterable attribute
    pub fn attribute(&self, attribute: FilterAttribute) -> Option<&str> {
        match attribute {
            FilterAttribute::Status => self.status.as_deref(),
            FilterAttribute::State => self.state.as_deref(),
            FilterAttribute::Severity => self.severity.as_deref(),
            FilterAttribute::Cwe => self.cwe_id.as_deref(),
            FilterAttribute::Category => self.category.as_deref(),
        }
    }

    /// Look up a property by its script name.
    ///
    /// The outer `None` means there is no such property; the inner one means
    /// the property exists but has no value for this finding.
    pub fn property(&self, name: &str) -> Option<Option<&str>> {
        match name {
            "id" => Some(self.id.as_deref()),
            "category" => Some(self.category.as_deref()),
            "cweId" => Some(self.cwe_id.as_deref()),
            "severity" => Some(self.severity.as_deref()),
            "status" => Some(self.status.as_deref()),
            "state" => Some(self.state.as_deref()),
            _ => None,
        }
    }
}
