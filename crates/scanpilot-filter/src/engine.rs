//! Filter engine: compile a `FilterConfiguration` once, evaluate per finding
//!
//! SAST and SCA findings are judged by their own engine's filters.

use std::collections::{BTreeMap, BTreeSet};

use scanpilot_core::{
    Engine, EngineFilters, Error, FilterAttribute, FilterConfiguration, FilterableView, Phase,
    Result,
};
use tracing::debug;

use crate::expr::{BuiltinLanguage, CompiledExpression, ExprValue, ExpressionLanguage};

#[derive(Debug)]
enum Mode {
    /// No filters configured, everything passes
    Unconstrained,
    /// Allowed upper-cased values per constrained attribute
    Declarative(BTreeMap<FilterAttribute, BTreeSet<String>>),
    Scripted {
        source: String,
        expression: Box<dyn CompiledExpression>,
    },
}

/// Compiled filter policy
#[derive(Debug)]
pub struct FilterEngine {
    mode: Mode,
}

impl FilterEngine {
    /// An engine that lets every finding through
    pub fn unconstrained() -> Self {
        Self {
            mode: Mode::Unconstrained,
        }
    }

    /// Compile one engine's filters with the built-in expression language
    pub fn compile(engine: Engine, filters: &EngineFilters) -> Result<Self> {
        Self::compile_with(engine, filters, &BuiltinLanguage)
    }

    /// Compile, rejecting a dual-mode configuration or a malformed script
    /// before any finding is seen
    pub fn compile_with(
        engine: Engine,
        filters: &EngineFilters,
        language: &dyn ExpressionLanguage,
    ) -> Result<Self> {
        filters.validate(engine)?;
        let label = engine.as_str().to_uppercase();

        if filters.has_scripted() {
            let source = filters.scripted.as_deref().unwrap_or_default().trim().to_string();
            let expression = language.compile(&source).map_err(|e| {
                Error::configuration(
                    Phase::Filtering,
                    format!("Invalid {} filter script ({}): {}", label, language.name(), e),
                )
            })?;
            debug!("Compiled {} scripted filter: {}", label, source);
            return Ok(Self {
                mode: Mode::Scripted { source, expression },
            });
        }

        if filters.has_simple() {
            let mut allowed: BTreeMap<FilterAttribute, BTreeSet<String>> = BTreeMap::new();
            for filter in &filters.simple {
                allowed
                    .entry(filter.attribute)
                    .or_default()
                    .insert(filter.value.trim().to_uppercase());
            }
            debug!(
                "Compiled {} declarative filter over {} attributes",
                label,
                allowed.len()
            );
            return Ok(Self {
                mode: Mode::Declarative(allowed),
            });
        }

        Ok(Self::unconstrained())
    }

    pub fn is_unconstrained(&self) -> bool {
        matches!(self.mode, Mode::Unconstrained)
    }

    /// Whether one finding satisfies the policy.
    ///
    /// A script that fails at runtime or yields a non-boolean aborts the pass
    /// with a configuration error; a finding that merely lacks a constrained
    /// attribute just fails the check.
    pub fn passes(&self, view: &FilterableView) -> Result<bool> {
        match &self.mode {
            Mode::Unconstrained => Ok(true),
            Mode::Declarative(allowed) => Ok(allowed.iter().all(|(attribute, values)| {
                match view.attribute(*attribute) {
                    Some(value) => values.contains(value),
                    None => {
                        debug!(
                            "Finding {:?} has no {}, filtered out",
                            view.id, attribute
                        );
                        false
                    }
                }
            })),
            Mode::Scripted { source, expression } => match expression.evaluate(view) {
                Ok(ExprValue::Bool(pass)) => Ok(pass),
                Ok(other) => Err(Error::configuration(
                    Phase::Filtering,
                    format!(
                        "Filtering script must return a boolean value. '{}' returned {} {}",
                        source,
                        other.type_name(),
                        other
                    ),
                )),
                Err(e) => Err(Error::configuration(
                    Phase::Filtering,
                    format!(
                        "A runtime error has occurred while executing the filter script ({}). \
                         Please use finding.<property> in your expressions, where <property> \
                         is one of [{}].",
                        e,
                        FilterableView::PROPERTIES.join(", ")
                    ),
                )),
            },
        }
    }
}

/// Compiled filters for every engine
#[derive(Debug)]
pub struct FilterSet {
    sast: FilterEngine,
    sca: FilterEngine,
}

impl FilterSet {
    pub fn unconstrained() -> Self {
        Self {
            sast: FilterEngine::unconstrained(),
            sca: FilterEngine::unconstrained(),
        }
    }

    pub fn compile(config: &FilterConfiguration) -> Result<Self> {
        Self::compile_with(config, &BuiltinLanguage)
    }

    /// Both engines' filters are checked before either is used
    pub fn compile_with(
        config: &FilterConfiguration,
        language: &dyn ExpressionLanguage,
    ) -> Result<Self> {
        Ok(Self {
            sast: FilterEngine::compile_with(Engine::Sast, &config.sast, language)?,
            sca: FilterEngine::compile_with(Engine::Sca, &config.sca, language)?,
        })
    }

    pub fn for_engine(&self, engine: Engine) -> &FilterEngine {
        match engine {
            Engine::Sast => &self.sast,
            Engine::Sca => &self.sca,
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.sast.is_unconstrained() && self.sca.is_unconstrained()
    }

    /// Judge a finding from `engine` by that engine's filters
    pub fn passes(&self, engine: Engine, view: &FilterableView) -> Result<bool> {
        self.for_engine(engine).passes(view)
    }
}

/// One-shot convenience: compile `filters` and evaluate a single finding
pub fn passes(engine: Engine, view: &FilterableView, filters: &EngineFilters) -> Result<bool> {
    FilterEngine::compile(engine, filters)?.passes(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanpilot_core::Filter;

    fn sast(filters: EngineFilters) -> Result<FilterEngine> {
        FilterEngine::compile(Engine::Sast, &filters)
    }

    fn finding(severity: &str, state: &str, status: &str, category: &str) -> FilterableView {
        FilterableView::new()
            .id("r-1")
            .severity(severity)
            .state(state)
            .status(status)
            .category(category)
            .cwe_id("79")
    }

    #[test]
    fn test_unconstrained_passes_everything() {
        let engine = sast(EngineFilters::default()).unwrap();
        assert!(engine.is_unconstrained());
        assert!(engine.passes(&FilterableView::new()).unwrap());
        assert!(engine
            .passes(&finding("LOW", "NOT_EXPLOITABLE", "RECURRENT", "X"))
            .unwrap());
    }

    #[test]
    fn test_declarative_case_insensitive() {
        let config = EngineFilters::simple(vec![
            Filter::new(FilterAttribute::Severity, "high"),
            Filter::new(FilterAttribute::Severity, "Medium"),
        ]);
        let engine = sast(config).unwrap();

        assert!(engine.passes(&finding("HIGH", "URGENT", "NEW", "X")).unwrap());
        assert!(engine.passes(&finding("medium", "URGENT", "NEW", "X")).unwrap());
        assert!(!engine.passes(&finding("LOW", "URGENT", "NEW", "X")).unwrap());
    }

    #[test]
    fn test_declarative_ands_attributes() {
        let config = EngineFilters::simple(vec![
            Filter::new(FilterAttribute::Status, "New"),
            Filter::new(FilterAttribute::State, "Urgent"),
            Filter::new(FilterAttribute::Category, "Client_Potential_XSS"),
        ]);
        let engine = sast(config).unwrap();

        assert!(engine
            .passes(&finding("HIGH", "URGENT", "NEW", "CLIENT_POTENTIAL_XSS"))
            .unwrap());
        assert!(!engine
            .passes(&finding("HIGH", "TO_VERIFY", "NEW", "CLIENT_POTENTIAL_XSS"))
            .unwrap());
        assert!(!engine
            .passes(&finding(
                "HIGH",
                "URGENT",
                "RECURRENT",
                "CROSS_SITE_HISTORY_MANIPULATION"
            ))
            .unwrap());
    }

    #[test]
    fn test_missing_attribute_fails_without_error() {
        let config = EngineFilters::simple(vec![Filter::new(FilterAttribute::State, "URGENT")]);
        let engine = sast(config).unwrap();
        let no_state = FilterableView::new().severity("HIGH");
        assert!(!engine.passes(&no_state).unwrap());
    }

    #[test]
    fn test_dual_mode_rejected_up_front() {
        let config = EngineFilters {
            simple: vec![Filter::new(FilterAttribute::Severity, "HIGH")],
            scripted: Some(String::from("finding.severity == 'HIGH'")),
        };
        let err = sast(config).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("cannot be used together"));
    }

    #[test]
    fn test_scripted_filter() {
        let config = EngineFilters::scripted(
            "finding.severity == 'HIGH' || (finding.severity == 'MEDIUM' && finding.state == 'URGENT')",
        );
        let engine = sast(config).unwrap();

        assert!(engine.passes(&finding("HIGH", "TO_VERIFY", "NEW", "X")).unwrap());
        assert!(engine.passes(&finding("MEDIUM", "URGENT", "NEW", "X")).unwrap());
        assert!(!engine.passes(&finding("MEDIUM", "TO_VERIFY", "NEW", "X")).unwrap());
        assert!(!engine.passes(&finding("LOW", "URGENT", "NEW", "X")).unwrap());
    }

    #[test]
    fn test_script_runtime_error_names_properties() {
        for source in ["cry.of.surprise == 'present'", "finding.mystery == 'unsolvable'"] {
            let engine = sast(EngineFilters::scripted(source)).unwrap();
            let err = engine
                .passes(&finding("HIGH", "URGENT", "NEW", "X"))
                .unwrap_err();
            assert!(matches!(err, Error::Configuration { .. }));
            assert!(err
                .to_string()
                .contains("[id, category, cweId, severity, status, state]"));
        }
    }

    #[test]
    fn test_non_boolean_script_rejected() {
        let engine =
            sast(EngineFilters::scripted("finding.severity")).unwrap();
        let err = engine
            .passes(&finding("HIGH", "URGENT", "NEW", "X"))
            .unwrap_err();
        assert!(err.to_string().contains("must return a boolean value"));
    }

    #[test]
    fn test_syntax_error_at_compile_time() {
        let err = sast(EngineFilters::scripted("finding.severity ==")).unwrap_err();
        assert!(matches!(err, Error::Configuration { phase: Phase::Filtering, .. }));
    }

    #[test]
    fn test_one_shot_passes() {
        let config = EngineFilters::simple(vec![Filter::new(FilterAttribute::Cwe, "79")]);
        assert!(passes(Engine::Sast, &finding("LOW", "URGENT", "NEW", "X"), &config).unwrap());
    }

    #[test]
    fn test_filter_set_keeps_engines_apart() {
        let config = FilterConfiguration::none().sast(EngineFilters::simple(vec![Filter::new(
            FilterAttribute::State,
            "URGENT",
        )]));
        let set = FilterSet::compile(&config).unwrap();
        let dependency = FilterableView::new().id("CVE-2021-44906").severity("MEDIUM");

        assert!(!set.is_unconstrained());
        assert!(set.for_engine(Engine::Sca).is_unconstrained());
        assert!(set.passes(Engine::Sca, &dependency).unwrap());
        assert!(!set.passes(Engine::Sast, &dependency).unwrap());
    }

    #[test]
    fn test_filter_set_rejects_either_engine_up_front() {
        let config = FilterConfiguration::none().sca(EngineFilters::scripted("finding.severity =="));
        let err = FilterSet::compile(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid SCA filter script"));
    }
}
