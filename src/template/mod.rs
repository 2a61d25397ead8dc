//! Template family: turns one external concept into one modelled concept.
//!
//! A template is chosen by `select_template`, relationships are populated from
//! the concept's parts through the mapping manager, then terms are built from
//! the template's slot pattern.

pub mod flags;
pub mod populate;
pub mod terms;
pub mod variants;

pub use flags::{Flags, IterationIndicator, ProcessingFlag, StagedFlags};
pub use variants::{strategy_for, TemplateStrategy};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::mapping::{AttributePartMapManager, MappingAudit};
use crate::model::{columns, CaseSignificance, Concept, ExternalConcept, PartLink};
use crate::ontology::OntologyStore;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use tracing::debug;

const INHERES_PROPERTIES: [&str; 9] = ["Len", "Circ", "Area", "Temp", "Morph", "Anat", "Type", "Find", "Imp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TemplateKind {
    Manual,
    Grouper,
    Susceptibility,
    Ratio,
    RatioWithoutDivisor,
    Process,
    Inheres,
    Challenge,
    Component,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TemplateKind::Manual => "Manual",
            TemplateKind::Grouper => "Grouper",
            TemplateKind::Susceptibility => "Susceptibility",
            TemplateKind::Ratio => "Ratio",
            TemplateKind::RatioWithoutDivisor => "RatioWithoutDivisor",
            TemplateKind::Process => "Process",
            TemplateKind::Inheres => "Inheres",
            TemplateKind::Challenge => "Challenge",
            TemplateKind::Component => "Component",
        };
        write!(f, "{}", s)
    }
}

/// Picks the modelling strategy for an external concept from its structure alone.
pub fn select_template(concept: &ExternalConcept, manual_ids: &BTreeSet<String>) -> TemplateKind {
    let property = concept.property.trim();
    if manual_ids.contains(&concept.identifier) {
        TemplateKind::Manual
    } else if concept.grouper {
        TemplateKind::Grouper
    } else if property == "Susc" {
        TemplateKind::Susceptibility
    } else if property.ends_with("Rto") || property.ends_with("Fr") {
        if concept.has_column(columns::COMPDENOM) {
            TemplateKind::Ratio
        } else {
            TemplateKind::RatioWithoutDivisor
        }
    } else if property.ends_with("Rat") && has_duration(concept) {
        TemplateKind::Process
    } else if INHERES_PROPERTIES.contains(&property) {
        TemplateKind::Inheres
    } else if concept.has_column(columns::CHALLENGE) {
        TemplateKind::Challenge
    } else {
        TemplateKind::Component
    }
}

fn has_duration(concept: &ExternalConcept) -> bool {
    concept.part_in(columns::TIME).map_or(false, |time| {
        let name = time.part_name.trim();
        !name.is_empty() && !name.eq_ignore_ascii_case("Pt") && !name.to_lowercase().contains("point in time")
    })
}

/// A substitutable position in a preferred-term pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Slot {
    Property,
    Component,
    Divisors,
    System,
    Time,
    Method,
    Challenge,
    Characterizes,
    Scale,
}

impl Slot {
    pub const TOKENS: [Slot; 8] = [
        Slot::Property,
        Slot::Component,
        Slot::Divisors,
        Slot::System,
        Slot::Time,
        Slot::Method,
        Slot::Challenge,
        Slot::Characterizes,
    ];

    /// Bracketed token in term patterns; scale is modelled but never named.
    pub fn token(&self) -> Option<&'static str> {
        match self {
            Slot::Property => Some("[PROPERTY]"),
            Slot::Component => Some("[COMPONENT]"),
            Slot::Divisors => Some("[DIVISORS]"),
            Slot::System => Some("[SYSTEM]"),
            Slot::Time => Some("[TIME]"),
            Slot::Method => Some("[METHOD]"),
            Slot::Challenge => Some("[CHALLENGE]"),
            Slot::Characterizes => Some("[CHARACTERIZES]"),
            Slot::Scale => None,
        }
    }

    pub fn from_token(token: &str) -> Option<Slot> {
        Slot::TOKENS.into_iter().find(|s| s.token() == Some(token))
    }

    pub fn for_column(column: &str) -> Option<Slot> {
        match column.to_ascii_uppercase().as_str() {
            columns::COMPONENT | columns::COMPNUM => Some(Slot::Component),
            columns::COMPDENOM => Some(Slot::Divisors),
            columns::PROPERTY => Some(Slot::Property),
            columns::SYSTEM => Some(Slot::System),
            columns::TIME => Some(Slot::Time),
            columns::METHOD => Some(Slot::Method),
            columns::CHALLENGE => Some(Slot::Challenge),
            columns::SCALE => Some(Slot::Scale),
            _ => None,
        }
    }

    /// The flag that removes this slot from terms, if any.
    pub fn suppressed_by(&self) -> Option<ProcessingFlag> {
        match self {
            Slot::Method => Some(ProcessingFlag::SuppressMethodTerm),
            Slot::Divisors => Some(ProcessingFlag::SuppressDivisorTerm),
            Slot::Characterizes => Some(ProcessingFlag::SuppressCharacterizesTerm),
            _ => None,
        }
    }

    /// The flag that lets this slot stay empty without failing the term.
    pub fn allowed_blank_by(&self) -> Option<ProcessingFlag> {
        match self {
            Slot::Component => Some(ProcessingFlag::AllowBlankComponent),
            Slot::Divisors => Some(ProcessingFlag::AllowBlankDivisor),
            _ => None,
        }
    }
}

/// The part whose value fills the component slot: COMPNUM when present, else COMPONENT.
pub fn designated_component(concept: &ExternalConcept) -> Option<&PartLink> {
    concept
        .part_in(columns::COMPNUM)
        .or_else(|| concept.part_in(columns::COMPONENT))
}

/// Generation-time wrapper around one modelled concept.
#[derive(Debug, Clone)]
pub struct TemplatedConcept {
    pub external_id: String,
    /// None only for synthesized REMOVED entries.
    pub kind: Option<TemplateKind>,
    pub concept: Concept,
    pub slot_text: BTreeMap<Slot, String>,
    /// Slots whose originating part appeared on the external concept.
    pub seen_slots: BTreeSet<Slot>,
    /// Names of the parts that filled each slot, for the colon-form synonym.
    pub part_names: BTreeMap<Slot, String>,
    pub flags: Flags,
    pub iteration: Option<IterationIndicator>,
    pub existing: Option<Concept>,
    pub issues: Vec<String>,
}

impl TemplatedConcept {
    pub fn new(external_id: &str, kind: TemplateKind, module_id: &str) -> Self {
        Self {
            external_id: external_id.to_string(),
            kind: Some(kind),
            concept: Concept::new(module_id),
            slot_text: BTreeMap::new(),
            seen_slots: BTreeSet::new(),
            part_names: BTreeMap::new(),
            flags: Flags::empty(),
            iteration: None,
            existing: None,
            issues: Vec::new(),
        }
    }

    /// Placeholder for a code that is maintained by hand.
    pub fn manual(external_id: &str, module_id: &str) -> Self {
        let mut tc = TemplatedConcept::new(external_id, TemplateKind::Manual, module_id);
        tc.iteration = Some(IterationIndicator::Manual);
        tc
    }

    /// Synthesized entry for an indexed code that has left the source.
    pub fn removed(external_id: &str, concept: Concept, existing: Option<Concept>) -> Self {
        Self {
            external_id: external_id.to_string(),
            kind: None,
            concept,
            slot_text: BTreeMap::new(),
            seen_slots: BTreeSet::new(),
            part_names: BTreeMap::new(),
            flags: Flags::empty(),
            iteration: Some(IterationIndicator::Removed),
            existing,
            issues: Vec::new(),
        }
    }

    pub fn is_dropped(&self) -> bool {
        self.flags.contains(ProcessingFlag::DropOut)
    }

    pub fn is_manual(&self) -> bool {
        self.kind == Some(TemplateKind::Manual)
    }

    pub fn drop_out(&mut self, issue: impl Into<String>) {
        let issue = issue.into();
        debug!("{} dropped out: {}", self.external_id, issue);
        self.issues.push(issue);
        self.flags.insert(ProcessingFlag::DropOut);
    }
}

/// Read-only collaborators shared by every modelling call; safe to share across workers.
pub struct ModellingContext<'a> {
    pub config: &'a PipelineConfig,
    pub mapping: &'a AttributePartMapManager,
    pub store: &'a dyn OntologyStore,
    unknown_vocabulary: Option<Regex>,
    /// Lower-cased terms the ontology marks case sensitive, such as organism names.
    case_sensitive_terms: HashSet<String>,
}

impl<'a> ModellingContext<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        mapping: &'a AttributePartMapManager,
        store: &'a dyn OntologyStore,
    ) -> Result<Self> {
        let words: Vec<String> = config
            .unknown_vocabulary
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .map(regex::escape)
            .collect();
        let unknown_vocabulary = if words.is_empty() {
            None
        } else {
            let pattern = format!(r"(?i)\b({})\b", words.join("|"));
            Some(Regex::new(&pattern).map_err(|e| {
                PipelineError::Config(format!("Bad unknown vocabulary pattern: {}", e))
            })?)
        };
        let case_sensitive_terms = store
            .component_ids()
            .into_iter()
            .filter_map(|id| store.concept(id))
            .flat_map(|c| c.descriptions.iter())
            .filter(|d| d.active && d.case_significance == CaseSignificance::CaseSensitive)
            .map(|d| d.term.to_lowercase())
            .collect();
        Ok(Self {
            config,
            mapping,
            store,
            unknown_vocabulary,
            case_sensitive_terms,
        })
    }

    pub fn is_unknown_value(&self, text: &str) -> bool {
        self.unknown_vocabulary
            .as_ref()
            .map_or(false, |re| re.is_match(text))
    }

    pub fn is_case_sensitive_term(&self, text: &str) -> bool {
        self.case_sensitive_terms.contains(&text.to_lowercase())
    }
}

/// Selects, populates and terms one external concept.
pub fn generate(
    external: &ExternalConcept,
    ctx: &ModellingContext<'_>,
    audit: &mut MappingAudit,
) -> TemplatedConcept {
    let kind = select_template(external, &ctx.config.manual_external_ids);
    if kind == TemplateKind::Manual {
        debug!("{} is maintained manually, skipping generation", external.identifier);
        return TemplatedConcept::manual(&external.identifier, &ctx.config.module_id);
    }
    let strategy = strategy_for(kind);
    let mut tc = populate::populate(strategy, external, ctx, audit);
    if !tc.is_dropped() {
        terms::populate_terms(&mut tc, strategy, ctx);
    }
    debug!(
        "{} modelled with {} template [{}]",
        external.identifier, kind, tc.flags
    );
    tc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(property: &str) -> ExternalConcept {
        ExternalConcept::new("1-1", property)
            .with_part(columns::COMPONENT, "LP1", "Glucose")
            .with_part(columns::TIME, "LP6960-1", "Pt")
    }

    #[test]
    fn test_selection_order() {
        let none = BTreeSet::new();
        assert_eq!(select_template(&concept("MCnc"), &none), TemplateKind::Component);
        assert_eq!(select_template(&concept("Susc"), &none), TemplateKind::Susceptibility);
        assert_eq!(select_template(&concept("MRto"), &none), TemplateKind::RatioWithoutDivisor);
        assert_eq!(
            select_template(&concept("SFr").with_part(columns::COMPDENOM, "LP2", "Creatinine"), &none),
            TemplateKind::Ratio
        );
        assert_eq!(select_template(&concept("Len"), &none), TemplateKind::Inheres);
        assert_eq!(
            select_template(&concept("MCnc").with_part(columns::CHALLENGE, "LP3", "75 g glucose PO"), &none),
            TemplateKind::Challenge
        );

        let mut grouper = concept("Susc");
        grouper.grouper = true;
        assert_eq!(select_template(&grouper, &none), TemplateKind::Grouper);

        let manual: BTreeSet<String> = ["1-1".to_string()].into_iter().collect();
        assert_eq!(select_template(&grouper, &manual), TemplateKind::Manual);
    }

    #[test]
    fn test_rate_needs_duration_for_process() {
        let none = BTreeSet::new();
        assert_eq!(select_template(&concept("MRat"), &none), TemplateKind::Component);
        let timed = ExternalConcept::new("2-2", "MRat")
            .with_part(columns::COMPONENT, "LP1", "Sodium")
            .with_part(columns::TIME, "LP6924-7", "24H");
        assert_eq!(select_template(&timed, &none), TemplateKind::Process);
    }

    #[test]
    fn test_designated_component_prefers_compnum() {
        let c = ExternalConcept::new("1-1", "MCnc")
            .with_part(columns::COMPONENT, "LP1", "Glucose^post meal")
            .with_part(columns::COMPNUM, "LP2", "Glucose");
        assert_eq!(designated_component(&c).map(|p| p.part_number.as_str()), Some("LP2"));
    }

    #[test]
    fn test_slot_tokens() {
        assert_eq!(Slot::from_token("[DIVISORS]"), Some(Slot::Divisors));
        assert_eq!(Slot::for_column("compdenom"), Some(Slot::Divisors));
        assert_eq!(Slot::Scale.token(), None);
        assert_eq!(Slot::for_column(columns::SUPER_SYSTEM), None);
    }
}
