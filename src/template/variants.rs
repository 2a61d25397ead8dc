//! One strategy per template kind.
//!
//! Every strategy shares the population and terming algorithm and differs in
//! declarative data (term pattern, attribute per slot, preset flags) plus two
//! hooks: how the component attributes are derived, and a template-specific
//! exception applied once all parts have been resolved.

use super::flags::{Flags, ProcessingFlag};
use super::populate::Population;
use super::{ModellingContext, Slot, TemplateKind};
use crate::mapping::{MappingAudit, RelationshipTemplate};
use crate::model::{ExternalConcept, PartLink};
use crate::vocabulary;

/// Words showing that a component name already describes the process it takes part in.
const PROCESS_WORDS: [&str; 3] = ["clearance", "excretion", "production"];

const SUSCEPTIBILITY_AGENT_TAGS: [&str; 3] = ["organism", "substance", "product"];

pub trait TemplateStrategy: Sync {
    fn kind(&self) -> TemplateKind;

    /// Preferred-term pattern with bracketed slot tokens.
    fn term_pattern(&self) -> &'static str;

    fn preset_flags(&self) -> Flags {
        Flags::empty()
    }

    /// Attribute type modelled for a slot; None when this template ignores the slot.
    fn attribute_for(&self, slot: Slot) -> Option<&'static str> {
        default_attribute(slot)
    }

    fn determine_component_attributes(
        &self,
        external: &ExternalConcept,
        part: &PartLink,
        ctx: &ModellingContext<'_>,
        audit: &mut MappingAudit,
    ) -> Vec<RelationshipTemplate> {
        match self.attribute_for(Slot::Component) {
            Some(attribute) => ctx
                .mapping
                .resolve(external, &part.part_number, attribute, ctx.store, audit),
            None => Vec::new(),
        }
    }

    fn apply_exceptions(&self, _external: &ExternalConcept, _work: &mut Population) {}
}

pub fn default_attribute(slot: Slot) -> Option<&'static str> {
    Some(match slot {
        Slot::Property => vocabulary::PROPERTY_TYPE,
        Slot::Component => vocabulary::COMPONENT,
        Slot::Divisors => vocabulary::RELATIVE_TO,
        Slot::System => vocabulary::DIRECT_SITE,
        Slot::Time => vocabulary::TIME_ASPECT,
        Slot::Method => vocabulary::TECHNIQUE,
        Slot::Challenge => vocabulary::PRECONDITION,
        Slot::Characterizes => vocabulary::CHARACTERIZES,
        Slot::Scale => vocabulary::SCALE_TYPE,
    })
}

pub fn strategy_for(kind: TemplateKind) -> &'static dyn TemplateStrategy {
    match kind {
        TemplateKind::Grouper => &GrouperTemplate,
        TemplateKind::Susceptibility => &SusceptibilityTemplate,
        TemplateKind::Ratio => &RatioTemplate,
        TemplateKind::RatioWithoutDivisor => &RatioWithoutDivisorTemplate,
        TemplateKind::Process => &ProcessTemplate,
        TemplateKind::Inheres => &InheresTemplate,
        TemplateKind::Challenge => &ChallengeTemplate,
        // Manual codes are never generated
        TemplateKind::Component | TemplateKind::Manual => &ComponentTemplate,
    }
}

pub struct ComponentTemplate;

impl TemplateStrategy for ComponentTemplate {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Component
    }

    fn term_pattern(&self) -> &'static str {
        "[PROPERTY] of [COMPONENT] in [SYSTEM] at [TIME] by [METHOD]"
    }

    fn preset_flags(&self) -> Flags {
        Flags::of(&[ProcessingFlag::SplitToGroupPerComponent])
    }
}

pub struct ChallengeTemplate;

impl TemplateStrategy for ChallengeTemplate {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Challenge
    }

    fn term_pattern(&self) -> &'static str {
        "[PROPERTY] of [COMPONENT] in [SYSTEM] at [TIME] by [METHOD] following [CHALLENGE]"
    }

    fn preset_flags(&self) -> Flags {
        Flags::of(&[ProcessingFlag::SplitToGroupPerComponent])
    }
}

pub struct RatioTemplate;

impl TemplateStrategy for RatioTemplate {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Ratio
    }

    fn term_pattern(&self) -> &'static str {
        "[PROPERTY] of [COMPONENT] to [DIVISORS] in [SYSTEM] at [TIME] by [METHOD]"
    }
}

/// Ratio whose divisor is implied by the property, e.g. a fraction of the total.
pub struct RatioWithoutDivisorTemplate;

impl TemplateStrategy for RatioWithoutDivisorTemplate {
    fn kind(&self) -> TemplateKind {
        TemplateKind::RatioWithoutDivisor
    }

    fn term_pattern(&self) -> &'static str {
        RatioTemplate.term_pattern()
    }

    fn preset_flags(&self) -> Flags {
        Flags::of(&[ProcessingFlag::SuppressDivisorTerm, ProcessingFlag::AllowBlankDivisor])
    }
}

pub struct InheresTemplate;

impl TemplateStrategy for InheresTemplate {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Inheres
    }

    fn term_pattern(&self) -> &'static str {
        "[PROPERTY] of [COMPONENT] of [SYSTEM] at [TIME] by [METHOD]"
    }

    fn preset_flags(&self) -> Flags {
        Flags::of(&[
            ProcessingFlag::AllowBlankComponent,
            ProcessingFlag::SplitToGroupPerComponent,
        ])
    }

    fn attribute_for(&self, slot: Slot) -> Option<&'static str> {
        match slot {
            Slot::System => Some(vocabulary::INHERES_IN),
            other => default_attribute(other),
        }
    }
}

pub struct ProcessTemplate;

impl TemplateStrategy for ProcessTemplate {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Process
    }

    fn term_pattern(&self) -> &'static str {
        "[PROPERTY] of [COMPONENT] [CHARACTERIZES] in [SYSTEM] over [TIME] by [METHOD]"
    }

    fn attribute_for(&self, slot: Slot) -> Option<&'static str> {
        match slot {
            Slot::Component => Some(vocabulary::PROCESS_OUTPUT),
            Slot::Time => Some(vocabulary::PROCESS_DURATION),
            other => default_attribute(other),
        }
    }

    fn apply_exceptions(&self, external: &ExternalConcept, work: &mut Population) {
        work.attributes.push(RelationshipTemplate::new(
            vocabulary::CHARACTERIZES,
            vocabulary::EXCRETORY_PROCESS,
        ));
        let names_process = super::designated_component(external).map_or(false, |part| {
            let name = part.part_name.to_lowercase();
            PROCESS_WORDS.iter().any(|w| name.contains(w))
        });
        if names_process {
            work.flags.raise(ProcessingFlag::SuppressCharacterizesTerm);
        }
    }
}

pub struct SusceptibilityTemplate;

impl TemplateStrategy for SusceptibilityTemplate {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Susceptibility
    }

    fn term_pattern(&self) -> &'static str {
        "[PROPERTY] to [COMPONENT] in [SYSTEM] at [TIME] by [METHOD]"
    }

    fn attribute_for(&self, slot: Slot) -> Option<&'static str> {
        match slot {
            Slot::Component => Some(vocabulary::TOWARDS),
            other => default_attribute(other),
        }
    }

    /// Susceptibility is towards an agent; values of any other kind are kept but noted.
    fn determine_component_attributes(
        &self,
        external: &ExternalConcept,
        part: &PartLink,
        ctx: &ModellingContext<'_>,
        audit: &mut MappingAudit,
    ) -> Vec<RelationshipTemplate> {
        let resolved = ctx
            .mapping
            .resolve(external, &part.part_number, vocabulary::TOWARDS, ctx.store, audit);
        for template in &resolved {
            let tag = ctx
                .store
                .concept(&template.value_id)
                .and_then(|c| c.semantic_tag().map(str::to_string));
            if let Some(tag) = tag {
                if !SUSCEPTIBILITY_AGENT_TAGS.contains(&tag.as_str()) {
                    audit.note(
                        &external.identifier,
                        &part.part_number,
                        format!("Susceptibility towards {} which is a {}", template.value_id, tag),
                        false,
                    );
                }
            }
        }
        resolved
    }

    fn apply_exceptions(&self, _external: &ExternalConcept, work: &mut Population) {
        work.attributes.push(RelationshipTemplate::new(
            vocabulary::INHERES_IN,
            vocabulary::ORGANISM,
        ));
    }
}

/// Panel-level code: only what is measured, where, and how it is expressed.
pub struct GrouperTemplate;

impl TemplateStrategy for GrouperTemplate {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Grouper
    }

    fn term_pattern(&self) -> &'static str {
        "[PROPERTY] of [COMPONENT] in [SYSTEM] by [METHOD]"
    }

    fn preset_flags(&self) -> Flags {
        Flags::of(&[ProcessingFlag::SuppressMethodTerm])
    }

    fn attribute_for(&self, slot: Slot) -> Option<&'static str> {
        match slot {
            Slot::Component | Slot::Property | Slot::System => default_attribute(slot),
            _ => None,
        }
    }
}
