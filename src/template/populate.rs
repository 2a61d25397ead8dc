//! Relationship population shared by every template.

use super::flags::{ProcessingFlag, StagedFlags};
use super::variants::TemplateStrategy;
use super::{designated_component, ModellingContext, Slot, TemplateKind, TemplatedConcept};
use crate::mapping::{MappingAudit, RelationshipTemplate};
use crate::model::{AlternateIdentifier, DefinitionStatus, ExternalConcept, RefsetMember, Relationship};
use crate::vocabulary;
use itertools::Itertools;
use std::collections::HashSet;
use tracing::debug;

/// Working state while one concept's parts are resolved.
pub struct Population {
    pub tc: TemplatedConcept,
    /// Values of the component attribute, one per component when split into groups.
    pub components: Vec<RelationshipTemplate>,
    pub attributes: Vec<RelationshipTemplate>,
    pub flags: StagedFlags,
}

impl Population {
    fn is_grouper(&self) -> bool {
        self.tc.kind == Some(TemplateKind::Grouper)
    }

    /// A part that cannot be modelled exactly: the concept becomes primitive,
    /// or drops out entirely when it is a grouper.
    fn degrade(&mut self, reason: String) {
        if self.is_grouper() {
            self.tc.issues.push(format!("Grouper dropped: {}", reason));
            self.flags.raise(ProcessingFlag::DropOut);
        } else {
            debug!("{} marked primitive: {}", self.tc.external_id, reason);
            self.flags.raise(ProcessingFlag::MarkAsPrimitive);
        }
    }
}

pub fn populate(
    strategy: &dyn TemplateStrategy,
    external: &ExternalConcept,
    ctx: &ModellingContext<'_>,
    audit: &mut MappingAudit,
) -> TemplatedConcept {
    let config = ctx.config;
    let mut tc = TemplatedConcept::new(&external.identifier, strategy.kind(), &config.module_id);
    tc.concept.definition_status = DefinitionStatus::Primitive;
    tc.concept
        .add_relationship(Relationship::stated(vocabulary::IS_A, config.parent_concept_id.clone(), 0));

    let mut work = Population {
        tc,
        components: Vec::new(),
        attributes: Vec::new(),
        flags: StagedFlags::new(strategy.preset_flags()),
    };

    let designated = designated_component(external);
    let mut seen_parts: HashSet<&str> = HashSet::new();

    for link in &external.parts {
        if config.is_skipped_column(&link.column) {
            continue;
        }
        let Some(slot) = Slot::for_column(&link.column) else {
            debug!("{}: no slot for column {}", external.identifier, link.column);
            continue;
        };
        if slot == Slot::Component && !designated.map_or(false, |d| std::ptr::eq(d, link)) {
            continue;
        }
        if !seen_parts.insert(link.part_number.as_str()) {
            continue;
        }
        let Some(attribute) = strategy.attribute_for(slot) else {
            continue;
        };

        work.tc.seen_slots.insert(slot);
        work.tc.part_names.insert(slot, link.part_name.clone());

        let resolved = if slot == Slot::Component {
            strategy.determine_component_attributes(external, link, ctx, audit)
        } else {
            ctx.mapping
                .resolve(external, &link.part_number, attribute, ctx.store, audit)
        };

        if resolved.is_empty() {
            if work.is_grouper() {
                work.degrade(format!("no mapping for {} part {}", link.column, link.part_number));
            } else if config.allows_primitive_fallback(&link.column) {
                work.tc.slot_text.insert(slot, link.part_name.clone());
                work.degrade(format!("no mapping for {} part {}", link.column, link.part_number));
            }
        } else if slot == Slot::Component {
            work.components.extend(resolved);
        } else {
            work.attributes.extend(resolved);
        }

        if ctx.is_unknown_value(&link.part_name) {
            work.tc.slot_text.insert(slot, link.part_name.clone());
            work.degrade(format!("{} part '{}' is not specific", link.column, link.part_name));
        }
        let lower = link.part_name.to_lowercase();
        if lower.contains("specimen") {
            work.flags.raise(ProcessingFlag::AllowSpecimen);
        }
        if lower.contains("technique") {
            work.flags.raise(ProcessingFlag::AllowTechnique);
        }
    }

    strategy.apply_exceptions(external, &mut work);
    attach_relationships(&mut work);

    let Population {
        mut tc,
        components,
        flags,
        ..
    } = work;
    tc.flags = tc.flags.union(flags.finish());

    if components.is_empty()
        && !tc.flags.contains(ProcessingFlag::AllowBlankComponent)
        && !tc.slot_text.contains_key(&Slot::Component)
    {
        tc.drop_out("No component attribute could be determined");
    }
    if !tc.is_dropped() && tc.concept.relationships().all(|r| r.type_id == vocabulary::IS_A) {
        tc.drop_out("No attribute relationships could be determined");
    }
    if !tc.flags.contains(ProcessingFlag::MarkAsPrimitive) {
        tc.concept.definition_status = DefinitionStatus::FullyDefined;
    }

    tc.concept
        .alternate_identifiers
        .push(AlternateIdentifier::new(config.scheme_id.clone(), external.identifier.clone()));
    if let Some(refset) = &config.membership_refset_id {
        tc.concept.refset_members.push(RefsetMember::new(refset.clone()));
    }
    tc
}

/// Adds the resolved attributes in group 1, or one group per component value
/// when the template splits components.
fn attach_relationships(work: &mut Population) {
    let components: Vec<RelationshipTemplate> = work
        .components
        .iter()
        .unique_by(|t| (t.type_id.clone(), t.value_id.clone()))
        .cloned()
        .collect();
    let attributes: Vec<RelationshipTemplate> = work
        .attributes
        .iter()
        .unique_by(|t| (t.type_id.clone(), t.value_id.clone()))
        .cloned()
        .collect();

    let concept = &mut work.tc.concept;
    if work.flags.is_preset(ProcessingFlag::SplitToGroupPerComponent) && components.len() > 1 {
        for (idx, component) in components.iter().enumerate() {
            let group = idx as u32 + 1;
            concept.add_relationship(Relationship::stated(
                component.type_id.clone(),
                component.value_id.clone(),
                group,
            ));
            for attribute in &attributes {
                concept.add_relationship(Relationship::stated(
                    attribute.type_id.clone(),
                    attribute.value_id.clone(),
                    group,
                ));
            }
        }
    } else {
        for template in components.iter().chain(attributes.iter()) {
            concept.add_relationship(template.to_relationship(1));
        }
    }
    work.components = components;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::mapping::AttributePartMapManager;
    use crate::model::{columns, Concept};
    use crate::ontology::InMemoryOntology;
    use crate::template::strategy_for;
    use std::collections::HashMap;

    fn mapping(config: &PipelineConfig) -> AttributePartMapManager {
        let table: HashMap<String, String> = [
            ("LP-GLU", "67079006"),
            ("LP-SER", "119364003"),
            ("LP-MCNC", "118539007"),
            ("LP-UNSPEC", "261665006"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        AttributePartMapManager::new(table, config)
    }

    fn store() -> InMemoryOntology {
        InMemoryOntology::new()
            .with_concept(Concept::reference("67079006", "Glucose (substance)", "Glucose"))
            .with_concept(Concept::reference("119364003", "Serum specimen (specimen)", "Serum specimen"))
            .with_concept(Concept::reference("118539007", "Mass concentration (property) (qualifier value)", "Mass concentration"))
            .with_concept(Concept::reference("261665006", "Unknown (qualifier value)", "Unknown"))
    }

    fn glucose() -> ExternalConcept {
        ExternalConcept::new("2345-7", "MCnc")
            .with_part(columns::COMPONENT, "LP-GLU", "Glucose")
            .with_part(columns::PROPERTY, "LP-MCNC", "MCnc")
            .with_part(columns::SYSTEM, "LP-SER", "Ser")
    }

    #[test]
    fn test_fully_mapped_concept_is_defined() {
        let config = PipelineConfig::default();
        let manager = mapping(&config);
        let store = store();
        let ctx = ModellingContext::new(&config, &manager, &store).unwrap();
        let mut audit = MappingAudit::new();

        let tc = populate(strategy_for(TemplateKind::Component), &glucose(), &ctx, &mut audit);
        assert!(!tc.is_dropped());
        assert_eq!(tc.concept.definition_status, DefinitionStatus::FullyDefined);
        assert_eq!(tc.concept.relationship_count(), 4);
        assert!(tc.concept.relationships().filter(|r| !r.is_a()).all(|r| r.group == 1));
        assert_eq!(tc.concept.alternate_identifiers[0].alternate_identifier, "2345-7");
    }

    #[test]
    fn test_unmapped_method_falls_back_to_primitive() {
        let config = PipelineConfig::default();
        let manager = mapping(&config);
        let store = store();
        let ctx = ModellingContext::new(&config, &manager, &store).unwrap();
        let mut audit = MappingAudit::new();

        let external = glucose().with_part(columns::METHOD, "LP-MAGIC", "Magic strip");
        let tc = populate(strategy_for(TemplateKind::Component), &external, &ctx, &mut audit);
        assert!(tc.flags.contains(ProcessingFlag::MarkAsPrimitive));
        assert_eq!(tc.concept.definition_status, DefinitionStatus::Primitive);
        assert_eq!(tc.slot_text.get(&Slot::Method).map(String::as_str), Some("Magic strip"));
        assert_eq!(audit.missing_count("LP-MAGIC"), 1);
    }

    #[test]
    fn test_grouper_drops_out_instead_of_degrading() {
        let config = PipelineConfig::default();
        let manager = mapping(&config);
        let store = store();
        let ctx = ModellingContext::new(&config, &manager, &store).unwrap();
        let mut audit = MappingAudit::new();

        let mut external = ExternalConcept::new("3-3", "MCnc")
            .with_part(columns::COMPONENT, "LP-GLU", "Glucose")
            .with_part(columns::SYSTEM, "LP-NOPE", "Body fluid");
        external.grouper = true;
        let tc = populate(strategy_for(TemplateKind::Grouper), &external, &ctx, &mut audit);
        assert!(tc.is_dropped());
        assert!(!tc.flags.contains(ProcessingFlag::MarkAsPrimitive));
    }

    #[test]
    fn test_unknown_vocabulary_uses_literal_text() {
        let config = PipelineConfig::default();
        let manager = mapping(&config);
        let store = store();
        let ctx = ModellingContext::new(&config, &manager, &store).unwrap();
        let mut audit = MappingAudit::new();

        let external = glucose().with_part(columns::METHOD, "LP-UNSPEC", "Method unspecified");
        let tc = populate(strategy_for(TemplateKind::Component), &external, &ctx, &mut audit);
        assert!(tc.flags.contains(ProcessingFlag::MarkAsPrimitive));
        assert_eq!(tc.slot_text.get(&Slot::Method).map(String::as_str), Some("Method unspecified"));
    }

    #[test]
    fn test_missing_component_drops_out() {
        let config = PipelineConfig::default();
        let manager = mapping(&config);
        let store = store();
        let ctx = ModellingContext::new(&config, &manager, &store).unwrap();
        let mut audit = MappingAudit::new();

        let external = ExternalConcept::new("4-4", "MCnc")
            .with_part(columns::COMPONENT, "LP-NOPE", "Mystery")
            .with_part(columns::SYSTEM, "LP-SER", "Ser");
        let tc = populate(strategy_for(TemplateKind::Component), &external, &ctx, &mut audit);
        assert!(tc.is_dropped());
        assert_eq!(audit.missing_count("LP-NOPE"), 1);
    }

    #[test]
    fn test_literal_component_without_attributes_drops_out() {
        let config = PipelineConfig::default();
        let manager = mapping(&config);
        let store = store();
        let ctx = ModellingContext::new(&config, &manager, &store).unwrap();
        let mut audit = MappingAudit::new();

        let external = ExternalConcept::new("6-6", "MCnc").with_part(columns::COMPONENT, "LP-X", "Other analyte");
        let tc = populate(strategy_for(TemplateKind::Component), &external, &ctx, &mut audit);
        assert!(tc.is_dropped());
        assert!(tc
            .issues
            .iter()
            .any(|i| i == "No attribute relationships could be determined"));
    }

    #[test]
    fn test_split_components_into_groups() {
        let config = PipelineConfig::default();
        let manager = mapping(&config);
        let store = store()
            .with_concept(Concept::reference("102739008", "LDL cholesterol (substance)", "LDL cholesterol"))
            .with_concept(Concept::reference("102740005", "VLDL cholesterol (substance)", "VLDL cholesterol"));
        let ctx = ModellingContext::new(&config, &manager, &store).unwrap();
        let mut audit = MappingAudit::new();

        let external = ExternalConcept::new("5-5", "MCnc")
            .with_part(columns::COMPONENT, "LP43576-5", "Cholesterol.in LDL+VLDL")
            .with_part(columns::SYSTEM, "LP-SER", "Ser");
        let tc = populate(strategy_for(TemplateKind::Component), &external, &ctx, &mut audit);
        let groups: HashSet<u32> = tc.concept.relationships().map(|r| r.group).collect();
        assert_eq!(groups, [0, 1, 2].into_iter().collect());
        assert_eq!(tc.concept.relationships_of_type(vocabulary::DIRECT_SITE).count(), 2);
    }

    #[test]
    fn test_susceptibility_adds_inheres_in_organism() {
        let config = PipelineConfig::default();
        let manager = mapping(&config);
        let store = store();
        let ctx = ModellingContext::new(&config, &manager, &store).unwrap();
        let mut audit = MappingAudit::new();

        let external = ExternalConcept::new("6-6", "Susc").with_part(columns::COMPNUM, "LP-GLU", "Glucose");
        let tc = populate(strategy_for(TemplateKind::Susceptibility), &external, &ctx, &mut audit);
        assert!(tc
            .concept
            .relationships()
            .any(|r| r.type_id == vocabulary::INHERES_IN && r.target_id == vocabulary::ORGANISM));
        assert!(tc.concept.relationships_of_type(vocabulary::TOWARDS).count() == 1);
        // glucose is a substance, which is an acceptable agent
        assert!(audit.notes().is_empty());
    }
}
