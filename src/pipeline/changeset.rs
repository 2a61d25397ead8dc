//! Change-set determination between a run's output and the published state.
//!
//! Classification is driven by the alternate identifier index. When a
//! persisted record exists its identifiers are carried onto the regenerated
//! concept component by component; anything left over is inactivated, never
//! deleted.

use crate::alternate_index::{AlternateIdentifierIndex, IndexEntry};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::identifiers::{IdGenerator, Partition};
use crate::model::{Concept, Description, ExternalSource};
use crate::ontology::OntologyStore;
use crate::template::{IterationIndicator, TemplatedConcept};
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub struct ChangeSetEngine<'a> {
    config: &'a PipelineConfig,
    ids: IdGenerator,
}

impl<'a> ChangeSetEngine<'a> {
    pub fn new(config: &'a PipelineConfig, store: &dyn OntologyStore) -> Self {
        Self {
            config,
            ids: IdGenerator::seeded_after(config.namespace, store.component_ids()),
        }
    }

    /// Classifies one generated concept, aligning identifiers with its persisted
    /// predecessor and recording it in the index.
    pub fn determine(
        &mut self,
        tc: &mut TemplatedConcept,
        store: &dyn OntologyStore,
        index: &mut AlternateIdentifierIndex,
    ) -> Result<IterationIndicator> {
        let scheme = self.config.scheme_id.clone();
        let iteration = match index.lookup(&scheme, &tc.external_id).cloned() {
            None => {
                self.assign_new(&mut tc.concept, None);
                IterationIndicator::New
            }
            Some(entry) => match store.concept(&entry.concept_id) {
                None => {
                    warn!(
                        "{} is indexed to {} which is absent from the ontology, resurrecting",
                        tc.external_id, entry.concept_id
                    );
                    tc.issues.push(format!(
                        "Indexed concept {} was missing and has been resurrected",
                        entry.concept_id
                    ));
                    self.assign_new(&mut tc.concept, Some(entry.concept_id.clone()));
                    IterationIndicator::Resurrected
                }
                Some(existing) => {
                    tc.existing = Some(existing.clone());
                    self.align(&mut tc.concept, existing)
                }
            },
        };

        let concept_id = tc.concept.id.clone().unwrap_or_default();
        let member_id = tc
            .concept
            .alternate_identifiers
            .iter()
            .find(|a| a.active && a.scheme_id == scheme && a.alternate_identifier == tc.external_id)
            .and_then(|a| a.id.clone());
        index.record(
            &scheme,
            IndexEntry {
                external_id: tc.external_id.clone(),
                concept_id,
                member_id,
            },
        )?;

        if iteration == IterationIndicator::Unchanged {
            tc.concept.clear_changes();
        }
        debug!("{} classified {}", tc.external_id, iteration);
        tc.iteration = Some(iteration);
        Ok(iteration)
    }

    /// One REMOVED entry per indexed code that is no longer in the source.
    pub fn determine_removed(
        &self,
        source: &ExternalSource,
        store: &dyn OntologyStore,
        index: &AlternateIdentifierIndex,
    ) -> Vec<TemplatedConcept> {
        let mut removed = Vec::new();
        for entry in index.entries(&self.config.scheme_id) {
            if source.contains(&entry.external_id) || self.config.is_manual(&entry.external_id) {
                continue;
            }
            let tc = match store.concept(&entry.concept_id) {
                Some(existing) => {
                    let mut concept = existing.clone();
                    if concept.active {
                        info!("{} has left the source, inactivating {}", entry.external_id, entry.concept_id);
                        concept.active = false;
                        concept.changed = true;
                        concept.axiom.active = false;
                        concept.axiom.changed = true;
                    } else {
                        debug!("{} was already inactivated", entry.external_id);
                    }
                    TemplatedConcept::removed(&entry.external_id, concept, Some(existing.clone()))
                }
                None => {
                    warn!(
                        "{} has left the source and its concept {} is absent from the ontology",
                        entry.external_id, entry.concept_id
                    );
                    let mut concept = Concept::new(self.config.module_id.clone());
                    concept.id = Some(entry.concept_id.clone());
                    concept.active = false;
                    concept.changed = false;
                    concept.axiom.changed = false;
                    let mut tc = TemplatedConcept::removed(&entry.external_id, concept, None);
                    tc.issues
                        .push(format!("Indexed concept {} is absent from the ontology", entry.concept_id));
                    tc
                }
            };
            removed.push(tc);
        }
        removed
    }

    fn assign_new(&mut self, concept: &mut Concept, concept_id: Option<String>) {
        concept.id = Some(concept_id.unwrap_or_else(|| self.ids.mint(Partition::Concept)));
        concept.changed = true;
        for description in &mut concept.descriptions {
            description.id = Some(self.ids.mint(Partition::Description));
            description.changed = true;
            for entry in &mut description.lang_refset_entries {
                entry.id = Some(self.ids.member_id());
                entry.changed = true;
            }
        }
        concept.axiom.id = Some(self.ids.member_id());
        concept.axiom.changed = true;

        // No classifier is available here, so the derived view starts as the stated one
        let mut inferred = Vec::new();
        for stated in concept.axiom.active_relationships() {
            let mut relationship = stated.as_inferred();
            relationship.id = Some(self.ids.mint(Partition::Relationship));
            inferred.push(relationship);
        }
        concept.inferred = inferred;

        for alternate in &mut concept.alternate_identifiers {
            alternate.id = Some(self.ids.member_id());
            alternate.changed = true;
        }
        for member in &mut concept.refset_members {
            member.id = Some(self.ids.member_id());
            member.changed = true;
        }
    }

    fn align(&mut self, concept: &mut Concept, existing: &Concept) -> IterationIndicator {
        concept.id = existing.id.clone();
        concept.changed = !existing.active
            || existing.module_id != concept.module_id
            || existing.definition_status != concept.definition_status;

        self.align_descriptions(concept, existing);
        self.align_axiom(concept, existing);
        self.reconcile_inferred(concept, existing);
        self.align_alternate_identifiers(concept, existing);
        self.align_refset_members(concept, existing);

        let primary_change = concept.changed
            || concept.axiom.changed
            || concept.descriptions.iter().any(|d| d.changed)
            || concept.alternate_identifiers.iter().any(|a| a.changed)
            || concept.refset_members.iter().any(|m| m.changed);
        if primary_change {
            return IterationIndicator::Modified;
        }
        let language_change = concept
            .descriptions
            .iter()
            .any(|d| d.lang_refset_entries.iter().any(|e| e.changed));
        if language_change {
            debug!("{} has language acceptability changes only", concept.id_or_placeholder());
            return IterationIndicator::Modified;
        }
        IterationIndicator::Unchanged
    }

    fn align_descriptions(&mut self, concept: &mut Concept, existing: &Concept) {
        let mut matched: HashSet<usize> = HashSet::new();
        for description in &mut concept.descriptions {
            let candidates = || {
                existing.descriptions.iter().enumerate().filter(|(idx, d)| {
                    !matched.contains(idx)
                        && d.term == description.term
                        && d.description_type == description.description_type
                })
            };
            let found = candidates()
                .find(|(_, d)| d.active)
                .or_else(|| candidates().next())
                .map(|(idx, d)| (idx, d.clone()));

            match found {
                Some((idx, previous)) => {
                    matched.insert(idx);
                    description.id = previous.id.clone();
                    description.changed = !previous.active
                        || previous.case_significance != description.case_significance
                        || previous.language_code != description.language_code;
                    self.align_language_entries(description, &previous);
                }
                None => {
                    description.id = Some(self.ids.mint(Partition::Description));
                    description.changed = true;
                    for entry in &mut description.lang_refset_entries {
                        entry.id = Some(self.ids.member_id());
                        entry.changed = true;
                    }
                }
            }
        }

        for (idx, previous) in existing.descriptions.iter().enumerate() {
            if matched.contains(&idx) {
                continue;
            }
            let mut carried = previous.clone();
            if carried.active {
                carried.active = false;
                carried.changed = true;
                for entry in &mut carried.lang_refset_entries {
                    if entry.active {
                        entry.active = false;
                        entry.changed = true;
                    }
                }
            }
            concept.descriptions.push(carried);
        }
    }

    fn align_language_entries(&mut self, description: &mut Description, previous: &Description) {
        for entry in &mut description.lang_refset_entries {
            let counterpart = previous
                .lang_refset_entries
                .iter()
                .filter(|e| e.refset_id == entry.refset_id)
                .max_by_key(|e| e.active);
            match counterpart {
                Some(old) => {
                    entry.id = old.id.clone();
                    entry.changed = !old.active || old.acceptability != entry.acceptability;
                }
                None => {
                    entry.id = Some(self.ids.member_id());
                    entry.changed = true;
                }
            }
        }

        // Dialects no longer generated
        let dropped: Vec<_> = previous
            .lang_refset_entries
            .iter()
            .filter(|old| {
                !description
                    .lang_refset_entries
                    .iter()
                    .any(|e| e.refset_id == old.refset_id)
            })
            .cloned()
            .collect();
        for mut old in dropped {
            if old.active {
                old.active = false;
                old.changed = true;
            }
            description.lang_refset_entries.push(old);
        }
    }

    fn align_axiom(&mut self, concept: &mut Concept, existing: &Concept) {
        concept.axiom.id = existing
            .axiom
            .id
            .clone()
            .or_else(|| Some(self.ids.member_id()));
        concept.axiom.changed = !existing.axiom.active
            || existing.definition_status != concept.definition_status
            || !concept.axiom.equivalent_to(&existing.axiom);
    }

    /// Carries derived relationships over by triple; they never drive classification.
    fn reconcile_inferred(&mut self, concept: &mut Concept, existing: &Concept) {
        let mut used: HashSet<usize> = HashSet::new();
        let mut inferred = Vec::new();
        for stated in concept.axiom.active_relationships() {
            let previous = existing
                .inferred
                .iter()
                .enumerate()
                .find(|(idx, r)| r.active && !used.contains(idx) && r.same_triple(stated));
            match previous {
                Some((idx, r)) => {
                    used.insert(idx);
                    let mut kept = r.clone();
                    kept.changed = false;
                    inferred.push(kept);
                }
                None => {
                    let mut relationship = stated.as_inferred();
                    relationship.id = Some(self.ids.mint(Partition::Relationship));
                    inferred.push(relationship);
                }
            }
        }
        for (idx, previous) in existing.inferred.iter().enumerate() {
            if used.contains(&idx) {
                continue;
            }
            let mut carried = previous.clone();
            if carried.active {
                carried.active = false;
                carried.changed = true;
            }
            inferred.push(carried);
        }
        concept.inferred = inferred;
    }

    fn align_alternate_identifiers(&mut self, concept: &mut Concept, existing: &Concept) {
        for alternate in &mut concept.alternate_identifiers {
            match existing.alternate_identifiers.iter().find(|a| a.matches(alternate)) {
                Some(previous) => {
                    alternate.id = previous.id.clone().or_else(|| Some(self.ids.member_id()));
                    alternate.changed = !previous.active;
                }
                None => {
                    alternate.id = Some(self.ids.member_id());
                    alternate.changed = true;
                }
            }
        }
        let leftovers: Vec<_> = existing
            .alternate_identifiers
            .iter()
            .filter(|old| !concept.alternate_identifiers.iter().any(|a| a.matches(old)))
            .cloned()
            .collect();
        for mut old in leftovers {
            if old.active {
                old.active = false;
                old.changed = true;
            }
            concept.alternate_identifiers.push(old);
        }
    }

    fn align_refset_members(&mut self, concept: &mut Concept, existing: &Concept) {
        for member in &mut concept.refset_members {
            match existing.refset_members.iter().find(|m| m.refset_id == member.refset_id) {
                Some(previous) => {
                    member.id = previous.id.clone().or_else(|| Some(self.ids.member_id()));
                    member.changed = !previous.active;
                }
                None => {
                    member.id = Some(self.ids.member_id());
                    member.changed = true;
                }
            }
        }
        let leftovers: Vec<_> = existing
            .refset_members
            .iter()
            .filter(|old| !concept.refset_members.iter().any(|m| m.refset_id == old.refset_id))
            .cloned()
            .collect();
        for mut old in leftovers {
            if old.active {
                old.active = false;
                old.changed = true;
            }
            concept.refset_members.push(old);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::is_valid_sctid;
    use crate::model::{
        Acceptability, AlternateIdentifier, CaseSignificance, DefinitionStatus, DescriptionType, ExternalConcept,
        Relationship,
    };
    use crate::ontology::InMemoryOntology;
    use crate::template::TemplateKind;
    use crate::vocabulary;

    fn generated(external_id: &str, term: &str) -> TemplatedConcept {
        let config = PipelineConfig::default();
        let mut tc = TemplatedConcept::new(external_id, TemplateKind::Component, &config.module_id);
        let concept = &mut tc.concept;
        concept.definition_status = DefinitionStatus::FullyDefined;
        concept.add_relationship(Relationship::stated(vocabulary::IS_A, vocabulary::OBSERVABLE_ENTITY, 0));
        concept.add_relationship(Relationship::stated(vocabulary::COMPONENT, "67079006", 1));
        concept.descriptions.push(
            Description::new(
                format!("{} (observable entity)", term),
                DescriptionType::Fsn,
                CaseSignificance::CaseInsensitive,
            )
            .with_acceptability(&config.dialect_refsets, Acceptability::Preferred),
        );
        concept.descriptions.push(
            Description::new(term, DescriptionType::Synonym, CaseSignificance::CaseInsensitive)
                .with_acceptability(&config.dialect_refsets, Acceptability::Preferred),
        );
        concept
            .alternate_identifiers
            .push(AlternateIdentifier::new(config.scheme_id.clone(), external_id));
        tc
    }

    /// Runs one concept through the engine and publishes it.
    fn publish(
        config: &PipelineConfig,
        tc: &mut TemplatedConcept,
        store: &mut InMemoryOntology,
        index: &mut AlternateIdentifierIndex,
    ) -> IterationIndicator {
        let mut engine = ChangeSetEngine::new(config, &*store);
        let iteration = engine.determine(tc, &*store, index).unwrap();
        store.upsert(tc.concept.clone()).unwrap();
        iteration
    }

    #[test]
    fn test_new_concept_gets_identifiers_and_inferred_view() {
        let config = PipelineConfig::default();
        let mut store = InMemoryOntology::new();
        let mut index = AlternateIdentifierIndex::new();
        let mut tc = generated("2345-7", "Glucose");

        assert_eq!(publish(&config, &mut tc, &mut store, &mut index), IterationIndicator::New);
        let id = tc.concept.id.clone().unwrap();
        assert!(is_valid_sctid(&id));
        assert!(tc.concept.descriptions.iter().all(|d| d.id.is_some()));
        assert_eq!(tc.concept.inferred.len(), 2);
        assert_eq!(index.lookup(&config.scheme_id, "2345-7").unwrap().concept_id, id);
    }

    #[test]
    fn test_regenerating_identical_concept_is_unchanged() {
        let config = PipelineConfig::default();
        let mut store = InMemoryOntology::new();
        let mut index = AlternateIdentifierIndex::new();
        let mut first = generated("2345-7", "Glucose");
        publish(&config, &mut first, &mut store, &mut index);

        let mut second = generated("2345-7", "Glucose");
        assert_eq!(publish(&config, &mut second, &mut store, &mut index), IterationIndicator::Unchanged);
        assert!(!second.concept.has_changes());
        assert_eq!(second.concept.id, first.concept.id);
    }

    #[test]
    fn test_modified_concept_keeps_identifiers() {
        let config = PipelineConfig::default();
        let mut store = InMemoryOntology::new();
        let mut index = AlternateIdentifierIndex::new();
        let mut first = generated("2345-7", "Glucose");
        publish(&config, &mut first, &mut store, &mut index);

        let mut second = generated("2345-7", "Glucose");
        second.concept.descriptions[1].term = "Glucose level".to_string();
        assert_eq!(publish(&config, &mut second, &mut store, &mut index), IterationIndicator::Modified);
        assert_eq!(second.concept.id, first.concept.id);
        assert_eq!(second.concept.descriptions[0].id, first.concept.descriptions[0].id);
        assert_eq!(second.concept.axiom.id, first.concept.axiom.id);
        assert_eq!(
            second.concept.alternate_identifiers[0].id,
            first.concept.alternate_identifiers[0].id
        );
        // old synonym carried as inactive
        let old = second
            .concept
            .descriptions
            .iter()
            .find(|d| d.term == "Glucose")
            .unwrap();
        assert!(!old.active);
        assert_eq!(old.id, first.concept.descriptions[1].id);
    }

    #[test]
    fn test_acceptability_change_escalates_to_modified() {
        let config = PipelineConfig::default();
        let mut store = InMemoryOntology::new();
        let mut index = AlternateIdentifierIndex::new();
        let mut first = generated("2345-7", "Glucose");
        publish(&config, &mut first, &mut store, &mut index);

        let mut second = generated("2345-7", "Glucose");
        second.concept.descriptions[1].lang_refset_entries[1].acceptability = Acceptability::Acceptable;
        assert_eq!(publish(&config, &mut second, &mut store, &mut index), IterationIndicator::Modified);
        let entry = &second.concept.descriptions[1].lang_refset_entries[1];
        assert!(entry.changed);
        assert_eq!(entry.id, first.concept.descriptions[1].lang_refset_entries[1].id);
        assert!(!second.concept.descriptions[1].changed);
    }

    #[test]
    fn test_dialect_no_longer_generated_is_inactivated() {
        let config = PipelineConfig::default();
        let mut store = InMemoryOntology::new();
        let mut index = AlternateIdentifierIndex::new();
        let mut first = generated("2345-7", "Glucose");
        publish(&config, &mut first, &mut store, &mut index);
        let old_entries = first.concept.descriptions[1].lang_refset_entries.clone();
        assert_eq!(old_entries.len(), 2);

        let mut second = generated("2345-7", "Glucose");
        second.concept.descriptions[1].lang_refset_entries.truncate(1);
        assert_eq!(publish(&config, &mut second, &mut store, &mut index), IterationIndicator::Modified);

        let entries = &second.concept.descriptions[1].lang_refset_entries;
        assert_eq!(entries.len(), 2);
        let kept = &entries[0];
        assert!(kept.active);
        assert!(!kept.changed);
        assert_eq!(kept.id, old_entries[0].id);
        let dropped = entries.iter().find(|e| e.refset_id == old_entries[1].refset_id).unwrap();
        assert_eq!(dropped.id, old_entries[1].id);
        assert!(!dropped.active);
        assert!(dropped.changed);
    }

    #[test]
    fn test_missing_persisted_record_is_resurrected() {
        let config = PipelineConfig::default();
        let store = InMemoryOntology::new();
        let mut index = AlternateIdentifierIndex::new();
        index
            .record(
                &config.scheme_id,
                IndexEntry {
                    external_id: "2345-7".into(),
                    concept_id: "1234567001".into(),
                    member_id: None,
                },
            )
            .unwrap();
        let mut tc = generated("2345-7", "Glucose");
        let mut engine = ChangeSetEngine::new(&config, &store);
        assert_eq!(
            engine.determine(&mut tc, &store, &mut index).unwrap(),
            IterationIndicator::Resurrected
        );
        assert_eq!(tc.concept.id.as_deref(), Some("1234567001"));
        assert!(!tc.issues.is_empty());
    }

    #[test]
    fn test_removed_inactivates_once() {
        let config = PipelineConfig::default();
        let mut store = InMemoryOntology::new();
        let mut index = AlternateIdentifierIndex::new();
        let mut tc = generated("2345-7", "Glucose");
        publish(&config, &mut tc, &mut store, &mut index);

        let source = ExternalSource::from_concepts(vec![ExternalConcept::new("9999-9", "MCnc")]);
        let engine = ChangeSetEngine::new(&config, &store);
        let removed = engine.determine_removed(&source, &store, &index);
        assert_eq!(removed.len(), 1);
        let concept = &removed[0].concept;
        assert!(!concept.active && concept.changed);
        assert!(!concept.axiom.active);
        assert!(concept.descriptions.iter().all(|d| d.active && !d.changed));
        assert!(concept.alternate_identifiers[0].active);

        store.upsert(concept.clone()).unwrap();
        let again = engine.determine_removed(&source, &store, &index);
        assert_eq!(again.len(), 1);
        assert!(!again[0].concept.has_changes());
    }
}
