//! Run orchestration: load inputs, model every external concept, validate,
//! classify against the published state and collect the delta.

use super::changeset::ChangeSetEngine;
use super::output::{delta_records, DeltaRecord};
use super::summary::RunSummary;
use crate::alternate_index::AlternateIdentifierIndex;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::mapping::{AttributePartMapManager, MappingAudit};
use crate::model::{ExternalConcept, ExternalSource, PartCatalog};
use crate::ontology::{InMemoryOntology, OntologyStore};
use crate::template::{self, IterationIndicator, ModellingContext, TemplatedConcept};
use crate::vocabulary;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const INTEGRITY_ISSUES: &str = "Part link integrity issues";
const MISSING_TARGETS: &str = "Dropped for missing relationship target";
const DUPLICATE_FSNS: &str = "Duplicate FSNs";

/// File locations for one run.
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub concepts: PathBuf,
    pub part_links: PathBuf,
    pub parts: Option<PathBuf>,
    pub part_mapping: PathBuf,
    pub ontology: PathBuf,
    pub alternate_index: PathBuf,
}

impl PipelineInputs {
    /// Conventional file names under an input directory and a state directory.
    pub fn from_dirs(input_dir: &Path, state_dir: &Path) -> Self {
        let parts = input_dir.join("parts.tsv");
        Self {
            concepts: input_dir.join("concepts.tsv"),
            part_links: input_dir.join("part_links.tsv"),
            parts: parts.exists().then_some(parts),
            part_mapping: input_dir.join("part_mapping.tsv"),
            ontology: state_dir.join("ontology.json"),
            alternate_index: state_dir.join("alternate_index.json"),
        }
    }
}

/// Everything a run produced, in source order.
#[derive(Debug)]
pub struct RunOutcome {
    pub concepts: Vec<TemplatedConcept>,
    pub removed: Vec<TemplatedConcept>,
    pub delta: Vec<DeltaRecord>,
    pub audit: MappingAudit,
    pub summary: RunSummary,
}

impl RunOutcome {
    pub fn find(&self, external_id: &str) -> Option<&TemplatedConcept> {
        self.concepts
            .iter()
            .chain(self.removed.iter())
            .find(|tc| tc.external_id == external_id)
    }

    pub fn all(&self) -> Vec<&TemplatedConcept> {
        self.concepts.iter().chain(self.removed.iter()).collect()
    }
}

pub struct PipelineManager<S: OntologyStore> {
    config: PipelineConfig,
    mapping: AttributePartMapManager,
    source: ExternalSource,
    store: S,
    index: AlternateIdentifierIndex,
}

impl PipelineManager<InMemoryOntology> {
    pub fn load(config: PipelineConfig, inputs: &PipelineInputs) -> Result<Self> {
        let catalog = match &inputs.parts {
            Some(path) => PartCatalog::load(path)?,
            None => PartCatalog::default(),
        };
        let source = ExternalSource::load(&inputs.concepts, &inputs.part_links, &catalog, &config.usage)?;
        let mapping = AttributePartMapManager::load(&inputs.part_mapping, &config)?;
        let store = InMemoryOntology::load(&inputs.ontology)?;
        let index = AlternateIdentifierIndex::load(&inputs.alternate_index)?;
        Ok(Self::new(config, mapping, source, store, index))
    }

    pub fn save_state(&self, inputs: &PipelineInputs) -> Result<()> {
        self.store.save(&inputs.ontology)?;
        self.index.save(&inputs.alternate_index)?;
        info!(
            "Saved ontology state to {} and alternate identifier index to {}",
            inputs.ontology.display(),
            inputs.alternate_index.display()
        );
        Ok(())
    }
}

impl<S: OntologyStore> PipelineManager<S> {
    pub fn new(
        config: PipelineConfig,
        mapping: AttributePartMapManager,
        source: ExternalSource,
        store: S,
        index: AlternateIdentifierIndex,
    ) -> Self {
        Self {
            config,
            mapping,
            source,
            store,
            index,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn mapping(&self) -> &AttributePartMapManager {
        &self.mapping
    }

    pub fn source(&self) -> &ExternalSource {
        &self.source
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn index(&self) -> &AlternateIdentifierIndex {
        &self.index
    }

    /// Models every external concept on `worker_count` scoped threads.
    /// Each worker accumulates its own audit and summary; results are merged in chunk order.
    pub fn model_all(&self) -> Result<(Vec<TemplatedConcept>, MappingAudit, RunSummary)> {
        let ctx = ModellingContext::new(&self.config, &self.mapping, &self.store)?;
        let externals: Vec<&ExternalConcept> = self.source.iter().collect();
        let workers = self.config.worker_count.max(1);
        let chunk_size = ((externals.len() + workers - 1) / workers).max(1);
        info!(
            "Modelling {} external concepts on {} workers",
            externals.len(),
            workers.min(externals.len().max(1))
        );

        let results = std::thread::scope(|scope| {
            let handles: Vec<_> = externals
                .chunks(chunk_size)
                .map(|chunk| {
                    let ctx = &ctx;
                    scope.spawn(move || {
                        let mut audit = MappingAudit::new();
                        let mut summary = RunSummary::new();
                        let mut modelled = Vec::with_capacity(chunk.len());
                        for external in chunk {
                            let tc = template::generate(external, ctx, &mut audit);
                            summary.record_modelled(&tc);
                            modelled.push(tc);
                        }
                        (modelled, audit, summary)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
        });

        let mut concepts = Vec::with_capacity(externals.len());
        let mut audit = MappingAudit::new();
        let mut summary = RunSummary::new();
        for result in results {
            let (modelled, worker_audit, worker_summary) = result
                .map_err(|_| PipelineError::Modelling("A modelling worker panicked".to_string()))?;
            concepts.extend(modelled);
            audit.merge(worker_audit);
            summary.merge(worker_summary);
        }
        Ok((concepts, audit, summary))
    }

    /// Runs modelling, validation and change-set determination, then stores
    /// every changed concept. State files are written separately.
    pub fn run(&mut self) -> Result<RunOutcome> {
        let (mut concepts, audit, mut summary) = self.model_all()?;
        summary.add(INTEGRITY_ISSUES, self.source.integrity_issues().len());

        let mut seen_fsns: HashMap<String, String> = HashMap::new();
        for tc in concepts.iter_mut() {
            self.validate(tc, &mut seen_fsns, &mut summary)?;
        }

        let mut engine = ChangeSetEngine::new(&self.config, &self.store);
        for tc in concepts.iter_mut() {
            if tc.is_manual() {
                info!("{} is maintained manually, not compared", tc.external_id);
                summary.record_iteration(IterationIndicator::Manual);
                continue;
            }
            if tc.is_dropped() {
                continue;
            }
            let iteration = engine.determine(tc, &self.store, &mut self.index)?;
            summary.record_iteration(iteration);
        }
        let removed = engine.determine_removed(&self.source, &self.store, &self.index);
        for _ in &removed {
            summary.record_iteration(IterationIndicator::Removed);
        }

        let confirm = self.config.confirm_unchanged_alternate_identifiers;
        let delta: Vec<DeltaRecord> = concepts
            .iter()
            .chain(removed.iter())
            .flat_map(|tc| delta_records(tc, confirm))
            .collect();

        let mut stored = 0;
        for tc in concepts.iter().chain(removed.iter()) {
            if tc.concept.id.is_some() && tc.concept.has_changes() && !tc.is_manual() && !tc.is_dropped() {
                self.store.upsert(tc.concept.clone())?;
                stored += 1;
            }
        }
        info!(
            "Run complete: {} concepts, {} removed, {} delta records, {} concepts stored",
            concepts.len(),
            removed.len(),
            delta.len(),
            stored
        );

        Ok(RunOutcome {
            concepts,
            removed,
            delta,
            audit,
            summary,
        })
    }

    fn validate(
        &self,
        tc: &mut TemplatedConcept,
        seen_fsns: &mut HashMap<String, String>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        if tc.is_manual() || tc.is_dropped() {
            return Ok(());
        }

        let missing: Vec<String> = tc
            .concept
            .relationships()
            .filter(|r| self.store.concept(&r.target_id).is_none())
            .map(|r| r.target_id.clone())
            .collect();
        if !missing.is_empty() {
            warn!(
                "{} references {} which are absent from the ontology",
                tc.external_id,
                missing.join(", ")
            );
            tc.drop_out(format!(
                "Relationship target(s) absent from the ontology: {}",
                missing.join(", ")
            ));
            summary.increment(MISSING_TARGETS);
            return Ok(());
        }

        let attributes = tc
            .concept
            .relationships()
            .filter(|r| r.type_id != vocabulary::IS_A)
            .count();
        if attributes == 0 {
            return Err(PipelineError::Modelling(format!(
                "{} was modelled without any attribute relationships",
                tc.external_id
            )));
        }

        if let Some(fsn) = tc.concept.fsn_term() {
            let fsn = fsn.to_string();
            match seen_fsns.get(&fsn) {
                Some(first) => {
                    debug!("{} shares its FSN with {}", tc.external_id, first);
                    tc.issues.push(format!("FSN '{}' duplicates the FSN of {}", fsn, first));
                    summary.increment(DUPLICATE_FSNS);
                }
                None => {
                    seen_fsns.insert(fsn, tc.external_id.clone());
                }
            }
        }
        Ok(())
    }
}
