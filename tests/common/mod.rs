#![allow(dead_code)]

use concept_pipeline::model::{CaseSignificance, Concept};
use concept_pipeline::ontology::{AssociationType, HistoricalAssociation, InMemoryOntology};
use concept_pipeline::vocabulary;
use concept_pipeline::{PipelineConfig, PipelineInputs, PipelineManager, RunOutcome};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const GLUCOSE: &str = "67079006";
pub const SERUM: &str = "119364003";
pub const PLASMA: &str = "119361006";
pub const PSEUDOMONAS: &str = "52499004";
pub const LEGACY_GLUCOSE: &str = "70000009";

pub const CONCEPTS: &str = "\
CODE\tNAME\tPROPERTY\tUSAGE_RANK\tGROUPER
2345-7\tGlucose [Mass/volume] in Serum\tMCnc\t12\tN
2350-7\tGlucose [Mass/volume] in Urine\tMCnc\t450\tN
108027-4\tPseudomonas aeruginosa susceptibility in wound\tSusc\t\tN
5555-5\tGlucose by enzymatic assay in Serum\tMCnc\t150\tN
5556-3\tGlucose by enzymatic assay in Urine\tMCnc\t\tN
7777-1\tLegacy glucose in wound\tMCnc\t\tN
";

pub const PART_LINKS: &str = "\
CODE\tPART_NUMBER\tPART_NAME\tPART_TYPE\tCOLUMN
2345-7\tLP-GLU\tGlucose\tCOMPONENT\tCOMPONENT
2345-7\tLP-MCNC\tMCnc\tPROPERTY\tPROPERTY
2345-7\tLP6960-1\tPt\tTIME\tTIME
2345-7\tLP-SER\tSer\tSYSTEM\tSYSTEM
2350-7\tLP-GLU\tGlucose\tCOMPONENT\tCOMPONENT
2350-7\tLP-MCNC\tMCnc\tPROPERTY\tPROPERTY
2350-7\tLP6960-1\tPt\tTIME\tTIME
2350-7\tLP-UR\t\t\tSYSTEM
108027-4\tLP-PSAE\tPseudomonas aeruginosa\tCOMPONENT\tCOMPONENT
108027-4\tLP-SUSC\tSusc\tPROPERTY\tPROPERTY
108027-4\tLP6960-1\tPt\tTIME\tTIME
108027-4\tLP-WOUND\tWound specimen\tSYSTEM\tSYSTEM
5555-5\tLP-GLU\tGlucose\tCOMPONENT\tCOMPONENT
5555-5\tLP-MCNC\tMCnc\tPROPERTY\tPROPERTY
5555-5\tLP6960-1\tPt\tTIME\tTIME
5555-5\tLP-SER\tSer\tSYSTEM\tSYSTEM
5555-5\tLP-ENZ\tEnzymatic assay\tMETHOD\tMETHOD
5556-3\tLP-GLU\tGlucose\tCOMPONENT\tCOMPONENT
5556-3\tLP-MCNC\tMCnc\tPROPERTY\tPROPERTY
5556-3\tLP6960-1\tPt\tTIME\tTIME
5556-3\tLP-UR\t\t\tSYSTEM
5556-3\tLP-ENZ\tEnzymatic assay\tMETHOD\tMETHOD
7777-1\tLP-OLDGLU\tGlucose legacy\tCOMPONENT\tCOMPONENT
7777-1\tLP-MCNC\tMCnc\tPROPERTY\tPROPERTY
7777-1\tLP6960-1\tPt\tTIME\tTIME
7777-1\tLP-WOUND\tWound\tSYSTEM\tSYSTEM
";

/// Catalog entries fill the names of link rows that leave them blank.
pub const PARTS: &str = "\
PART_NUMBER\tPART_NAME\tPART_TYPE\tSTATUS
LP-UR\tUrine\tSYSTEM\tACTIVE
";

pub const PART_MAPPING: &str = "\
SOURCE_CODE\tSTATUS\tNO_MAP\tTARGET_CODE
LP-GLU\tACCEPTED\tN\t67079006
LP-MCNC\tACCEPTED\tN\t118539007
LP-SER\tACCEPTED\tN\t119364003
LP-UR\tACCEPTED\tN\t122575003
LP-SUSC\tACCEPTED\tN\t30789000
LP-PSAE\tACCEPTED\tN\t52499004
LP-WOUND\tACCEPTED\tN\t119365002
LP-OLDGLU\tACCEPTED\tN\t70000009
LP-ENZ\tUNMAPPED\tN\t
";

pub fn reference_ontology() -> InMemoryOntology {
    let mut pseudomonas = Concept::reference(PSEUDOMONAS, "Pseudomonas aeruginosa (organism)", "Pseudomonas aeruginosa");
    for d in &mut pseudomonas.descriptions {
        d.case_significance = CaseSignificance::CaseSensitive;
    }
    let mut legacy = Concept::reference(LEGACY_GLUCOSE, "Glucose legacy (substance)", "Glucose legacy");
    legacy.active = false;

    let mut store = InMemoryOntology::new()
        .with_concept(Concept::reference(
            vocabulary::OBSERVABLE_ENTITY,
            "Observable entity (observable entity)",
            "Observable entity",
        ))
        .with_concept(Concept::reference(vocabulary::ORGANISM, "Organism (organism)", "Organism"))
        .with_concept(Concept::reference(GLUCOSE, "Glucose (substance)", "Glucose"))
        .with_concept(Concept::reference(SERUM, "Serum specimen (specimen)", "Serum specimen"))
        .with_concept(Concept::reference(PLASMA, "Plasma specimen (specimen)", "Plasma specimen"))
        .with_concept(Concept::reference("122575003", "Urine specimen (specimen)", "Urine specimen"))
        .with_concept(Concept::reference(
            "118539007",
            "Mass concentration (property) (qualifier value)",
            "Mass concentration",
        ))
        .with_concept(Concept::reference(
            "123029007",
            "Single point in time (qualifier value)",
            "Single point in time",
        ))
        .with_concept(Concept::reference(
            "30789000",
            "Susceptibility (property) (qualifier value)",
            "Susceptibility",
        ))
        .with_concept(Concept::reference("119365002", "Specimen from wound (specimen)", "Specimen from wound"))
        .with_concept(pseudomonas)
        .with_concept(legacy);
    store.add_association(HistoricalAssociation {
        source_id: LEGACY_GLUCOSE.into(),
        association: AssociationType::ReplacedBy,
        target_id: GLUCOSE.into(),
    });
    store
}

/// Input and state directories seeded with the reference fixtures.
pub struct Fixture {
    pub dir: TempDir,
    pub inputs: PipelineInputs,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        let state = dir.path().join("state");
        fs::create_dir_all(&input).unwrap();
        fs::create_dir_all(&state).unwrap();

        write(&input.join("concepts.tsv"), CONCEPTS);
        write(&input.join("part_links.tsv"), PART_LINKS);
        write(&input.join("parts.tsv"), PARTS);
        write(&input.join("part_mapping.tsv"), PART_MAPPING);
        reference_ontology().save(&state.join("ontology.json")).unwrap();

        let inputs = PipelineInputs::from_dirs(&input, &state);
        Self { dir, inputs }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.dir.path().join("input")
    }

    pub fn write_input(&self, name: &str, content: &str) {
        write(&self.input_dir().join(name), content);
    }

    /// One full run that persists its state, like the binary does.
    pub fn run(&self) -> RunOutcome {
        self.run_with(config())
    }

    pub fn run_with(&self, config: PipelineConfig) -> RunOutcome {
        let mut manager = PipelineManager::load(config, &self.inputs).unwrap();
        let outcome = manager.run().unwrap();
        manager.save_state(&self.inputs).unwrap();
        outcome
    }
}

pub fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.worker_count = 2;
    config
}

pub fn write(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
}
