//! Term synthesis from slot patterns.

use super::flags::{Flags, ProcessingFlag, StagedFlags};
use super::variants::TemplateStrategy;
use super::{ModellingContext, Slot, TemplatedConcept};
use crate::model::{Acceptability, CaseSignificance, Description, DescriptionType};
use crate::vocabulary;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

/// Slots rendered into the colon-form synonym, in order.
const COLON_FORM_SLOTS: [Slot; 6] = [
    Slot::Component,
    Slot::Property,
    Slot::Time,
    Slot::System,
    Slot::Scale,
    Slot::Method,
];

struct PhraseRemoval {
    key: &'static str,
    phrase: &'static str,
    unless: Option<ProcessingFlag>,
}

lazy_static! {
    /// Values whose preferred term never reads well inside a name.
    static ref VALUE_TERM_OVERRIDES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("123029007", ""); // Single point in time
        m.insert("718500008", "excretion"); // Excretory process
        m.insert("410607006", "organism");
        m
    };

    /// Phrases removed from values carrying a given semantic tag.
    static ref SEMANTIC_TAG_REMOVALS: Vec<PhraseRemoval> = vec![
        PhraseRemoval { key: "specimen", phrase: " specimen", unless: Some(ProcessingFlag::AllowSpecimen) },
        PhraseRemoval { key: "body structure", phrase: " structure", unless: None },
    ];

    /// Phrases removed from values of a given attribute type.
    static ref ATTRIBUTE_REMOVALS: Vec<PhraseRemoval> = vec![
        PhraseRemoval { key: vocabulary::TECHNIQUE, phrase: " technique", unless: Some(ProcessingFlag::AllowTechnique) },
        PhraseRemoval { key: vocabulary::PROCESS_DURATION, phrase: " duration", unless: None },
    ];

    /// Case-insensitive matchers for every removable phrase.
    static ref REMOVAL_PATTERNS: HashMap<&'static str, Regex> = SEMANTIC_TAG_REMOVALS
        .iter()
        .chain(ATTRIBUTE_REMOVALS.iter())
        .map(|r| (r.phrase, Regex::new(&format!("(?i){}", regex::escape(r.phrase))).unwrap()))
        .collect();

    static ref UNRESOLVED_TOKEN: Regex = Regex::new(r"\[[A-Z_]+\]").unwrap();
}

enum Rendering {
    Text(String),
    /// Drop the token and the connector before it.
    StripWithPreceding,
    /// Drop the token and the connector after it.
    StripWithTrailing,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Connector(String),
    Text(String),
}

/// Builds FSN, preferred term and colon-form synonym for a populated concept.
pub fn populate_terms(tc: &mut TemplatedConcept, strategy: &dyn TemplateStrategy, ctx: &ModellingContext<'_>) {
    let mut flags = StagedFlags::new(tc.flags);
    let mut issues = Vec::new();

    let view: &TemplatedConcept = tc;
    let term = render_pattern(strategy.term_pattern(), |slot| {
        resolve_slot(view, strategy, ctx, slot, &mut issues)
    });
    let term = upper_first(&term);
    let fsn = format!("{} ({})", term, ctx.config.semantic_tag);
    tc.issues.extend(issues);

    if term.trim().is_empty() {
        tc.issues.push("Generated term is empty".to_string());
        flags.raise(ProcessingFlag::DropOut);
    } else if has_unresolved_token(&fsn) {
        tc.issues.push(format!("FSN indicates failure: {}", fsn));
        flags.raise(ProcessingFlag::DropOut);
    }
    tc.flags = flags.finish();
    if tc.is_dropped() {
        return;
    }

    let case = case_significance_of(&term);
    let dialects = &ctx.config.dialect_refsets;
    let descriptions = &mut tc.concept.descriptions;
    descriptions.push(
        Description::new(fsn, DescriptionType::Fsn, case).with_acceptability(dialects, Acceptability::Preferred),
    );
    descriptions.push(
        Description::new(term.clone(), DescriptionType::Synonym, case)
            .with_acceptability(dialects, Acceptability::Preferred),
    );
    if let Some(colon) = colon_form(tc) {
        if colon != term {
            tc.concept.descriptions.push(
                Description::new(colon, DescriptionType::Synonym, CaseSignificance::CaseSensitive)
                    .with_acceptability(dialects, Acceptability::Acceptable),
            );
        }
    }
}

fn resolve_slot(
    tc: &TemplatedConcept,
    strategy: &dyn TemplateStrategy,
    ctx: &ModellingContext<'_>,
    slot: Slot,
    issues: &mut Vec<String>,
) -> Rendering {
    if slot.suppressed_by().map_or(false, |f| tc.flags.contains(f)) {
        return Rendering::StripWithPreceding;
    }
    if let Some(text) = tc.slot_text.get(&slot) {
        if text.trim().is_empty() {
            return Rendering::StripWithTrailing;
        }
        let text = text.trim();
        if ctx.is_case_sensitive_term(text) {
            return Rendering::Text(text.to_string());
        }
        return Rendering::Text(adjust_case(text, None));
    }

    let Some(attribute) = strategy.attribute_for(slot) else {
        return Rendering::StripWithPreceding;
    };
    let values: Vec<&str> = tc
        .concept
        .relationships_of_type(attribute)
        .map(|r| r.target_id.as_str())
        .unique()
        .collect();
    if values.is_empty() {
        let blank_allowed = slot.allowed_blank_by().map_or(false, |f| tc.flags.contains(f));
        if tc.seen_slots.contains(&slot) && !blank_allowed {
            return Rendering::Unresolved;
        }
        return Rendering::StripWithPreceding;
    }

    let mut terms = Vec::new();
    for value in values {
        match value_term(value, attribute, ctx, tc.flags) {
            Some(term) => terms.push(term),
            None => {
                issues.push(format!("No preferred term available for {}", value));
                return Rendering::Unresolved;
            }
        }
    }
    let terms: Vec<String> = terms.into_iter().filter(|t| !t.is_empty()).collect();
    if terms.is_empty() {
        Rendering::StripWithPreceding
    } else {
        Rendering::Text(terms.join(" and "))
    }
}

/// Preferred term of a value concept as it should read inside a generated name.
fn value_term(value_id: &str, attribute: &str, ctx: &ModellingContext<'_>, flags: Flags) -> Option<String> {
    if let Some(term) = ctx.config.term_overrides.get(value_id) {
        return Some(term.clone());
    }
    if let Some(term) = VALUE_TERM_OVERRIDES.get(value_id) {
        return Some(term.to_string());
    }

    let refset = ctx.config.dialect_refsets.first()?;
    let concept = ctx.store.concept(value_id)?;
    let description = concept.preferred_synonym(refset)?;
    let mut term = description.term.clone();

    if let Some(tag) = concept.semantic_tag() {
        for removal in SEMANTIC_TAG_REMOVALS.iter().filter(|r| r.key == tag) {
            term = apply_removal(&term, removal, flags);
        }
    }
    for removal in ATTRIBUTE_REMOVALS.iter().filter(|r| r.key == attribute) {
        term = apply_removal(&term, removal, flags);
    }
    Some(adjust_case(term.trim(), Some(description.case_significance)))
}

fn apply_removal(term: &str, removal: &PhraseRemoval, flags: Flags) -> String {
    if removal.unless.map_or(false, |f| flags.contains(f)) {
        return term.to_string();
    }
    match REMOVAL_PATTERNS.get(removal.phrase) {
        Some(re) => re.replacen(term, 1, "").into_owned(),
        None => term.to_string(),
    }
}

fn render_pattern(pattern: &str, mut resolve: impl FnMut(Slot) -> Rendering) -> String {
    let mut out: Vec<Piece> = Vec::new();
    let mut skip_next_connector = false;

    for word in pattern.split_whitespace() {
        match Slot::from_token(word) {
            None => {
                if skip_next_connector {
                    skip_next_connector = false;
                    continue;
                }
                out.push(Piece::Connector(word.to_string()));
            }
            Some(slot) => {
                skip_next_connector = false;
                match resolve(slot) {
                    Rendering::Text(text) => out.push(Piece::Text(text)),
                    Rendering::StripWithPreceding => {
                        if matches!(out.last(), Some(Piece::Connector(_))) {
                            out.pop();
                        }
                    }
                    Rendering::StripWithTrailing => skip_next_connector = true,
                    Rendering::Unresolved => out.push(Piece::Text(word.to_string())),
                }
            }
        }
    }

    // Collapse double connectors, keeping the later one, and trim dangling ones.
    let mut collapsed: Vec<Piece> = Vec::with_capacity(out.len());
    for piece in out {
        if matches!(piece, Piece::Connector(_)) && matches!(collapsed.last(), Some(Piece::Connector(_))) {
            collapsed.pop();
        }
        collapsed.push(piece);
    }
    while matches!(collapsed.first(), Some(Piece::Connector(_))) {
        collapsed.remove(0);
    }
    while matches!(collapsed.last(), Some(Piece::Connector(_))) {
        collapsed.pop();
    }

    collapsed
        .into_iter()
        .map(|p| match p {
            Piece::Connector(s) | Piece::Text(s) => s,
        })
        .filter(|s| !s.is_empty())
        .join(" ")
}

fn has_unresolved_token(text: &str) -> bool {
    UNRESOLVED_TOKEN.is_match(text)
}

/// True for acronyms and mixed-case names such as "HIV" or "HbA1c".
fn starts_with_acronym(text: &str) -> bool {
    let first_word = text.split_whitespace().next().unwrap_or("");
    first_word.chars().count() > 1 && first_word.chars().skip(1).any(char::is_uppercase)
}

/// Lower-cases the first letter unless the text is case sensitive or starts with an acronym.
fn adjust_case(text: &str, case: Option<CaseSignificance>) -> String {
    if case == Some(CaseSignificance::CaseSensitive) || starts_with_acronym(text) {
        return text.to_string();
    }
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn upper_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn case_significance_of(term: &str) -> CaseSignificance {
    if starts_with_acronym(term) {
        CaseSignificance::CaseSensitive
    } else if term.chars().skip(1).any(char::is_uppercase) {
        CaseSignificance::InitialCharacterCaseInsensitive
    } else {
        CaseSignificance::CaseInsensitive
    }
}

fn colon_form(tc: &TemplatedConcept) -> Option<String> {
    if tc.part_names.is_empty() {
        return None;
    }
    Some(
        COLON_FORM_SLOTS
            .iter()
            .map(|slot| tc.part_names.get(slot).map(String::as_str).unwrap_or(""))
            .join(":"),
    )
}
