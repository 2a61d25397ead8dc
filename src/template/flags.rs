use serde::{Deserialize, Serialize};
use std::fmt;

/// Non-exclusive switches that alter population and terming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingFlag {
    DropOut,
    MarkAsPrimitive,
    AllowBlankComponent,
    AllowBlankDivisor,
    SuppressMethodTerm,
    SuppressDivisorTerm,
    SuppressCharacterizesTerm,
    AllowSpecimen,
    AllowTechnique,
    SplitToGroupPerComponent,
}

impl ProcessingFlag {
    pub const ALL: [ProcessingFlag; 10] = [
        ProcessingFlag::DropOut,
        ProcessingFlag::MarkAsPrimitive,
        ProcessingFlag::AllowBlankComponent,
        ProcessingFlag::AllowBlankDivisor,
        ProcessingFlag::SuppressMethodTerm,
        ProcessingFlag::SuppressDivisorTerm,
        ProcessingFlag::SuppressCharacterizesTerm,
        ProcessingFlag::AllowSpecimen,
        ProcessingFlag::AllowTechnique,
        ProcessingFlag::SplitToGroupPerComponent,
    ];

    fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub fn name(self) -> &'static str {
        match self {
            ProcessingFlag::DropOut => "DROP_OUT",
            ProcessingFlag::MarkAsPrimitive => "MARK_AS_PRIMITIVE",
            ProcessingFlag::AllowBlankComponent => "ALLOW_BLANK_COMPONENT",
            ProcessingFlag::AllowBlankDivisor => "ALLOW_BLANK_DIVISOR",
            ProcessingFlag::SuppressMethodTerm => "SUPPRESS_METHOD_TERM",
            ProcessingFlag::SuppressDivisorTerm => "SUPPRESS_DIVISOR_TERM",
            ProcessingFlag::SuppressCharacterizesTerm => "SUPPRESS_CHARACTERIZES_TERM",
            ProcessingFlag::AllowSpecimen => "ALLOW_SPECIMEN",
            ProcessingFlag::AllowTechnique => "ALLOW_TECHNIQUE",
            ProcessingFlag::SplitToGroupPerComponent => "SPLIT_TO_GROUP_PER_COMPONENT",
        }
    }
}

/// Set of processing flags stored as a bitset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(u16);

impl Flags {
    pub fn empty() -> Self {
        Flags(0)
    }

    pub fn of(flags: &[ProcessingFlag]) -> Self {
        flags.iter().fold(Flags::empty(), |acc, f| acc.with(*f))
    }

    pub fn with(mut self, flag: ProcessingFlag) -> Self {
        self.insert(flag);
        self
    }

    pub fn insert(&mut self, flag: ProcessingFlag) {
        self.0 |= flag.bit();
    }

    pub fn contains(&self, flag: ProcessingFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    pub fn union(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = ProcessingFlag> + '_ {
        ProcessingFlag::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(ProcessingFlag::name).collect();
        write!(f, "{}", names.join(","))
    }
}

/// Flags for one processing stage.
///
/// Preset flags are readable while the stage runs. Flags raised during the
/// stage cannot be read back until `finish` merges them, so no step observes
/// a flag raised by a step that happened to run earlier.
#[derive(Debug, Clone, Copy, Default)]
pub struct StagedFlags {
    preset: Flags,
    raised: Flags,
}

impl StagedFlags {
    pub fn new(preset: Flags) -> Self {
        Self {
            preset,
            raised: Flags::empty(),
        }
    }

    pub fn is_preset(&self, flag: ProcessingFlag) -> bool {
        self.preset.contains(flag)
    }

    pub fn raise(&mut self, flag: ProcessingFlag) {
        self.raised.insert(flag);
    }

    pub fn finish(self) -> Flags {
        self.preset.union(self.raised)
    }
}

/// Classification of one external code within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IterationIndicator {
    New,
    Unchanged,
    Modified,
    Resurrected,
    Manual,
    Removed,
}

impl fmt::Display for IterationIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IterationIndicator::New => "NEW",
            IterationIndicator::Unchanged => "UNCHANGED",
            IterationIndicator::Modified => "MODIFIED",
            IterationIndicator::Resurrected => "RESURRECTED",
            IterationIndicator::Manual => "MANUAL",
            IterationIndicator::Removed => "REMOVED",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_bitset() {
        let mut flags = Flags::of(&[ProcessingFlag::AllowSpecimen]);
        flags.insert(ProcessingFlag::DropOut);
        assert!(flags.contains(ProcessingFlag::DropOut));
        assert!(!flags.contains(ProcessingFlag::MarkAsPrimitive));
        assert_eq!(flags.to_string(), "DROP_OUT,ALLOW_SPECIMEN");
    }

    #[test]
    fn test_raised_flags_are_invisible_until_finished() {
        let mut staged = StagedFlags::new(Flags::of(&[ProcessingFlag::AllowBlankComponent]));
        staged.raise(ProcessingFlag::MarkAsPrimitive);
        assert!(staged.is_preset(ProcessingFlag::AllowBlankComponent));
        assert!(!staged.is_preset(ProcessingFlag::MarkAsPrimitive));
        let merged = staged.finish();
        assert!(merged.contains(ProcessingFlag::MarkAsPrimitive));
        assert!(merged.contains(ProcessingFlag::AllowBlankComponent));
    }
}
