//! Well-known identifiers of the target ontology used while modelling.

pub const IS_A: &str = "116680003";
pub const OBSERVABLE_ENTITY: &str = "363787002";
pub const ORGANISM: &str = "410607006";
pub const EXCRETORY_PROCESS: &str = "718500008";

// Attribute types
pub const COMPONENT: &str = "246093002";
pub const PROPERTY_TYPE: &str = "370130000";
pub const TIME_ASPECT: &str = "370134009";
pub const DIRECT_SITE: &str = "704327008";
pub const INHERES_IN: &str = "704319004";
pub const SCALE_TYPE: &str = "370132008";
pub const TECHNIQUE: &str = "246501002";
pub const CHARACTERIZES: &str = "704321009";
pub const RELATIVE_TO: &str = "704325000";
pub const PROCESS_OUTPUT: &str = "704324001";
pub const PROCESS_DURATION: &str = "704323007";
pub const TOWARDS: &str = "704320005";
pub const PRECONDITION: &str = "704326004";

// Metadata
pub const PRIMITIVE: &str = "900000000000074008";
pub const FULLY_DEFINED: &str = "900000000000073002";
pub const FSN_TYPE: &str = "900000000000003001";
pub const SYNONYM_TYPE: &str = "900000000000013009";
pub const PREFERRED: &str = "900000000000548007";
pub const ACCEPTABLE: &str = "900000000000549004";
pub const CASE_INSENSITIVE: &str = "900000000000448009";
pub const INITIAL_CHARACTER_CASE_INSENSITIVE: &str = "900000000000020002";
pub const CASE_SENSITIVE: &str = "900000000000017005";
pub const STATED: &str = "900000000000010007";
pub const INFERRED: &str = "900000000000011006";

pub const US_ENGLISH_REFSET: &str = "900000000000509007";
pub const GB_ENGLISH_REFSET: &str = "900000000000508004";

pub const DEFAULT_MODULE: &str = "11010000107";
pub const DEFAULT_SCHEME: &str = "705114005";

/// Human-readable name of an attribute type, used in expressions and reports.
pub fn attribute_name(type_id: &str) -> &'static str {
    match type_id {
        IS_A => "Is a",
        COMPONENT => "Component",
        PROPERTY_TYPE => "Property type",
        TIME_ASPECT => "Time aspect",
        DIRECT_SITE => "Direct site",
        INHERES_IN => "Inheres in",
        SCALE_TYPE => "Scale type",
        TECHNIQUE => "Technique",
        CHARACTERIZES => "Characterizes",
        RELATIVE_TO => "Relative to",
        PROCESS_OUTPUT => "Process output",
        PROCESS_DURATION => "Process duration",
        TOWARDS => "Towards",
        PRECONDITION => "Precondition",
        _ => "Attribute",
    }
}
