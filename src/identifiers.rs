//! Minting of stable identifiers for newly created components.

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Concept,
    Description,
    Relationship,
}

impl Partition {
    fn digit(&self) -> char {
        match self {
            Partition::Concept => '0',
            Partition::Description => '1',
            Partition::Relationship => '2',
        }
    }
}

/// Smallest item identifier minted, keeping short-format ids at least six digits long.
const MIN_ITEM: u64 = 1000;

/// Sequential SCTID generator; item identifiers are shared across partitions.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    namespace: Option<u32>,
    next_item: u64,
}

impl IdGenerator {
    pub fn new(namespace: Option<u32>, first_item: u64) -> Self {
        Self {
            namespace,
            next_item: first_item.max(MIN_ITEM),
        }
    }

    /// Continues numbering after the highest item already used in this namespace.
    pub fn seeded_after<'a>(namespace: Option<u32>, existing: impl IntoIterator<Item = &'a str>) -> Self {
        let max_item = existing
            .into_iter()
            .filter_map(|id| item_of(id, namespace))
            .max()
            .unwrap_or(0);
        Self::new(namespace, max_item + 1)
    }

    pub fn mint(&mut self, partition: Partition) -> String {
        let item = self.next_item;
        self.next_item += 1;
        let body = match self.namespace {
            Some(ns) => format!("{}{:07}1{}", item, ns, partition.digit()),
            None => format!("{}0{}", item, partition.digit()),
        };
        let check = verhoeff_check_digit(&body);
        format!("{}{}", body, check)
    }

    /// Identifier for refset members and axioms.
    pub fn member_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

fn item_of(id: &str, namespace: Option<u32>) -> Option<u64> {
    if !is_valid_sctid(id) {
        return None;
    }
    let len = id.len();
    let flag = id.as_bytes()[len - 3];
    match namespace {
        Some(ns) => {
            if flag != b'1' || len < 11 {
                return None;
            }
            let ns_digits: u32 = id[len - 10..len - 3].parse().ok()?;
            if ns_digits != ns {
                return None;
            }
            id[..len - 10].parse().ok()
        }
        None => {
            if flag != b'0' {
                return None;
            }
            id[..len - 3].parse().ok()
        }
    }
}

const VERHOEFF_D: [[u8; 10]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
    [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
    [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
    [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
    [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
    [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
    [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
    [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];

const VERHOEFF_P: [[u8; 10]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
    [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
    [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
    [9, 4, 5, 3, 1, 2, 7, 6, 8, 0],
    [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
    [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
    [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
];

const VERHOEFF_INV: [u8; 10] = [0, 4, 3, 2, 1, 5, 6, 7, 8, 9];

pub fn verhoeff_check_digit(digits: &str) -> char {
    let mut c = 0usize;
    for (i, ch) in digits.bytes().rev().enumerate() {
        let d = (ch - b'0') as usize;
        c = VERHOEFF_D[c][VERHOEFF_P[(i + 1) % 8][d] as usize] as usize;
    }
    (b'0' + VERHOEFF_INV[c]) as char
}

pub fn is_valid_sctid(id: &str) -> bool {
    if id.len() < 6 || id.len() > 18 || !id.bytes().all(|b| b.is_ascii_digit()) || id.starts_with('0') {
        return false;
    }
    let (body, check) = id.split_at(id.len() - 1);
    check.starts_with(verhoeff_check_digit(body))
}
