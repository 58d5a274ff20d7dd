//! US state and territory codes used to tag leaf resources
//!
//! Manifests annotate each output file with the jurisdictions it covers. The
//! table below is the only place state ids are assigned: the `states` table is
//! seeded from it and the crawler maps annotations through it, so ids can never
//! diverge between the two.

use std::fmt;

/// The 57 two-letter codes. A code's id is its position in this table plus one.
pub const JURISDICTIONS: [&str; 57] = [
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", // 1-10
    "GA", "HI", "ID", "IL", "IN", "IA", "KS", "KY", "LA", "ME", // 11-20
    "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", // 21-30
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", // 31-40
    "SC", "SD", "TN", "TX", "UT", "VT", "VA", "WA", "WV", "WI", // 41-50
    "WY", "AS", "GU", "MP", "PR", "VI", "UM", // 51-57
];

/// A state or territory drawn from [`JURISDICTIONS`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Jurisdiction(u8);

impl Jurisdiction {
    /// Looks up a code, ignoring case and surrounding whitespace
    ///
    /// # Examples
    ///
    /// ```
    /// use availability_crawler::state::Jurisdiction;
    ///
    /// let ma = Jurisdiction::from_code(" ma ").unwrap();
    /// assert_eq!(ma.code(), "MA");
    /// assert_eq!(ma.id(), 22);
    /// assert!(Jurisdiction::from_code("ZZ").is_none());
    /// ```
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        JURISDICTIONS
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(code))
            .map(|idx| Self(idx as u8 + 1))
    }

    /// Looks up a jurisdiction by its stable numeric id
    pub fn from_id(id: i64) -> Option<Self> {
        if (1..=JURISDICTIONS.len() as i64).contains(&id) {
            Some(Self(id as u8))
        } else {
            None
        }
    }

    /// The stable numeric id stored in the `states` table
    pub fn id(self) -> u8 {
        self.0
    }

    /// The upper-case two-letter code
    pub fn code(self) -> &'static str {
        JURISDICTIONS[self.0 as usize - 1]
    }

    /// Iterates the full table in id order
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=JURISDICTIONS.len() as u8).map(Self)
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Splits raw annotations into known jurisdictions and unmatched codes
///
/// Duplicates are collapsed; order of first appearance is kept.
pub fn partition_codes<S: AsRef<str>>(codes: &[S]) -> (Vec<Jurisdiction>, Vec<String>) {
    let mut matched = Vec::new();
    let mut unmatched = Vec::new();

    for raw in codes {
        match Jurisdiction::from_code(raw.as_ref()) {
            Some(j) if !matched.contains(&j) => matched.push(j),
            Some(_) => {}
            None => unmatched.push(raw.as_ref().to_string()),
        }
    }

    (matched, unmatched)
}
