//! Logical timestamps and the total order used to pick a winning value

use std::cmp::Ordering;

/// A Lamport-style version marker attached to every stored value
///
/// Timestamps are ordered by their sequence number first and by the owner id second, comparing
/// the owner ids byte-wise. As long as every client uses a unique owner id, no two timestamps
/// issued by different writes compare as equal.
///
/// A sequence number of `0` is reserved for "no value" and is never issued by a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Timestamp {
    sequence: u64,
    owner_id: String,
}

impl Timestamp {
    pub fn new<O>(sequence: u64, owner_id: O) -> Self
    where
        O: Into<String>,
    {
        Self {
            sequence,
            owner_id: owner_id.into(),
        }
    }

    /// The timestamp a client issues for a new write, after observing `latest` as the highest
    /// timestamp currently stored
    ///
    /// ```rust
    /// # use abd::timestamp::Timestamp;
    /// let first = Timestamp::next_after(None, "A");
    /// assert_eq!(1, first.sequence());
    ///
    /// let second = Timestamp::next_after(Some(&Timestamp::new(4, "B")), "A");
    /// assert_eq!(Timestamp::new(5, "A"), second);
    /// ```
    pub fn next_after<O>(latest: Option<&Timestamp>, owner_id: O) -> Self
    where
        O: Into<String>,
    {
        let sequence = latest.map(|ts| ts.sequence).unwrap_or(0);

        Self {
            sequence: sequence.saturating_add(1),
            owner_id: owner_id.into(),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Whether this carries the reserved sequence number and therefore stands for "no value"
    pub fn is_absent(&self) -> bool {
        self.sequence == 0
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence
            .cmp(&other.sequence)
            .then_with(|| self.owner_id.as_bytes().cmp(other.owner_id.as_bytes()))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.sequence, self.owner_id)
    }
}

/// Finds the largest of the given timestamps
///
/// Missing entries and timestamps with the reserved sequence number are skipped, so the result is
/// [`None`] only if none of the inputs carried a real timestamp.
///
/// ```rust
/// # use abd::timestamp::{find_largest, Timestamp};
/// let a = Timestamp::new(5, "A");
/// let b = Timestamp::new(5, "B");
/// assert_eq!(Some(&b), find_largest([Some(&a), None, Some(&b)]));
/// ```
pub fn find_largest<'t, I>(timestamps: I) -> Option<&'t Timestamp>
where
    I: IntoIterator<Item = Option<&'t Timestamp>>,
{
    timestamps
        .into_iter()
        .flatten()
        .filter(|ts| !ts.is_absent())
        .max()
}
