//! Locus sequence comparison.
//!
//! Decides which of two sequence markers carries the more recent state, or
//! that they cannot be ordered (desync). Rules are evaluated in priority
//! order; the first rule that applies wins.

use crate::types::LocusSequence;
use std::fmt;

/// Outcome of comparing a working copy against an incoming sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    /// Same state.
    Equal,
    /// Current is newer.
    GreaterThan,
    /// Incoming is newer.
    LessThan,
    /// The two cannot be ordered.
    Desync,
}

/// Which rule produced a comparison. Only used for debug logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rule {
    SequenceOverlap,
    UnequalRanges,
    UniqueEntries,
    OutOfSync,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rule::SequenceOverlap => "sequence-overlap",
            Rule::UnequalRanges => "unequal-ranges",
            Rule::UniqueEntries => "unique-entries",
            Rule::OutOfSync => "out-of-sync",
        };
        f.write_str(name)
    }
}

/// What to do with an incoming snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaAction {
    UseIncoming,
    UseCurrent,
    Desync,
}

impl From<Comparison> for DeltaAction {
    fn from(comparison: Comparison) -> Self {
        match comparison {
            Comparison::Equal | Comparison::GreaterThan => DeltaAction::UseCurrent,
            Comparison::LessThan => DeltaAction::UseIncoming,
            Comparison::Desync => DeltaAction::Desync,
        }
    }
}

/// Derived view of a sequence used by the rules.
#[derive(Debug)]
struct Metadata<'a> {
    start: u64,
    end: u64,
    min: u64,
    max: u64,
    entries: &'a [u64],
    unique: Vec<u64>,
}

impl<'a> Metadata<'a> {
    fn of(sequence: &'a LocusSequence) -> Self {
        let first = sequence.entries.first().copied().unwrap_or(0);
        let last = sequence.entries.last().copied().unwrap_or(0);
        let start = sequence.range_start;
        let end = sequence.range_end;

        Self {
            start,
            end,
            // range start <= range end <= min(entries)
            min: if start != 0 { start } else { first },
            max: if last != 0 { last } else { end },
            entries: &sequence.entries,
            unique: Vec::new(),
        }
    }

    fn has_range(&self) -> bool {
        self.start != 0 || self.end != 0
    }

    fn total_range(&self) -> i128 {
        self.end as i128 - self.min as i128
    }
}

/// Entries of `base` absent from `other` and outside `other`'s range, ascending.
fn unique_entries(base: &Metadata<'_>, other: &Metadata<'_>) -> Vec<u64> {
    let mut unique: Vec<u64> = base
        .entries
        .iter()
        .copied()
        .filter(|seq| !other.entries.contains(seq))
        .filter(|seq| *seq < other.start || *seq > other.end)
        .collect();
    unique.sort_unstable();
    unique
}

fn check_sequence_overlap(current: &Metadata<'_>, incoming: &Metadata<'_>) -> Option<Comparison> {
    if current.min > incoming.max {
        Some(Comparison::GreaterThan)
    } else if current.max < incoming.min {
        Some(Comparison::LessThan)
    } else {
        None
    }
}

fn check_unequal_ranges(current: &Metadata<'_>, incoming: &Metadata<'_>) -> Option<Comparison> {
    if !current.unique.is_empty() || !incoming.unique.is_empty() {
        return None;
    }

    let current_range = current.total_range();
    let incoming_range = incoming.total_range();

    Some(if current_range > incoming_range {
        Comparison::GreaterThan
    } else if current_range < incoming_range {
        Comparison::LessThan
    } else {
        Comparison::Equal
    })
}

fn check_unique_entries(current: &Metadata<'_>, incoming: &Metadata<'_>) -> Option<Comparison> {
    match (current.unique.is_empty(), incoming.unique.is_empty()) {
        (false, true) => Some(Comparison::GreaterThan),
        (true, false) => Some(Comparison::LessThan),
        _ => None,
    }
}

fn check_out_of_sync(current: &Metadata<'_>, incoming: &Metadata<'_>) -> Comparison {
    let overlaps =
        |list: &[u64], min: u64, max: u64| list.iter().any(|seq| min < *seq && *seq < max);

    let neither_has_range = !current.has_range() && !incoming.has_range();
    let current_overlap = overlaps(&current.unique, incoming.min, incoming.max);
    let incoming_overlap = overlaps(&incoming.unique, current.min, current.max);

    if neither_has_range || current_overlap || incoming_overlap {
        return Comparison::Desync;
    }

    match (current.unique.first(), incoming.unique.first()) {
        (Some(current_min), Some(incoming_min)) if current_min > incoming_min => {
            Comparison::GreaterThan
        }
        _ => Comparison::LessThan,
    }
}

/// Compare two sequence markers.
pub fn compare_sequences(current: &LocusSequence, incoming: &LocusSequence) -> (Comparison, Rule) {
    let mut local = Metadata::of(current);
    let mut delta = Metadata::of(incoming);

    local.unique = unique_entries(&local, &delta);
    delta.unique = unique_entries(&delta, &local);

    if let Some(result) = check_sequence_overlap(&local, &delta) {
        return (result, Rule::SequenceOverlap);
    }
    if let Some(result) = check_unequal_ranges(&local, &delta) {
        return (result, Rule::UnequalRanges);
    }
    if let Some(result) = check_unique_entries(&local, &delta) {
        return (result, Rule::UniqueEntries);
    }
    (check_out_of_sync(&local, &delta), Rule::OutOfSync)
}

/// Decide what to do with an incoming snapshot given the working copy's
/// sequence. `base` is the incoming delta's base sequence, if any.
pub fn compare(
    current: &LocusSequence,
    incoming: &LocusSequence,
    base: Option<&LocusSequence>,
) -> DeltaAction {
    if current.is_empty() || incoming.is_empty() {
        return DeltaAction::UseIncoming;
    }

    let (comparison, rule) = compare_sequences(current, incoming);
    tracing::debug!(?comparison, %rule, "locus sequence comparison");

    let Some(base) = base else {
        return comparison.into();
    };

    if comparison != Comparison::LessThan {
        return comparison.into();
    }

    // Incoming is newer; it only extends the working copy if its base is
    // not ahead of what we hold.
    match compare_sequences(current, base).0 {
        Comparison::GreaterThan | Comparison::Equal => DeltaAction::UseIncoming,
        _ => DeltaAction::Desync,
    }
}
