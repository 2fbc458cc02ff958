//! Snapshot sequencing.
//!
//! Every inbound snapshot is classified against the working copy (the last
//! accepted full state with deltas merged in):
//! - `Apply`: the working copy advanced and must be reconciled
//! - `AlreadyCurrent`: stale or duplicate re-delivery
//! - `Desync`: a gap was detected; the sequencer pauses until a fresh full
//!   snapshot is fetched out-of-band and `resume()` is called
//!
//! The sequencer never fetches anything itself. It only gates correctness.

mod comparison;
mod manager;
mod merge;

pub use comparison::{compare, compare_sequences, Comparison, DeltaAction, Rule};
pub use manager::{Action, ResyncRequest, ResyncState, Sequencer};
pub use merge::{apply_delta, merge_participants};
