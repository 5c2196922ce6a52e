//! Ordered strategy chains.
//!
//! Every extractor in this crate is a fixed-priority list of independent
//! heuristics run against the same document. The chain is explicit so each
//! heuristic stays testable on its own, and so the trace is one line per
//! stage naming the strategy that fired rather than narration scattered
//! through branches.

use log::debug;

/// A single named extraction heuristic.
pub struct Strategy<T> {
    /// Short name used in the extraction trace
    pub name: &'static str,
    pub run: fn(&str) -> Option<T>,
}

/// Run `strategies` against `input` left to right and return the first hit.
///
/// Emits one `debug!` line per stage: the winning strategy name, or a miss
/// when the whole chain comes up empty.
pub fn first_match<T>(stage: &str, input: &str, strategies: &[Strategy<T>]) -> Option<T> {
    for strategy in strategies {
        if let Some(value) = (strategy.run)(input) {
            debug!("{}: matched via {}", stage, strategy.name);
            return Some(value);
        }
    }
    debug!("{}: no strategy matched", stage);
    None
}
