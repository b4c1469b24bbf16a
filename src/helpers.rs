// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Small predicate helpers over [`crate::mode::Mode`], [`crate::edge::Outcome`],
//! and [`crate::receive_result::ReceiveValue`].
//!
//! These exist so callers don't have to spell out a `matches!` every time
//! they only care about one of the terminal states.

use crate::edge::Outcome;
use crate::error::NodeErrorValue;
use crate::mode::Mode;
use crate::receive_result::ReceiveValue;

#[must_use]
pub fn is_closed(mode: Mode) -> bool {
    matches!(mode, Mode::Closed)
}

#[must_use]
pub fn is_drained(mode: Mode) -> bool {
    matches!(mode, Mode::Drained)
}

#[must_use]
pub fn is_split(mode: Mode) -> bool {
    matches!(mode, Mode::Split)
}

#[must_use]
pub fn is_consumed(mode: Mode) -> bool {
    matches!(mode, Mode::Consumed)
}

#[must_use]
pub fn is_error(mode: Mode) -> bool {
    matches!(mode, Mode::Error)
}

/// The error an [`Outcome::Errored`] or `Errored`-flavored `ReceiveValue`
/// carries, if any. Useful for log sites that want to print a reason
/// without matching on the full enum.
#[must_use]
pub fn error_value<T>(value: &ReceiveValue<T>) -> Option<&NodeErrorValue> {
    match value {
        ReceiveValue::Errored(err) => Some(err),
        ReceiveValue::Value(_) | ReceiveValue::Drained => None,
    }
}

#[must_use]
pub fn is_closed_outcome<T>(outcome: &Outcome<T>) -> bool {
    matches!(outcome, Outcome::Closed)
}

#[must_use]
pub fn is_error_outcome<T>(outcome: &Outcome<T>) -> bool {
    matches!(outcome, Outcome::Errored)
}

#[must_use]
pub fn is_filtered_outcome<T>(outcome: &Outcome<T>) -> bool {
    matches!(outcome, Outcome::Filtered)
}

#[must_use]
pub fn is_drained_value<T>(value: &ReceiveValue<T>) -> bool {
    matches!(value, ReceiveValue::Drained)
}

#[must_use]
pub fn is_errored_value<T>(value: &ReceiveValue<T>) -> bool {
    matches!(value, ReceiveValue::Errored(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_predicates_match_exactly_one_variant() {
        assert!(is_closed(Mode::Closed));
        assert!(!is_closed(Mode::Open));
        assert!(is_drained(Mode::Drained));
        assert!(is_split(Mode::Split));
        assert!(is_consumed(Mode::Consumed));
        assert!(is_error(Mode::Error));
    }

    #[test]
    fn error_value_extracts_only_from_errored() {
        let value: ReceiveValue<i32> = ReceiveValue::Value(1);
        assert!(error_value(&value).is_none());
        let drained: ReceiveValue<i32> = ReceiveValue::Drained;
        assert!(error_value(&drained).is_none());
        let errored: ReceiveValue<i32> = ReceiveValue::Errored(crate::error::PlainError::boxed("bad"));
        assert!(error_value(&errored).is_some());
    }

    #[test]
    fn receive_value_predicates() {
        let drained: ReceiveValue<i32> = ReceiveValue::Drained;
        let errored: ReceiveValue<i32> = ReceiveValue::Errored(crate::error::PlainError::boxed("bad"));
        assert!(is_drained_value(&drained));
        assert!(!is_errored_value(&drained));
        assert!(is_errored_value(&errored));
        assert!(!is_drained_value(&errored));
    }

    #[test]
    fn outcome_predicates() {
        let closed: Outcome<i32> = Outcome::Closed;
        let errored: Outcome<i32> = Outcome::Errored;
        let filtered: Outcome<i32> = Outcome::Filtered;
        assert!(is_closed_outcome(&closed));
        assert!(is_error_outcome(&errored));
        assert!(is_filtered_outcome(&filtered));
        assert!(!is_closed_outcome(&errored));
    }
}
