// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Construction-time configuration for a [`crate::node::Node`].

use std::sync::Arc;

use crate::error::NodeErrorValue;

/// A node's optional message transform. Returning `Ok(None)` filters the
/// message out silently; `Err` transitions the node to error, carrying
/// whatever error value the operator produced.
pub type Operator<T> = Arc<dyn Fn(T) -> Result<Option<T>, NodeErrorValue> + Send + Sync>;

/// Builder for a new [`crate::node::Node`]'s fixed construction-time
/// parameters, following the same parse-with-defaults shape used
/// elsewhere in this crate's ancestry for small config structs: required
/// fields are positional, optional ones are builder methods, and
/// `build()` (here just `Self`, there being no fallible parsing step)
/// produces the final value.
#[derive(Clone)]
pub struct NodeConfig<T> {
    pub(crate) description: String,
    pub(crate) operator: Option<Operator<T>>,
    pub(crate) grounded: bool,
    pub(crate) permanent: bool,
}

impl<T> NodeConfig<T> {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self { description: description.into(), operator: None, grounded: false, permanent: false }
    }

    #[must_use]
    pub fn operator(mut self, operator: impl Fn(T) -> Result<Option<T>, NodeErrorValue> + Send + Sync + 'static) -> Self {
        self.operator = Some(Arc::new(operator));
        self
    }

    /// Messages arriving with zero downstream edges are discarded rather
    /// than buffered.
    #[must_use]
    pub fn grounded(mut self, grounded: bool) -> Self {
        self.grounded = grounded;
        self
    }

    /// `close`/`error` without `force` become no-ops.
    #[must_use]
    pub fn permanent(mut self, permanent: bool) -> Self {
        self.permanent = permanent;
        self
    }
}

impl<T> Default for NodeConfig<T> {
    fn default() -> Self {
        Self::new("node")
    }
}

#[cfg(test)]
mod tests {
    use super::NodeConfig;

    #[test]
    fn defaults_are_open_and_non_permanent() {
        let config: NodeConfig<i32> = NodeConfig::new("n");
        assert!(!config.grounded);
        assert!(!config.permanent);
        assert!(config.operator.is_none());
    }

    #[test]
    fn builder_methods_set_flags() {
        let config: NodeConfig<i32> = NodeConfig::new("n").grounded(true).permanent(true);
        assert!(config.grounded);
        assert!(config.permanent);
    }
}
