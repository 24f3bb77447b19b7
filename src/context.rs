//! Per-process environment context.
//!
//! The reference environment kept one-time initialization behind hidden
//! static flags; here setup is an explicit [`ForestContext`] value created
//! once per process group and passed to the operations that need it.
//! Teardown is tied to the context's lifetime.

use once_cell::sync::OnceCell;

use crate::error::ForestError;

static ENV_INIT: OnceCell<()> = OnceCell::new();

/// Explicit context for a forest-owning process.
///
/// Validates the single-tree invariant at construction: every per-call
/// `which_tree` check of the reference collapses into this one precondition.
#[derive(Debug, Clone)]
pub struct ForestContext {
    num_trees: usize,
}

impl ForestContext {
    /// Create a context managing `num_trees` root trees.
    ///
    /// Only `num_trees == 1` is supported; anything else is a caller
    /// contract breach, not a runtime condition.
    pub fn new(num_trees: usize) -> Result<Self, ForestError> {
        if num_trees != 1 {
            return Err(ForestError::MultipleTrees(num_trees));
        }
        ENV_INIT.get_or_init(|| {
            log::debug!("forest-amr environment initialized");
        });
        Ok(Self { num_trees })
    }

    /// Number of root trees managed by this context (always 1).
    pub fn num_trees(&self) -> usize {
        self.num_trees
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_tree_only() {
        assert!(ForestContext::new(1).is_ok());
        assert_eq!(
            ForestContext::new(4).unwrap_err(),
            ForestError::MultipleTrees(4)
        );
    }
}
