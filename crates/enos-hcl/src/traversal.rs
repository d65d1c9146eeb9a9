// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Static traversals such as `step.create_vpc.id` or `var.regions[0]`.

use crate::diagnostics::Range;
use crate::value::{Value, format_number};
use std::fmt;

/// One step of a traversal.
#[derive(Debug, Clone, PartialEq)]
pub enum Traverser {
    /// The root variable name.
    Root(String, Range),
    /// `.name`
    Attr(String, Range),
    /// `[key]` with a literal key.
    Index(Value, Range),
}

impl Traverser {
    /// The source range of this step.
    pub fn range(&self) -> &Range {
        match self {
            Traverser::Root(_, r) | Traverser::Attr(_, r) | Traverser::Index(_, r) => r,
        }
    }
}

/// A sequence of traversal steps. Absolute traversals start with [`Traverser::Root`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Traversal(pub Vec<Traverser>);

impl Traversal {
    /// Returns true if the traversal starts with a root name.
    pub fn is_absolute(&self) -> bool {
        matches!(self.0.first(), Some(Traverser::Root(..)))
    }

    /// The root variable name of an absolute traversal.
    pub fn root_name(&self) -> Option<&str> {
        match self.0.first() {
            Some(Traverser::Root(name, _)) => Some(name),
            _ => None,
        }
    }

    /// The range covering every step.
    pub fn source_range(&self) -> Range {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) => Range::between(first.range(), last.range()),
            _ => Range::default(),
        }
    }

    /// Returns a copy of the traversal with the root renamed.
    pub fn with_root(&self, name: &str) -> Traversal {
        let mut steps = self.0.clone();
        if let Some(Traverser::Root(root, _)) = steps.first_mut() {
            *root = name.to_string();
        }
        Traversal(steps)
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no steps.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The steps.
    pub fn steps(&self) -> &[Traverser] {
        &self.0
    }
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            match step {
                Traverser::Root(name, _) => f.write_str(name)?,
                Traverser::Attr(name, _) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                Traverser::Index(Value::Number(n), _) => write!(f, "[{}]", format_number(*n))?,
                Traverser::Index(Value::String(s), _) => write!(f, "[{:?}]", s)?,
                Traverser::Index(other, _) => write!(f, "[{}]", other)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traversal_display_and_root() {
        let r = Range::default();
        let t = Traversal(vec![
            Traverser::Root("step".into(), r.clone()),
            Traverser::Attr("vpc".into(), r.clone()),
            Traverser::Attr("ids".into(), r.clone()),
            Traverser::Index(Value::number(0.0), r.clone()),
        ]);
        assert_eq!(t.to_string(), "step.vpc.ids[0]");
        assert_eq!(t.root_name(), Some("step"));
        assert_eq!(t.with_root("module").to_string(), "module.vpc.ids[0]");
    }
}
