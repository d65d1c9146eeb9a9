// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Decoding of `matrix` blocks.
//!
//! ```hcl
//! matrix {
//!   backend = ["raft", "consul"]
//!   arch    = ["amd64", "arm64"]
//!
//!   include {
//!     backend = ["inmem"]
//!     arch    = ["amd64"]
//!   }
//!
//!   exclude {
//!     backend = ["consul"]
//!     arch    = ["arm64"]
//!   }
//! }
//! ```
//!
//! Each attribute is one variant axis. Axes are sorted by name and combined
//! into their Cartesian product. `include` and `exclude` blocks are applied
//! in the order they are written.

use enos_hcl::{
    Attribute, Block, BlockHeaderSchema, BodySchema, Diagnostic, Diagnostics, EvalContext, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::matrix::{Element, Exclude, ExcludeMode, Matrix, Vector};
use crate::scenario_filter::ScenarioFilter;
use crate::verify::verify_body_only_has_blocks;

pub(crate) const BLOCK_TYPE_MATRIX: &str = "matrix";
const BLOCK_TYPE_INCLUDE: &str = "include";
const BLOCK_TYPE_EXCLUDE: &str = "exclude";

static MATRIX_SCHEMA: BodySchema = BodySchema {
    attributes: &[],
    blocks: &[BlockHeaderSchema::new(BLOCK_TYPE_MATRIX, &[])],
};

static INCLUDE_EXCLUDE_SCHEMA: BodySchema = BodySchema {
    attributes: &[],
    blocks: &[
        BlockHeaderSchema::new(BLOCK_TYPE_INCLUDE, &[]),
        BlockHeaderSchema::new(BLOCK_TYPE_EXCLUDE, &[]),
    ],
};

/// A decoded matrix block at each stage of its construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatrixBlock {
    /// One vector per variant axis, sorted by axis name.
    pub original: Matrix,
    /// The product of each `include` block, in order.
    pub include_products: Vec<Matrix>,
    /// Every exclude generated from `exclude` blocks, in order.
    pub excludes: Vec<Exclude>,
    /// The final, unique and sorted product.
    pub final_product: Matrix,
}

impl MatrixBlock {
    /// The final product.
    pub fn matrix(&self) -> &Matrix {
        &self.final_product
    }

    /// Narrows the final product with a filter and re-sorts it.
    pub fn filter(&mut self, filter: &ScenarioFilter) -> &Matrix {
        self.final_product = self.final_product.filter(filter);
        self.final_product.sort();
        &self.final_product
    }
}

/// Decodes the single optional `matrix` block inside `block`.
///
/// Returns `None` when the block has no matrix. Attribute values may refer to
/// earlier attributes as `matrix.<name>`.
pub fn decode_matrix(ctx: &Arc<EvalContext>, block: &Block) -> (Option<MatrixBlock>, Diagnostics) {
    let mut diags = Diagnostics::new();

    let (content, _, more) = block.body.partial_content(&MATRIX_SCHEMA);
    let failed = more.has_errors();
    diags.extend(more);
    if failed {
        return (None, diags);
    }

    let matrix_blocks = content.blocks_of_type(BLOCK_TYPE_MATRIX);
    let matrix_block = match matrix_blocks.as_slice() {
        [] => return (None, diags),
        [one] => *one,
        many => {
            diags.push(
                Diagnostic::error(
                    "scenario has more than one matrix block defined",
                    format!("a single matrix block can be set, found {}", many.len()),
                )
                .with_subject(&block.type_range)
                .with_context(&block.def_range),
            );
            return (None, diags);
        }
    };

    // A private child so `matrix` never leaks into the caller's context.
    let mut eval_ctx = EvalContext::child_of(Arc::clone(ctx));

    let (original, more) = decode_matrix_attributes(&mut eval_ctx, &matrix_block.body.attributes, true);
    let failed = more.has_errors();
    diags.extend(more);
    if failed {
        return (None, diags);
    }

    let mut res = MatrixBlock {
        final_product: original.cartesian_product().unique_values(),
        original,
        ..MatrixBlock::default()
    };

    let (sub, remain, more) = matrix_block.body.partial_content(&INCLUDE_EXCLUDE_SCHEMA);
    let failed = more.has_errors();
    diags.extend(more);
    if failed {
        return (None, diags);
    }
    diags.extend(verify_body_only_has_blocks(
        &remain,
        &[BLOCK_TYPE_INCLUDE, BLOCK_TYPE_EXCLUDE],
    ));

    for sub_block in sub.blocks {
        let (attrs, more) = sub_block.body.just_attributes();
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            continue;
        }
        let attrs: Vec<Attribute> = attrs.into_iter().cloned().collect();

        let (sub_matrix, more) = decode_matrix_attributes(&mut eval_ctx, &attrs, false);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            continue;
        }
        let product = sub_matrix.cartesian_product().unique_values();

        if sub_block.type_name == BLOCK_TYPE_INCLUDE {
            for vec in product.vectors() {
                res.final_product.add_vector_sorted(vec);
            }
            res.include_products.push(product);
        } else {
            let excludes: Vec<Exclude> = product
                .into_vectors()
                .into_iter()
                .map(|v| Exclude::new(ExcludeMode::Contains, v))
                .collect();
            res.final_product = res.final_product.exclude(&excludes);
            res.excludes.extend(excludes);
        }
    }

    // Includes may have introduced duplicates.
    res.final_product = res.final_product.unique_values();
    res.final_product.sort();

    (Some(res), diags)
}

/// Decodes attributes as variant axes, sorted by name. When `bind` is set,
/// each decoded attribute is made visible to later ones as `matrix.<name>`.
fn decode_matrix_attributes(
    ctx: &mut EvalContext,
    attrs: &[Attribute],
    bind: bool,
) -> (Matrix, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut variants = BTreeMap::new();
    let mut vecs = BTreeMap::new();

    for attr in attrs {
        let (val, vec, more) = decode_matrix_attribute(ctx, attr);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            continue;
        }
        vecs.insert(attr.name.clone(), vec);

        if bind {
            variants.insert(attr.name.clone(), val);
            ctx.set_variable("matrix", Value::object(variants.clone()));
        }
    }

    (Matrix::from_vectors(vecs.into_values()), diags)
}

fn decode_matrix_attribute(ctx: &EvalContext, attr: &Attribute) -> (Value, Vector, Diagnostics) {
    let (val, mut diags) = attr.expr.value(ctx);
    if diags.has_errors() {
        return (val, Vector::new(), diags);
    }

    let invalid = |summary: &str, detail: String| {
        Diagnostic::error(summary, detail)
            .with_subject(&attr.name_range)
            .with_context(&attr.range)
    };

    let Some(elems) = val.as_value_slice() else {
        diags.push(invalid(
            "matrix attribute value must be a list of strings",
            format!(
                "expected value for {} to be a list of strings, found {}",
                attr.name,
                val.type_name()
            ),
        ));
        return (val, Vector::new(), diags);
    };

    if elems.is_empty() {
        diags.push(invalid("matrix attribute values cannot be empty lists", String::new()));
        return (val, Vector::new(), diags);
    }

    let mut vec = Vector::new();
    let mut bad = None;
    for elem in elems {
        match elem.as_str() {
            Some(s) => vec.push(Element::new(&attr.name, s)),
            None => {
                bad = Some(elem.type_name());
                break;
            }
        }
    }

    if let Some(ty) = bad {
        diags.push(invalid(
            "matrix attribute value must be a list of strings",
            format!("found element with type {}", ty),
        ));
        return (val, Vector::new(), diags);
    }

    (val, vec, diags)
}
