// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Structural checks shared by the block decoders.

use enos_hcl::{Attribute, Block, Body, Diagnostic, Diagnostics, Range};
use once_cell::sync::Lazy;
use regex::Regex;

static HCL_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\p{L}_][\p{L}\p{N}_-]*$").expect("identifier regex is valid")
});

static ENOS_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+$").expect("identifier regex is valid"));

/// Attributes Terraform reserves on module blocks.
pub(crate) const TERRAFORM_META_ATTRS: [&str; 3] = ["count", "for_each", "depends_on"];

/// Verifies that `label` is both a valid HCL identifier and a valid enos identifier.
pub(crate) fn verify_valid_identifier(label: &str, range: &Range) -> Diagnostics {
    let mut diags = Diagnostics::new();

    if !HCL_IDENTIFIER.is_match(label) {
        diags.push(
            Diagnostic::error("label is invalid", "label is not a valid HCL identifier")
                .with_subject(range),
        );
    }

    if !ENOS_IDENTIFIER.is_match(label) {
        diags.push(
            Diagnostic::error("label is invalid", "label is not a valid enos identifier")
                .with_subject(range),
        );
    }

    diags
}

/// Verifies that a block has at least one label and that every label is a valid identifier.
pub(crate) fn verify_block_labels_are_valid_identifiers(block: &Block) -> Diagnostics {
    if block.labels.is_empty() {
        return Diagnostic::error(
            "invalid block identifier",
            "block can only have a single name label",
        )
        .with_subject(&block.type_range)
        .with_context(&Range::between(&block.type_range, &block.def_range))
        .into();
    }

    let mut diags = Diagnostics::new();
    for (label, range) in block.labels.iter().zip(&block.label_ranges) {
        diags.extend(verify_valid_identifier(label, range));
    }
    diags
}

/// Verifies that a block has exactly `n` labels.
pub(crate) fn verify_block_has_n_labels(block: &Block, n: usize) -> Diagnostics {
    if block.labels.len() == n {
        return Diagnostics::new();
    }
    Diagnostic::error(
        "invalid block",
        format!("block has {} labels but required {}", block.labels.len(), n),
    )
    .with_subject(&block.type_range)
    .with_context(&block.def_range)
    .into()
}

/// Reports every block in a body that should only hold attributes.
pub(crate) fn verify_no_blocks(body: &Body) -> Diagnostics {
    verify_body_only_has_blocks(body, &[])
}

/// Reports every block in a body whose type is not in `allowed`.
pub(crate) fn verify_body_only_has_blocks(body: &Body, allowed: &[&str]) -> Diagnostics {
    let mut diags = Diagnostics::new();
    for block in &body.blocks {
        if allowed.contains(&block.type_name.as_str()) {
            continue;
        }
        let detail = if allowed.is_empty() {
            String::new()
        } else {
            format!(
                "block type {} is not allowed, must be one of {}",
                block.type_name,
                allowed.join(", ")
            )
        };
        diags.push(
            Diagnostic::error("unexpected block", detail)
                .with_subject(&block.type_range)
                .with_context(&Range::between(&block.type_range, &block.range)),
        );
    }
    diags
}

/// Splits out the Terraform meta-arguments, reporting each as an error.
pub(crate) fn filter_terraform_meta_attrs<'a>(
    attrs: impl IntoIterator<Item = &'a Attribute>,
) -> (Vec<&'a Attribute>, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut out = Vec::new();

    for attr in attrs {
        if TERRAFORM_META_ATTRS.contains(&attr.name.as_str()) {
            diags.push(
                Diagnostic::error(
                    "invalid attribute",
                    format!("Terraform meta-arguments {:?} are not valid", attr.name),
                )
                .with_subject(&attr.name_range)
                .with_context(&Range::between(&attr.name_range, &attr.range)),
            );
            continue;
        }
        out.push(attr);
    }

    (out, diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use enos_hcl::parse;

    #[test]
    fn test_identifiers() {
        let r = Range::default();
        assert!(verify_valid_identifier("good_name1", &r).is_empty());
        assert!(verify_valid_identifier("has-dash", &r).has_errors());
        assert!(verify_valid_identifier("1abc", &r).has_errors());
        assert!(verify_valid_identifier("has space", &r).has_errors());
    }

    #[test]
    fn test_meta_attrs_filtered() {
        let (file, diags) = parse("a = 1\ncount = 2\nfor_each = {}\n", "test.hcl");
        assert!(!diags.has_errors());
        let (kept, diags) = filter_terraform_meta_attrs(&file.body.attributes);
        assert_eq!(kept.len(), 1);
        assert_eq!(diags.errors().count(), 2);
    }

    #[test]
    fn test_block_label_checks() {
        let (file, diags) = parse("thing \"a\" \"b-c\" {}\nother {}\n", "test.hcl");
        assert!(!diags.has_errors());
        let thing = &file.body.blocks[0];
        let other = &file.body.blocks[1];

        assert!(verify_block_labels_are_valid_identifiers(thing).has_errors());
        assert!(verify_block_labels_are_valid_identifiers(other).has_errors());
        assert!(verify_block_has_n_labels(thing, 2).is_empty());
        assert!(verify_block_has_n_labels(other, 1).has_errors());
        assert_eq!(verify_body_only_has_blocks(&file.body, &["thing"]).len(), 1);
    }
}
