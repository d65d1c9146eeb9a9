// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Schema-driven body decoding.
//!
//! A [`BodySchema`] names the attributes and block types a body may contain.
//! Extracting content against a schema reports unsupported, missing and
//! duplicated items the same way regardless of which block is being decoded.

use crate::ast::{Attribute, Block, Body};
use crate::diagnostics::{Diagnostic, Diagnostics, Range};
use std::collections::BTreeMap;

/// An attribute a body may define.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSchema {
    /// Attribute name.
    pub name: &'static str,
    /// True if the attribute must be present.
    pub required: bool,
}

impl AttributeSchema {
    /// An optional attribute.
    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
        }
    }

    /// A required attribute.
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
        }
    }
}

/// A block type a body may contain.
#[derive(Debug, Clone, Copy)]
pub struct BlockHeaderSchema {
    /// Block type name.
    pub type_name: &'static str,
    /// Names of the labels the block must have, used in error messages.
    pub label_names: &'static [&'static str],
}

impl BlockHeaderSchema {
    /// A block type with the given labels.
    pub const fn new(type_name: &'static str, label_names: &'static [&'static str]) -> Self {
        Self {
            type_name,
            label_names,
        }
    }
}

/// The expected shape of a body.
#[derive(Debug, Clone, Copy)]
pub struct BodySchema {
    /// Permitted attributes.
    pub attributes: &'static [AttributeSchema],
    /// Permitted block types.
    pub blocks: &'static [BlockHeaderSchema],
}

/// Content extracted from a body with a schema.
#[derive(Debug, Clone)]
pub struct BodyContent<'a> {
    /// Attributes by name.
    pub attributes: BTreeMap<String, &'a Attribute>,
    /// Blocks in source order.
    pub blocks: Vec<&'a Block>,
    /// Where to report missing items.
    pub missing_item_range: Range,
}

impl<'a> BodyContent<'a> {
    /// Looks up an extracted attribute.
    pub fn attribute(&self, name: &str) -> Option<&'a Attribute> {
        self.attributes.get(name).copied()
    }

    /// Blocks of the given type, in source order.
    pub fn blocks_of_type(&self, type_name: &str) -> Vec<&'a Block> {
        self.blocks
            .iter()
            .copied()
            .filter(|b| b.type_name == type_name)
            .collect()
    }
}

impl Body {
    /// Extracts content, reporting anything the schema does not allow.
    pub fn content(&self, schema: &BodySchema) -> (BodyContent<'_>, Diagnostics) {
        let (content, _, mut diags) = self.extract(schema, false);
        diags.extend(self.unexpected_items(schema));
        (content, diags)
    }

    /// Extracts content, returning a body holding everything the schema did not name.
    pub fn partial_content(&self, schema: &BodySchema) -> (BodyContent<'_>, Body, Diagnostics) {
        let (content, remain, diags) = self.extract(schema, true);
        (content, remain, diags)
    }

    /// Returns every attribute in source order, reporting any blocks as errors.
    pub fn just_attributes(&self) -> (Vec<&Attribute>, Diagnostics) {
        let mut diags = Diagnostics::new();
        for block in &self.blocks {
            diags.push(
                Diagnostic::error(
                    format!("Unexpected {:?} block", block.type_name),
                    "Blocks are not allowed here.",
                )
                .with_subject(&block.type_range),
            );
        }
        (self.attributes.iter().collect(), diags)
    }

    fn extract(&self, schema: &BodySchema, want_remain: bool) -> (BodyContent<'_>, Body, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut attributes = BTreeMap::new();
        let mut remain = Body {
            range: self.range.clone(),
            end_range: self.end_range.clone(),
            ..Body::default()
        };

        for attr in &self.attributes {
            if schema.attributes.iter().any(|s| s.name == attr.name) {
                attributes.insert(attr.name.clone(), attr);
            } else if want_remain {
                remain.attributes.push(attr.clone());
            }
        }

        for attr_schema in schema.attributes {
            if attr_schema.required && !attributes.contains_key(attr_schema.name) {
                diags.push(
                    Diagnostic::error(
                        "Missing required argument",
                        format!(
                            "The argument {:?} is required, but no definition was found.",
                            attr_schema.name
                        ),
                    )
                    .with_subject(&self.missing_item_range()),
                );
            }
        }

        let mut blocks = Vec::new();
        for block in &self.blocks {
            let Some(block_schema) = schema.blocks.iter().find(|s| s.type_name == block.type_name)
            else {
                if want_remain {
                    remain.blocks.push(block.clone());
                }
                continue;
            };
            let want = block_schema.label_names.len();
            if block.labels.len() > want {
                let range = &block.label_ranges[want];
                let detail = if want == 0 {
                    format!("No labels are expected for {} blocks.", block.type_name)
                } else {
                    format!("Only {} labels ({}) are expected for {} blocks.", want, block_schema.label_names.join(", "), block.type_name)
                };
                diags.push(
                    Diagnostic::error(format!("Extraneous label for {}", block.type_name), detail)
                        .with_subject(range)
                        .with_context(&block.def_range),
                );
                continue;
            }
            if block.labels.len() < want {
                let missing = block_schema.label_names[block.labels.len()];
                diags.push(
                    Diagnostic::error(
                        format!("Missing {} for {}", missing, block.type_name),
                        format!(
                            "All {} blocks must have {} labels ({}).",
                            block.type_name,
                            want,
                            block_schema.label_names.join(", ")
                        ),
                    )
                    .with_subject(&block.def_range),
                );
                continue;
            }
            blocks.push(block);
        }

        (
            BodyContent {
                attributes,
                blocks,
                missing_item_range: self.missing_item_range(),
            },
            remain,
            diags,
        )
    }

    fn unexpected_items(&self, schema: &BodySchema) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let block_names: Vec<String> = schema.blocks.iter().map(|b| b.type_name.to_string()).collect();
        let attr_names: Vec<String> = schema.attributes.iter().map(|a| a.name.to_string()).collect();

        for attr in &self.attributes {
            if schema.attributes.iter().any(|s| s.name == attr.name) {
                continue;
            }
            let detail = if schema.blocks.iter().any(|b| b.type_name == attr.name) {
                format!(
                    "An argument named {:?} is not expected here. Did you mean to define a block of type {:?}?",
                    attr.name, attr.name
                )
            } else {
                match find_similar_name(&attr.name, &attr_names) {
                    Some(s) => format!(
                        "An argument named {:?} is not expected here. Did you mean {:?}?",
                        attr.name, s
                    ),
                    None => format!("An argument named {:?} is not expected here.", attr.name),
                }
            };
            diags.push(
                Diagnostic::error("Unsupported argument", detail).with_subject(&attr.name_range),
            );
        }

        for block in &self.blocks {
            if schema.blocks.iter().any(|s| s.type_name == block.type_name) {
                continue;
            }
            let detail = if schema.attributes.iter().any(|a| a.name == block.type_name) {
                format!(
                    "Blocks of type {:?} are not expected here. Did you mean to define argument {:?}? If so, use the equals sign to assign it a value.",
                    block.type_name, block.type_name
                )
            } else {
                match find_similar_name(&block.type_name, &block_names) {
                    Some(s) => format!(
                        "Blocks of type {:?} are not expected here. Did you mean {:?}?",
                        block.type_name, s
                    ),
                    None => format!("Blocks of type {:?} are not expected here.", block.type_name),
                }
            };
            diags.push(
                Diagnostic::error("Unsupported block type", detail).with_subject(&block.type_range),
            );
        }

        diags
    }
}

/// Finds the candidate closest to `target`, if any is close enough to suggest.
pub fn find_similar_name(target: &str, candidates: &[String]) -> Option<String> {
    let target_lower = target.to_lowercase();

    candidates
        .iter()
        .filter_map(|candidate| {
            let distance = levenshtein_distance(&target_lower, &candidate.to_lowercase());
            // Only suggest when the edit distance is small relative to the name
            if distance <= target.len() / 3 + 1 {
                Some((candidate.clone(), distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, d)| *d)
        .map(|(name, _)| name)
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const MODULE_SCHEMA: BodySchema = BodySchema {
        attributes: &[
            AttributeSchema::required("source"),
            AttributeSchema::optional("version"),
        ],
        blocks: &[BlockHeaderSchema::new("step", &["name"])],
    };

    #[test]
    fn test_content_reports_unsupported_and_missing() {
        let (file, _) = parse("versoin = \"1\"\nfoo {\n}\n", "test.hcl");
        let (content, diags) = file.body.content(&MODULE_SCHEMA);
        assert!(content.attribute("source").is_none());
        let summaries: Vec<_> = diags.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(
            summaries,
            vec!["Missing required argument", "Unsupported argument", "Unsupported block type"]
        );
        assert!(diags.iter().nth(1).unwrap().detail.contains("Did you mean \"version\"?"));
    }

    #[test]
    fn test_content_label_counts() {
        let (file, _) = parse("source = \"x\"\nstep {\n}\nstep \"a\" \"b\" {\n}\nstep \"ok\" {\n}\n", "test.hcl");
        let (content, diags) = file.body.content(&MODULE_SCHEMA);
        assert_eq!(content.blocks.len(), 1);
        assert_eq!(content.blocks[0].labels, vec!["ok".to_string()]);
        assert_eq!(diags.len(), 2);
        assert_eq!(diags.iter().next().unwrap().summary, "Missing name for step");
    }

    #[test]
    fn test_partial_content_remain() {
        let (file, _) = parse("source = \"x\"\nextra = 1\nother {\n}\n", "test.hcl");
        let (content, remain, diags) = file.body.partial_content(&MODULE_SCHEMA);
        assert!(!diags.has_errors());
        assert!(content.attribute("source").is_some());
        assert_eq!(remain.attributes.len(), 1);
        assert_eq!(remain.blocks.len(), 1);
    }

    #[test]
    fn test_just_attributes_rejects_blocks() {
        let (file, _) = parse("a = 1\nb {\n}\n", "test.hcl");
        let (attrs, diags) = file.body.just_attributes();
        assert_eq!(attrs.len(), 1);
        assert_eq!(diags.iter().next().unwrap().summary, "Unexpected \"b\" block");
    }

    #[test]
    fn test_find_similar_name() {
        let candidates = vec!["source".to_string(), "version".to_string()];
        assert_eq!(find_similar_name("sorce", &candidates), Some("source".to_string()));
        assert_eq!(find_similar_name("completely", &candidates), None);
    }
}
