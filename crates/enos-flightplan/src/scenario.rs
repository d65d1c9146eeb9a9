// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scenarios.
//!
//! A scenario block is expanded into one [`Scenario`] per matrix vector. The
//! vector is bound to `matrix` while the body is decoded:
//!
//! ```hcl
//! scenario "upgrade" {
//!   matrix {
//!     backend = ["raft", "consul"]
//!   }
//!
//!   terraform_cli = terraform_cli.default
//!   terraform     = terraform.default
//!   providers     = [provider.aws.east]
//!
//!   locals {
//!     bucket = "upgrade-${matrix.backend}"
//!   }
//!
//!   step "create_backend" {
//!     module = "backend_${matrix.backend}"
//!   }
//!
//!   output "bucket" {
//!     value = local.bucket
//!   }
//! }
//! ```

use enos_hcl::{
    Attribute, AttributeSchema, Block, BlockHeaderSchema, BodyContent, BodySchema, Diagnostic,
    Diagnostics, EvalContext, Range, Type, Value, convert,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use crate::decoder::DecodeTarget;
use crate::matrix::Vector;
use crate::matrix_decoder::BLOCK_TYPE_MATRIX;
use crate::provider::Provider;
use crate::quality::Quality;
use crate::scenario_filter::ScenarioFilter;
use crate::scenario_output::{BLOCK_TYPE_OUTPUT, ScenarioOutput};
use crate::scenario_step::{BLOCK_TYPE_STEP, ScenarioStep};
use crate::terraform_cli::{DEFAULT_TERRAFORM_CLI_NAME, TerraformCli};
use crate::terraform_setting::TerraformSetting;
use crate::transport::Transport;
use crate::verify::{verify_block_has_n_labels, verify_block_labels_are_valid_identifiers};

pub(crate) const BLOCK_TYPE_SCENARIO: &str = "scenario";
const BLOCK_TYPE_LOCALS: &str = "locals";
const DEFAULT_TERRAFORM_SETTING_NAME: &str = "default";

static SCENARIO_SCHEMA: BodySchema = BodySchema {
    attributes: &[
        AttributeSchema::optional("description"),
        AttributeSchema::optional("terraform_cli"),
        AttributeSchema::optional("terraform"),
        AttributeSchema::optional("providers"),
    ],
    blocks: &[
        BlockHeaderSchema::new(BLOCK_TYPE_STEP, &["name"]),
        BlockHeaderSchema::new(BLOCK_TYPE_OUTPUT, &["name"]),
        BlockHeaderSchema::new(BLOCK_TYPE_MATRIX, &[]),
        BlockHeaderSchema::new(BLOCK_TYPE_LOCALS, &[]),
    ],
};

/// One concrete instance of a scenario block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Optional description.
    pub description: String,
    /// The matrix vector this instance was decoded with. Empty without a matrix.
    pub variants: Vector,
    /// The Terraform CLI to run the scenario with.
    pub terraform_cli: TerraformCli,
    /// The `terraform` settings block, if any.
    pub terraform_setting: Option<TerraformSetting>,
    /// Providers configured at the root of the generated module.
    pub providers: Vec<Provider>,
    /// Remote host transport from an `enos` provider.
    pub transport: Option<Transport>,
    /// Steps in declaration order.
    pub steps: Vec<ScenarioStep>,
    /// Outputs in declaration order.
    pub outputs: Vec<ScenarioOutput>,
}

/// Identifies a scenario instance on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioRef {
    /// Scenario name.
    pub name: String,
    /// Scenario description.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Variant vector.
    pub variants: Vector,
    /// Stable identifier, see [`Scenario::uid`].
    pub uid: String,
    /// Filter that selects exactly this instance.
    pub filter: String,
}

/// A summary of a scenario block for documentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioOutline {
    /// Scenario name.
    pub name: String,
    /// Scenario description.
    pub description: String,
    /// Steps in declaration order.
    pub steps: Vec<StepOutline>,
    /// Every quality verified by any step, sorted.
    pub verifies: Vec<Quality>,
}

/// A step of a [`ScenarioOutline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutline {
    /// Step name.
    pub name: String,
    /// Step description.
    pub description: String,
    /// Qualities the step verifies.
    pub verifies: Vec<Quality>,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variants.is_empty() {
            return f.write_str(&self.name);
        }
        write!(f, "{} {}", self.name, self.variants)
    }
}

impl Scenario {
    /// Lowercase hex SHA-256 of the display string.
    pub fn uid(&self) -> String {
        hex::encode(Sha256::digest(self.to_string().as_bytes()))
    }

    /// The filter string that selects this instance, e.g. `test backend:raft`.
    pub fn filter_str(&self) -> String {
        if self.variants.is_empty() {
            return self.name.clone();
        }
        format!("{} {}", self.name, self.variants.filter_str())
    }

    /// The wire reference of this instance.
    pub fn reference(&self) -> ScenarioRef {
        ScenarioRef {
            name: self.name.clone(),
            description: self.description.clone(),
            variants: self.variants.clone(),
            uid: self.uid(),
            filter: self.filter_str(),
        }
    }

    /// Orders scenarios by name and then by variants.
    pub fn cmp_id(&self, other: &Scenario) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.variants.cmp(&other.variants))
    }

    /// Returns true if the filter selects this instance.
    pub fn matches(&self, filter: &ScenarioFilter) -> bool {
        if filter.select_all {
            return true;
        }

        if let Some(name) = &filter.name {
            if !name.is_empty() && *name != self.name {
                return false;
            }
        }

        let include = filter.include.as_ref().filter(|v| !v.is_empty());
        if self.variants.is_empty() && (include.is_some() || !filter.exclude.is_empty()) {
            return false;
        }

        if let Some(include) = include {
            if !self.variants.contains_unordered(include) {
                return false;
            }
        }

        if filter.exclude.iter().any(|ex| ex.matches(&self.variants)) {
            return false;
        }

        if let Some(m) = filter.intersection_matrix.as_ref().filter(|m| !m.is_empty()) {
            if !m.vectors().iter().any(|v| self.variants.contains_unordered(v)) {
                return false;
            }
        }

        true
    }

    /// The outline of this scenario.
    pub fn outline(&self) -> ScenarioOutline {
        let mut verifies = BTreeSet::new();
        let steps = self
            .steps
            .iter()
            .map(|step| {
                verifies.extend(step.verifies.iter().cloned());
                StepOutline {
                    name: step.name.clone(),
                    description: step.description.clone(),
                    verifies: step.verifies.clone(),
                }
            })
            .collect();

        ScenarioOutline {
            name: self.name.clone(),
            description: self.description.clone(),
            steps,
            verifies: verifies.into_iter().collect(),
        }
    }

    /// Decodes a scenario block into this instance.
    ///
    /// `ctx` is the instance's own context; `matrix` is already bound and
    /// `local` and `step` are added to it as the body is decoded. Below
    /// [`DecodeTarget::ScenariosComplete`] only the name is set.
    pub fn decode(&mut self, block: &Block, ctx: &mut EvalContext, target: DecodeTarget) -> Diagnostics {
        let mut diags = Diagnostics::new();
        self.name = block.labels.first().cloned().unwrap_or_default();

        if target < DecodeTarget::ScenariosComplete {
            return diags;
        }

        let (content, more) = block.body.content(&SCENARIO_SCHEMA);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return diags;
        }

        if content.blocks_of_type(BLOCK_TYPE_STEP).is_empty() {
            diags.push(
                Diagnostic::error(
                    "missing required step block",
                    "scenarios require one or more step blocks",
                )
                .with_subject(&block.body.missing_item_range()),
            );
        }

        if let Some(attr) = content.attribute("description") {
            let (val, more) = attr.expr.value(ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                return diags;
            }
            match convert(&val, &Type::String) {
                Ok(Value::String(s)) => self.description = s,
                _ => {
                    diags.push(
                        Diagnostic::error("invalid value", "scenario description must be a string")
                            .with_subject(&attr.expr.range)
                            .with_context(&attr.range),
                    );
                    return diags;
                }
            }
        }

        macro_rules! stage {
            ($e:expr) => {{
                let more = $e;
                let failed = more.has_errors();
                diags.extend(more);
                if failed {
                    return diags;
                }
            }};
        }

        stage!(decode_locals(&content, ctx));
        stage!(self.decode_terraform_cli(&content, block, ctx));
        stage!(self.decode_terraform_setting(&content, ctx));
        stage!(self.decode_providers(&content, ctx));
        stage!(self.decode_steps(&content, ctx));
        stage!(self.decode_outputs(&content, ctx));

        diags
    }

    fn decode_terraform_cli(
        &mut self,
        content: &BodyContent<'_>,
        block: &Block,
        ctx: &EvalContext,
    ) -> Diagnostics {
        let mut diags = Diagnostics::new();

        let load = |name: &str, cli: &mut TerraformCli| -> Diagnostics {
            let mut diags = Diagnostics::new();
            let missing = || {
                Diagnostic::error(
                    "unable to determine terraform_cli",
                    format!("no terraform_cli named {} is available in the eval ctx", name),
                )
                .with_subject(&block.body.missing_item_range())
            };
            let Some(val) = ctx.variable("terraform_cli").and_then(|clis| clis.get_attr(name)) else {
                diags.push(missing());
                return diags;
            };
            match TerraformCli::from_value(val) {
                Ok(c) => *cli = c,
                Err(e) => diags.push(
                    Diagnostic::error(
                        "unable to convert default terraform_cli from eval context to object",
                        e.to_string(),
                    )
                    .with_subject(&block.body.missing_item_range()),
                ),
            }
            diags
        };

        let Some(attr) = content.attribute("terraform_cli") else {
            return load(DEFAULT_TERRAFORM_CLI_NAME, &mut self.terraform_cli);
        };

        let (val, more) = attr.expr.value(ctx);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return diags;
        }

        if let Some(name) = val.as_str() {
            diags.extend(load(name, &mut self.terraform_cli));
            return diags;
        }

        match TerraformCli::from_value(&val) {
            Ok(cli) => self.terraform_cli = cli,
            Err(e) => diags.push(
                Diagnostic::error("invalid terraform_cli value", e.to_string())
                    .with_subject(&attr.expr.range)
                    .with_context(&attr.range),
            ),
        }

        diags
    }

    fn decode_terraform_setting(&mut self, content: &BodyContent<'_>, ctx: &EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let attr = content.attribute("terraform");
        let err = |summary: String, detail: &str| {
            let d = Diagnostic::error(summary, detail);
            match attr {
                Some(a) => d.with_subject(&a.expr.range).with_context(&a.range),
                None => d,
            }
        };
        let mut load = |setting: &Value| match TerraformSetting::from_value(setting) {
            Ok(s) => {
                self.terraform_setting = Some(s);
                None
            }
            Err(e) => Some(err(
                "unable to unmarshal terraform from eval context".into(),
                &e.to_string(),
            )),
        };

        let settings = ctx.variable("terraform");

        let Some(attr) = attr else {
            if let Some(setting) = settings.and_then(|s| s.get_attr(DEFAULT_TERRAFORM_SETTING_NAME)) {
                diags.extend(load(setting));
            }
            return diags;
        };

        let Some(settings) = settings else {
            diags.push(err(
                "terraform references an undefined terraform block".into(),
                "no terraform blocks have been defined",
            ));
            return diags;
        };

        let (val, more) = attr.expr.value(ctx);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return diags;
        }

        if val.is_null() || !val.is_wholly_known() {
            diags.push(err(
                "terraform value must be set to a terraform block label or value".into(),
                "invalid attribute",
            ));
            return diags;
        }

        if let Some(name) = val.as_str() {
            match settings.get_attr(name) {
                Some(setting) => diags.extend(load(setting)),
                None => diags.push(err(
                    format!("no terraform block with a name label {} exists", name),
                    "terraform references an undefined terraform block",
                )),
            }
            return diags;
        }

        let Some(fields) = val.as_value_map() else {
            diags.push(err(
                "terraform value must be set to a terraform block label or value".into(),
                "invalid attribute value",
            ));
            return diags;
        };

        let name = match fields.get("name") {
            None => {
                diags.push(err(
                    "terraform value does not have the required name attribute".into(),
                    "missing required attribute",
                ));
                return diags;
            }
            Some(n) => match n.as_str() {
                Some(n) => n,
                None => {
                    diags.push(err(
                        "terraform name value must be known".into(),
                        "missing required attribute",
                    ));
                    return diags;
                }
            },
        };

        let Some(setting) = settings.get_attr(name) else {
            diags.push(err(
                format!("no terraform block with a name label {} exists", name),
                "references an undefined terraform block",
            ));
            return diags;
        };

        if !val.semantic_eq(setting) {
            diags.push(err(
                "terraform value and configured value don't match".into(),
                "invalid attribute",
            ));
            return diags;
        }

        diags.extend(load(setting));
        diags
    }

    fn decode_providers(&mut self, content: &BodyContent<'_>, ctx: &EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let Some(attr) = content.attribute("providers") else {
            return diags;
        };
        let err = |summary: String, detail: String| {
            Diagnostic::error(summary, detail)
                .with_subject(&attr.expr.range)
                .with_context(&attr.range)
        };

        let (val, more) = attr.expr.value(ctx);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return diags;
        }

        let Some(wanted) = val.as_value_slice().filter(|_| val.is_wholly_known()) else {
            diags.push(err("providers value must be a known object".into(), String::new()));
            return diags;
        };

        let Some(defined) = ctx.variable("provider").filter(|p| p.as_value_map().is_some()) else {
            diags.push(err(
                "cannot set provider as no providers have been defined".into(),
                String::new(),
            ));
            return diags;
        };

        let find = |ptype: &str, alias: &str| -> Result<&Value, Diagnostic> {
            let aliases = defined
                .get_attr(ptype)
                .ok_or_else(|| err(format!("provider type {} is not defined", ptype), String::new()))?;
            aliases.get_attr(alias).ok_or_else(|| {
                err(
                    format!("alias {} for provider type {} is not defined", alias, ptype),
                    String::new(),
                )
            })
        };

        for pval in wanted {
            if let Some(address) = pval.as_str() {
                let parts: Vec<&str> = address.split('.').collect();
                let &[ptype, alias] = parts.as_slice() else {
                    diags.push(err(
                        "provider attribute must be a provider value or type.alias string".into(),
                        format!("provider value {} is not a valid provider address", address),
                    ));
                    continue;
                };
                match find(ptype, alias).map(Provider::from_value) {
                    Ok(Ok(p)) => self.providers.push(p),
                    Ok(Err(e)) => {
                        diags.push(err("unable to unmarshal provider value".into(), e.to_string()))
                    }
                    Err(d) => diags.push(d),
                }
                continue;
            }

            let provider = match Provider::from_value(pval) {
                Ok(p) => p,
                Err(e) => {
                    diags.push(err("unable to unmarshal provider value".into(), e.to_string()));
                    continue;
                }
            };

            let found = match find(&provider.provider_type, &provider.alias) {
                Ok(v) => v,
                Err(d) => {
                    diags.push(d);
                    continue;
                }
            };

            if !pval.semantic_eq(found) {
                diags.push(err(
                    "provider arguments don't match defined provider".into(),
                    String::new(),
                ));
                return diags;
            }

            self.providers.push(provider);
        }

        let base_dir = ctx
            .variable("path")
            .and_then(|p| p.get_attr("root"))
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .unwrap_or_default();
        for provider in &self.providers {
            let (transport, more) = Transport::from_provider(provider, &base_dir);
            diags.extend(more);
            if transport.is_some() && self.transport.is_none() {
                self.transport = transport;
            }
        }

        diags
    }

    fn decode_steps(&mut self, content: &BodyContent<'_>, ctx: &mut EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let mut found = BTreeSet::new();

        for block in content.blocks_of_type(BLOCK_TYPE_STEP) {
            let name = block.labels.first().cloned().unwrap_or_default();
            if found.contains(&name) {
                diags.push(redeclared(block, "step", &name));
                continue;
            }

            let more = verify_block_labels_are_valid_identifiers(block);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            let (step, more) = ScenarioStep::decode(block, ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            step.insert_into_ctx(ctx);
            found.insert(name);
            self.steps.push(step);
        }

        diags
    }

    fn decode_outputs(&mut self, content: &BodyContent<'_>, ctx: &EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let mut found = BTreeSet::new();

        for block in content.blocks_of_type(BLOCK_TYPE_OUTPUT) {
            let name = block.labels.first().cloned().unwrap_or_default();
            if found.contains(&name) {
                diags.push(redeclared(block, "output", &name));
                continue;
            }

            let more = verify_block_labels_are_valid_identifiers(block);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            let (out, more) = ScenarioOutput::decode(block, ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            found.insert(name);
            self.outputs.push(out);
        }

        diags
    }
}

fn redeclared(block: &Block, what: &str, name: &str) -> Diagnostic {
    let article = if what.starts_with(['a', 'e', 'i', 'o', 'u']) { "an" } else { "a" };
    Diagnostic::error(
        format!("redeclared {} in scenario", what),
        format!("{} {} with name {} has already been declared", article, what, name),
    )
    .with_subject(&block.type_range)
    .with_context(&Range::between(&block.type_range, &block.def_range))
}

/// Evaluates `locals` blocks in source order. Each local is visible to the
/// ones after it.
fn decode_locals(content: &BodyContent<'_>, ctx: &mut EvalContext) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let blocks = content.blocks_of_type(BLOCK_TYPE_LOCALS);
    if blocks.is_empty() {
        return diags;
    }

    let mut locals = BTreeMap::new();
    for block in blocks {
        let more = verify_block_has_n_labels(block, 0);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            continue;
        }

        let (mut attrs, more) = block.body.just_attributes();
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            continue;
        }
        attrs.sort_by_key(|a: &&Attribute| a.range.start.byte);

        for attr in attrs {
            let (val, more) = attr.expr.value(ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }
            locals.insert(attr.name.clone(), val);
            ctx.set_variable("local", Value::object(locals.clone()));
        }
    }

    diags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{Exclude, ExcludeMode};
    use crate::module::Module;
    use enos_hcl::parse;

    fn root_ctx() -> EvalContext {
        let mut ctx = EvalContext::new();
        ctx.set_variable("path", Value::object_from([("root", Value::string("/enos"))]));
        let module = Module {
            name: "backend".into(),
            source: "./modules/backend".into(),
            ..Module::default()
        };
        ctx.set_variable("module", Value::object_from([("backend", module.to_value())]));
        let cli = TerraformCli {
            name: "default".into(),
            path: "/bin/terraform".into(),
            ..TerraformCli::default()
        };
        ctx.set_variable("terraform_cli", Value::object_from([("default", cli.to_value())]));
        ctx.set_variable("terraform", Value::empty_object());
        let enos = Provider {
            provider_type: "enos".into(),
            alias: "ubuntu".into(),
            config: crate::schemaless_block::SchemalessBlock {
                attrs: BTreeMap::from([(
                    "transport".to_string(),
                    Value::object_from([(
                        "ssh",
                        Value::object_from([("private_key_path", Value::string("./key.pem"))]),
                    )]),
                )]),
                ..Default::default()
            },
        };
        ctx.set_variable(
            "provider",
            Value::object_from([("enos", Value::object_from([("ubuntu", enos.to_value())]))]),
        );
        ctx
    }

    fn decode(src: &str, variants: Vector) -> (Scenario, Diagnostics) {
        let (file, diags) = parse(src, "enos.hcl");
        assert!(!diags.has_errors(), "{}", diags);
        let mut ctx = root_ctx();
        ctx.set_variable("matrix", variants.to_value());
        let mut scenario = Scenario {
            variants,
            ..Scenario::default()
        };
        let diags = scenario.decode(&file.body.blocks[0], &mut ctx, DecodeTarget::ScenariosComplete);
        (scenario, diags)
    }

    #[test]
    fn test_decode_complete_scenario() {
        let (scenario, diags) = decode(
            r#"
scenario "test" {
  description = "a test"
  providers   = ["enos.ubuntu"]

  locals {
    first  = "one"
    second = "${local.first}-${matrix.backend}"
  }

  step "one" {
    module = module.backend
  }

  step "two" {
    module = "backend"

    variables {
      name = local.second
    }
  }

  output "name" {
    value = step.two.name
  }
}
"#,
            Vector::from_pairs([("backend", "raft")]),
        );
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(scenario.name, "test");
        assert_eq!(scenario.description, "a test");
        assert_eq!(scenario.terraform_cli.path, "/bin/terraform");
        assert!(scenario.terraform_setting.is_none());
        assert_eq!(scenario.steps.len(), 2);
        assert_eq!(scenario.outputs.len(), 1);
        assert_eq!(scenario.providers.len(), 1);
        let transport = scenario.transport.as_ref().unwrap();
        assert_eq!(transport.ssh.private_key_path, "/enos/./key.pem");
        assert_eq!(
            crate::step_variable::StepVariable::from_value(&scenario.steps[1].module.attrs["name"]),
            Some(&crate::step_variable::StepVariable::Value(Value::string("one-raft")))
        );
    }

    #[test]
    fn test_requires_step_and_unique_names() {
        let (_, diags) = decode(r#"scenario "empty" {}"#, Vector::new());
        assert!(diags.errors().any(|d| d.summary == "missing required step block"));

        let (scenario, diags) = decode(
            r#"
scenario "dupes" {
  step "one" {
    module = module.backend
  }
  step "one" {
    module = module.backend
  }
}
"#,
            Vector::new(),
        );
        assert!(diags.errors().any(|d| d.summary == "redeclared step in scenario"));
        assert_eq!(scenario.steps.len(), 1);
    }

    #[test]
    fn test_names_only_below_complete() {
        let (file, _) = parse(r#"scenario "fast" { bogus = true }"#, "enos.hcl");
        let mut scenario = Scenario::default();
        let diags = scenario.decode(
            &file.body.blocks[0],
            &mut root_ctx(),
            DecodeTarget::ScenariosNamesExpandVariants,
        );
        assert!(diags.is_empty());
        assert_eq!(scenario.name, "fast");
    }

    #[test]
    fn test_identity() {
        let scenario = Scenario {
            name: "test".into(),
            variants: Vector::from_pairs([("backend", "raft"), ("arch", "amd64")]),
            ..Scenario::default()
        };
        assert_eq!(scenario.to_string(), "test [backend:raft arch:amd64]");
        assert_eq!(scenario.filter_str(), "test backend:raft arch:amd64");
        assert_eq!(scenario.uid().len(), 64);
        assert_eq!(scenario.uid(), scenario.clone().uid());

        let bare = Scenario {
            name: "bare".into(),
            ..Scenario::default()
        };
        assert_eq!(bare.to_string(), "bare");
        assert_eq!(bare.filter_str(), "bare");
    }

    #[test]
    fn test_matches() {
        let scenario = Scenario {
            name: "test".into(),
            variants: Vector::from_pairs([("backend", "raft"), ("arch", "amd64")]),
            ..Scenario::default()
        };
        assert!(scenario.matches(&ScenarioFilter::select_all()));
        assert!(scenario.matches(&ScenarioFilter::with_name("test")));
        assert!(!scenario.matches(&ScenarioFilter::with_name("other")));

        let mut f = ScenarioFilter::with_name("test");
        f.include = Some(Vector::from_pairs([("arch", "amd64")]));
        assert!(scenario.matches(&f));

        f.exclude = vec![Exclude::new(
            ExcludeMode::Contains,
            Vector::from_pairs([("backend", "raft")]),
        )];
        assert!(!scenario.matches(&f));

        let bare = Scenario {
            name: "test".into(),
            ..Scenario::default()
        };
        let mut f = ScenarioFilter::default();
        f.include = Some(Vector::from_pairs([("arch", "amd64")]));
        assert!(!bare.matches(&f));
    }

    #[test]
    fn test_outline_collects_qualities() {
        let q = |n: &str| Quality {
            name: n.into(),
            description: String::new(),
        };
        let scenario = Scenario {
            name: "test".into(),
            steps: vec![
                ScenarioStep {
                    name: "a".into(),
                    verifies: vec![q("z"), q("b")],
                    ..ScenarioStep::default()
                },
                ScenarioStep {
                    name: "b".into(),
                    verifies: vec![q("b")],
                    ..ScenarioStep::default()
                },
            ],
            ..Scenario::default()
        };
        let outline = scenario.outline();
        assert_eq!(outline.steps.len(), 2);
        assert_eq!(
            outline.verifies.iter().map(|q| q.name.as_str()).collect::<Vec<_>>(),
            vec!["b", "z"]
        );
    }
}
