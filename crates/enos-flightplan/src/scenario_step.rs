// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scenario steps.
//!
//! ```hcl
//! step "create_vpc" {
//!   description = "create a network"
//!   module      = module.vpc
//!   depends_on  = [step.prepare]
//!   verifies    = [quality.network_is_private]
//!   providers   = { aws = provider.aws.east }
//!
//!   variables {
//!     ami = step.prepare.ami_id
//!   }
//! }
//! ```
//!
//! Steps are decoded in order. Each decoded step is added to the `step`
//! variable so later steps can reference it.

use enos_hcl::{
    Attribute, AttributeSchema, Block, BlockHeaderSchema, BodyContent, BodySchema, Diagnostic,
    Diagnostics, EvalContext, Range, Type, Value, convert,
};
use std::collections::{BTreeMap, BTreeSet};

use crate::module::Module;
use crate::provider::Provider;
use crate::quality::Quality;
use crate::step_variable::{StepVariable, decode_step_variable};
use crate::verify::filter_terraform_meta_attrs;

pub(crate) const BLOCK_TYPE_STEP: &str = "step";
const BLOCK_TYPE_VARIABLES: &str = "variables";
const DEFAULT_PROVIDER_ALIAS: &str = "default";

static SCENARIO_STEP_SCHEMA: BodySchema = BodySchema {
    attributes: &[
        AttributeSchema::optional("description"),
        AttributeSchema::required("module"),
        AttributeSchema::optional("providers"),
        AttributeSchema::optional("depends_on"),
        AttributeSchema::optional("skip_step"),
        AttributeSchema::optional("verifies"),
    ],
    blocks: &[BlockHeaderSchema::new(BLOCK_TYPE_VARIABLES, &[])],
};

/// A `step` block of a scenario.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioStep {
    /// Step name, unique within the scenario.
    pub name: String,
    /// Optional description.
    pub description: String,
    /// The module the step runs, with its inputs.
    pub module: Module,
    /// Providers passed to the module, keyed by the name the module imports.
    pub providers: BTreeMap<String, Provider>,
    /// Names of steps that must run first, sorted.
    pub depends_on: Vec<String>,
    /// Qualities the step verifies, sorted.
    pub verifies: Vec<Quality>,
    /// Whether the step is left out of the generated module.
    pub skip: bool,
}

impl ScenarioStep {
    /// Decodes a step block. `ctx` must hold the `module`, `provider`,
    /// `quality` and `step` variables defined so far.
    pub fn decode(block: &Block, ctx: &EvalContext) -> (ScenarioStep, Diagnostics) {
        let mut step = ScenarioStep {
            name: block.labels.first().cloned().unwrap_or_default(),
            ..ScenarioStep::default()
        };

        let (content, mut diags) = block.body.content(&SCENARIO_STEP_SCHEMA);
        if diags.has_errors() {
            return (step, diags);
        }

        if let Some(attr) = content.attribute("description") {
            let (val, more) = attr.expr.value(ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                return (step, diags);
            }
            match convert(&val, &Type::String) {
                Ok(Value::String(s)) => step.description = s,
                _ => {
                    diags.push(
                        Diagnostic::error("invalid value", "step description must be a string")
                            .with_subject(&attr.expr.range)
                            .with_context(&attr.range),
                    );
                    return (step, diags);
                }
            }
        }

        let (skip, more) = decode_skip(&content, ctx);
        let failed = more.has_errors();
        diags.extend(more);
        step.skip = skip;
        if failed || skip {
            return (step, diags);
        }

        macro_rules! stage {
            ($e:expr) => {{
                let more = $e;
                let failed = more.has_errors();
                diags.extend(more);
                if failed {
                    return (step, diags);
                }
            }};
        }

        stage!(step.decode_depends_on(&content, ctx));
        stage!(step.decode_verifies(&content, ctx));

        let Some(module_attr) = content.attribute("module") else {
            diags.push(
                Diagnostic::error("scenario step missing module", "scenario step missing module")
                    .with_subject(&block.body.missing_item_range()),
            );
            return (step, diags);
        };
        stage!(step.decode_module_attribute(module_attr, ctx));

        let (module_val, more) = step.validate_module_reference(module_attr, ctx);
        stage!(more);

        stage!(step.decode_providers(&content, ctx));

        if let Some(module_val) = module_val.as_ref().and_then(Value::as_value_map) {
            step.copy_module_attributes(module_val);
        }

        diags.extend(step.decode_variables(&content.blocks_of_type(BLOCK_TYPE_VARIABLES), ctx));

        (step, diags)
    }

    fn decode_module_attribute(&mut self, attr: &Attribute, ctx: &EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let context = Range::between(&attr.name_range, &attr.expr.range);
        let err = |summary: &str, detail: String| {
            Diagnostic::error(summary, detail)
                .with_subject(&attr.expr.range)
                .with_context(&context)
        };

        let (mut val, more) = attr.expr.value(ctx);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return diags;
        }

        if val.is_null() || !val.is_wholly_known() {
            diags.push(err("invalid module value", "module must be a known module object".into()));
            return diags;
        }

        if let Some(name) = val.as_str() {
            let Some(modules) = ctx.variable("module") else {
                diags.push(err("unknown module", "no modules have been defined".into()));
                return diags;
            };
            let Some(module) = modules.get_attr(name) else {
                diags.push(err(
                    "unknown module",
                    format!("no modules with name {} have been defined", name),
                ));
                return diags;
            };
            val = module.clone();
        }

        let Some(fields) = val.as_value_map() else {
            diags.push(err(
                "invalid module value",
                "module must be a string name or module value".into(),
            ));
            return diags;
        };

        match fields.get("name").and_then(Value::as_str) {
            Some(name) => self.module.name = name.to_string(),
            None => {
                diags.push(
                    Diagnostic::error("missing module name", "missing module name")
                        .with_subject(&attr.name_range)
                        .with_context(&context),
                );
                return diags;
            }
        }

        let Some(source) = fields.get("source") else {
            diags.push(err("missing module source", "missing module source".into()));
            return diags;
        };
        match source.as_str() {
            Some(s) => self.module.source = s.to_string(),
            None => match convert(source, &Type::String) {
                Ok(Value::String(s)) => {
                    diags.push(
                        Diagnostic::warning(
                            "invalid module source value",
                            "module source value should be a string, consider updating it",
                        )
                        .with_subject(&attr.expr.range)
                        .with_context(&context),
                    );
                    self.module.source = s;
                }
                _ => diags.push(err(
                    "invalid module source value",
                    "module source value must be a string".into(),
                )),
            },
        }

        if let Some(version) = fields.get("version") {
            match version.as_str() {
                Some(s) => self.module.version = s.to_string(),
                None => match convert(version, &Type::String) {
                    Ok(Value::String(s)) => {
                        diags.push(
                            Diagnostic::warning(
                                "invalid module version value",
                                "module version value should be a string, consider updating it",
                            )
                            .with_subject(&attr.expr.range)
                            .with_context(&context),
                        );
                        self.module.version = s;
                    }
                    _ => diags.push(err(
                        "invalid module version value",
                        "module version value must be a string".into(),
                    )),
                },
            }
        }

        diags
    }

    /// Finds the module definition the step refers to and checks that the
    /// sources agree.
    fn validate_module_reference(
        &self,
        attr: &Attribute,
        ctx: &EvalContext,
    ) -> (Option<Value>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let context = Range::between(&attr.name_range, &attr.expr.range);
        let err = |summary: &str, detail: String| {
            Diagnostic::error(summary, detail)
                .with_subject(&attr.expr.range)
                .with_context(&context)
        };
        let unknown = || {
            err(
                "unknown module",
                format!("a module with name {} has not been defined", self.module.name),
            )
        };

        let Some(modules) = ctx.variable("module").and_then(Value::as_value_map) else {
            diags.push(unknown());
            return (None, diags);
        };

        let defined = modules
            .values()
            .find(|m| m.get_attr("name").and_then(Value::as_str) == Some(self.module.name.as_str()));
        let Some(defined) = defined else {
            diags.push(unknown());
            return (None, diags);
        };

        match defined.get_attr("source").and_then(Value::as_str) {
            None => {
                diags.push(err("missing source", "module value does not contain a source".into()));
                (None, diags)
            }
            Some(s) if s != self.module.source => {
                diags.push(err(
                    "module source doesn't match module definition",
                    format!(
                        "module source for module {} is {}, not {}",
                        self.module.name, s, self.module.source
                    ),
                ));
                (None, diags)
            }
            Some(_) => (Some(defined.clone()), diags),
        }
    }

    fn decode_depends_on(&mut self, content: &BodyContent<'_>, ctx: &EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let Some(attr) = content.attribute("depends_on") else {
            return diags;
        };
        let err = |summary: &str, detail: String| {
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

        let Some(deps) = val.as_value_slice().filter(|_| val.is_wholly_known()) else {
            diags.push(err("depends value must be a known object", String::new()));
            return diags;
        };

        let Some(defined) = ctx.variable("step") else {
            diags.push(err(
                "No prior steps have been defined. You cannot depend_on an undefined step",
                String::new(),
            ));
            return diags;
        };

        let mut names = BTreeSet::new();
        for dep in deps {
            let name = match dep.as_str() {
                Some(name) => {
                    if defined.get_attr(name).is_none() {
                        diags.push(err(
                            "step has not been defined",
                            format!("cannot depend_on step {} as it has not been defined", name),
                        ));
                        continue;
                    }
                    name.to_string()
                }
                None => match Module::from_value(dep) {
                    Ok(m) => m.name,
                    Err(e) => {
                        diags.push(err("value of depends_on attribute is not a step", e.to_string()));
                        continue;
                    }
                },
            };

            if !names.insert(name.clone()) {
                diags.push(err(
                    "cannot depend on the same step more than once",
                    format!("cannot depend_on step {} more than once", name),
                ));
            }
        }

        self.depends_on = names.into_iter().collect();
        diags
    }

    fn decode_verifies(&mut self, content: &BodyContent<'_>, ctx: &EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let Some(attr) = content.attribute("verifies") else {
            return diags;
        };
        let err = |summary: String, detail: String| {
            Diagnostic::error(summary, detail)
                .with_subject(&attr.expr.range)
                .with_context(&attr.range)
        };
        const INVALID: &str = "invalid input for 'verifies' attribute. Must be one-or-more qualities";

        let (val, more) = attr.expr.value(ctx);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return diags;
        }

        if val.is_null() || !val.is_wholly_known() {
            diags.push(err(
                "verifies value must be knowable at compile time".into(),
                String::new(),
            ));
            return diags;
        }

        if !val.can_iterate_elements() {
            diags.push(err(INVALID.into(), String::new()));
            return diags;
        }

        let Some(elems) = val.as_value_slice() else {
            match Quality::from_value(&val) {
                Ok(q) => self.verifies.push(q),
                Err(e) => diags.push(err(INVALID.into(), e.to_string())),
            }
            return diags;
        };

        let mut seen = BTreeSet::new();
        for elem in elems {
            let quality = match Quality::from_value(elem) {
                Ok(q) => q,
                Err(e) => {
                    diags.push(err(INVALID.into(), e.to_string()));
                    continue;
                }
            };
            if !seen.insert(quality.name.clone()) {
                diags.push(err(
                    format!(
                        "quality verification of {} cannot be specified more than once",
                        quality.name
                    ),
                    "cannot define the same quality more than once".into(),
                ));
                continue;
            }
            self.verifies.push(quality);
        }

        self.verifies.sort();
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
        let default_alias_warning = |import: &str, address: &str| {
            Diagnostic::warning(
                "cannot use default provider as alias value",
                format!(
                    "provider alias {} has been set to {}. Providers that have been labeled as \"default\" cannot be used as aliases because they are always available to scenario",
                    import, address
                ),
            )
            .with_subject(&attr.expr.range)
            .with_context(&attr.range)
        };

        let (val, more) = attr.expr.value(ctx);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return diags;
        }

        let Some(wanted) = val.as_value_map().filter(|_| val.is_wholly_known()) else {
            diags.push(err("providers value must be a known object".into(), String::new()));
            return diags;
        };

        let Some(defined) = ctx.variable("provider") else {
            diags.push(err(
                "provider value has not been defined".into(),
                "no providers have been defined".into(),
            ));
            return diags;
        };
        if !defined.is_wholly_known() || defined.as_value_map().is_none() {
            diags.push(err(
                "cannot set provider as no providers have been defined".into(),
                String::new(),
            ));
            return diags;
        }

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

        for (import, pval) in wanted {
            if let Some(address) = pval.as_str() {
                let parts: Vec<&str> = address.split('.').collect();
                let &[ptype, alias] = parts.as_slice() else {
                    diags.push(err(
                        "provider attribute must be a provider value or type.alias string".into(),
                        format!("provider value {} is not a valid provider address", address),
                    ));
                    continue;
                };

                let found = match find(ptype, alias) {
                    Ok(v) => v,
                    Err(d) => {
                        diags.push(d);
                        continue;
                    }
                };

                if alias == DEFAULT_PROVIDER_ALIAS {
                    diags.push(default_alias_warning(import, address));
                    continue;
                }

                match Provider::from_value(found) {
                    Ok(p) => {
                        self.providers.insert(import.clone(), p);
                    }
                    Err(e) => diags.push(err("unable to unmarshal provider value".into(), e.to_string())),
                }
                continue;
            }

            let provider = match Provider::from_value(pval) {
                Ok(p) => p,
                Err(e) => {
                    diags.push(err(
                        format!("unable to unmarshal provider value for {}", import),
                        e.to_string(),
                    ));
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

            if provider.alias == DEFAULT_PROVIDER_ALIAS {
                diags.push(default_alias_warning(import, &provider.address()));
                continue;
            }

            if !pval.semantic_eq(found) {
                diags.push(err(
                    "provider arguments don't match defined provider".into(),
                    String::new(),
                ));
                return diags;
            }

            self.providers.insert(import.clone(), provider);
        }

        diags
    }

    /// Copies the inputs of the module definition into the step, leaving
    /// out the fields every module has.
    fn copy_module_attributes(&mut self, module: &BTreeMap<String, Value>) {
        for (name, value) in module {
            if matches!(name.as_str(), "name" | "source" | "version") {
                continue;
            }
            let attr = match StepVariable::from_value(value) {
                Some(_) => value.clone(),
                None => StepVariable::Value(value.clone()).into_value(),
            };
            self.module.attrs.insert(name.clone(), attr);
        }
    }

    fn decode_variables(&mut self, blocks: &[&Block], ctx: &EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();

        for block in blocks {
            let (attrs, more) = block.body.just_attributes();
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                return diags;
            }

            let (attrs, more) = filter_terraform_meta_attrs(attrs);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                return diags;
            }

            let mut decoded = BTreeMap::new();
            let mut block_diags = Diagnostics::new();
            for attr in attrs {
                let (val, more) = decode_step_variable(&attr.expr, ctx);
                block_diags.extend(more);
                decoded.insert(attr.name.clone(), val);
            }

            let failed = block_diags.has_errors();
            diags.extend(block_diags);
            if failed {
                continue;
            }
            self.module.attrs.extend(decoded);
        }

        diags
    }

    /// The step as it appears in the `step` variable.
    pub fn to_value(&self) -> Value {
        let mut vals = BTreeMap::new();
        vals.insert("source".to_string(), Value::string(&self.module.source));
        vals.insert("name".to_string(), Value::string(&self.name));
        vals.insert("variables".to_string(), Value::object(self.module.attrs.clone()));
        if !self.module.version.is_empty() {
            vals.insert("version".to_string(), Value::string(&self.module.version));
        }
        Value::object(vals)
    }

    /// Adds the step to the `step` variable defined directly on `ctx`.
    pub fn insert_into_ctx(&self, ctx: &mut EvalContext) {
        let mut steps = ctx
            .local_variables()
            .get("step")
            .and_then(Value::as_value_map)
            .cloned()
            .unwrap_or_default();
        steps.insert(self.name.clone(), self.to_value());
        ctx.set_variable("step", Value::object(steps));
    }
}

fn decode_skip(content: &BodyContent<'_>, ctx: &EvalContext) -> (bool, Diagnostics) {
    let mut diags = Diagnostics::new();
    let Some(attr) = content.attribute("skip_step") else {
        return (false, diags);
    };

    let (val, more) = attr.expr.value(ctx);
    let failed = more.has_errors();
    diags.extend(more);
    if failed {
        return (false, diags);
    }

    if val.is_null() || !val.is_wholly_known() {
        diags.push(
            Diagnostic::error("skip_step must be a known value", "")
                .with_subject(&attr.expr.range),
        );
    }

    let Some(skip) = val.as_bool() else {
        diags.push(
            Diagnostic::error(
                "skip_step must be a bool",
                format!("skip_step must be a bool, not {}", val.type_name()),
            )
            .with_subject(&attr.expr.range),
        );
        return (false, diags);
    };

    if diags.has_errors() {
        return (false, diags);
    }
    (skip, diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use enos_hcl::parse;

    fn base_ctx() -> EvalContext {
        let mut ctx = EvalContext::new();
        let vpc = Module {
            name: "vpc".into(),
            source: "./modules/vpc".into(),
            attrs: BTreeMap::from([("cidr".to_string(), Value::string("10.0.0.0/16"))]),
            ..Module::default()
        };
        ctx.set_variable("module", Value::object_from([("vpc", vpc.to_value())]));

        let east = Provider {
            provider_type: "aws".into(),
            alias: "east".into(),
            ..Provider::default()
        };
        let default = Provider {
            provider_type: "aws".into(),
            alias: "default".into(),
            ..Provider::default()
        };
        ctx.set_variable(
            "provider",
            Value::object_from([(
                "aws",
                Value::object_from([("east", east.to_value()), ("default", default.to_value())]),
            )]),
        );

        let quality = |name: &str| Quality {
            name: name.into(),
            description: format!("{} works", name),
        };
        ctx.set_variable(
            "quality",
            Value::object_from([
                ("fast", quality("fast").to_value()),
                ("safe", quality("safe").to_value()),
            ]),
        );
        ctx
    }

    fn decode_all(src: &str, ctx: &mut EvalContext) -> (Vec<ScenarioStep>, Diagnostics) {
        let (file, diags) = parse(src, "enos.hcl");
        assert!(!diags.has_errors(), "{}", diags);
        let mut all = Diagnostics::new();
        let mut steps = Vec::new();
        for block in &file.body.blocks {
            let (step, diags) = ScenarioStep::decode(block, ctx);
            step.insert_into_ctx(ctx);
            all.extend(diags);
            steps.push(step);
        }
        (steps, all)
    }

    #[test]
    fn test_decode_steps() {
        let mut ctx = base_ctx();
        let (steps, diags) = decode_all(
            r#"
step "first" {
  module = module.vpc
}

step "second" {
  description = "second step"
  module      = "vpc"
  depends_on  = [step.first, "first_again"]
  verifies    = [quality.safe, quality.fast]
  providers = {
    aws = provider.aws.east
  }

  variables {
    cidr   = "10.1.0.0/16"
    parent = step.first.vpc_id
  }
}

step "first_again" {
  module = module.vpc
}
"#,
            &mut ctx,
        );
        // second references first_again before it is defined
        assert!(diags.has_errors());
        assert_eq!(steps[0].module.source, "./modules/vpc");
        assert!(steps[0].module.attrs.contains_key("cidr"));

        let mut ctx = base_ctx();
        let (steps, diags) = decode_all(
            r#"
step "first" {
  module = module.vpc
}

step "second" {
  description = "second step"
  module      = "vpc"
  depends_on  = [step.first]
  verifies    = [quality.safe, quality.fast]
  providers = {
    aws = provider.aws.east
  }

  variables {
    cidr   = "10.1.0.0/16"
    parent = step.first.vpc_id
  }
}
"#,
            &mut ctx,
        );
        assert!(!diags.has_errors(), "{}", diags);
        let second = &steps[1];
        assert_eq!(second.description, "second step");
        assert_eq!(second.depends_on, vec!["first"]);
        assert_eq!(
            second.verifies.iter().map(|q| q.name.as_str()).collect::<Vec<_>>(),
            vec!["fast", "safe"]
        );
        assert_eq!(second.providers["aws"].alias, "east");
        assert_eq!(
            StepVariable::from_value(&second.module.attrs["cidr"]),
            Some(&StepVariable::Value(Value::string("10.1.0.0/16")))
        );
        assert!(matches!(
            StepVariable::from_value(&second.module.attrs["parent"]),
            Some(StepVariable::Traversal(_))
        ));

        let steps_var = ctx.variable("step").unwrap();
        assert!(steps_var.get_attr("first").is_some());
        assert!(steps_var.get_attr("second").is_some());
    }

    #[test]
    fn test_skip_step() {
        let mut ctx = base_ctx();
        let (steps, diags) = decode_all(
            r#"step "skipped" {
  module    = module.nope
  skip_step = true
}"#,
            &mut ctx,
        );
        assert!(!diags.has_errors(), "{}", diags);
        assert!(steps[0].skip);

        let (_, diags) = decode_all(
            r#"step "bad" {
  module    = module.vpc
  skip_step = "yes"
}"#,
            &mut base_ctx(),
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn test_module_reference_errors() {
        let (_, diags) = decode_all(r#"step "a" { module = "missing" }"#, &mut base_ctx());
        assert!(diags.errors().any(|d| d.summary == "unknown module"));

        let (_, diags) = decode_all(
            r#"step "a" {
  module = { name = "vpc", source = "./elsewhere" }
}"#,
            &mut base_ctx(),
        );
        assert!(
            diags
                .errors()
                .any(|d| d.summary == "module source doesn't match module definition")
        );
    }

    #[test]
    fn test_duplicate_verifies_and_depends() {
        let mut ctx = base_ctx();
        let (_, diags) = decode_all(
            r#"
step "first" {
  module = module.vpc
}

step "second" {
  module     = module.vpc
  depends_on = [step.first, "first"]
}
"#,
            &mut ctx,
        );
        assert_eq!(diags.errors().count(), 1);

        let (_, diags) = decode_all(
            r#"step "a" {
  module   = module.vpc
  verifies = [quality.fast, quality.fast]
}"#,
            &mut base_ctx(),
        );
        assert_eq!(diags.errors().count(), 1);

        let (steps, diags) = decode_all(
            r#"step "a" {
  module   = module.vpc
  verifies = quality.fast
}"#,
            &mut base_ctx(),
        );
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(steps[0].verifies.len(), 1);
    }

    #[test]
    fn test_providers() {
        let (steps, diags) = decode_all(
            r#"step "a" {
  module    = module.vpc
  providers = {
    aws  = "aws.east"
    aws2 = "aws.default"
  }
}"#,
            &mut base_ctx(),
        );
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(diags.warnings().count(), 1);
        assert_eq!(steps[0].providers.len(), 1);

        let (_, diags) = decode_all(
            r#"step "a" {
  module    = module.vpc
  providers = { aws = "aws.west" }
}"#,
            &mut base_ctx(),
        );
        assert!(diags.has_errors());

        let (_, diags) = decode_all(
            r#"step "a" {
  module    = module.vpc
  providers = { aws = "east" }
}"#,
            &mut base_ctx(),
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn test_meta_attrs_rejected_in_variables() {
        let (_, diags) = decode_all(
            r#"step "a" {
  module = module.vpc

  variables {
    count = 2
  }
}"#,
            &mut base_ctx(),
        );
        assert!(diags.has_errors());
    }
}
