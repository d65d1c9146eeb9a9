// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The decoded flight plan.

use enos_hcl::{Block, Body, BodyContent, Diagnostic, Diagnostics, EvalContext, Range, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::decoder::{
    BLOCK_TYPE_GLOBALS, BLOCK_TYPE_MODULE, BLOCK_TYPE_PROVIDER, BLOCK_TYPE_QUALITY, BLOCK_TYPE_TERRAFORM_CLI,
    BLOCK_TYPE_TERRAFORM_SETTING, BLOCK_TYPE_VARIABLE, DecodeTarget,
};
use crate::module::Module;
use crate::provider::Provider;
use crate::quality::Quality;
use crate::sample::{BLOCK_TYPE_SAMPLE, Sample};
use crate::scenario::Scenario;
use crate::scenario_decoder::{ScenarioBlock, ScenarioDecoder};
use crate::scenario_filter::ScenarioFilter;
use crate::terraform_cli::{DEFAULT_TERRAFORM_CLI_NAME, TerraformCli};
use crate::terraform_setting::TerraformSetting;
use crate::variable::{Variable, VariableValue, VariableValueSource, values_from_env};
use crate::verify::{verify_block_has_n_labels, verify_block_labels_are_valid_identifiers, verify_no_blocks};

/// Everything decoded from a directory of `enos*.hcl` files.
///
/// The flight plan is read-only once the decoder returns it.
#[derive(Debug, Clone, Default)]
pub struct FlightPlan {
    /// Absolute directory the configuration was loaded from.
    pub base_dir: PathBuf,
    /// `module` blocks.
    pub modules: Vec<Module>,
    /// `provider` blocks.
    pub providers: Vec<Provider>,
    /// `terraform` blocks.
    pub terraform_settings: Vec<TerraformSetting>,
    /// `terraform_cli` blocks, including the implicit default.
    pub terraform_clis: Vec<TerraformCli>,
    /// `quality` blocks.
    pub qualities: Vec<Quality>,
    /// `sample` blocks.
    pub samples: Vec<Sample>,
    /// Expanded scenario blocks. Empty until scenarios are decoded.
    pub scenario_blocks: Vec<ScenarioBlock>,
    eval_ctx: Arc<EvalContext>,
    scenario_sources: Vec<Arc<Block>>,
}

impl FlightPlan {
    /// An empty flight plan rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Every decoded scenario, ordered by name and variants.
    pub fn scenarios(&self) -> Vec<&Scenario> {
        self.scenario_blocks.iter().flat_map(|b| b.scenarios.iter()).collect()
    }

    /// The evaluation context scenarios are decoded in.
    pub fn eval_context(&self) -> &Arc<EvalContext> {
        &self.eval_ctx
    }

    /// Number of raw `scenario` blocks.
    pub fn scenario_block_count(&self) -> usize {
        self.scenario_sources.len()
    }

    /// A decoder that expands this flight plan's scenario blocks.
    pub fn scenario_decoder(&self, target: DecodeTarget, filter: ScenarioFilter, config: Config) -> ScenarioDecoder {
        ScenarioDecoder::new(
            Arc::clone(&self.eval_ctx),
            self.scenario_sources.clone(),
            target,
            filter,
            config,
        )
    }

    /// Filters the scenario blocks and expands their matrices without
    /// decoding any scenario bodies.
    pub fn decode_scenario_blocks(&self, filter: &ScenarioFilter) -> (Vec<ScenarioBlock>, Diagnostics) {
        self.scenario_decoder(DecodeTarget::ScenariosMatrixOnly, filter.clone(), Config::default())
            .decode_blocks()
    }

    /// Looks up a sample by name.
    pub fn find_sample(&self, name: &str) -> Option<&Sample> {
        self.samples.iter().find(|s| s.name == name)
    }

    /// Sample names, sorted.
    pub fn sample_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.samples.iter().map(|s| s.name.clone()).collect();
        names.sort();
        names
    }

    pub(crate) fn set_scenario_sources(&mut self, ctx: Arc<EvalContext>, blocks: Vec<Arc<Block>>) {
        self.eval_ctx = ctx;
        self.scenario_sources = blocks;
    }

    /// Decodes `variable` blocks and binds `var`. Values come from the
    /// variables files and `ENOS_VAR_` entries, with the environment winning.
    pub(crate) fn decode_variables(
        &mut self,
        content: &BodyContent<'_>,
        vars_body: &Body,
        env: &[String],
        ctx: &mut EvalContext,
    ) -> Diagnostics {
        let mut diags = Diagnostics::new();

        for block in vars_body.blocks.iter().filter(|b| b.type_name == BLOCK_TYPE_VARIABLE) {
            let name = block.labels.first().cloned().unwrap_or_default();
            diags.push(
                Diagnostic::error(
                    "Variable declaration in enos.vars.hcl file",
                    format!(
                        "An enos.vars.hcl file is used to assign values to variables that have already been \
                         declared in enos.hcl files, not to declare new variables. To declare variable {:?}, \
                         place this block in one of your enos.hcl files.\n\nTo set a value for this variable \
                         in {}, use the definition syntax instead:\n    {} = <value>",
                        name, block.type_range.filename, name
                    ),
                )
                .with_subject(&block.type_range),
            );
        }
        if diags.has_errors() {
            return diags;
        }

        let more = verify_no_blocks(vars_body);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return diags;
        }

        let (attrs, more) = vars_body.just_attributes();
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return diags;
        }

        let mut values: BTreeMap<String, VariableValue> = attrs
            .into_iter()
            .map(|attr| {
                (
                    attr.name.clone(),
                    VariableValue {
                        source: VariableValueSource::VarsFile(attr.expr.clone()),
                        range: attr.range.clone(),
                    },
                )
            })
            .collect();
        values.extend(values_from_env(env));

        let mut vars = BTreeMap::new();
        for block in content.blocks_of_type(BLOCK_TYPE_VARIABLE) {
            let more = verify_block_labels_are_valid_identifiers(block);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            let (variable, more) = Variable::decode(block, &values);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            vars.insert(variable.name.clone(), variable.value());
        }

        ctx.set_variable("var", Value::object(vars));
        diags
    }

    /// Decodes `globals` blocks and binds `global`. Attributes are evaluated
    /// in source order so later globals can refer to earlier ones.
    pub(crate) fn decode_globals(&mut self, content: &BodyContent<'_>, ctx: &mut EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let mut globals = BTreeMap::new();

        for block in content.blocks_of_type(BLOCK_TYPE_GLOBALS) {
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
            attrs.sort_by_key(|a| a.range.start.byte);

            for attr in attrs {
                let (val, more) = attr.expr.value(ctx);
                let failed = more.has_errors();
                diags.extend(more);
                if failed {
                    continue;
                }

                globals.insert(attr.name.clone(), val);
                ctx.set_variable("global", Value::object(globals.clone()));
            }
        }

        ctx.set_variable("global", Value::object(globals));
        diags
    }

    /// Decodes `module` blocks and binds `module`.
    pub(crate) fn decode_modules(&mut self, content: &BodyContent<'_>, ctx: &mut EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let mut mods = BTreeMap::new();

        for block in content.blocks_of_type(BLOCK_TYPE_MODULE) {
            let more = verify_block_labels_are_valid_identifiers(block);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            let (module, more) = Module::decode(block, ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            mods.insert(module.name.clone(), module.to_value());
            self.modules.push(module);
        }

        ctx.set_variable("module", Value::object(mods));
        diags
    }

    /// Decodes `provider` blocks and binds `provider.<type>.<alias>`.
    pub(crate) fn decode_providers(&mut self, content: &BodyContent<'_>, ctx: &mut EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let mut providers: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();

        for block in content.blocks_of_type(BLOCK_TYPE_PROVIDER) {
            let more = verify_block_labels_are_valid_identifiers(block);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            let more = verify_block_has_n_labels(block, 2);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            let (provider, more) = Provider::decode(block, ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            let aliases = providers.entry(provider.provider_type.clone()).or_default();
            if aliases.contains_key(&provider.alias) {
                let subject = match block.label_ranges.as_slice() {
                    [t, a, ..] => Range::between(t, a),
                    _ => block.def_range.clone(),
                };
                diags.push(
                    Diagnostic::error(
                        "provider and alias has been previously defined",
                        format!(
                            "provider {} with alias {} has already been defined",
                            provider.provider_type, provider.alias
                        ),
                    )
                    .with_subject(&subject)
                    .with_context(&block.def_range),
                );
                continue;
            }

            aliases.insert(provider.alias.clone(), provider.to_value());
            self.providers.push(provider);
        }

        ctx.set_variable(
            "provider",
            Value::object_from(
                providers
                    .into_iter()
                    .map(|(ptype, aliases)| (ptype, Value::object(aliases))),
            ),
        );
        diags
    }

    /// Decodes `terraform` blocks and binds `terraform`.
    pub(crate) fn decode_terraform_settings(
        &mut self,
        content: &BodyContent<'_>,
        ctx: &mut EvalContext,
    ) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let mut settings = BTreeMap::new();

        for block in content.blocks_of_type(BLOCK_TYPE_TERRAFORM_SETTING) {
            let more = verify_block_labels_are_valid_identifiers(block);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            let (setting, more) = TerraformSetting::decode(block, ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            settings.insert(setting.name.clone(), setting.to_value());
            self.terraform_settings.push(setting);
        }

        ctx.set_variable("terraform", Value::object(settings));
        diags
    }

    /// Decodes `terraform_cli` blocks and binds `terraform_cli`, adding the
    /// default CLI when none is named `default`.
    pub(crate) fn decode_terraform_clis(&mut self, content: &BodyContent<'_>, ctx: &mut EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let mut clis = BTreeMap::new();

        for block in content.blocks_of_type(BLOCK_TYPE_TERRAFORM_CLI) {
            let more = verify_block_labels_are_valid_identifiers(block);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            let (cli, more) = TerraformCli::decode(block, ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            clis.insert(cli.name.clone(), cli.to_value());
            self.terraform_clis.push(cli);
        }

        if !clis.contains_key(DEFAULT_TERRAFORM_CLI_NAME) {
            let cli = TerraformCli::default_cli();
            clis.insert(cli.name.clone(), cli.to_value());
            self.terraform_clis.push(cli);
        }

        ctx.set_variable("terraform_cli", Value::object(clis));
        diags
    }

    /// Decodes `quality` blocks and binds `quality`.
    pub(crate) fn decode_qualities(&mut self, content: &BodyContent<'_>, ctx: &mut EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let mut qualities = BTreeMap::new();
        let mut seen = BTreeSet::new();

        for block in content.blocks_of_type(BLOCK_TYPE_QUALITY) {
            let more = verify_block_labels_are_valid_identifiers(block);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            let (quality, more) = Quality::decode(block, ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            if !seen.insert(quality.name.clone()) {
                diags.push(
                    Diagnostic::error(
                        "quality has been previously defined",
                        format!("a quality named {} has already been defined", quality.name),
                    )
                    .with_subject(&block.def_range),
                );
                continue;
            }

            qualities.insert(quality.name.clone(), quality.to_value());
            self.qualities.push(quality);
        }

        ctx.set_variable("quality", Value::object(qualities));
        diags
    }

    /// Decodes `sample` blocks. Subsets are not checked against scenarios.
    pub(crate) fn decode_samples(&mut self, content: &BodyContent<'_>, ctx: &Arc<EvalContext>) -> Diagnostics {
        let mut diags = Diagnostics::new();

        for block in content.blocks_of_type(BLOCK_TYPE_SAMPLE) {
            let more = verify_block_labels_are_valid_identifiers(block);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            let name = block.labels.first().map(String::as_str).unwrap_or_default();
            if self.find_sample(name).is_some() {
                diags.push(
                    Diagnostic::error(
                        "sample has been previously defined",
                        format!("a sample named {} has already been defined", name),
                    )
                    .with_subject(&block.def_range),
                );
                continue;
            }

            let (sample, more) = Sample::decode(block, ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            self.samples.push(sample);
        }

        diags
    }
}
