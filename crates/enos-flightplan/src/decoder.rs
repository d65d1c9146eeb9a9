// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flight plan decoding.
//!
//! The [`Decoder`] parses raw `enos*.hcl` and `enos*.vars.hcl` files and
//! decodes the top-level blocks up to a [`DecodeTarget`]. Each stage extends
//! the evaluation context used by the stages after it:
//!
//! | Stage | Context variable |
//! |---|---|
//! | variables | `var` |
//! | globals | `global` |
//! | modules | `module` |
//! | providers | `provider` |
//! | terraform settings | `terraform` |
//! | terraform CLIs | `terraform_cli` |
//! | qualities | `quality` |
//!
//! Scenario blocks are kept raw on the [`FlightPlan`] and expanded by a
//! [`ScenarioDecoder`](crate::scenario_decoder::ScenarioDecoder).

use enos_hcl::{
    BlockHeaderSchema, Body, BodySchema, Diagnostic, Diagnostics, EvalContext, Value, base_functions, parse,
};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::file_finder::RawFiles;
use crate::flightplan::FlightPlan;
use crate::scenario::BLOCK_TYPE_SCENARIO;
use crate::scenario_filter::ScenarioFilter;

pub(crate) const BLOCK_TYPE_GLOBALS: &str = "globals";
pub(crate) const BLOCK_TYPE_MODULE: &str = "module";
pub(crate) const BLOCK_TYPE_PROVIDER: &str = "provider";
pub(crate) const BLOCK_TYPE_QUALITY: &str = "quality";
pub(crate) const BLOCK_TYPE_TERRAFORM_CLI: &str = "terraform_cli";
pub(crate) const BLOCK_TYPE_TERRAFORM_SETTING: &str = "terraform";
pub(crate) const BLOCK_TYPE_VARIABLE: &str = "variable";

static FLIGHT_PLAN_SCHEMA: BodySchema = BodySchema {
    attributes: &[],
    blocks: &[
        BlockHeaderSchema::new(BLOCK_TYPE_GLOBALS, &[]),
        BlockHeaderSchema::new(crate::sample::BLOCK_TYPE_SAMPLE, &["name"]),
        BlockHeaderSchema::new(BLOCK_TYPE_TERRAFORM_SETTING, &["name"]),
        BlockHeaderSchema::new(BLOCK_TYPE_TERRAFORM_CLI, &["name"]),
        BlockHeaderSchema::new(BLOCK_TYPE_PROVIDER, &["type", "alias"]),
        BlockHeaderSchema::new(BLOCK_TYPE_SCENARIO, &["name"]),
        BlockHeaderSchema::new(BLOCK_TYPE_MODULE, &["name"]),
        BlockHeaderSchema::new(BLOCK_TYPE_VARIABLE, &["name"]),
        BlockHeaderSchema::new(BLOCK_TYPE_QUALITY, &["name"]),
    ],
};

/// How deep a flight plan is decoded.
///
/// Targets are ordered. Scenario targets below
/// [`DecodeTarget::ScenariosOutlines`] are shallow: they skip the modules,
/// providers and terraform blocks that only fully decoded scenarios need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeTarget {
    /// Not configured. Decoding fails.
    #[default]
    Unset,
    /// `variable` blocks.
    Variables,
    /// `globals` blocks.
    Globals,
    /// `module` blocks.
    Modules,
    /// `provider` blocks.
    Providers,
    /// `terraform` blocks.
    TerraformSettings,
    /// `terraform_cli` blocks.
    TerraformClis,
    /// `quality` blocks.
    Qualities,
    /// `sample` blocks, without decoding scenarios.
    Samples,
    /// Scenario names only.
    ScenariosNamesNoVariants,
    /// Scenario names and expanded matrices.
    ScenariosMatrixOnly,
    /// One scenario per variant, names only.
    ScenariosNamesExpandVariants,
    /// One fully decoded scenario per block.
    ScenariosOutlines,
    /// Every scenario fully decoded.
    ScenariosComplete,
    /// Every scenario fully decoded, and samples.
    All,
}

impl fmt::Display for DecodeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecodeTarget::Unset => "unset",
            DecodeTarget::Variables => "variables",
            DecodeTarget::Globals => "globals",
            DecodeTarget::Modules => "modules",
            DecodeTarget::Providers => "providers",
            DecodeTarget::TerraformSettings => "terraform_settings",
            DecodeTarget::TerraformClis => "terraform_clis",
            DecodeTarget::Qualities => "qualities",
            DecodeTarget::Samples => "samples",
            DecodeTarget::ScenariosNamesNoVariants => "scenarios_names_no_variants",
            DecodeTarget::ScenariosMatrixOnly => "scenarios_matrix_only",
            DecodeTarget::ScenariosNamesExpandVariants => "scenarios_names_expand_variants",
            DecodeTarget::ScenariosOutlines => "scenarios_outlines",
            DecodeTarget::ScenariosComplete => "scenarios_complete",
            DecodeTarget::All => "all",
        };
        f.write_str(s)
    }
}

impl DecodeTarget {
    /// Returns true if decoding to this target runs `stage`.
    pub fn includes(self, stage: DecodeTarget) -> bool {
        use DecodeTarget::*;
        match stage {
            Unset => false,
            Variables | Globals => self >= stage,
            Modules | Providers | TerraformSettings | TerraformClis => self >= stage && !self.is_shallow(),
            Qualities => self >= Qualities && self != Samples,
            Samples => matches!(self, Samples | All),
            _ => self >= stage,
        }
    }

    /// Returns true if this target expands scenario blocks.
    pub fn decodes_scenarios(self) -> bool {
        self >= DecodeTarget::ScenariosNamesNoVariants
    }

    fn is_shallow(self) -> bool {
        matches!(
            self,
            DecodeTarget::Samples
                | DecodeTarget::ScenariosNamesNoVariants
                | DecodeTarget::ScenariosMatrixOnly
                | DecodeTarget::ScenariosNamesExpandVariants
        )
    }
}

/// Decodes raw configuration files into a [`FlightPlan`].
///
/// # Example
///
/// ```no_run
/// use enos_flightplan::{DecodeTarget, Workspace};
///
/// # async fn run() -> enos_flightplan::Result<()> {
/// let ws = Workspace::load("./enos")?;
/// let (fp, diags) = ws
///     .decoder()?
///     .with_target(DecodeTarget::ScenariosComplete)
///     .decode_all()
///     .await;
/// assert!(!diags.has_errors());
/// for scenario in fp.scenarios() {
///     println!("{}", scenario);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Decoder {
    base_dir: PathBuf,
    fp_files: RawFiles,
    var_files: RawFiles,
    env: Vec<String>,
    target: DecodeTarget,
    filter: ScenarioFilter,
    config: Config,
}

impl Decoder {
    /// A decoder rooted at `base_dir`, decoding everything.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            fp_files: RawFiles::new(),
            var_files: RawFiles::new(),
            env: Vec::new(),
            target: DecodeTarget::All,
            filter: ScenarioFilter::select_all(),
            config: Config::default(),
        }
    }

    /// Sets the flight plan file contents.
    pub fn with_fp_files(mut self, files: RawFiles) -> Self {
        self.fp_files = files;
        self
    }

    /// Sets the variables file contents.
    pub fn with_var_files(mut self, files: RawFiles) -> Self {
        self.var_files = files;
        self
    }

    /// Sets `KEY=value` environment entries. Only `ENOS_VAR_` entries are used.
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    /// Sets the decode target.
    pub fn with_target(mut self, target: DecodeTarget) -> Self {
        self.target = target;
        self
    }

    /// Sets the scenario filter used by [`Decoder::decode_all`].
    pub fn with_filter(mut self, filter: ScenarioFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the scenario decoder configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// The decode target.
    pub fn target(&self) -> DecodeTarget {
        self.target
    }

    /// Decodes every top-level block up to the target. Scenario blocks are
    /// kept on the flight plan but not expanded.
    pub fn decode(&self) -> (FlightPlan, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut fp = FlightPlan::new(self.base_dir.clone());

        if self.base_dir.as_os_str().is_empty() {
            diags.push(Diagnostic::error(
                "unable to decode flight plan without a base directory",
                "",
            ));
            return (fp, diags);
        }

        let (fp_bodies, more) = parse_files(&self.fp_files);
        diags.extend(more);
        let (var_bodies, more) = parse_files(&self.var_files);
        diags.extend(more);
        if diags.has_errors() {
            return (fp, diags);
        }

        let body = Body::merge(fp_bodies);
        let vars_body = Body::merge(var_bodies);

        if self.target == DecodeTarget::Unset {
            diags.push(
                Diagnostic::error("Flight plan decode target level must be configured", "")
                    .with_subject(&body.missing_item_range()),
            );
            return (fp, diags);
        }

        let (content, more) = body.content(&FLIGHT_PLAN_SCHEMA);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return (fp, diags);
        }

        let mut ctx = EvalContext::with_functions(Arc::new(base_functions(&self.base_dir)));
        ctx.set_variable(
            "path",
            Value::object_from([("root", Value::string(self.base_dir.to_string_lossy()))]),
        );

        macro_rules! stage {
            ($stage:expr, $e:expr) => {
                if self.target.includes($stage) {
                    let more = $e;
                    debug!(stage = %$stage, diagnostics = more.len(), "decoded flight plan stage");
                    let failed = more.has_errors();
                    diags.extend(more);
                    if failed {
                        return (fp, diags);
                    }
                }
            };
        }

        stage!(
            DecodeTarget::Variables,
            fp.decode_variables(&content, &vars_body, &self.env, &mut ctx)
        );
        stage!(DecodeTarget::Globals, fp.decode_globals(&content, &mut ctx));
        stage!(DecodeTarget::Modules, fp.decode_modules(&content, &mut ctx));
        stage!(DecodeTarget::Providers, fp.decode_providers(&content, &mut ctx));
        stage!(
            DecodeTarget::TerraformSettings,
            fp.decode_terraform_settings(&content, &mut ctx)
        );
        stage!(DecodeTarget::TerraformClis, fp.decode_terraform_clis(&content, &mut ctx));
        stage!(DecodeTarget::Qualities, fp.decode_qualities(&content, &mut ctx));

        let ctx = Arc::new(ctx);
        stage!(DecodeTarget::Samples, fp.decode_samples(&content, &ctx));

        fp.set_scenario_sources(
            Arc::clone(&ctx),
            content
                .blocks_of_type(BLOCK_TYPE_SCENARIO)
                .into_iter()
                .cloned()
                .map(Arc::new)
                .collect(),
        );

        (fp, diags)
    }

    /// Decodes the flight plan and, when the target includes scenarios,
    /// expands the scenario blocks that match the filter.
    pub async fn decode_all(&self) -> (FlightPlan, Diagnostics) {
        let (mut fp, mut diags) = self.decode();
        if diags.has_errors() || !self.target.decodes_scenarios() {
            return (fp, diags);
        }

        let decoder = fp.scenario_decoder(self.target, self.filter.clone(), self.config.clone());
        let (blocks, more) = decoder.decode_all().await;
        diags.extend(more);
        fp.scenario_blocks = blocks;

        (fp, diags)
    }
}

fn parse_files(files: &RawFiles) -> (Vec<Body>, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut bodies = Vec::with_capacity(files.len());
    for (path, src) in files {
        let (file, more) = parse(src, &path.to_string_lossy());
        diags.extend(more);
        bodies.push(file.body);
    }
    (bodies, diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Vector;
    use std::path::Path;

    fn files(entries: &[(&str, &str)]) -> RawFiles {
        entries
            .iter()
            .map(|(name, src)| (Path::new("/enos").join(name), src.to_string()))
            .collect()
    }

    const FLIGHT_PLAN: &str = r#"
variable "region" {
  type    = string
  default = "us-east-1"
}

variable "arches" {
  type    = list(string)
  default = ["amd64"]
}

globals {
  prefix = "enos"
  bucket = "${global.prefix}-${var.region}"
}

module "vpc" {
  source = "./modules/vpc"
  region = var.region
}

provider "aws" "east" {
  region = var.region
}

quality "has_vpc" {
  description = "The VPC exists"
}

scenario "smoke" {
  matrix {
    arch = var.arches
  }

  providers = [provider.aws.east]

  step "vpc" {
    module   = module.vpc
    verifies = quality.has_vpc
  }

  output "bucket" {
    value = global.bucket
  }
}
"#;

    fn decoder() -> Decoder {
        Decoder::new("/enos").with_fp_files(files(&[("enos.hcl", FLIGHT_PLAN)]))
    }

    #[test]
    fn test_target_order() {
        assert!(DecodeTarget::Unset < DecodeTarget::Variables);
        assert!(DecodeTarget::ScenariosComplete < DecodeTarget::All);
        assert!(DecodeTarget::All.includes(DecodeTarget::Modules));
        assert!(DecodeTarget::All.includes(DecodeTarget::Samples));
        assert!(DecodeTarget::Samples.includes(DecodeTarget::Samples));
        assert!(!DecodeTarget::Samples.includes(DecodeTarget::Modules));
        assert!(!DecodeTarget::Samples.includes(DecodeTarget::Qualities));
        assert!(!DecodeTarget::ScenariosMatrixOnly.includes(DecodeTarget::Providers));
        assert!(!DecodeTarget::ScenariosComplete.includes(DecodeTarget::Samples));
        assert!(DecodeTarget::ScenariosOutlines.includes(DecodeTarget::TerraformClis));
        assert!(!DecodeTarget::Globals.includes(DecodeTarget::Modules));
        assert_eq!(DecodeTarget::ScenariosMatrixOnly.to_string(), "scenarios_matrix_only");
    }

    #[test]
    fn test_decode_requires_target_and_base_dir() {
        let (_, diags) = decoder().with_target(DecodeTarget::Unset).decode();
        assert!(
            diags
                .errors()
                .any(|d| d.summary == "Flight plan decode target level must be configured")
        );

        let (_, diags) = Decoder::new("").decode();
        assert!(
            diags
                .errors()
                .any(|d| d.summary == "unable to decode flight plan without a base directory")
        );
    }

    #[test]
    fn test_decode_top_level_blocks() {
        let (fp, diags) = decoder().with_target(DecodeTarget::Qualities).decode();
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(fp.base_dir, Path::new("/enos"));
        assert_eq!(fp.modules.len(), 1);
        assert_eq!(fp.modules[0].source, "./modules/vpc");
        assert_eq!(fp.providers.len(), 1);
        assert_eq!(fp.providers[0].address(), "aws.east");
        assert_eq!(fp.qualities.len(), 1);
        assert!(fp.terraform_clis.iter().any(|c| c.name == "default"));
        assert_eq!(
            fp.eval_context().variable("global").and_then(|g| g.get_attr("bucket")),
            Some(&Value::string("enos-us-east-1"))
        );
    }

    #[test]
    fn test_shallow_targets_skip_modules() {
        let (fp, diags) = decoder().with_target(DecodeTarget::ScenariosMatrixOnly).decode();
        assert!(!diags.has_errors(), "{}", diags);
        assert!(fp.modules.is_empty());
        assert!(fp.providers.is_empty());
        assert_eq!(fp.scenario_block_count(), 1);
    }

    #[test]
    fn test_env_overrides_var_files() {
        let d = decoder()
            .with_target(DecodeTarget::Variables)
            .with_var_files(files(&[("enos.vars.hcl", "region = \"us-west-2\"\narches = [\"arm64\", \"amd64\"]\n")]))
            .with_env(vec![
                "ENOS_VAR_region=eu-central-1".to_string(),
                "PATH=/bin".to_string(),
            ]);
        let (fp, diags) = d.decode();
        assert!(!diags.has_errors(), "{}", diags);
        let vars = fp.eval_context().variable("var").unwrap();
        assert_eq!(vars.get_attr("region"), Some(&Value::string("eu-central-1")));
        assert_eq!(vars.get_attr("arches").and_then(Value::length), Some(2));
    }

    #[test]
    fn test_variable_declared_in_vars_file() {
        let d = decoder()
            .with_target(DecodeTarget::Variables)
            .with_var_files(files(&[("enos.vars.hcl", "variable \"oops\" {}\n")]));
        let (_, diags) = d.decode();
        assert!(
            diags
                .errors()
                .any(|d| d.summary == "Variable declaration in enos.vars.hcl file")
        );
    }

    #[test]
    fn test_duplicate_provider() {
        let src = r#"
provider "aws" "east" {
  region = "us-east-1"
}

provider "aws" "east" {
  region = "us-east-2"
}
"#;
        let (_, diags) = Decoder::new("/enos")
            .with_fp_files(files(&[("enos.hcl", src)]))
            .with_target(DecodeTarget::Providers)
            .decode();
        assert!(
            diags
                .errors()
                .any(|d| d.summary == "provider and alias has been previously defined")
        );
    }

    #[test]
    fn test_unknown_top_level_block() {
        let (_, diags) = Decoder::new("/enos")
            .with_fp_files(files(&[("enos.hcl", "resource \"a\" \"b\" {}\n")]))
            .decode();
        assert!(diags.has_errors());
    }

    #[test]
    fn test_parse_errors_from_every_file() {
        let (_, diags) = decoder()
            .with_var_files(files(&[("enos.vars.hcl", "region = \n")]))
            .decode();
        assert!(diags.has_errors());
        assert!(diags.iter().any(|d| {
            d.subject
                .as_ref()
                .is_some_and(|r| r.filename.ends_with("enos.vars.hcl"))
        }));
    }

    #[tokio::test]
    async fn test_decode_all_expands_scenarios() {
        let (fp, diags) = decoder()
            .with_target(DecodeTarget::ScenariosComplete)
            .with_var_files(files(&[("enos.vars.hcl", "arches = [\"arm64\", \"amd64\"]\n")]))
            .decode_all()
            .await;
        assert!(!diags.has_errors(), "{}", diags);

        let scenarios = fp.scenarios();
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].variants, Vector::from_pairs([("arch", "amd64")]));
        assert_eq!(scenarios[1].variants, Vector::from_pairs([("arch", "arm64")]));
        assert_eq!(scenarios[0].providers[0].address(), "aws.east");
        assert_eq!(scenarios[0].steps[0].verifies[0].name, "has_vpc");
    }
}
