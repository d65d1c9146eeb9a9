// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Terraform root module generation.
//!
//! Each scenario instance is written to `<out_dir>/<uid>/`:
//!
//! ```text
//! <out_dir>/<uid>/scenario.tf    terraform, provider, module and output blocks
//! <out_dir>/<uid>/terraform.rc   CLI configuration, when the scenario's CLI has one
//! ```
//!
//! Steps become `module` blocks in step order, each depending on the previous
//! rendered step. Local module sources (`./` or `../`) are rewritten relative
//! to the generated module directory so Terraform still treats them as local.

use enos_hcl::{Diagnostic, Diagnostics, Value, WriteBody, WriteExpr};
use std::fs;
use std::io::Write as _;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::decoder::DecodeTarget;
use crate::error::{Error, Result};
use crate::scenario::Scenario;
use crate::scenario_filter::ScenarioFilter;
use crate::step_variable::value_to_write_expr;
use crate::workspace::Workspace;

/// Name of the generated Terraform configuration file.
pub const SCENARIO_FILE_NAME: &str = "scenario.tf";

/// Name of the generated Terraform CLI configuration file.
pub const RC_FILE_NAME: &str = "terraform.rc";

/// Default output directory, relative to the flight plan directory.
pub const DEFAULT_OUT_DIR: &str = ".enos";

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Files written for one scenario instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedModule {
    /// The instance's filter string.
    pub scenario: String,
    /// Directory holding the generated files.
    pub dir: PathBuf,
    /// Path of `scenario.tf`.
    pub scenario_path: PathBuf,
    /// Path of `terraform.rc`, when one was written.
    pub rc_path: Option<PathBuf>,
}

/// Generates the root module of a single scenario instance.
#[derive(Debug, Clone, Default)]
pub struct Generator<'a> {
    scenario: Option<&'a Scenario>,
    base_dir: Option<PathBuf>,
    out_dir: Option<PathBuf>,
}

impl<'a> Generator<'a> {
    /// A generator with nothing configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scenario instance to generate.
    pub fn with_scenario(mut self, scenario: &'a Scenario) -> Self {
        self.scenario = Some(scenario);
        self
    }

    /// Sets the flight plan directory that local module sources are relative to.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Sets the root output directory.
    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = Some(out_dir.into());
        self
    }

    fn parts(&self) -> Result<(&'a Scenario, &Path, &Path)> {
        let scenario = self
            .scenario
            .ok_or_else(|| Error::InvalidGenerator("unable to generate without a scenario".to_string()))?;
        let base_dir = self
            .base_dir
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| Error::InvalidGenerator("unable to generate without a base directory".to_string()))?;
        let out_dir = self
            .out_dir
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| Error::InvalidGenerator("unable to generate without an out directory".to_string()))?;
        Ok((scenario, base_dir, out_dir))
    }

    /// Directory the scenario's files are written to.
    pub fn module_dir(&self) -> Result<PathBuf> {
        let (scenario, _, out_dir) = self.parts()?;
        Ok(out_dir.join(scenario.uid()))
    }

    /// Renders `scenario.tf` without writing it.
    pub fn render(&self) -> Result<String> {
        let (scenario, base_dir, _) = self.parts()?;
        let module_dir = self.module_dir()?;
        render_scenario(scenario, base_dir, &module_dir)
    }

    /// Writes the scenario's files.
    pub fn generate(&self) -> Result<GeneratedModule> {
        let (scenario, _, _) = self.parts()?;
        let dir = self.module_dir()?;
        let contents = self.render()?;

        ensure_dir(&dir)?;
        let scenario_path = dir.join(SCENARIO_FILE_NAME);
        write_file(&scenario_path, contents.as_bytes())?;

        let rc_path = match scenario.terraform_cli.rc_file() {
            Some(rc) => {
                let path = dir.join(RC_FILE_NAME);
                write_file(&path, rc.as_bytes())?;
                Some(path)
            }
            None => None,
        };

        info!(
            scenario = %scenario.filter_str(),
            dir = %dir.display(),
            rc_file = rc_path.is_some(),
            "generated scenario module"
        );

        Ok(GeneratedModule {
            scenario: scenario.filter_str(),
            dir,
            scenario_path,
            rc_path,
        })
    }
}

fn render_scenario(scenario: &Scenario, base_dir: &Path, module_dir: &Path) -> Result<String> {
    let mut body = WriteBody::new();

    if let Some(setting) = &scenario.terraform_setting {
        body.append_block(setting.to_write_block());
    }

    for provider in &scenario.providers {
        let block = body.append_new_block("provider", &[provider.provider_type.as_str()]);
        block.set_attribute_value("alias", Value::string(&provider.alias));
        provider.config.write_body(block);
    }

    let mut previous: Option<&str> = None;
    for step in scenario.steps.iter().filter(|s| !s.skip) {
        let block = body.append_new_block("module", &[step.name.as_str()]);

        let source = maybe_update_relative_source(&step.module.source, base_dir, module_dir)?;
        block.set_attribute_value("source", Value::string(source));
        if !step.module.version.is_empty() {
            block.set_attribute_value("version", Value::string(&step.module.version));
        }

        let mut depends_on: Vec<&str> = previous.into_iter().collect();
        for name in &step.depends_on {
            let rendered = scenario.steps.iter().any(|s| s.name == *name && !s.skip);
            if rendered && !depends_on.contains(&name.as_str()) {
                depends_on.push(name);
            }
        }
        if !depends_on.is_empty() {
            let refs = depends_on.iter().map(|n| WriteExpr::Raw(format!("module.{}", n))).collect();
            block.set_attribute("depends_on", WriteExpr::Tuple(refs));
        }

        if !step.providers.is_empty() {
            let providers = step
                .providers
                .iter()
                .map(|(name, p)| (name.clone(), WriteExpr::Raw(p.address())))
                .collect();
            block.set_attribute("providers", WriteExpr::Object(providers));
        }

        if !step.module.attrs.is_empty() {
            block.append_newline();
            for (name, val) in &step.module.attrs {
                block.set_attribute(name.as_str(), value_to_write_expr(val));
            }
        }

        previous = Some(step.name.as_str());
    }

    for output in &scenario.outputs {
        let block = body.append_new_block("output", &[output.name.as_str()]);
        if !output.description.is_empty() {
            block.set_attribute_value("description", Value::string(&output.description));
        }
        if output.sensitive {
            block.set_attribute_value("sensitive", Value::Bool(true));
        }
        block.set_attribute("value", value_to_write_expr(&output.value));
    }

    Ok(body.to_hcl())
}

/// Rewrites a local module source so it resolves from `out_dir`. Absolute
/// paths and registry, VCS or URL sources are returned unchanged.
pub fn maybe_update_relative_source(source: &str, base_dir: &Path, out_dir: &Path) -> Result<String> {
    if !(source.starts_with("./") || source.starts_with("../")) {
        return Ok(source.to_string());
    }

    let from = std::path::absolute(out_dir)?;
    let to = std::path::absolute(base_dir.join(source))?;
    Ok(relative_path(&from, &to))
}

/// The shortest path from directory `from` to `to`, always starting with
/// `./` or `../`. Both paths are cleaned lexically.
pub fn relative_path(from: &Path, to: &Path) -> String {
    let from = clean_components(from);
    let to = clean_components(to);
    if from == to {
        return "./".to_string();
    }

    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let steps_back = from.len() - common;
    let rest = to[common..].join("/");

    if steps_back == 0 {
        return format!("./{}", rest);
    }
    format!("{}{}", "../".repeat(steps_back), rest)
}

fn clean_components(path: &Path) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(p) => parts.push(p.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    parts
}

fn ensure_dir(dir: &Path) -> Result<()> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(Error::InvalidGenerator(format!(
                "out directory path ({}) is not a directory",
                dir.display()
            )));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(dir)?;
    debug!(dir = %dir.display(), "created module directory");
    Ok(())
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut opts = fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(FILE_MODE);
    }
    let mut file = opts.open(path)?;
    file.write_all(contents)?;
    Ok(())
}

/// A request to decode a workspace and generate a module for every
/// scenario instance the filter selects.
#[derive(Debug, Clone)]
pub struct GenerateReq {
    /// The flight plan to generate from.
    pub workspace: Workspace,
    /// Selects the scenario instances.
    pub filter: ScenarioFilter,
    /// Decoder tuning.
    pub config: Config,
}

impl GenerateReq {
    /// Generates every instance selected by `filter`.
    pub fn new(workspace: Workspace, filter: ScenarioFilter) -> Self {
        Self {
            workspace,
            filter,
            config: Config::default(),
        }
    }

    /// Sets the decoder configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// The output root: the workspace's out dir, or `.enos` in the flight
    /// plan directory.
    pub fn out_dir(&self) -> PathBuf {
        self.workspace
            .out_dir
            .clone()
            .unwrap_or_else(|| self.workspace.base_dir.join(DEFAULT_OUT_DIR))
    }

    /// Decodes the selected scenarios and writes their modules. Generation
    /// stops at the first failure.
    pub async fn generate(&self) -> (Vec<GeneratedModule>, Diagnostics) {
        let decoder = match self.workspace.decoder() {
            Ok(d) => d,
            Err(e) => return (Vec::new(), e.into_diagnostics()),
        };
        let (fp, mut diags) = decoder
            .with_target(DecodeTarget::All)
            .with_filter(self.filter.clone())
            .with_config(self.config.clone())
            .decode_all()
            .await;
        if diags.has_errors() {
            return (Vec::new(), diags);
        }

        let out_dir = self.out_dir();
        let mut generated = Vec::new();
        for scenario in fp.scenarios() {
            let res = Generator::new()
                .with_scenario(scenario)
                .with_base_dir(&fp.base_dir)
                .with_out_dir(&out_dir)
                .generate();
            match res {
                Ok(module) => generated.push(module),
                Err(e) => {
                    diags.push(Diagnostic::error(
                        format!("unable to generate scenario {}", scenario.filter_str()),
                        e.to_string(),
                    ));
                    break;
                }
            }
        }

        info!(modules = generated.len(), out_dir = %out_dir.display(), "generated scenario modules");
        (generated, diags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Vector;
    use crate::module::Module;
    use crate::provider::Provider;
    use crate::scenario_step::ScenarioStep;
    use crate::terraform_cli::TerraformCli;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_relative_path() {
        let cases = [
            ("/Users/enos/scenarios", "/tmp/out", "./modules/foo", "../../Users/enos/scenarios/modules/foo"),
            ("/Users/enos/scenarios", "/tmp/out", "../modules/foo", "../../Users/enos/modules/foo"),
            ("/Users/enos", "/Users/enos", "./", "./"),
            ("/Users/enos", "/Users/enos", "./modules/foo", "./modules/foo"),
            ("/Users/enos", "/Users/sone", "./modules/foo", "../enos/modules/foo"),
            ("/Users/enos", "/Users/enos/out", "./modules/foo", "../modules/foo"),
            (
                "/Users/enos/projects/enos/scenarios",
                "/Users/enos/out",
                "./modules/foo",
                "../projects/enos/scenarios/modules/foo",
            ),
            ("/Users/enos/scenarios", "/Users/enos/scenarios/out", "./modules/foo", "../modules/foo"),
        ];

        for (base, out, source, want) in cases {
            let got = maybe_update_relative_source(source, Path::new(base), Path::new(out)).unwrap();
            assert_eq!(got, want, "base={} out={} source={}", base, out, source);
        }
    }

    #[test]
    fn test_non_local_sources_pass_through() {
        for source in [
            "terraform-aws-modules/vpc/aws",
            "app.terraform.io/example-corp/k8s-cluster/azurerm",
            "github.com/hashicorp/example",
            "bitbucket.org/hashicorp/terraform-consul-aws",
            "git::https://example.com/vpc.git",
            "https://example.com/vpc-module.zip",
            "s3::https://s3-eu-west-1.amazonaws.com/examplecorp-terraform-modules/vpc.zip",
            "gcs::https://www.googleapis.com/storage/v1/modules/foomodule.zip",
            "/opt/modules/foo",
        ] {
            let got = maybe_update_relative_source(source, Path::new("/a/b"), Path::new("/c/d")).unwrap();
            assert_eq!(got, source);
        }
    }

    #[test]
    fn test_generator_requires_options() {
        let scenario = Scenario::default();
        let err = Generator::new().with_base_dir("/a").with_out_dir("/b").render().unwrap_err();
        assert!(matches!(err, Error::InvalidGenerator(msg) if msg.contains("scenario")));

        let err = Generator::new().with_scenario(&scenario).with_out_dir("/b").render().unwrap_err();
        assert!(matches!(err, Error::InvalidGenerator(msg) if msg.contains("base directory")));

        let err = Generator::new().with_scenario(&scenario).with_base_dir("/a").render().unwrap_err();
        assert!(matches!(err, Error::InvalidGenerator(msg) if msg.contains("out directory")));
    }

    fn step(name: &str, source: &str) -> ScenarioStep {
        ScenarioStep {
            name: name.to_string(),
            module: Module {
                name: name.to_string(),
                source: source.to_string(),
                ..Module::default()
            },
            ..ScenarioStep::default()
        }
    }

    fn scenario() -> Scenario {
        let mut first = step("create_vpc", "./modules/vpc");
        first.module.version = "1.0.0".to_string();
        first.module.attrs.insert("cidr".to_string(), Value::string("10.0.0.0/16"));

        let mut skipped = step("skipped", "./modules/skip");
        skipped.skip = true;

        let mut last = step("create_db", "terraform-aws-modules/rds/aws");
        last.providers.insert(
            "aws".to_string(),
            Provider {
                provider_type: "aws".to_string(),
                alias: "east".to_string(),
                ..Provider::default()
            },
        );

        Scenario {
            name: "test".to_string(),
            variants: Vector::from_pairs([("arch", "amd64")]),
            terraform_cli: TerraformCli::default_cli(),
            steps: vec![first, skipped, last],
            ..Scenario::default()
        }
    }

    #[test]
    fn test_render_modules() {
        let scenario = scenario();
        let hcl = Generator::new()
            .with_scenario(&scenario)
            .with_base_dir("/work/enos")
            .with_out_dir("/work/enos/.enos")
            .render()
            .unwrap();

        assert!(hcl.contains("module \"create_vpc\" {"), "{}", hcl);
        assert!(hcl.contains("source  = \"../../modules/vpc\""), "{}", hcl);
        assert!(hcl.contains("version = \"1.0.0\""), "{}", hcl);
        assert!(hcl.contains("cidr = \"10.0.0.0/16\""), "{}", hcl);
        assert!(!hcl.contains("skipped"), "{}", hcl);
        assert!(hcl.contains("depends_on = [module.create_vpc]"), "{}", hcl);
        assert!(hcl.contains("aws.east"), "{}", hcl);
        assert!(hcl.contains("\"terraform-aws-modules/rds/aws\""), "{}", hcl);
        assert!(hcl.find("create_vpc").unwrap() < hcl.find("create_db").unwrap());
    }

    #[test]
    fn test_generate_writes_files() {
        let dir = TempDir::new().unwrap();
        let mut scenario = scenario();
        let mut attrs = BTreeMap::new();
        attrs.insert("plugin_cache_dir".to_string(), Value::string("/tmp/cache"));
        scenario.terraform_cli.config = Some(crate::schemaless_block::SchemalessBlock {
            attrs,
            ..Default::default()
        });

        let out = dir.path().join("out");
        let module = Generator::new()
            .with_scenario(&scenario)
            .with_base_dir(dir.path())
            .with_out_dir(&out)
            .generate()
            .unwrap();

        assert_eq!(module.dir, out.join(scenario.uid()));
        let tf = fs::read_to_string(&module.scenario_path).unwrap();
        assert!(tf.contains("source  = \"../../modules/vpc\""), "{}", tf);

        let rc = fs::read_to_string(module.rc_path.as_ref().unwrap()).unwrap();
        assert!(rc.contains("plugin_cache_dir = \"/tmp/cache\""), "{}", rc);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&module.scenario_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o022, 0);
        }

        // Regenerating overwrites in place.
        let again = Generator::new()
            .with_scenario(&scenario)
            .with_base_dir(dir.path())
            .with_out_dir(&out)
            .generate()
            .unwrap();
        assert_eq!(fs::read_to_string(&again.scenario_path).unwrap(), tf);
    }

    #[test]
    fn test_out_dir_must_be_directory() {
        let dir = TempDir::new().unwrap();
        let scenario = scenario();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(out.join(scenario.uid()), "").unwrap();

        let err = Generator::new()
            .with_scenario(&scenario)
            .with_base_dir(dir.path())
            .with_out_dir(&out)
            .generate()
            .unwrap_err();
        assert!(err.to_string().contains("is not a directory"));
    }

    #[tokio::test]
    async fn test_generate_workspace() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("modules")).unwrap();
        fs::write(
            dir.path().join("enos.hcl"),
            r#"
module "noop" {
  source = "./modules/noop"
}

scenario "smoke" {
  matrix {
    arch = ["amd64", "arm64"]
  }

  step "first" {
    module = module.noop
  }

  step "second" {
    module = module.noop

    variables {
      input = step.first.id
    }
  }
}
"#,
        )
        .unwrap();

        let ws = Workspace::load(dir.path()).unwrap();
        let (modules, diags) = GenerateReq::new(ws, ScenarioFilter::parse(&["smoke", "arch:arm64"]).unwrap())
            .generate()
            .await;
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(modules.len(), 1);

        let tf = fs::read_to_string(&modules[0].scenario_path).unwrap();
        assert!(tf.contains("input = module.first.id"), "{}", tf);
        assert!(tf.contains("source     = \"../../modules/noop\""), "{}", tf);
    }
}
