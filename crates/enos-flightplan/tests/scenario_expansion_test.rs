// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End to end scenario decoding and matrix expansion.

mod common;

use common::{abs_module, flight_plan};
use enos_flightplan::step_variable::StepVariable;
use enos_flightplan::{Config, DecodeTarget, ScenarioFilter, Vector};
use enos_hcl::Value;
use std::fs;
use tempfile::TempDir;

fn variants(fp: &enos_flightplan::FlightPlan) -> Vec<String> {
    fp.scenarios().iter().map(|s| s.variants.filter_str()).collect()
}

#[tokio::test]
async fn test_basic_matrix_product() {
    let dir = TempDir::new().unwrap();
    let src = format!(
        r#"{}
scenario "s" {{
  matrix {{
    b = ["1", "2"]
    a = ["x", "y"]
  }}

  step "t" {{
    module = module.m
  }}
}}
"#,
        abs_module(&dir)
    );
    fs::write(dir.path().join("enos.hcl"), src).unwrap();
    let ws = enos_flightplan::Workspace::load(dir.path()).unwrap();

    let (fp, diags) = ws.decoder().unwrap().decode_all().await;
    assert!(!diags.has_errors(), "{}", diags);
    assert_eq!(
        variants(&fp),
        vec!["a:x b:1", "a:x b:2", "a:y b:1", "a:y b:2"]
    );
    for scenario in fp.scenarios() {
        assert_eq!(scenario.name, "s");
        assert_eq!(scenario.steps.len(), 1);
        assert!(scenario.steps[0].module.source.ends_with("noop"));
    }
}

const INCLUDE_EXCLUDE: &str = r#"
module "m" {
  source = "./modules/m"
}

scenario "fish" {
  matrix {
    cathat   = ["thing1", "thing2"]
    onefish  = ["redfish", "bluefish"]

    include {
      cathat  = ["sally", "conrad"]
      onefish = ["twofish"]
    }

    exclude {
      cathat  = ["thing1"]
      onefish = ["redfish", "bluefish"]
    }
  }

  step "t" {
    module = module.m
  }
}
"#;

#[tokio::test]
async fn test_include_and_exclude() {
    let fp_dir = flight_plan(INCLUDE_EXCLUDE, None);
    let (fp, diags) = fp_dir.workspace.decoder().unwrap().decode_all().await;
    assert!(!diags.has_errors(), "{}", diags);
    assert_eq!(
        variants(&fp),
        vec![
            "cathat:conrad onefish:twofish",
            "cathat:sally onefish:twofish",
            "cathat:thing2 onefish:bluefish",
            "cathat:thing2 onefish:redfish",
        ]
    );
}

#[tokio::test]
async fn test_filter_selects_instances() {
    let fp_dir = flight_plan(INCLUDE_EXCLUDE, None);
    let filter = ScenarioFilter::parse(&["fish", "onefish:twofish", "!cathat:sally"]).unwrap();
    let (fp, diags) = fp_dir
        .workspace
        .decoder()
        .unwrap()
        .with_filter(filter)
        .decode_all()
        .await;
    assert!(!diags.has_errors(), "{}", diags);
    assert_eq!(variants(&fp), vec!["cathat:conrad onefish:twofish"]);

    let filter = ScenarioFilter::parse(&["fish", "cathat:nobody"]).unwrap();
    let (_, diags) = fp_dir
        .workspace
        .decoder()
        .unwrap()
        .with_filter(filter)
        .decode_all()
        .await;
    assert!(diags.has_errors());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_decode_matches_serial() {
    let fp_dir = flight_plan(
        r#"
module "m" {
  source = "./modules/m"
}

scenario "wide" {
  matrix {
    a = ["1", "2", "3", "4", "5"]
    b = ["1", "2", "3", "4", "5"]
    c = ["1", "2", "3", "4"]
  }

  step "t" {
    module = module.m

    variables {
      combo = "${matrix.a}-${matrix.b}-${matrix.c}"
    }
  }
}
"#,
        None,
    );

    let serial = Config {
        concurrency_threshold: usize::MAX,
        ..Config::default()
    };
    let concurrent = Config {
        concurrency_threshold: 1,
        decode_workers: 4,
        ..Config::default()
    };

    let (a, diags) = fp_dir.workspace.decoder().unwrap().with_config(serial).decode_all().await;
    assert!(!diags.has_errors(), "{}", diags);
    let (b, diags) = fp_dir.workspace.decoder().unwrap().with_config(concurrent).decode_all().await;
    assert!(!diags.has_errors(), "{}", diags);

    assert_eq!(a.scenarios().len(), 100);
    assert_eq!(variants(&a), variants(&b));

    let first = a.scenarios()[0];
    assert_eq!(first.variants, Vector::from_pairs([("a", "1"), ("b", "1"), ("c", "1")]));
    let combo = first.steps[0].module.attrs.get("combo").and_then(StepVariable::from_value);
    assert_eq!(combo, Some(&StepVariable::Value(Value::string("1-1-1"))));
}

#[tokio::test]
async fn test_variables_env_overrides_file() {
    let src = r#"
variable "region" {
  type    = string
  default = "us-east-1"
}

module "m" {
  source = "./modules/m"
  region = var.region
}

scenario "s" {
  step "t" {
    module = module.m
  }
}
"#;
    let fp_dir = flight_plan(src, Some("region = \"us-west-1\"\n"));

    let (fp, diags) = fp_dir.workspace.decoder().unwrap().decode_all().await;
    assert!(!diags.has_errors(), "{}", diags);
    let region = fp.scenarios()[0].steps[0].module.attrs.get("region").and_then(StepVariable::from_value);
    assert_eq!(region, Some(&StepVariable::Value(Value::string("us-west-1"))));

    let ws = fp_dir
        .workspace
        .clone()
        .with_env(vec!["ENOS_VAR_region=eu-west-1".to_string()]);
    let (fp, diags) = ws.decoder().unwrap().decode_all().await;
    assert!(!diags.has_errors(), "{}", diags);
    let region = fp.scenarios()[0].steps[0].module.attrs.get("region").and_then(StepVariable::from_value);
    assert_eq!(region, Some(&StepVariable::Value(Value::string("eu-west-1"))));
}

#[tokio::test]
async fn test_outlines_and_names() {
    let fp_dir = flight_plan(INCLUDE_EXCLUDE, None);

    let (fp, diags) = fp_dir
        .workspace
        .decoder()
        .unwrap()
        .with_target(DecodeTarget::ScenariosOutlines)
        .decode_all()
        .await;
    assert!(!diags.has_errors(), "{}", diags);
    assert_eq!(fp.scenarios().len(), 1);
    let outline = fp.scenarios()[0].outline();
    assert_eq!(outline.name, "fish");
    assert_eq!(outline.steps.len(), 1);

    let (fp, diags) = fp_dir
        .workspace
        .decoder()
        .unwrap()
        .with_target(DecodeTarget::ScenariosNamesNoVariants)
        .decode_all()
        .await;
    assert!(!diags.has_errors(), "{}", diags);
    let names: Vec<_> = fp.scenarios().iter().map(|s| s.name.clone()).collect();
    assert_eq!(names, vec!["fish"]);
    assert!(fp.scenarios()[0].variants.is_empty());
}
