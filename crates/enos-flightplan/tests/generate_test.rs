// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End to end module generation.

mod common;

use common::flight_plan;
use enos_flightplan::generate::{RC_FILE_NAME, SCENARIO_FILE_NAME, maybe_update_relative_source};
use enos_flightplan::{GenerateReq, Generator, ScenarioFilter};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn test_relative_source_rewriting() {
    let base = Path::new("/Users/enos/scenarios");
    let out = Path::new("/Users/enos/scenarios/out");

    assert_eq!(
        maybe_update_relative_source("./modules/foo", base, out).unwrap(),
        "../modules/foo"
    );
    assert_eq!(
        maybe_update_relative_source("terraform-aws-modules/vpc/aws", base, out).unwrap(),
        "terraform-aws-modules/vpc/aws"
    );
}

const FLIGHT_PLAN: &str = r#"
terraform_cli "cached" {
  plugin_cache_dir = "/var/cache/terraform"
}

terraform "default" {
  required_version = ">= 1.2.0"

  required_providers {
    aws = {
      source = "hashicorp/aws"
    }
  }
}

provider "aws" "east" {
  region = "us-east-1"
}

module "vpc" {
  source = "./modules/vpc"
}

module "db" {
  source  = "terraform-aws-modules/rds/aws"
  version = "6.0.0"
}

scenario "upgrade" {
  matrix {
    arch = ["amd64", "arm64"]
  }

  terraform_cli = terraform_cli.cached
  terraform     = terraform.default
  providers     = [provider.aws.east]

  step "create_vpc" {
    module = module.vpc

    providers = {
      aws = provider.aws.east
    }

    variables {
      arch = matrix.arch
    }
  }

  step "create_db" {
    module = module.db

    variables {
      vpc_id = step.create_vpc.id
    }
  }

  output "vpc_id" {
    description = "the vpc"
    value       = step.create_vpc.id
  }
}
"#;

#[tokio::test]
async fn test_generate_scenarios() {
    let fp = flight_plan(FLIGHT_PLAN, None);
    let out = TempDir::new().unwrap();
    let ws = fp.workspace.clone().with_out_dir(out.path());

    let (modules, diags) = GenerateReq::new(ws, ScenarioFilter::select_all()).generate().await;
    assert!(!diags.has_errors(), "{}", diags);
    assert_eq!(modules.len(), 2);

    for module in &modules {
        assert!(module.dir.starts_with(out.path()));
        assert_eq!(module.scenario_path, module.dir.join(SCENARIO_FILE_NAME));

        let tf = fs::read_to_string(&module.scenario_path).unwrap();
        assert!(tf.contains("terraform {"), "{}", tf);
        assert!(tf.contains("required_version = \">= 1.2.0\""), "{}", tf);
        assert!(tf.contains("provider \"aws\" {"), "{}", tf);
        assert!(tf.contains("alias  = \"east\""), "{}", tf);
        assert!(tf.contains("module \"create_vpc\" {"), "{}", tf);
        assert!(tf.contains("depends_on = [module.create_vpc]"), "{}", tf);
        assert!(tf.contains("vpc_id = module.create_vpc.id"), "{}", tf);
        assert!(tf.contains("output \"vpc_id\" {"), "{}", tf);
        assert!(tf.contains("\"terraform-aws-modules/rds/aws\""), "{}", tf);

        let rc = module.rc_path.as_ref().unwrap();
        assert_eq!(rc, &module.dir.join(RC_FILE_NAME));
        assert!(fs::read_to_string(rc).unwrap().contains("plugin_cache_dir"));
    }

    let arm = modules.iter().find(|m| m.scenario.ends_with("arch:arm64")).unwrap();
    let tf = fs::read_to_string(&arm.scenario_path).unwrap();
    assert!(tf.contains("arch = \"arm64\""), "{}", tf);
}

#[tokio::test]
async fn test_generation_is_stable_across_out_dirs() {
    let fp = flight_plan(FLIGHT_PLAN, None);
    let (plan, diags) = fp.workspace.decoder().unwrap().decode_all().await;
    assert!(!diags.has_errors(), "{}", diags);
    let scenario = plan.scenarios()[0];

    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    let render = |out: &Path| {
        Generator::new()
            .with_scenario(scenario)
            .with_base_dir(&plan.base_dir)
            .with_out_dir(out)
            .render()
            .unwrap()
    };

    // Only the rewritten local source differs between output directories.
    let strip = |hcl: String| -> Vec<String> {
        hcl.lines()
            .filter(|l| !l.contains("modules/vpc"))
            .map(str::to_string)
            .collect()
    };
    assert_eq!(strip(render(a.path())), strip(render(b.path())));
    assert_eq!(render(a.path()), render(a.path()));
}
