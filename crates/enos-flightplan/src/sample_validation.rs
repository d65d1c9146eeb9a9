// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sample validation.
//!
//! Validation frames every sample of a flight plan and fails if any subset
//! frame is empty. With enough samples the frames are built by a pool of
//! workers; the first failure stops new work from being submitted.

use enos_hcl::{Diagnostic, Diagnostics};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::decoder::DecodeTarget;
use crate::flightplan::FlightPlan;
use crate::sample::SampleFilter;
use crate::workspace::Workspace;

/// A request to validate the samples of a workspace.
#[derive(Debug, Clone)]
pub struct SampleValidationReq {
    /// The flight plan to validate.
    pub workspace: Workspace,
    /// Restricts validation to one sample and its subset selection.
    pub filter: Option<SampleFilter>,
    /// Number of concurrent validation workers.
    pub workers: usize,
}

impl SampleValidationReq {
    /// Validates every sample in `workspace`.
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            filter: None,
            workers: Config::default().sample_validation_workers,
        }
    }

    /// Validates only the sample named by `filter`.
    pub fn with_filter(mut self, filter: SampleFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the worker count. Fewer than two validates serially.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Decodes the samples and validates their frames.
    pub async fn validate(&self) -> Diagnostics {
        let decoder = match self.workspace.decoder() {
            Ok(d) => d,
            Err(e) => return e.into_diagnostics(),
        };
        let (fp, mut diags) = decoder.with_target(DecodeTarget::Samples).decode();
        if diags.has_errors() {
            return diags;
        }

        let jobs = match self.filter.as_ref().filter(|f| !f.sample.is_empty()) {
            Some(filter) => {
                if fp.find_sample(&filter.sample).is_none() {
                    diags.push(Diagnostic::error(
                        format!("no sample named {} has been defined", filter.sample),
                        "",
                    ));
                    return diags;
                }
                vec![filter.clone()]
            }
            None => fp.sample_names().into_iter().map(SampleFilter::for_sample).collect(),
        };

        let samples = jobs.len();
        let more = if self.workers < 2 || samples < 3 {
            validate_serially(&fp, jobs)
        } else {
            validate_concurrently(Arc::new(fp), jobs, self.workers).await
        };

        info!(samples, errors = more.errors().count(), "validated samples");
        diags.extend(more);
        diags
    }
}

fn validate_sample(fp: &FlightPlan, filter: &SampleFilter) -> Diagnostics {
    let Some(sample) = fp.find_sample(&filter.sample) else {
        return Diagnostic::error(format!("no sample named {} has been defined", filter.sample), "").into();
    };

    match sample.frame(fp, filter).and_then(|frame| frame.validate()) {
        Ok(()) => Diagnostics::new(),
        Err(e) => e.into_diagnostics(),
    }
}

fn validate_serially(fp: &FlightPlan, jobs: Vec<SampleFilter>) -> Diagnostics {
    let mut diags = Diagnostics::new();
    for filter in jobs {
        let more = validate_sample(fp, &filter);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            break;
        }
    }
    diags
}

async fn validate_concurrently(fp: Arc<FlightPlan>, jobs: Vec<SampleFilter>, workers: usize) -> Diagnostics {
    let submission = CancellationToken::new();
    let (job_tx, job_rx) = mpsc::channel::<SampleFilter>(1);
    let (res_tx, mut res_rx) = mpsc::channel::<Diagnostics>(1);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let mut tasks = Vec::with_capacity(workers + 1);

    // Producer
    let token = submission.clone();
    tasks.push(tokio::spawn(async move {
        for job in jobs {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("sample validation producer cancelled");
                    break;
                }
                sent = job_tx.send(job) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
    }));

    for worker_id in 0..workers {
        let fp = Arc::clone(&fp);
        let job_rx = Arc::clone(&job_rx);
        let res_tx = res_tx.clone();

        tasks.push(tokio::spawn(async move {
            loop {
                let job = job_rx.lock().await.recv().await;
                let Some(filter) = job else {
                    break;
                };

                let fp = Arc::clone(&fp);
                let diags = match tokio::task::spawn_blocking(move || validate_sample(&fp, &filter)).await {
                    Ok(diags) => diags,
                    Err(e) => Diagnostic::error("sample validation worker failed", e.to_string()).into(),
                };

                if res_tx.send(diags).await.is_err() {
                    break;
                }
            }
            debug!(worker_id, "sample validation worker stopped");
        }));
    }
    drop(res_tx);

    let mut diags = Diagnostics::new();
    while let Some(more) = res_rx.recv().await {
        let failed = more.has_errors();
        diags.extend(more);
        if failed && !submission.is_cancelled() {
            debug!("sample failed validation, cancelling submission");
            submission.cancel();
        }
    }

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "sample validation task did not exit cleanly");
        }
    }

    diags
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace(src: &str) -> (TempDir, Workspace) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("enos.hcl"), src).unwrap();
        let ws = Workspace::load(dir.path()).unwrap();
        (dir, ws)
    }

    fn flight_plan(samples: &[(&str, &str)]) -> String {
        let mut src = String::from(
            r#"
scenario "smoke" {
  matrix {
    arch   = ["amd64", "arm64"]
    distro = ["ubuntu", "rhel"]
  }

  step "noop" {
    module = "noop"
  }
}
"#,
        );
        for (name, arch) in samples {
            src.push_str(&format!(
                r#"
sample "{name}" {{
  subset "smoke" {{
    matrix {{
      arch = ["{arch}"]
    }}
  }}
}}
"#
            ));
        }
        src
    }

    #[tokio::test]
    async fn test_validate_serially() {
        let (_dir, ws) = workspace(&flight_plan(&[("good", "amd64")]));
        let diags = SampleValidationReq::new(ws).validate().await;
        assert!(!diags.has_errors(), "{}", diags);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_validate_concurrently() {
        let (_dir, ws) = workspace(&flight_plan(&[
            ("a", "amd64"),
            ("b", "arm64"),
            ("c", "amd64"),
            ("d", "arm64"),
        ]));
        let diags = SampleValidationReq::new(ws).with_workers(3).validate().await;
        assert!(!diags.has_errors(), "{}", diags);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_validate_reports_empty_frames() {
        let (_dir, ws) = workspace(&flight_plan(&[
            ("a", "amd64"),
            ("b", "s390x"),
            ("c", "arm64"),
        ]));
        let diags = SampleValidationReq::new(ws).with_workers(2).validate().await;
        assert!(diags.has_errors());
        assert!(
            diags
                .errors()
                .any(|d| d.summary.contains("the sampling frame for b/smoke is invalid"))
        );
    }

    #[tokio::test]
    async fn test_validate_unknown_sample() {
        let (_dir, ws) = workspace(&flight_plan(&[("a", "amd64")]));
        let diags = SampleValidationReq::new(ws)
            .with_filter(SampleFilter::for_sample("missing"))
            .validate()
            .await;
        assert!(
            diags
                .errors()
                .any(|d| d.summary == "no sample named missing has been defined")
        );
    }
}
