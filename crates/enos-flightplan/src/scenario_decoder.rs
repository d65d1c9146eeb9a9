// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scenario expansion.
//!
//! A [`ScenarioDecoder`] turns `scenario` blocks into one [`Scenario`] per
//! matrix vector. Blocks are first filtered and their matrices expanded, then
//! every instance is decoded to the requested [`DecodeTarget`] and handed to
//! the caller through a [`ScenarioStream`].
//!
//! Large expansions are decoded by a pool of workers:
//!
//! ```text
//! producer --req(1)--> worker x N --res(1)--> collector --out(1)--> ScenarioStream::next
//! ```
//!
//! Every channel holds a single message so each stage waits for the next one
//! to be ready. Cancelling submission stops the producer while in-flight
//! decodes drain; cancelling shutdown stops every task.

use enos_hcl::{Block, Diagnostic, Diagnostics, EvalContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::decoder::DecodeTarget;
use crate::matrix::{Matrix, Vector};
use crate::matrix_decoder::{MatrixBlock, decode_matrix};
use crate::scenario::Scenario;
use crate::scenario_filter::ScenarioFilter;
use crate::verify::{verify_block_has_n_labels, verify_block_labels_are_valid_identifiers};

/// A `scenario` block with its expanded matrix and decoded instances.
#[derive(Debug, Clone)]
pub struct ScenarioBlock {
    /// Scenario name.
    pub name: String,
    /// The raw block.
    pub block: Arc<Block>,
    /// The decoded matrix, if the block has one.
    pub matrix: Option<MatrixBlock>,
    /// Decoded instances, sorted by variants once decoding completes.
    pub scenarios: Vec<Scenario>,
}

impl ScenarioBlock {
    /// The final matrix product, if any.
    pub fn matrix(&self) -> Option<&Matrix> {
        self.matrix.as_ref().map(MatrixBlock::matrix)
    }

    /// How many instances the block expands to.
    pub fn instance_count(&self) -> usize {
        self.vectors().len()
    }

    // One entry per instance. `None` decodes the block without variants.
    fn vectors(&self) -> Vec<Option<Vector>> {
        match self.matrix().filter(|m| !m.is_empty()) {
            Some(m) => m.vectors().iter().cloned().map(Some).collect(),
            None => vec![None],
        }
    }
}

/// A decoded scenario instance.
#[derive(Debug, Clone)]
pub struct ScenarioDecodeResponse {
    /// The scenario. `None` when decoding failed.
    pub scenario: Option<Scenario>,
    /// Diagnostics produced while decoding the instance.
    pub diagnostics: Diagnostics,
}

struct DecodeRequest {
    block: Arc<Block>,
    variants: Option<Vector>,
    target: DecodeTarget,
}

/// Expands scenario blocks into scenario instances.
#[derive(Debug, Clone)]
pub struct ScenarioDecoder {
    eval_ctx: Arc<EvalContext>,
    blocks: Vec<Arc<Block>>,
    target: DecodeTarget,
    filter: ScenarioFilter,
    config: Config,
}

impl ScenarioDecoder {
    /// Creates a decoder over `blocks` evaluated in `eval_ctx`.
    pub fn new(
        eval_ctx: Arc<EvalContext>,
        blocks: Vec<Arc<Block>>,
        target: DecodeTarget,
        filter: ScenarioFilter,
        config: Config,
    ) -> Self {
        Self {
            eval_ctx,
            blocks,
            target,
            filter,
            config,
        }
    }

    /// The decode target.
    pub fn target(&self) -> DecodeTarget {
        self.target
    }

    /// The scenario filter.
    pub fn filter(&self) -> &ScenarioFilter {
        &self.filter
    }

    /// Filters, sorts and expands the scenario blocks without decoding any
    /// scenario bodies.
    pub fn decode_blocks(&self) -> (Vec<ScenarioBlock>, Diagnostics) {
        let mut diags = Diagnostics::new();

        if self.blocks.is_empty() {
            diags.push(Diagnostic::error("no scenario blocks have been defined", ""));
            return (Vec::new(), diags);
        }

        let mut blocks = Vec::new();
        for block in &self.blocks {
            let name = block.labels.first().cloned().unwrap_or_default();
            if !self.filter.matches_name(&name) {
                continue;
            }

            let more = verify_block_labels_are_valid_identifiers(block);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                return (Vec::new(), diags);
            }

            let more = verify_block_has_n_labels(block, 1);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                return (Vec::new(), diags);
            }

            blocks.push(ScenarioBlock {
                name,
                block: Arc::clone(block),
                matrix: None,
                scenarios: Vec::new(),
            });
        }
        blocks.sort_by(|a, b| a.name.cmp(&b.name));

        if self.target == DecodeTarget::ScenariosNamesNoVariants {
            return (blocks, diags);
        }

        for sb in &mut blocks {
            let (matrix, more) = decode_matrix(&self.eval_ctx, &sb.block);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                return (Vec::new(), diags);
            }

            sb.matrix = matrix.map(|mut m| {
                m.filter(&self.filter);
                m
            });
        }

        if self.filter.requires_variants() {
            blocks.retain(|sb| sb.matrix().is_some_and(|m| !m.is_empty()));
        }

        debug!(
            target_level = %self.target,
            blocks = blocks.len(),
            filter = %self.filter,
            "decoded scenario blocks"
        );

        (blocks, diags)
    }

    /// Starts decoding scenario instances. Must be called from within a tokio
    /// runtime.
    pub fn stream(&self) -> ScenarioStream {
        let shutdown = CancellationToken::new();
        let submission = shutdown.child_token();
        let (out_tx, out_rx) = mpsc::channel(1);

        let mut stream = ScenarioStream {
            rx: out_rx,
            blocks: Vec::new(),
            diagnostics: Diagnostics::new(),
            submission: submission.clone(),
            shutdown: shutdown.clone(),
            tasks: Vec::new(),
            next_timeout: self.config.next_timeout,
            count: 0,
            failed: false,
            done: false,
        };

        let (mut blocks, diags) = self.decode_blocks();
        let failed = diags.has_errors();
        stream.diagnostics.extend(diags);
        if failed {
            stream.failed = true;
            stream.done = true;
            return stream;
        }

        let must_dispatch: usize = blocks.iter().map(ScenarioBlock::instance_count).sum();

        let requests: Vec<DecodeRequest> = match self.target {
            DecodeTarget::ScenariosNamesNoVariants => {
                blocks
                    .iter()
                    .map(|sb| DecodeRequest {
                        block: Arc::clone(&sb.block),
                        variants: None,
                        target: self.target,
                    })
                    .collect()
            }
            DecodeTarget::ScenariosMatrixOnly => {
                // Expanding the matrices was all there was to do.
                stream.blocks = blocks;
                stream.done = true;
                return stream;
            }
            DecodeTarget::ScenariosOutlines => {
                // One instance per block describes the block.
                for sb in &mut blocks {
                    if let Some(mb) = sb.matrix.as_mut() {
                        if let Some(first) = mb.final_product.vectors().first().cloned() {
                            mb.final_product = Matrix::from_vectors([first]);
                        }
                    }
                }
                blocks
                    .iter()
                    .flat_map(|sb| {
                        sb.vectors().into_iter().map(|variants| DecodeRequest {
                            block: Arc::clone(&sb.block),
                            variants,
                            target: DecodeTarget::All,
                        })
                    })
                    .collect()
            }
            DecodeTarget::ScenariosNamesExpandVariants | DecodeTarget::ScenariosComplete | DecodeTarget::All => {
                blocks
                    .iter()
                    .flat_map(|sb| {
                        sb.vectors().into_iter().map(|variants| DecodeRequest {
                            block: Arc::clone(&sb.block),
                            variants,
                            target: self.target,
                        })
                    })
                    .collect()
            }
            other => {
                stream.diagnostics.push(Diagnostic::error(
                    format!("{} is not a known decode mode", other),
                    "",
                ));
                stream.failed = true;
                stream.done = true;
                return stream;
            }
        };
        stream.blocks = blocks;

        let serial = self.target == DecodeTarget::ScenariosOutlines
            || must_dispatch < self.config.concurrency_threshold
            || num_cpus::get() < 2;

        if serial {
            debug!(scenarios = requests.len(), "decoding scenarios serially");
            stream.tasks.push(tokio::spawn(decode_serially(
                Arc::clone(&self.eval_ctx),
                requests,
                out_tx,
                submission,
            )));
        } else {
            info!(
                scenarios = requests.len(),
                workers = self.config.decode_workers,
                "decoding scenarios concurrently"
            );
            stream.tasks.extend(decode_concurrently(
                Arc::clone(&self.eval_ctx),
                requests,
                out_tx,
                self.config.decode_workers.max(1),
                submission,
                shutdown,
            ));
        }

        stream
    }

    /// Decodes every matching scenario and returns the blocks with their
    /// instances sorted.
    pub async fn decode_all(&self) -> (Vec<ScenarioBlock>, Diagnostics) {
        let mut stream = self.stream();
        let mut diags = Diagnostics::new();

        while let Some(res) = stream.next().await {
            let Some(scenario) = res.scenario else {
                continue;
            };
            match stream.blocks.iter_mut().find(|b| b.name == scenario.name) {
                Some(block) => block.scenarios.push(scenario),
                None => {
                    diags.push(Diagnostic::error(
                        format!("no scenario block with name {} could be found", scenario.name),
                        "",
                    ));
                    break;
                }
            }
        }

        stream.stop().await;
        diags.extend(stream.diagnostics().clone());

        let mut blocks = std::mem::take(&mut stream.blocks);
        for block in &mut blocks {
            block.scenarios.sort_by(|a, b| a.cmp_id(b));
        }

        if !diags.has_errors()
            && self.target.decodes_scenarios()
            && self.target != DecodeTarget::ScenariosMatrixOnly
            && stream.count() == 0
        {
            diags.push(Diagnostic::error(
                format!("no scenarios matched filter criteria: {}", self.filter),
                "",
            ));
        }

        (blocks, diags)
    }
}

/// Scenario instances as they are decoded.
///
/// Always call [`ScenarioStream::stop`] when finished so in-flight work is
/// drained and every task is joined.
#[derive(Debug)]
pub struct ScenarioStream {
    rx: mpsc::Receiver<ScenarioDecodeResponse>,
    blocks: Vec<ScenarioBlock>,
    diagnostics: Diagnostics,
    submission: CancellationToken,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    next_timeout: Duration,
    count: usize,
    failed: bool,
    done: bool,
}

impl ScenarioStream {
    /// Waits for the next decoded instance. Returns `None` when every
    /// instance has been returned, decoding failed, or the wait timed out.
    pub async fn next(&mut self) -> Option<ScenarioDecodeResponse> {
        if self.done {
            return None;
        }

        match tokio::time::timeout(self.next_timeout, self.rx.recv()).await {
            Err(_) => {
                warn!(
                    timeout_ms = self.next_timeout.as_millis() as u64,
                    returned = self.count,
                    "timed out waiting for next scenario"
                );
                self.diagnostics.push(Diagnostic::error(
                    "timed out waiting for next scenario",
                    format!("no scenario was decoded within {:?}", self.next_timeout),
                ));
                self.failed = true;
                self.done = true;
                self.shutdown.cancel();
                None
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Ok(Some(res)) => {
                self.count += 1;
                if res.diagnostics.has_errors() {
                    if !self.failed {
                        debug!(returned = self.count, "scenario failed to decode, cancelling submission");
                    }
                    self.failed = true;
                    self.submission.cancel();
                }
                self.diagnostics.extend(res.diagnostics.clone());
                Some(res)
            }
        }
    }

    /// Stops submitting work, drains in-flight responses and joins every task.
    pub async fn stop(&mut self) {
        self.submission.cancel();
        while self.next().await.is_some() {}
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "scenario decode task did not exit cleanly");
            }
        }
    }

    /// The filtered and expanded scenario blocks.
    pub fn blocks(&self) -> &[ScenarioBlock] {
        &self.blocks
    }

    /// Every diagnostic seen so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// How many instances have been returned.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns true once no more instances will be returned.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Returns true if any instance failed or the stream timed out.
    pub fn has_failed(&self) -> bool {
        self.failed
    }
}

impl Drop for ScenarioStream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn decode_scenario(ctx: &Arc<EvalContext>, req: &DecodeRequest) -> ScenarioDecodeResponse {
    let mut scenario = Scenario::default();
    let mut child = EvalContext::child_of(Arc::clone(ctx));
    if let Some(variants) = &req.variants {
        child.set_variable("matrix", variants.to_value());
        scenario.variants = variants.clone();
    }

    let diagnostics = scenario.decode(&req.block, &mut child, req.target);
    let scenario = (!diagnostics.has_errors()).then_some(scenario);

    ScenarioDecodeResponse { scenario, diagnostics }
}

async fn decode_serially(
    ctx: Arc<EvalContext>,
    requests: Vec<DecodeRequest>,
    out: mpsc::Sender<ScenarioDecodeResponse>,
    submission: CancellationToken,
) {
    for req in requests {
        if submission.is_cancelled() {
            break;
        }

        let res = decode_scenario(&ctx, &req);
        tokio::select! {
            biased;
            _ = submission.cancelled() => {
                debug!("serial scenario decoder cancelled");
                break;
            }
            sent = out.send(res) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

fn decode_concurrently(
    ctx: Arc<EvalContext>,
    requests: Vec<DecodeRequest>,
    out: mpsc::Sender<ScenarioDecodeResponse>,
    workers: usize,
    submission: CancellationToken,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let (req_tx, req_rx) = mpsc::channel::<DecodeRequest>(1);
    let (res_tx, mut res_rx) = mpsc::channel::<ScenarioDecodeResponse>(1);
    let req_rx = Arc::new(Mutex::new(req_rx));
    let mut tasks = Vec::with_capacity(workers + 2);

    // Producer
    let token = submission.clone();
    tasks.push(tokio::spawn(async move {
        for req in requests {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("scenario decode producer cancelled");
                    break;
                }
                sent = req_tx.send(req) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
    }));

    for worker_id in 0..workers {
        let ctx = Arc::clone(&ctx);
        let req_rx = Arc::clone(&req_rx);
        let res_tx = res_tx.clone();
        let submission = submission.clone();
        let shutdown = shutdown.clone();

        tasks.push(tokio::spawn(async move {
            loop {
                let req = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    req = async { req_rx.lock().await.recv().await } => match req {
                        Some(req) => req,
                        None => break,
                    },
                };

                if submission.is_cancelled() {
                    continue;
                }

                let ctx = Arc::clone(&ctx);
                let res = match tokio::task::spawn_blocking(move || decode_scenario(&ctx, &req)).await {
                    Ok(res) => res,
                    Err(e) => ScenarioDecodeResponse {
                        scenario: None,
                        diagnostics: Diagnostic::error("scenario decode worker failed", e.to_string()).into(),
                    },
                };

                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    sent = res_tx.send(res) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!(worker_id, "scenario decode worker stopped");
        }));
    }
    drop(res_tx);

    // Collector
    tasks.push(tokio::spawn(async move {
        loop {
            let res = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                res = res_rx.recv() => match res {
                    Some(res) => res,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sent = out.send(res) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
    }));

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use crate::terraform_cli::TerraformCli;
    use enos_hcl::{Value, parse};

    fn decoder(src: &str, target: DecodeTarget, filter: ScenarioFilter, config: Config) -> ScenarioDecoder {
        let (file, diags) = parse(src, "enos.hcl");
        assert!(!diags.has_errors(), "{}", diags);

        let mut ctx = EvalContext::new();
        ctx.set_variable("path", Value::object_from([("root", Value::string("/enos"))]));
        let module = Module {
            name: "m".into(),
            source: "/enos/modules/m".into(),
            ..Module::default()
        };
        ctx.set_variable("module", Value::object_from([("m", module.to_value())]));
        let cli = TerraformCli {
            name: "default".into(),
            path: "/bin/terraform".into(),
            ..TerraformCli::default()
        };
        ctx.set_variable("terraform_cli", Value::object_from([("default", cli.to_value())]));
        ctx.set_variable("terraform", Value::empty_object());
        ctx.set_variable("provider", Value::empty_object());

        let blocks = file.body.blocks.into_iter().map(Arc::new).collect();
        ScenarioDecoder::new(Arc::new(ctx), blocks, target, filter, config)
    }

    const BASIC: &str = r#"
scenario "s" {
  matrix {
    b = ["2", "1"]
    a = ["y", "x"]
  }

  step "t" {
    module = module.m
  }
}

scenario "plain" {
  step "t" {
    module = module.m
  }
}
"#;

    fn variants(blocks: &[ScenarioBlock], name: &str) -> Vec<String> {
        blocks
            .iter()
            .find(|b| b.name == name)
            .unwrap()
            .scenarios
            .iter()
            .map(|s| s.variants.filter_str())
            .collect()
    }

    #[tokio::test]
    async fn test_decode_all_serially() {
        let d = decoder(BASIC, DecodeTarget::ScenariosComplete, ScenarioFilter::select_all(), Config::default());
        let (blocks, diags) = d.decode_all().await;
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name, "plain");
        assert_eq!(blocks[0].scenarios.len(), 1);
        assert_eq!(
            variants(&blocks, "s"),
            vec!["a:x b:1", "a:x b:2", "a:y b:1", "a:y b:2"]
        );
        assert_eq!(blocks[1].scenarios[0].steps.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_decode_all_concurrently() {
        let config = Config {
            concurrency_threshold: 0,
            decode_workers: 3,
            ..Config::default()
        };
        let d = decoder(BASIC, DecodeTarget::ScenariosComplete, ScenarioFilter::select_all(), config);
        let (blocks, diags) = d.decode_all().await;
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(
            variants(&blocks, "s"),
            vec!["a:x b:1", "a:x b:2", "a:y b:1", "a:y b:2"]
        );
    }

    #[tokio::test]
    async fn test_filter_requires_variants() {
        let filter = ScenarioFilter::parse(&["a:x"]).unwrap();
        let d = decoder(BASIC, DecodeTarget::ScenariosNamesExpandVariants, filter, Config::default());
        let (blocks, diags) = d.decode_all().await;
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(blocks.len(), 1);
        assert_eq!(variants(&blocks, "s"), vec!["a:x b:1", "a:x b:2"]);
    }

    #[tokio::test]
    async fn test_matrix_only_and_names_only() {
        let d = decoder(BASIC, DecodeTarget::ScenariosMatrixOnly, ScenarioFilter::select_all(), Config::default());
        let mut stream = d.stream();
        assert!(stream.next().await.is_none());
        assert_eq!(stream.blocks()[1].matrix().map(Matrix::len), Some(4));
        stream.stop().await;

        let d = decoder(
            BASIC,
            DecodeTarget::ScenariosNamesNoVariants,
            ScenarioFilter::select_all(),
            Config::default(),
        );
        let (blocks, diags) = d.decode_all().await;
        assert!(!diags.has_errors(), "{}", diags);
        assert!(blocks.iter().all(|b| b.matrix.is_none() && b.scenarios.len() == 1));
    }

    #[tokio::test]
    async fn test_outlines_decode_one_instance() {
        let d = decoder(BASIC, DecodeTarget::ScenariosOutlines, ScenarioFilter::select_all(), Config::default());
        let (blocks, diags) = d.decode_all().await;
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(variants(&blocks, "s"), vec!["a:x b:1"]);
        assert_eq!(blocks[1].scenarios[0].outline().steps.len(), 1);
    }

    #[tokio::test]
    async fn test_first_error_stops_the_stream() {
        let src = r#"
scenario "broken" {
  matrix {
    a = ["1", "2", "3"]
  }

  step "t" {
    module = module.missing
  }
}
"#;
        let d = decoder(src, DecodeTarget::ScenariosComplete, ScenarioFilter::select_all(), Config::default());
        let mut stream = d.stream();
        let first = stream.next().await.unwrap();
        assert!(first.scenario.is_none());
        assert!(first.diagnostics.has_errors());
        stream.stop().await;
        assert!(stream.has_failed());
        assert!(stream.is_done());
        assert!(stream.count() < 3 || stream.diagnostics().has_errors());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_next_timeout_ends_decoding() {
        let axis = (0..20).map(|i| format!("\"{}\"", i)).collect::<Vec<_>>().join(", ");
        let src = format!(
            r#"
scenario "big" {{
  matrix {{
    a = [{axis}]
    b = [{axis}]
  }}

  step "t" {{
    module = module.m
  }}
}}
"#
        );
        let config = Config {
            next_timeout: Duration::from_nanos(1),
            concurrency_threshold: 1,
            ..Config::default()
        };
        let d = decoder(&src, DecodeTarget::ScenariosComplete, ScenarioFilter::select_all(), config);
        let (_, diags) = tokio::time::timeout(Duration::from_secs(30), d.decode_all())
            .await
            .expect("decode_all returns after the timeout");
        assert!(
            diags
                .errors()
                .any(|d| d.summary == "timed out waiting for next scenario"),
            "{}",
            diags
        );
    }

    #[tokio::test]
    async fn test_no_blocks() {
        let d = decoder("", DecodeTarget::ScenariosComplete, ScenarioFilter::select_all(), Config::default());
        let (_, diags) = d.decode_all().await;
        assert!(
            diags
                .errors()
                .any(|d| d.summary == "no scenario blocks have been defined")
        );
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let d = decoder(BASIC, DecodeTarget::Modules, ScenarioFilter::select_all(), Config::default());
        let (_, diags) = d.decode_all().await;
        assert!(diags.errors().any(|d| d.summary.ends_with("is not a known decode mode")));
    }
}
