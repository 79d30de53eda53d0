use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use log::{debug, info, warn, error};
use crate::config::Config;
use crate::delay_manager::DelayPolicy;
use crate::input_loader;
use crate::resume_manager::{Checkpoint, CheckpointStore};
use crate::result_writer::{ResultRow, ResultSink};
use crate::scraper::SynonymSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    LoadingCodes,
    Resuming,
    Iterating,
    Finalizing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No code could be loaded.
    NothingToDo,
    Completed,
    /// Stopped by `--limit` before every code was processed.
    Partial,
    Interrupted,
    /// An error unrelated to a single code stopped the iteration.
    Aborted,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::NothingToDo => 1,
            RunOutcome::Partial | RunOutcome::Aborted => 2,
            RunOutcome::Interrupted => 130,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub processed: usize,
    pub total: usize,
    pub rows: usize,
}

/// Work product of a run, owned by the controller.
#[derive(Debug, Default, Clone)]
pub struct RunProgress {
    pub codes: Vec<String>,
    pub processed: HashSet<String>,
    pub results: Vec<ResultRow>,
}

impl RunProgress {
    pub fn total(&self) -> usize {
        self.codes.len()
    }

    /// Codes not processed yet, in input order.
    pub fn remaining(&self) -> Vec<String> {
        self.codes
            .iter()
            .filter(|code| !self.processed.contains(*code))
            .cloned()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        !self.codes.is_empty() && self.processed.len() == self.codes.len()
    }

    fn record(&mut self, code: &str, synonyms: Vec<String>) {
        self.results
            .extend(synonyms.into_iter().map(|synonym| ResultRow::new(code, synonym)));
        self.processed.insert(code.to_string());
    }
}

/// Drives one resumable scraping run: load codes, resume from the checkpoint,
/// fetch what is left, and persist results on every batch and at the end.
pub struct RunController<'a, S: SynonymSource> {
    source: &'a S,
    input: PathBuf,
    column: usize,
    checkpoints: CheckpointStore,
    sink: ResultSink,
    delay: DelayPolicy,
    batch_size: usize,
    limit: Option<usize>,
    fresh: bool,
    interrupt: Arc<AtomicBool>,
    state: RunState,
}

impl<'a, S: SynonymSource> RunController<'a, S> {
    pub fn new(config: &Config, source: &'a S, interrupt: Arc<AtomicBool>) -> Self {
        RunController {
            source,
            input: config.input.clone(),
            column: config.column,
            checkpoints: CheckpointStore::new(config.checkpoint.clone()),
            sink: ResultSink::new(config.output.clone()),
            delay: config.delay_policy(),
            batch_size: config.batch_size.max(1),
            limit: config.limit,
            fresh: config.fresh,
            interrupt,
            state: RunState::Init,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn run(&mut self) -> RunSummary {
        let mut progress = RunProgress::default();
        let mut outcome = RunOutcome::NothingToDo;
        self.state = RunState::Init;

        while self.state != RunState::Done {
            debug!("Run state: {:?}", self.state);
            self.state = match self.state {
                RunState::Init => RunState::LoadingCodes,
                RunState::LoadingCodes => match self.load_codes() {
                    Some(codes) => {
                        progress.codes = codes;
                        RunState::Resuming
                    }
                    None => RunState::Done,
                },
                RunState::Resuming => {
                    self.resume(&mut progress);
                    RunState::Iterating
                }
                RunState::Iterating => {
                    outcome = self.iterate(&mut progress);
                    RunState::Finalizing
                }
                RunState::Finalizing => {
                    self.finalize(&progress);
                    RunState::Done
                }
                RunState::Done => RunState::Done,
            };
        }

        let summary = RunSummary {
            outcome,
            processed: progress.processed.len(),
            total: progress.total(),
            rows: progress.results.len(),
        };
        info!(
            "Scraping finished ({:?}): {}/{} codes processed",
            summary.outcome, summary.processed, summary.total
        );
        info!("Total synonyms collected: {}", summary.rows);
        summary
    }

    fn load_codes(&self) -> Option<Vec<String>> {
        match input_loader::load_codes(&self.input, self.column) {
            Ok(codes) if codes.is_empty() => {
                warn!("No codes to process in {:?}", self.input);
                None
            }
            Ok(codes) => Some(codes),
            Err(e) => {
                error!("Failed to load codes: {}", e);
                None
            }
        }
    }

    fn resume(&self, progress: &mut RunProgress) {
        if self.fresh {
            if self.checkpoints.exists() {
                info!("Fresh run requested, discarding existing checkpoint");
                self.checkpoints.delete();
            }
            return;
        }

        let Some(checkpoint) = self.checkpoints.load() else {
            return;
        };

        let known: HashSet<&str> = progress.codes.iter().map(String::as_str).collect();
        let (kept, stale): (HashSet<String>, HashSet<String>) = checkpoint
            .processed_set()
            .into_iter()
            .partition(|code| known.contains(code.as_str()));
        if !stale.is_empty() {
            warn!("Ignoring {} checkpointed codes missing from the input", stale.len());
        }
        progress.processed = kept;
        info!("Resuming from checkpoint: {} codes already processed", progress.processed.len());

        self.reload_results(progress, &checkpoint);
    }

    // Saves overwrite the output, so rows from earlier runs must be carried
    // over before the first save of this one.
    fn reload_results(&self, progress: &mut RunProgress, checkpoint: &Checkpoint) {
        match self.sink.load() {
            Ok(rows) => {
                let prior: Vec<ResultRow> = rows
                    .into_iter()
                    .filter(|row| progress.processed.contains(&row.code))
                    .collect();
                if prior.len() != checkpoint.results_count {
                    warn!(
                        "Output holds {} rows for processed codes, checkpoint recorded {}",
                        prior.len(),
                        checkpoint.results_count
                    );
                }
                info!("Reloaded {} previous results from {:?}", prior.len(), self.sink.path());
                progress.results = prior;
            }
            Err(e) => {
                error!("Could not reload previous results: {}", e);
                self.sink.backup();
            }
        }
    }

    fn iterate(&self, progress: &mut RunProgress) -> RunOutcome {
        let remaining = progress.remaining();
        let total = progress.total();
        info!("Codes to process: {}/{}", remaining.len(), total);

        let budget = self.limit.map_or(remaining.len(), |limit| limit.min(remaining.len()));

        for (i, code) in remaining.iter().take(budget).enumerate() {
            if self.interrupted() {
                warn!("Interrupt received, saving results...");
                return RunOutcome::Interrupted;
            }

            info!("Processing code {} ({}/{})", code, progress.processed.len() + 1, total);

            let synonyms = match self.source.fetch_synonyms(code) {
                Ok(synonyms) => synonyms,
                Err(e) if e.is_per_code() => {
                    warn!("Lookup failed for code {}: {}", code, e);
                    Vec::new()
                }
                Err(e) => {
                    error!("Unexpected error on code {}: {}. Stopping.", code, e);
                    return RunOutcome::Aborted;
                }
            };

            // Interrupted mid-fetch: the code is left for the next run.
            if self.interrupted() {
                warn!("Interrupt received, code {} will be retried next run", code);
                return RunOutcome::Interrupted;
            }

            if synonyms.is_empty() {
                info!("  -> no synonym found");
            } else {
                info!("  -> {} synonyms found", synonyms.len());
            }
            progress.record(code, synonyms);

            if progress.processed.len() % self.batch_size == 0 {
                info!("Intermediate save ({} codes processed)", progress.processed.len());
                self.persist(progress);
            }

            if i + 1 < budget && !self.delay.pause(&self.interrupt) {
                warn!("Interrupt received, saving results...");
                return RunOutcome::Interrupted;
            }
        }

        if progress.is_complete() {
            RunOutcome::Completed
        } else {
            info!("Limit of {} codes reached", budget);
            RunOutcome::Partial
        }
    }

    fn persist(&self, progress: &RunProgress) {
        self.sink.save(&progress.results);
        self.checkpoints
            .save(&progress.processed, progress.total(), progress.results.len());
    }

    /// Final save. A completed run leaves no checkpoint behind.
    pub fn finalize(&self, progress: &RunProgress) {
        self.persist(progress);
        if progress.is_complete() {
            self.checkpoints.delete();
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }
}
