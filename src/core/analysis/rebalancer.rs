//! Dataset class balancing.
//!
//! Drives every class in the output folder toward a single target object
//! count: the input pool is copied in, files from the secondary pool top up
//! under-represented classes, and excess instances of over-represented
//! classes are evicted into the extra folder. Top-up and eviction repeat until
//! the counts are exact, nothing changes, or the iteration bound is hit.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::Sender,
    Arc,
};
use std::thread;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn};

use crate::config::BalancerConfig;
use crate::core::dataset::{
    list_annotation_files, load_class_names, scan, ClassCount, ClassId, FolderIndex,
};
use crate::core::operations::{
    choose_step, strip_class_lines, transfer, EvictionStep, TransferMode, TransferOutcome,
};
use crate::error::BalanceError;
use crate::state::{BalancePhase, BalancerState, StateStore};

use super::balance_analyzer::{
    analyze_pairing, count_of, excesses, is_balanced, log_class_counts, shortfalls,
    IntegrityIssueType,
};
use super::report::{BalanceOutcome, BalanceReport, BalanceWarning};

/// Strategy for ordering candidate files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    /// File name order
    #[default]
    Ordered,
    /// Seeded shuffle
    Random { seed: u64 },
    /// Files with the fewest instances of the class first
    FewestInstances,
    /// Files with the most instances of the class first
    MostInstances,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &str {
        match self {
            SelectionStrategy::Ordered => "Ordered",
            SelectionStrategy::Random { .. } => "Random",
            SelectionStrategy::FewestInstances => "Fewest Instances",
            SelectionStrategy::MostInstances => "Most Instances",
        }
    }

    fn seed(&self) -> u64 {
        match self {
            SelectionStrategy::Random { seed } => *seed,
            _ => 0,
        }
    }
}

/// Order `(file name, instances of the class)` candidates.
/// Input is expected in file name order; ties keep that order.
pub fn order_candidates(
    strategy: SelectionStrategy,
    candidates: &mut [(String, usize)],
    rng: &mut StdRng,
) {
    match strategy {
        SelectionStrategy::Ordered => candidates.sort_by(|a, b| a.0.cmp(&b.0)),
        SelectionStrategy::Random { .. } => {
            candidates.sort_by(|a, b| a.0.cmp(&b.0));
            candidates.shuffle(rng);
        }
        SelectionStrategy::FewestInstances => {
            candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
        }
        SelectionStrategy::MostInstances => {
            candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        }
    }
}

/// Progress message for a balancing run
#[derive(Debug, Clone)]
pub enum BalanceProgressMessage {
    PhaseStarted {
        phase: BalancePhase,
        iteration: usize,
    },
    Transferred {
        file: String,
        mode: TransferMode,
    },
    Evicted {
        file: String,
        class_id: ClassId,
        lines: usize,
        whole_file: bool,
    },
    IterationFinished {
        iteration: usize,
        counts: ClassCount,
    },
    Finished(BalanceReport),
}

/// Orchestrates one balancing run over the four folders.
///
/// Single writer: nothing else may touch the output or extra folders while a
/// run is in progress.
pub struct DatasetBalancer {
    config: BalancerConfig,
    store: StateStore,
    state: BalancerState,
    class_names: Vec<String>,
    input: FolderIndex,
    secondary: FolderIndex,
    output: FolderIndex,
    known_classes: BTreeSet<ClassId>,
    report: BalanceReport,
    rng: StdRng,
    /// Files that failed or conflicted this run; not retried
    skipped: HashSet<String>,
    /// Output files whose eviction failed this run
    evict_failed: HashSet<String>,
    /// Output annotations reported without an image
    missing_images: HashSet<String>,
    transfers_since_checkpoint: usize,
    progress_tx: Option<Sender<BalanceProgressMessage>>,
    cancel_flag: Option<Arc<AtomicBool>>,
    cancelled: bool,
}

impl DatasetBalancer {
    pub fn new(config: BalancerConfig) -> Result<Self, BalanceError> {
        config.validate()?;

        Ok(Self {
            store: StateStore::new(&config.output_folder),
            state: BalancerState::new(config.target_count),
            class_names: Vec::new(),
            input: FolderIndex::empty(&config.input_folder),
            secondary: FolderIndex::empty(&config.secondary_folder),
            output: FolderIndex::empty(&config.output_folder),
            known_classes: BTreeSet::new(),
            report: BalanceReport::new(config.target_count),
            rng: StdRng::seed_from_u64(config.selection.seed()),
            skipped: HashSet::new(),
            evict_failed: HashSet::new(),
            missing_images: HashSet::new(),
            transfers_since_checkpoint: 0,
            progress_tx: None,
            cancel_flag: None,
            cancelled: false,
            config,
        })
    }

    pub fn with_progress(mut self, progress_tx: Sender<BalanceProgressMessage>) -> Self {
        self.progress_tx = Some(progress_tx);
        self
    }

    /// Checked between transfers; a set flag stops the run after persisting state.
    pub fn with_cancel_flag(mut self, cancel_flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(cancel_flag);
        self
    }

    /// Run all phases and return the end-of-run report.
    pub fn run(mut self) -> Result<BalanceReport, BalanceError> {
        let span = info_span!("balance_dataset");
        let _guard = span.enter();

        info!(
            "Starting dataset balancing: target {} per class, selection {}, eviction {}",
            self.config.target_count,
            self.config.selection.as_str(),
            self.config.eviction.as_str()
        );

        self.prepare_folders()?;
        self.restore_state()?;

        self.seed()?;
        if self.check_cancelled() {
            return self.finish();
        }

        self.populate_output()?;
        if self.check_cancelled() {
            return self.finish();
        }

        self.converge()?;
        self.finish()
    }

    // ------------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------------

    fn prepare_folders(&mut self) -> Result<(), BalanceError> {
        let output = self.config.output_folder.clone();
        let extra = self.config.extra_folder.clone();

        if self.config.reset {
            info!("Emptying output and extra folders...");
            self.store.clear().map_err(|e| BalanceError::ResetFolder {
                path: self.store.path().to_path_buf(),
                source: e,
            })?;
            for folder in [&output, &extra] {
                empty_folder(folder)?;
            }
        }

        for folder in [&output, &extra] {
            fs::create_dir_all(folder).map_err(|e| {
                error!("Cannot create folder {:?}: {}", folder, e);
                BalanceError::CreateFolder {
                    path: folder.clone(),
                    source: e,
                }
            })?;
        }
        Ok(())
    }

    fn restore_state(&mut self) -> Result<(), BalanceError> {
        // Every snapshot written from here on describes the real output
        self.reindex_output()?;

        let Some(mut saved) = self.store.load()? else {
            return Ok(());
        };

        if saved.target_count != self.config.target_count {
            warn!(
                "Saved state used target {}, running with configured target {}",
                saved.target_count, self.config.target_count
            );
            saved.target_count = self.config.target_count;
        }

        // Anything already sitting in the output was copied by an earlier run
        let present = list_annotation_files(&self.config.output_folder).map_err(|e| {
            BalanceError::ReadOutput {
                path: self.config.output_folder.clone(),
                source: e,
            }
        })?;
        for name in present {
            saved.mark_processed(&name);
        }

        info!(
            "Resuming from phase '{}' with {} processed files",
            saved.phase.as_str(),
            saved.processed_files.len()
        );
        self.state = saved;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Phase 1: seed
    // ------------------------------------------------------------------------

    fn seed(&mut self) -> Result<(), BalanceError> {
        self.emit(BalanceProgressMessage::PhaseStarted {
            phase: BalancePhase::Seed,
            iteration: 0,
        });

        let input_folder = self.config.input_folder.clone();
        let secondary_folder = self.config.secondary_folder.clone();

        // Read-only, so the two folders can be indexed side by side
        let (input_result, secondary_result) = thread::scope(|s| {
            let input = s.spawn(|| scan(&input_folder));
            let secondary = s.spawn(|| scan(&secondary_folder));
            (join_scan(input.join()), join_scan(secondary.join()))
        });

        self.input = input_result.map_err(|e| {
            error!("Cannot read input folder {:?}: {}", input_folder, e);
            BalanceError::ReadInput {
                path: input_folder.clone(),
                source: e,
            }
        })?;

        self.secondary = match secondary_result {
            Ok(index) => index,
            Err(e) => {
                warn!("Secondary folder {:?} unavailable: {}", secondary_folder, e);
                self.report.warn(BalanceWarning::FolderUnreadable {
                    folder: secondary_folder.clone(),
                    reason: e.to_string(),
                });
                FolderIndex::empty(&secondary_folder)
            }
        };

        for index in [&self.input, &self.secondary] {
            for line in &index.malformed {
                self.report
                    .warnings
                    .push(BalanceWarning::MalformedAnnotationLine(line.clone()));
            }
            for name in &index.unreadable {
                self.report.warnings.push(BalanceWarning::FolderUnreadable {
                    folder: index.folder.join(name),
                    reason: "annotation file could not be read".to_string(),
                });
            }
        }

        self.class_names = load_class_names(&input_folder);
        if self.class_names.is_empty() {
            self.class_names = load_class_names(&secondary_folder);
        }
        if self.class_names.is_empty() {
            warn!("classes.txt not found. Class names will be unknown.");
        }
        self.report.class_names = self.class_names.clone();

        self.known_classes = self
            .input
            .class_counts
            .keys()
            .chain(self.secondary.class_counts.keys())
            .chain(self.output.class_counts.keys())
            .copied()
            .chain(0..self.class_names.len() as ClassId)
            .collect();

        for &class_id in &self.known_classes {
            if self.input.count(class_id) + self.secondary.count(class_id) == 0 {
                warn!(
                    "Class {} has no instances in input or secondary",
                    class_id
                );
            }
        }

        log_class_counts(
            "Initial counts in input folder:",
            &self.input.class_counts,
            &self.class_names,
        );
        log_class_counts(
            "Available counts in secondary folder:",
            &self.secondary.class_counts,
            &self.class_names,
        );

        self.persist(BalancePhase::Seed)
    }

    // ------------------------------------------------------------------------
    // Phase 2: populate output
    // ------------------------------------------------------------------------

    fn populate_output(&mut self) -> Result<(), BalanceError> {
        info!("Copying input files to output...");
        self.emit(BalanceProgressMessage::PhaseStarted {
            phase: BalancePhase::Populate,
            iteration: 0,
        });

        let input_folder = self.config.input_folder.clone();
        let names: Vec<String> = self.input.files.file_names().map(str::to_string).collect();

        for name in names {
            if self.check_cancelled() {
                break;
            }
            if self.state.is_processed(&name) {
                debug!("{} already processed, skipping", name);
                continue;
            }
            self.copy_into_output(&name, &input_folder)?;
        }

        self.reindex_output()?;
        log_class_counts(
            "Counts in output after copying input:",
            &self.output.class_counts,
            &self.class_names,
        );
        self.persist(BalancePhase::Populate)
    }

    // ------------------------------------------------------------------------
    // Phases 3-5: top up, evict, repeat
    // ------------------------------------------------------------------------

    fn converge(&mut self) -> Result<(), BalanceError> {
        let target = self.config.target_count;
        let start = self.state.iteration;
        let max_iterations = self.config.max_iterations;

        // Already balanced output (e.g. a rerun) needs no passes at all
        if is_balanced(&self.output.class_counts, &self.known_classes, target) {
            info!("All classes already at target count {}", target);
            self.report.outcome = BalanceOutcome::Exact;
            return Ok(());
        }

        let mut outcome = BalanceOutcome::IterationBound;
        let mut iterations = 0;

        for iteration in 1..=max_iterations {
            iterations = iteration;
            info!("Rebalancing iteration {}", iteration);
            self.state.iteration = start + iteration;

            let added = self.top_up(iteration)?;
            if self.cancelled {
                outcome = BalanceOutcome::Cancelled;
                break;
            }
            let evicted = self.evict(iteration)?;
            if self.cancelled {
                outcome = BalanceOutcome::Cancelled;
                break;
            }

            self.emit(BalanceProgressMessage::IterationFinished {
                iteration,
                counts: self.output.class_counts.clone(),
            });
            log_class_counts(
                &format!("Counts after rebalancing iteration {}:", iteration),
                &self.output.class_counts,
                &self.class_names,
            );

            if is_balanced(&self.output.class_counts, &self.known_classes, target) {
                info!("All classes have exactly the target count. Rebalancing complete.");
                outcome = BalanceOutcome::Exact;
                break;
            }
            if !added && !evicted {
                info!("No changes made in this iteration. Rebalancing complete.");
                outcome = BalanceOutcome::FixedPoint;
                break;
            }
        }

        if outcome == BalanceOutcome::IterationBound {
            warn!(
                "Reached maximum of {} iterations. Rebalancing may be incomplete.",
                max_iterations
            );
            self.report.warn(BalanceWarning::IterationBoundExceeded {
                iterations: max_iterations,
            });
        }

        self.report.iterations = iterations;
        self.report.outcome = outcome;
        Ok(())
    }

    /// Copy secondary files into the output for each class under target.
    /// Returns whether any file landed.
    fn top_up(&mut self, iteration: usize) -> Result<bool, BalanceError> {
        self.emit(BalanceProgressMessage::PhaseStarted {
            phase: BalancePhase::TopUp,
            iteration,
        });

        let target = self.config.target_count;
        let secondary_folder = self.config.secondary_folder.clone();
        let mut added_any = false;

        for (class_id, needed) in shortfalls(&self.output.class_counts, &self.known_classes, target)
        {
            debug!("Class {} is under target by {}", class_id, needed);

            let mut candidates = self.secondary_candidates(class_id);
            order_candidates(self.config.selection, &mut candidates, &mut self.rng);

            let before = self.output.count(class_id);
            for (name, _) in candidates {
                if self.output.count(class_id) >= target || self.check_cancelled() {
                    break;
                }
                // A file pulled for an earlier class this pass is already in
                if self.state.is_processed(&name) {
                    continue;
                }
                if self.copy_into_output(&name, &secondary_folder)? {
                    added_any = true;
                }
            }

            let after = self.output.count(class_id);
            if after < target {
                info!(
                    "Unable to find enough files for class {}. Added {} out of {} needed.",
                    class_id,
                    after.saturating_sub(before),
                    needed
                );
            }
            if self.cancelled {
                break;
            }
        }

        self.reindex_output()?;
        self.persist(BalancePhase::TopUp)?;
        Ok(added_any)
    }

    /// Evict excess instances of each class over target.
    /// Returns whether anything was evicted.
    fn evict(&mut self, iteration: usize) -> Result<bool, BalanceError> {
        self.emit(BalanceProgressMessage::PhaseStarted {
            phase: BalancePhase::Evict,
            iteration,
        });

        let target = self.config.target_count;
        let mut evicted_any = false;

        for (class_id, excess) in excesses(&self.output.class_counts, &self.known_classes, target) {
            info!(
                "Class {} is over target ({} > {}), evicting {}",
                class_id,
                self.output.count(class_id),
                target,
                excess
            );

            let mut candidates: Vec<(String, usize)> = self
                .output
                .files
                .files_with_class(class_id)
                .into_iter()
                .filter(|(name, _)| !self.evict_failed.contains(*name))
                .map(|(name, n)| (name.to_string(), n))
                .collect();
            order_candidates(self.config.selection, &mut candidates, &mut self.rng);

            for (name, _) in candidates {
                let remaining = self.output.count(class_id).saturating_sub(target);
                if remaining == 0 || self.check_cancelled() {
                    break;
                }
                if self.evict_from_file(&name, class_id, remaining)? {
                    evicted_any = true;
                }
            }

            if self.cancelled {
                break;
            }
        }

        self.reindex_output()?;
        self.persist(BalancePhase::Evict)?;
        Ok(evicted_any)
    }

    fn evict_from_file(
        &mut self,
        name: &str,
        class_id: ClassId,
        remaining: usize,
    ) -> Result<bool, BalanceError> {
        let Some(counts) = self.output.files.get(name).cloned() else {
            return Ok(false);
        };
        let in_file = count_of(&counts, class_id);
        if in_file == 0 {
            return Ok(false);
        }

        let output_folder = self.config.output_folder.clone();
        let extra_folder = self.config.extra_folder.clone();

        let mut step = choose_step(self.config.eviction, &counts, class_id, remaining);

        // The overflow file may already hold lines evicted earlier
        if step == EvictionStep::MoveFile && extra_folder.join(name).exists() {
            debug!("{} already has an overflow file, stripping lines instead", name);
            step = EvictionStep::StripLines(in_file.min(remaining));
        }

        if step == EvictionStep::MoveFile {
            match transfer(TransferMode::Move, name, &output_folder, &extra_folder) {
                Ok(outcome) if outcome.landed() => {
                    if outcome == TransferOutcome::MissingImageAsset
                        && self.missing_images.insert(name.to_string())
                    {
                        self.report.warn(BalanceWarning::MissingImageAsset {
                            file: name.to_string(),
                            folder: output_folder.clone(),
                        });
                    }
                    info!("Moved {} to extra folder ({} of class {})", name, in_file, class_id);
                    self.report.files_evicted += 1;
                    self.refresh_output_file(name);
                    self.emit(BalanceProgressMessage::Evicted {
                        file: name.to_string(),
                        class_id,
                        lines: in_file,
                        whole_file: true,
                    });
                    return Ok(true);
                }
                Ok(outcome) => {
                    debug!("Whole-file eviction of {} not possible ({:?})", name, outcome);
                    step = EvictionStep::StripLines(in_file.min(remaining));
                }
                Err(e) => {
                    error!("Failed to evict {}: {}", name, e);
                    self.evict_failed.insert(name.to_string());
                    self.report.warn(BalanceWarning::TransferFailed {
                        file: name.to_string(),
                        reason: e.to_string(),
                    });
                    return Ok(false);
                }
            }
        }

        let EvictionStep::StripLines(count) = step else {
            return Ok(false);
        };
        match strip_class_lines(&output_folder, &extra_folder, name, class_id, count) {
            Ok(0) => Ok(false),
            Ok(removed) => {
                self.report.lines_evicted += removed;
                self.refresh_output_file(name);
                self.emit(BalanceProgressMessage::Evicted {
                    file: name.to_string(),
                    class_id,
                    lines: removed,
                    whole_file: false,
                });
                Ok(true)
            }
            Err(e) => {
                error!("Failed to evict lines from {}: {}", name, e);
                self.evict_failed.insert(name.to_string());
                self.report.warn(BalanceWarning::TransferFailed {
                    file: name.to_string(),
                    reason: e.to_string(),
                });
                Ok(false)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Finish
    // ------------------------------------------------------------------------

    fn finish(mut self) -> Result<BalanceReport, BalanceError> {
        if self.cancelled {
            warn!("Balancing cancelled; state saved for resume");
            self.report.outcome = BalanceOutcome::Cancelled;
            self.sync_state();
            self.store.save(&self.state)?;
        } else {
            self.flag_unsatisfiable();
            self.audit_pairing();
            self.persist(BalancePhase::Complete)?;
        }

        self.report.final_counts = self.output.class_counts.clone();
        for line in self.report.summary_lines() {
            info!("{}", line);
        }

        let report = self.report.clone();
        self.emit(BalanceProgressMessage::Finished(report.clone()));
        Ok(report)
    }

    /// Report classes left under target. A class is unsatisfiable when the
    /// pools never held enough instances or no secondary file is left to copy.
    fn flag_unsatisfiable(&mut self) {
        let target = self.config.target_count;
        for (class_id, _) in shortfalls(&self.output.class_counts, &self.known_classes, target) {
            let final_count = self.output.count(class_id);
            let available = self.input.count(class_id) + self.secondary.count(class_id);
            let remaining_files = self.secondary_candidates(class_id).len();

            if available < target || remaining_files == 0 {
                warn!(
                    "Class {} cannot reach target {}: {} in output, {} available",
                    class_id, target, final_count, available
                );
                self.report.warn(BalanceWarning::UnsatisfiableClass {
                    class_id,
                    final_count,
                    available,
                });
            } else {
                warn!(
                    "Class {} ended under target {} with {} secondary file(s) unused",
                    class_id, target, remaining_files
                );
                self.report.warn(BalanceWarning::ClassShortfall {
                    class_id,
                    final_count,
                    remaining_files,
                });
            }
        }
    }

    fn audit_pairing(&mut self) {
        let stats = analyze_pairing(&self.config.output_folder);
        for issue in stats.all_issues() {
            if issue.issue_type == IntegrityIssueType::LabelWithoutImage {
                let name = issue
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                if self.missing_images.contains(&name) {
                    continue;
                }
            }
            self.report.warn(BalanceWarning::UnpairedFile {
                path: issue.path.clone(),
                expected_counterpart: issue.expected_counterpart.clone(),
            });
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Copy one pair into the output and account for it.
    /// Returns whether the annotation landed.
    fn copy_into_output(&mut self, name: &str, src_folder: &Path) -> Result<bool, BalanceError> {
        let output_folder = self.config.output_folder.clone();

        let landed = match transfer(TransferMode::Copy, name, src_folder, &output_folder) {
            Ok(TransferOutcome::Transferred { .. }) => true,
            Ok(TransferOutcome::MissingImageAsset) => {
                self.missing_images.insert(name.to_string());
                self.report.warn(BalanceWarning::MissingImageAsset {
                    file: name.to_string(),
                    folder: src_folder.to_path_buf(),
                });
                true
            }
            Ok(TransferOutcome::AlreadyPresent) => {
                self.state.mark_processed(name);
                self.refresh_output_file(name);
                false
            }
            Ok(TransferOutcome::DestinationConflict { path }) => {
                self.skipped.insert(name.to_string());
                self.report.warn(BalanceWarning::DestinationConflict {
                    file: name.to_string(),
                    path,
                });
                false
            }
            Err(e) => {
                error!("Failed to copy {} from {:?}: {}", name, src_folder, e);
                self.skipped.insert(name.to_string());
                self.report.warn(BalanceWarning::TransferFailed {
                    file: name.to_string(),
                    reason: e.to_string(),
                });
                false
            }
        };

        if landed {
            self.state.mark_processed(name);
            self.report.files_copied += 1;
            self.refresh_output_file(name);
            self.emit(BalanceProgressMessage::Transferred {
                file: name.to_string(),
                mode: TransferMode::Copy,
            });
            self.checkpoint()?;
        }
        Ok(landed)
    }

    /// Secondary files holding `class_id` that are neither copied nor skipped,
    /// in file name order.
    fn secondary_candidates(&self, class_id: ClassId) -> Vec<(String, usize)> {
        self.secondary
            .files
            .files_with_class(class_id)
            .into_iter()
            .filter(|(name, _)| !self.state.is_processed(name) && !self.skipped.contains(*name))
            .map(|(name, n)| (name.to_string(), n))
            .collect()
    }

    fn refresh_output_file(&mut self, name: &str) {
        if let Err(e) = self.output.refresh_file(name) {
            warn!("Failed to re-read {} in output: {}", name, e);
        }
    }

    /// Replace the output view wholesale with a fresh scan.
    fn reindex_output(&mut self) -> Result<(), BalanceError> {
        self.output = scan(&self.config.output_folder).map_err(|e| BalanceError::ReadOutput {
            path: self.config.output_folder.clone(),
            source: e,
        })?;
        self.known_classes
            .extend(self.output.class_counts.keys().copied());
        Ok(())
    }

    fn sync_state(&mut self) {
        self.state.target_count = self.config.target_count;
        self.state.class_counts = self.output.class_counts.clone();
        self.state.output_index = self.output.files.clone();
    }

    fn persist(&mut self, phase: BalancePhase) -> Result<(), BalanceError> {
        self.state.phase = phase;
        self.sync_state();
        self.store.save(&self.state)?;
        self.transfers_since_checkpoint = 0;
        Ok(())
    }

    fn checkpoint(&mut self) -> Result<(), BalanceError> {
        self.transfers_since_checkpoint += 1;
        if self.config.checkpoint_every > 0
            && self.transfers_since_checkpoint >= self.config.checkpoint_every
        {
            debug!("Checkpointing after {} transfers", self.transfers_since_checkpoint);
            self.sync_state();
            self.store.save(&self.state)?;
            self.transfers_since_checkpoint = 0;
        }
        Ok(())
    }

    fn check_cancelled(&mut self) -> bool {
        if !self.cancelled {
            if let Some(ref cancel) = self.cancel_flag {
                if cancel.load(Ordering::Relaxed) {
                    warn!("Balancing cancelled by user");
                    self.cancelled = true;
                }
            }
        }
        self.cancelled
    }

    fn emit(&self, message: BalanceProgressMessage) {
        if let Some(ref tx) = self.progress_tx {
            let _ = tx.send(message);
        }
    }
}

fn join_scan(
    result: thread::Result<std::io::Result<FolderIndex>>,
) -> std::io::Result<FolderIndex> {
    result.unwrap_or_else(|_| {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "indexing thread panicked",
        ))
    })
}

/// Remove every entry of `folder`, keeping the folder itself.
fn empty_folder(folder: &Path) -> Result<(), BalanceError> {
    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(BalanceError::ResetFolder {
                path: folder.to_path_buf(),
                source: e,
            })
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| BalanceError::ResetFolder {
            path: path.clone(),
            source: e,
        })?;
    }
    info!("Emptied {:?}", folder);
    Ok(())
}
