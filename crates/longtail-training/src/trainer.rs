//! The training loop.
//!
//! A [`Trainer`] moves through
//! `Initialized → Epoch(k) → … → Stopped(reason) → BestModelRestored`.
//! Each epoch trains on shuffled full batches, evaluates every split and
//! snapshots all components whenever the validation IC strictly improves.
//! At the end the best snapshot is restored into the live model and written
//! to `<save_dir>/<component>.safetensors`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use candle_core::Tensor;
use longtail_checkpoint::{load_component, write_tensors, CheckpointError, ParameterSnapshot};
use longtail_core::{ConfigError, ContrastiveKind, TrainerConfig, MULTI_HORIZON_WIDTH};
use longtail_data::{DailyGroups, DataProvider, RowKey, Split, SplitFrame};
use longtail_layers::Encoder;
use longtail_losses::{masked_mse, masked_mse_host, SortedPool};
use longtail_optimizer::{clip_grad_value, create_optimizer, OptimizerConfig, OptimizerDyn};
use longtail_tensor::{device_for, seed_device};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RecorderError, TrainingResult};
use crate::hooks::{EarlyStopping, StopDecision};
use crate::metrics::{format_metrics, ic_summary, EvalMetrics};
use crate::model::LongtailModel;
use crate::objective::{contrastive_loss, BatchContext};
use crate::recorder::Recorder;

/// Why training ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Validation IC stalled for `early_stop` epochs.
    EarlyStop,
    /// The epoch budget ran out.
    MaxEpochs,
}

/// Lifecycle of a [`Trainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    /// Built, not yet fitted.
    Initialized,
    /// Inside epoch `k`.
    Epoch(usize),
    /// The epoch loop ended.
    Stopped(StopReason),
    /// The best snapshot is live and persisted.
    BestModelRestored,
}

/// A cleaned split with its primary labels and day groups.
#[derive(Debug, Clone)]
pub struct PreparedSplit {
    split: Split,
    frame: SplitFrame,
    primary: Vec<f32>,
    groups: DailyGroups,
}

impl PreparedSplit {
    /// Cleans `frame` on the `primary_index` label column.
    pub fn new(split: Split, frame: SplitFrame, primary_index: usize) -> TrainingResult<Self> {
        let frame = frame.clean(primary_index)?;
        let primary = frame.label_column(primary_index);
        let groups = frame.daily_groups();
        Ok(Self {
            split,
            frame,
            primary,
            groups,
        })
    }

    /// Which split this is.
    pub fn split(&self) -> Split {
        self.split
    }

    /// The cleaned frame.
    pub fn frame(&self) -> &SplitFrame {
        &self.frame
    }

    /// Primary label per row.
    pub fn primary(&self) -> &[f32] {
        &self.primary
    }

    /// Same-day row groups.
    pub fn groups(&self) -> &DailyGroups {
        &self.groups
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.frame.len()
    }

    /// Whether no row survived cleaning.
    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }
}

/// Per-epoch training statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EpochStats {
    /// Full batches processed.
    pub batches: usize,
    /// Mean masked MSE per batch.
    pub regression_loss: f64,
    /// Mean blended contrastive loss per batch.
    pub contrastive_loss: f64,
    /// Mean memory regularization loss per batch.
    pub memory_loss: f64,
    /// Batches whose samples all shared one prototype.
    pub collapsed_batches: usize,
    /// Positive pairs per training row.
    pub positive_num: f64,
    /// Negative pairs per training row.
    pub negative_num: f64,
}

impl EpochStats {
    fn finish(mut self, rows: usize) -> Self {
        if self.batches > 0 {
            let b = self.batches as f64;
            self.regression_loss /= b;
            self.contrastive_loss /= b;
            self.memory_loss /= b;
        }
        if rows > 0 {
            self.positive_num /= rows as f64;
            self.negative_num /= rows as f64;
        }
        self
    }

    /// Writes the statistics into a metric map.
    pub fn insert_into(&self, out: &mut BTreeMap<String, f64>) {
        out.insert("train_reg_loss".into(), self.regression_loss);
        out.insert("additional_loss".into(), self.contrastive_loss);
        out.insert("prototype_constraint_loss".into(), self.memory_loss);
        out.insert("all_same_batch_num".into(), self.collapsed_batches as f64);
        out.insert("positive_num".into(), self.positive_num);
        out.insert("negative_num".into(), self.negative_num);
    }
}

/// Summary of a finished [`Trainer::fit`], also saved through the recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// Epoch whose parameters were restored, if any epoch improved.
    pub best_epoch: Option<usize>,
    /// Best validation IC.
    pub best_valid_ic: f64,
    /// Epochs actually trained.
    pub epochs_run: usize,
    /// Why the loop ended.
    pub stop_reason: StopReason,
    /// Files written, one per active component.
    pub saved: Vec<PathBuf>,
}

/// What the epoch loop hands back to [`Trainer::fit`].
struct EpochOutcome {
    snapshot: ParameterSnapshot,
    best_epoch: Option<usize>,
    best_valid_ic: f64,
    epochs_run: usize,
    stop_reason: StopReason,
}

/// Predictions aligned with a frame's index.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    /// Row keys, in frame order.
    pub index: Vec<RowKey>,
    /// One score per row.
    pub scores: Vec<f32>,
}

/// Tensor names written by [`Trainer::dump_representations`].
pub const DUMP_TENSORS: [&str; 4] = ["features", "representations", "labels", "predictions"];

/// Training context: configuration, model, optimizer and RNG.
pub struct Trainer {
    config: TrainerConfig,
    model: LongtailModel,
    optimizer: Box<dyn OptimizerDyn>,
    rng: StdRng,
    state: TrainerState,
}

impl Trainer {
    /// Validates `config` and builds the model and optimizer.
    pub fn new(config: TrainerConfig) -> TrainingResult<Self> {
        config.validate()?;
        let device = device_for(config.device)?;
        if let Some(seed) = config.seed {
            seed_device(&device, seed)?;
        }
        let model = LongtailModel::new(&config, &device)?;
        let optimizer = create_optimizer(
            OptimizerConfig::from_kind(config.optimizer, config.learning_rate),
            model.vars(),
        )?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!(
            optimizer = optimizer.config().name(),
            learning_rate = config.learning_rate,
            batch_size = config.batch_size,
            contrastive = config.contrastive.as_ref().map(|c| c.objective.name()),
            "Trainer initialized"
        );
        Ok(Self {
            config,
            model,
            optimizer,
            rng,
            state: TrainerState::Initialized,
        })
    }

    /// The configuration in use.
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// The live model.
    pub fn model(&self) -> &LongtailModel {
        &self.model
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TrainerState {
        self.state
    }

    /// Loads `split` from `provider` and cleans it on the primary label.
    pub fn prepare<P: DataProvider + ?Sized>(&self, provider: &P, split: Split) -> TrainingResult<PreparedSplit> {
        let frame = provider.prepare(split)?;
        let primary = self.config.data_region.primary_label_index(frame.horizons())?;
        let prepared = PreparedSplit::new(split, frame, primary)?;
        self.check_frame(prepared.frame())?;
        Ok(prepared)
    }

    fn check_frame(&self, frame: &SplitFrame) -> TrainingResult<()> {
        let feature_dim = self.config.encoder.feature_dim;
        if frame.feature_width() == 0 || frame.feature_width() % feature_dim != 0 {
            return Err(ConfigError::invalid(
                "encoder.feature_dim",
                format!(
                    "{} feature columns are not a whole number of {feature_dim}-feature steps",
                    frame.feature_width()
                ),
            )
            .into());
        }
        let needs_full = self
            .config
            .contrastive
            .as_ref()
            .is_some_and(|c| c.objective.needs_full_horizons());
        if needs_full && frame.horizons() != MULTI_HORIZON_WIDTH {
            return Err(ConfigError::invalid(
                "labels",
                format!(
                    "the selected weighting needs {MULTI_HORIZON_WIDTH} horizons, got {}",
                    frame.horizons()
                ),
            )
            .into());
        }
        Ok(())
    }

    fn save_dir(&self) -> TrainingResult<PathBuf> {
        let dir = self
            .config
            .save_dir
            .clone()
            .ok_or_else(|| ConfigError::invalid("save_dir", "must name an existing directory, got none"))?;
        if !dir.is_dir() {
            return Err(CheckpointError::MissingDirectory(dir).into());
        }
        Ok(dir)
    }

    /// Trains until early stop or the epoch budget, then restores and
    /// persists the best parameters.
    pub fn fit<P, R>(&mut self, provider: &P, recorder: &mut R) -> TrainingResult<FitReport>
    where
        P: DataProvider + ?Sized,
        R: Recorder + ?Sized,
    {
        let save_dir = self.save_dir()?;
        let train = self.prepare(provider, Split::Train)?;
        let valid = self.prepare(provider, Split::Valid)?;
        let test = self.prepare(provider, Split::Test)?;
        for split in [&train, &valid] {
            if split.is_empty() {
                return Err(ConfigError::EmptySplit {
                    split: split.split().to_string(),
                }
                .into());
            }
        }
        let pool = match self.config.contrastive.as_ref().map(|c| &c.objective) {
            Some(ContrastiveKind::Sampling(_)) => Some(SortedPool::new(
                train.frame().features(),
                train.primary(),
                train.frame().feature_width(),
            )?),
            _ => None,
        };

        info!(
            train = train.len(),
            valid = valid.len(),
            test = test.len(),
            "Training..."
        );
        let mut initial = BTreeMap::new();
        for split in [&train, &valid, &test] {
            self.evaluate(split)?.insert_into(split.split().name(), &mut initial);
        }
        info!("Initial evaluation: {}", format_metrics(&initial));

        let outcome = self.run_epochs(&train, pool.as_ref(), |trainer, epoch, stats| {
            let mut metrics = BTreeMap::new();
            stats.insert_into(&mut metrics);
            let mut valid_ic = f64::NAN;
            for split in [&train, &valid, &test] {
                let eval = trainer.evaluate(split)?;
                if split.split() == Split::Valid {
                    valid_ic = eval.ic.ic;
                }
                eval.insert_into(split.split().name(), &mut metrics);
            }
            info!(epoch, "{}", format_metrics(&metrics));
            recorder.log_metrics(epoch, &metrics)?;
            Ok(valid_ic)
        })?;

        let saved = outcome.snapshot.save_components(&save_dir)?;
        info!(
            best_valid_ic = outcome.best_valid_ic,
            best_epoch = ?outcome.best_epoch,
            path = %save_dir.display(),
            "Model saved"
        );

        let report = FitReport {
            best_epoch: outcome.best_epoch,
            best_valid_ic: outcome.best_valid_ic,
            epochs_run: outcome.epochs_run,
            stop_reason: outcome.stop_reason,
            saved,
        };
        let value = serde_json::to_value(&report).map_err(RecorderError::from)?;
        recorder.save_object("fit_report", &value)?;
        Ok(report)
    }

    /// Runs the epoch loop and leaves the best parameters live.
    ///
    /// `validate` sees the trainer after each epoch's update and returns the
    /// validation IC that drives early stopping.
    fn run_epochs<F>(
        &mut self,
        train: &PreparedSplit,
        pool: Option<&SortedPool>,
        mut validate: F,
    ) -> TrainingResult<EpochOutcome>
    where
        F: FnMut(&Self, usize, &EpochStats) -> TrainingResult<f64>,
    {
        let mut stopper = EarlyStopping::new(self.config.early_stop);
        let mut best: Option<ParameterSnapshot> = None;
        let mut stop_reason = StopReason::MaxEpochs;
        let mut epochs_run = 0;
        for epoch in 0..self.config.epochs {
            self.state = TrainerState::Epoch(epoch);
            let stats = self.train_epoch(epoch, train, pool)?;
            if stats.collapsed_batches > 0 {
                warn!(epoch, batches = stats.collapsed_batches, "Batches collapsed onto one prototype");
            }
            let valid_ic = validate(&*self, epoch, &stats)?;
            epochs_run = epoch + 1;

            match stopper.observe(epoch, valid_ic) {
                StopDecision::Improved => {
                    best = Some(ParameterSnapshot::capture(self.model.varmap())?);
                    info!(epoch, valid_ic, "Best parameters updated");
                }
                StopDecision::Continue => {}
                StopDecision::Stop => {
                    stop_reason = StopReason::EarlyStop;
                    break;
                }
            }
        }
        self.state = TrainerState::Stopped(stop_reason);

        let snapshot = match best {
            Some(snapshot) => snapshot,
            None => {
                warn!("No epoch improved the validation IC, keeping the final parameters");
                ParameterSnapshot::capture(self.model.varmap())?
            }
        };
        snapshot.restore(self.model.varmap())?;
        self.state = TrainerState::BestModelRestored;
        Ok(EpochOutcome {
            snapshot,
            best_epoch: stopper.best_epoch(),
            best_valid_ic: stopper.best_value(),
            epochs_run,
            stop_reason,
        })
    }

    /// One pass over `floor(N / B)` shuffled full batches.
    pub fn train_epoch(
        &mut self,
        epoch: usize,
        train: &PreparedSplit,
        pool: Option<&SortedPool>,
    ) -> TrainingResult<EpochStats> {
        let batch_size = self.config.batch_size;
        let width = train.frame().feature_width();
        let mut order: Vec<usize> = (0..train.len()).collect();
        order.shuffle(&mut self.rng);

        let vars = self.model.vars();
        let want_attention = self.model.memory().is_some()
            && matches!(
                self.config.contrastive.as_ref().map(|c| &c.objective),
                Some(ContrastiveKind::Sampling(_))
            );
        let mut stats = EpochStats::default();

        for rows in order.chunks_exact(batch_size) {
            let features = train.frame().gather_features(rows);
            let labels: Vec<f32> = rows.iter().map(|r| train.primary()[*r]).collect();
            let xs = Tensor::from_slice(&features, (rows.len(), width), self.model.device())?;
            let out = self.model.forward(&xs, true, want_attention)?;

            let regression = masked_mse(&out.pred, &labels)?;
            stats.regression_loss += regression.to_scalar::<f32>()? as f64;
            let mut loss = regression;
            if let Some(memory) = &out.memory {
                stats.memory_loss += memory.loss.to_scalar::<f32>()? as f64;
                if memory.collapsed {
                    stats.collapsed_batches += 1;
                }
                loss = (loss + &memory.loss)?;
            }
            if let Some(contrastive) = &self.config.contrastive {
                let horizons = train.frame().gather_label_rows(rows);
                let ranks: Vec<usize> = match pool {
                    Some(pool) => rows.iter().map(|r| pool.rank(*r)).collect(),
                    None => Vec::new(),
                };
                let ctx = BatchContext {
                    epoch,
                    xs: &xs,
                    features: &features,
                    labels: &labels,
                    horizons: &horizons,
                    ranks: &ranks,
                    pool,
                };
                let objective = contrastive_loss(&contrastive.objective, &self.model, &out, &ctx, &mut self.rng)?;
                let blended = objective.loss.affine(contrastive.scale(), 0.0)?;
                stats.contrastive_loss += blended.to_scalar::<f32>()? as f64;
                stats.positive_num += objective.positive_num as f64;
                stats.negative_num += objective.negative_num as f64;
                stats.collapsed_batches += objective.collapsed;
                loss = (loss + blended)?;
            }

            let mut grads = loss.backward()?;
            let clipped = clip_grad_value(&mut grads, &vars, self.config.grad_clip)?;
            self.optimizer.step(&grads)?;
            stats.batches += 1;
            debug!(
                epoch,
                batch = stats.batches,
                loss = loss.to_scalar::<f32>()?,
                clipped,
                "Batch done"
            );
        }
        if stats.batches == 0 {
            warn!(
                epoch,
                rows = train.len(),
                batch_size,
                "Training split is smaller than one batch, no update"
            );
        }
        Ok(stats.finish(train.len()))
    }

    /// Inference-mode predictions for every row of `frame`, including the
    /// trailing partial chunk. NaN features are read as zero.
    fn infer(&self, frame: &SplitFrame) -> TrainingResult<Vec<f32>> {
        let rows: Vec<usize> = (0..frame.len()).collect();
        let mut preds = Vec::with_capacity(frame.len());
        for chunk in rows.chunks(self.config.batch_size) {
            let xs = self.chunk_tensor(frame, chunk)?;
            preds.extend(self.model.predict(&xs)?);
        }
        Ok(preds)
    }

    fn chunk_tensor(&self, frame: &SplitFrame, rows: &[usize]) -> TrainingResult<Tensor> {
        let features: Vec<f32> = frame
            .gather_features(rows)
            .into_iter()
            .map(|v| if v.is_nan() { 0.0 } else { v })
            .collect();
        Ok(Tensor::from_slice(
            &features,
            (rows.len(), frame.feature_width()),
            self.model.device(),
        )?)
    }

    /// Loss, score and daily correlations of the live model on `split`.
    pub fn evaluate(&self, split: &PreparedSplit) -> TrainingResult<EvalMetrics> {
        let preds = self.infer(split.frame())?;
        let loss = masked_mse_host(&preds, split.primary());
        Ok(EvalMetrics {
            loss,
            score: -loss,
            ic: ic_summary(&preds, split.primary(), split.groups()),
        })
    }

    /// Predictions for every row of `frame`, aligned with its index.
    pub fn predict(&self, frame: &SplitFrame) -> TrainingResult<Predictions> {
        self.check_frame(frame)?;
        Ok(Predictions {
            index: frame.index().to_vec(),
            scores: self.infer(frame)?,
        })
    }

    /// Writes the first batch of `frame` (features, representations, primary
    /// labels and predictions) to a safetensors file at `path`.
    pub fn dump_representations(&self, frame: &SplitFrame, path: &Path) -> TrainingResult<()> {
        if frame.is_empty() {
            return Err(ConfigError::EmptySplit {
                split: "representation dump".to_string(),
            }
            .into());
        }
        let primary = self.config.data_region.primary_label_index(frame.horizons())?;
        let rows: Vec<usize> = (0..frame.len().min(self.config.batch_size)).collect();
        let xs = self.chunk_tensor(frame, &rows)?;
        let reprs = self.model.encoder().represent(&xs, false)?.detach();
        let preds = self.model.forward(&xs, false, false)?.pred.detach();
        let labels: Vec<f32> = rows.iter().map(|r| frame.label_row(*r)[primary]).collect();
        let labels = Tensor::from_slice(&labels, rows.len(), self.model.device())?;

        let tensors: HashMap<String, Tensor> = DUMP_TENSORS
            .iter()
            .map(|name| name.to_string())
            .zip([xs, reprs, labels, preds])
            .collect();
        write_tensors(path, &tensors)?;
        Ok(())
    }

    /// Reloads every active component from `<dir>/<component>.safetensors`.
    pub fn load_components(&mut self, dir: &Path) -> TrainingResult<()> {
        for component in self.model.components() {
            load_component(dir, component, self.model.varmap())?;
        }
        info!(path = %dir.display(), "Model loaded");
        Ok(())
    }
}
