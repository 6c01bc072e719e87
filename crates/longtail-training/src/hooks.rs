//! Early stopping on the validation IC.

use tracing::{debug, info};

/// Outcome of one [`EarlyStopping::observe`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    /// The value beat the best so far; the caller should snapshot.
    Improved,
    /// No improvement, patience not yet exhausted.
    Continue,
    /// Patience exhausted.
    Stop,
}

/// Patience-based stopping on a higher-is-better metric.
///
/// The best value starts at negative infinity and only a strictly greater
/// value counts as an improvement, so NaN never improves.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best_value: f64,
    best_epoch: Option<usize>,
    stalled: usize,
}

impl EarlyStopping {
    /// Creates a tracker that stops after `patience` epochs without improvement.
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_value: f64::NEG_INFINITY,
            best_epoch: None,
            stalled: 0,
        }
    }

    /// Records the metric of `epoch`.
    pub fn observe(&mut self, epoch: usize, value: f64) -> StopDecision {
        if value > self.best_value {
            debug!(epoch, previous = self.best_value, value, "Validation IC improved");
            self.best_value = value;
            self.best_epoch = Some(epoch);
            self.stalled = 0;
            return StopDecision::Improved;
        }
        self.stalled += 1;
        debug!(epoch, stalled = self.stalled, patience = self.patience, "No improvement");
        if self.stalled >= self.patience {
            info!(epoch, best_epoch = ?self.best_epoch, "Early stop");
            StopDecision::Stop
        } else {
            StopDecision::Continue
        }
    }

    /// Best value seen so far.
    pub fn best_value(&self) -> f64 {
        self.best_value
    }

    /// Epoch of the best value, if any epoch improved.
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Epochs since the last improvement.
    pub fn stalled(&self) -> usize {
        self.stalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stops_after_patience() {
        let mut es = EarlyStopping::new(2);
        assert_eq!(es.observe(0, 0.1), StopDecision::Improved);
        assert_eq!(es.observe(1, 0.1), StopDecision::Continue);
        assert_eq!(es.observe(2, 0.3), StopDecision::Improved);
        assert_eq!(es.observe(3, 0.2), StopDecision::Continue);
        assert_eq!(es.observe(4, 0.25), StopDecision::Stop);
        assert_eq!(es.best_epoch(), Some(2));
        assert_eq!(es.best_value(), 0.3);
    }

    #[test]
    fn test_nan_never_improves() {
        let mut es = EarlyStopping::new(1);
        assert_eq!(es.observe(0, f64::NAN), StopDecision::Stop);
        assert_eq!(es.best_epoch(), None);
    }

    #[test]
    fn test_peak_then_stall_runs_patience_more_epochs() {
        let patience = 3;
        let mut es = EarlyStopping::new(patience);
        let script = [0.01, 0.02, 0.05, 0.04, 0.03, 0.045, 0.01, 0.02];
        let mut ran = 0;
        for (epoch, value) in script.iter().enumerate() {
            ran = epoch + 1;
            if es.observe(epoch, *value) == StopDecision::Stop {
                break;
            }
        }
        assert_eq!(es.best_epoch(), Some(2));
        assert_eq!(ran, 3 + patience);
    }
}
