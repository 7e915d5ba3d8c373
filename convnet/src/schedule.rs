/// Milestone learning-rate schedule: the rate is multiplied by `gamma` at
/// each configured epoch, advanced exactly once per epoch.
#[derive(Debug, Clone)]
pub struct MultiStepLr {
    base_lr: f32,
    gamma: f32,
    milestones: Vec<usize>,
    epochs_done: usize,
}

impl MultiStepLr {
    pub fn new(base_lr: f32, milestones: Vec<usize>, gamma: f32) -> Self {
        Self {
            base_lr,
            gamma,
            milestones,
            epochs_done: 0,
        }
    }

    /// The effective rate for the current position in the schedule.
    pub fn current_lr(&self) -> f32 {
        let hits = self
            .milestones
            .iter()
            .filter(|&&m| m <= self.epochs_done)
            .count();

        self.base_lr * self.gamma.powi(hits as i32)
    }

    /// Advances past one finished epoch and returns the new effective rate.
    pub fn step(&mut self) -> f32 {
        self.epochs_done += 1;
        self.current_lr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_changes_only_at_exact_milestones() {
        let mut sched = MultiStepLr::new(1.0, vec![2, 4], 0.1);
        assert_eq!(sched.current_lr(), 1.0);

        assert_eq!(sched.step(), 1.0); // after epoch 1
        assert!((sched.step() - 0.1).abs() < 1e-9); // after epoch 2
        assert!((sched.step() - 0.1).abs() < 1e-9); // after epoch 3
        assert!((sched.step() - 0.01).abs() < 1e-9); // after epoch 4
        assert!((sched.step() - 0.01).abs() < 1e-9); // after epoch 5
    }

    #[test]
    fn empty_milestones_keep_the_base_rate() {
        let mut sched = MultiStepLr::new(0.1, vec![], 0.1);
        for _ in 0..10 {
            assert_eq!(sched.step(), 0.1);
        }
    }
}
