use log::info;

/// Track progress of a bulk recalculation
pub struct RecalculationProgress {
    total: usize,
    updated: usize,
    failed: usize,
    log_every: usize,
}

impl RecalculationProgress {
    pub fn new(total: usize, log_every: usize) -> Self {
        Self {
            total,
            updated: 0,
            failed: 0,
            log_every: log_every.max(1),
        }
    }

    pub fn increment_updated(&mut self) {
        self.updated += 1;
        self.log_progress();
    }

    pub fn increment_failed(&mut self) {
        self.failed += 1;
        self.log_progress();
    }

    pub fn current_count(&self) -> usize {
        self.updated + self.failed
    }

    fn log_progress(&self) {
        let current = self.current_count();
        if should_log(current, self.total, self.log_every) {
            info!(
                "  → Progress: {}/{} ({} updated, {} failed)",
                current, self.total, self.updated, self.failed
            );
        }
    }
}

fn should_log(current: usize, total: usize, every: usize) -> bool {
    is_milestone(current, every) || is_complete(current, total)
}

fn is_milestone(count: usize, every: usize) -> bool {
    count % every == 0
}

fn is_complete(current: usize, total: usize) -> bool {
    current == total
}
