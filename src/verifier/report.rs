/// Verifier tuning knobs
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Violations kept per check for the detail list; totals are always full
    pub max_violations: usize,
    /// Settle events each trade must produce. Two legs for each of two
    /// counterparties today; a future fee leg would make it five, so this
    /// is a parameter rather than a literal.
    pub settle_events_per_trade: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self { max_violations: 3, settle_events_per_trade: 4 }
    }
}

/// Bounded violation accumulator: keeps the first N details, counts all
#[derive(Debug, Clone)]
pub struct ViolationList {
    cap: usize,
    total: u64,
    sample: Vec<String>,
}

impl ViolationList {
    pub fn new(cap: usize) -> Self {
        Self { cap, total: 0, sample: Vec::new() }
    }

    pub fn push(&mut self, detail: String) {
        self.total += 1;
        if self.sample.len() < self.cap {
            self.sample.push(detail);
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn sample(&self) -> &[String] {
        &self.sample
    }

    pub fn truncated(&self) -> bool {
        (self.sample.len() as u64) < self.total
    }
}

/// Outcome of one independent check
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub name: &'static str,
    pub violations: ViolationList,
}

impl CheckReport {
    pub fn new(name: &'static str, cap: usize) -> Self {
        Self { name, violations: ViolationList::new(cap) }
    }

    pub fn passed(&self) -> bool {
        self.violations.total() == 0
    }
}

/// All checks of one verifier run
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub checks: Vec<CheckReport>,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed())
    }

    pub fn total_violations(&self) -> u64 {
        self.checks.iter().map(|c| c.violations.total()).sum()
    }
}

/// Verdict marker for operator output; plain text when color is disabled
pub fn verdict_mark(ok: bool, no_color: bool) -> &'static str {
    match (ok, no_color) {
        (true, false) => "✅ PASS",
        (false, false) => "❌ FAIL",
        (true, true) => "PASS",
        (false, true) => "FAIL",
    }
}
