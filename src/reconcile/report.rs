use crate::verifier::report::ViolationList;

/// Outcome of one reconciliation run.
///
/// Extra keys are reported but do not fail the run on their own: "extra"
/// downstream may simply be history the local side never replayed.
#[derive(Debug)]
pub struct ReconcileReport {
    pub entity: &'static str,
    pub matched: u64,
    pub mismatched: u64,
    pub missing: u64,
    pub extra: u64,
    pub diffs: ViolationList,
}

impl ReconcileReport {
    pub fn new(entity: &'static str, max_diff_lines: usize) -> Self {
        Self {
            entity,
            matched: 0,
            mismatched: 0,
            missing: 0,
            extra: 0,
            diffs: ViolationList::new(max_diff_lines),
        }
    }

    pub fn passed(&self) -> bool {
        self.mismatched == 0 && self.missing == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    /// Summary first, capped detail list after, so the verdict is visible
    /// even when the diff list is long
    pub fn print(&self, no_color: bool) {
        println!("\n=== Reconciliation: {} ===", self.entity);
        println!("matched:    {}", self.matched);
        println!("mismatched: {}", self.mismatched);
        println!("missing:    {}", self.missing);
        println!("extra:      {}", self.extra);

        let verdict = match (self.passed(), no_color) {
            (true, false) => "✅ CONSISTENT",
            (false, false) => "❌ INCONSISTENT",
            (true, true) => "CONSISTENT",
            (false, true) => "INCONSISTENT",
        };
        println!("verdict:    {}", verdict);

        if self.diffs.total() > 0 {
            println!(
                "--- details (showing {} of {}) ---",
                self.diffs.sample().len(),
                self.diffs.total()
            );
            for line in self.diffs.sample() {
                println!("{}", line);
            }
        }
    }
}
