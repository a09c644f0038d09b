use std::fmt;

/// Outcome of one entity class within a poll pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassReport {
    pub processed: usize,
    pub failed: usize,
    /// Entities left alone this pass (in flight elsewhere, or cancelled).
    pub skipped: usize,
    /// The class could not even be listed.
    pub aborted: bool,
}

impl ClassReport {
    pub fn aborted() -> Self {
        Self {
            aborted: true,
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        !self.aborted && self.failed == 0
    }
}

impl fmt::Display for ClassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.aborted {
            return f.write_str("aborted");
        }
        write!(
            f,
            "{} ok, {} failed, {} skipped",
            self.processed, self.failed, self.skipped
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub alliances: ClassReport,
    pub corporations: ClassReport,
    pub characters: ClassReport,
}

impl PollReport {
    pub fn is_success(&self) -> bool {
        self.alliances.is_success()
            && self.corporations.is_success()
            && self.characters.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_failure_fails_the_pass() {
        let mut report = PollReport::default();
        assert!(report.is_success());

        report.corporations.failed = 1;
        assert!(!report.is_success());

        report.corporations.failed = 0;
        report.characters = ClassReport::aborted();
        assert!(!report.is_success());
        assert_eq!(report.characters.to_string(), "aborted");
    }
}
