use std::collections::HashMap;

/// One in-flight position poll: the reports collected since the last yik.
///
/// The round only ever holds reports from sessions that are still registered;
/// the coordinator drops a session's report when it disconnects, so
/// `len() == registered` is a sufficient completion check.
#[derive(Debug, Default)]
pub struct SyncRound {
    reports: HashMap<String, Option<f64>>,
}

impl SyncRound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or overwrites) a session's report. Non-finite positions are
    /// treated as "not active", finite ones are clamped into 0-1.
    pub fn record(&mut self, id: &str, position: Option<f64>) {
        let position = position
            .filter(|value| value.is_finite())
            .map(|value| value.clamp(0.0, 1.0));
        self.reports.insert(id.to_string(), position);
    }

    pub fn forget(&mut self, id: &str) -> bool {
        self.reports.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn is_complete(&self, registered: usize) -> bool {
        registered > 0 && self.reports.len() == registered
    }

    /// The furthest-ahead active position, or 0 when nobody is active.
    pub fn target(&self) -> f64 {
        self.reports
            .values()
            .flatten()
            .copied()
            .fold(None, |max: Option<f64>, value| {
                Some(max.map_or(value, |max| max.max(value)))
            })
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_is_max_of_active_reports() {
        let mut round = SyncRound::new();
        round.record("a", Some(0.2));
        round.record("b", None);
        round.record("c", Some(0.7));
        round.record("d", Some(0.4));
        assert_eq!(round.target(), 0.7);
    }

    #[test]
    fn test_all_inactive_targets_zero() {
        let mut round = SyncRound::new();
        round.record("a", None);
        round.record("b", None);
        assert_eq!(round.target(), 0.0);
        assert_eq!(SyncRound::new().target(), 0.0);
    }

    #[test]
    fn test_record_sanitizes_positions() {
        let mut round = SyncRound::new();
        round.record("a", Some(f64::NAN));
        assert_eq!(round.target(), 0.0);
        round.record("b", Some(3.0));
        assert_eq!(round.target(), 1.0);
        round.record("b", Some(-1.0));
        assert_eq!(round.target(), 0.0);
        assert_eq!(round.len(), 2);
    }

    #[test]
    fn test_completion_tracks_registered_count() {
        let mut round = SyncRound::new();
        assert!(!round.is_complete(0));
        round.record("a", Some(0.1));
        assert!(!round.is_complete(2));
        assert!(round.is_complete(1));

        // A repeated report does not count twice.
        round.record("a", Some(0.3));
        assert!(!round.is_complete(2));
        round.record("b", None);
        assert!(round.is_complete(2));

        assert!(round.forget("b"));
        assert!(!round.forget("b"));
        assert!(round.is_complete(1));
    }
}
