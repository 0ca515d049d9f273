//! Integration tests for the scan pipeline's state rules
//!
//! These tests verify the video lifecycle contract:
//! - Which status transitions exist and who may perform them
//! - That progress percentages reported during a scan never decrease
//! - Duration string handling at the filter boundary

/// Valid status values for videos
const VALID_STATUSES: &[&str] = &["new", "downloaded", "ignored"];

mod status_transitions {
    use super::*;

    /// Transition rules: (from, to, engine_allowed, user_allowed)
    const RULES: &[(&str, &str, bool, bool)] = &[
        // new -> downloaded: existence check found the file, or download finished
        ("new", "downloaded", true, false),
        // new -> ignored: filter re-evaluation, or user ignores
        ("new", "ignored", true, true),
        // downloaded -> new: revert when every enabled existence check misses
        ("downloaded", "new", true, false),
        // downloaded -> ignored: user only
        ("downloaded", "ignored", false, true),
        // ignored -> new: manual unignore only
        ("ignored", "new", false, true),
        // ignored -> downloaded: never happens automatically
        ("ignored", "downloaded", false, false),
    ];

    fn engine_may(from: &str, to: &str) -> bool {
        RULES
            .iter()
            .any(|&(f, t, engine, _)| f == from && t == to && engine)
    }

    fn user_may(from: &str, to: &str) -> bool {
        RULES
            .iter()
            .any(|&(f, t, _, user)| f == from && t == to && user)
    }

    #[test]
    fn every_rule_references_valid_statuses() {
        for &(from, to, _, _) in RULES {
            assert!(VALID_STATUSES.contains(&from), "unknown status {from}");
            assert!(VALID_STATUSES.contains(&to), "unknown status {to}");
        }
    }

    #[test]
    fn engine_never_resurrects_ignored_videos() {
        assert!(!engine_may("ignored", "new"));
        assert!(!engine_may("ignored", "downloaded"));
    }

    #[test]
    fn revert_is_engine_only() {
        assert!(engine_may("downloaded", "new"));
        assert!(!user_may("downloaded", "new"));
    }

    #[test]
    fn unignore_is_user_only() {
        assert!(user_may("ignored", "new"));
        assert!(!engine_may("ignored", "new"));
    }

    #[test]
    fn self_transitions_are_not_rules() {
        for &status in VALID_STATUSES {
            assert!(!engine_may(status, status));
            assert!(!user_may(status, status));
        }
    }
}

mod scan_progress {
    /// The percentage checkpoints a scan reports, in order
    const CHECKPOINTS: &[u8] = &[10, 50, 90, 100];

    #[test]
    fn checkpoints_are_monotonic() {
        assert!(CHECKPOINTS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn reconciliation_band_fits_between_processing_and_done() {
        // 50-90 is apportioned across per-video work
        let band = 90 - 50;
        for done in 0..=10usize {
            let pct = 50 + (band * done / 10) as u8;
            assert!((50..=90).contains(&pct));
        }
    }
}

mod duration_strings {
    /// Mirror of the accepted duration grammar: M:SS or H:MM:SS
    fn is_well_formed(s: &str) -> bool {
        let parts: Vec<&str> = s.split(':').collect();
        matches!(parts.len(), 2 | 3) && parts.iter().all(|p| p.parse::<u32>().is_ok())
    }

    #[test]
    fn accepted_forms() {
        assert!(is_well_formed("9:59"));
        assert!(is_well_formed("10:00"));
        assert!(is_well_formed("1:02:03"));
    }

    #[test]
    fn rejected_forms() {
        assert!(!is_well_formed("live"));
        assert!(!is_well_formed("10"));
        assert!(!is_well_formed("1:2:3:4"));
        assert!(!is_well_formed(""));
    }
}
