//! Filter engine
//!
//! Pure allow/deny decisions for a video title and duration against a
//! performer's keyword rules merged with the global ones. No I/O; the
//! rules are compiled once per scan from the settings and performer rows.

use crate::db::PerformerRecord;

/// Compiled filter rules for one performer scan
#[derive(Debug, Clone, Default)]
pub struct FilterRules {
    /// Union of global and performer blacklists, lower-cased and trimmed
    blacklist: Vec<String>,
    /// Union of global and performer whitelists
    whitelist: Vec<String>,
    /// Minimum duration in minutes, 0 = disabled
    min_duration: i32,
}

impl FilterRules {
    /// Merge the performer's keyword lists with the global ones.
    pub fn compile(
        performer: &PerformerRecord,
        global_blacklist: Option<&str>,
        global_whitelist: Option<&str>,
    ) -> Self {
        let mut blacklist = split_keywords(global_blacklist);
        blacklist.extend(split_keywords(performer.blacklist_keywords.as_deref()));

        let mut whitelist = split_keywords(global_whitelist);
        whitelist.extend(split_keywords(performer.whitelist_keywords.as_deref()));

        Self {
            blacklist,
            whitelist,
            min_duration: performer.min_duration,
        }
    }

    /// Decide whether a video passes. First matching rule wins:
    /// minimum duration, then blacklist, then whitelist requirement.
    pub fn is_allowed(&self, title: &str, duration: Option<&str>) -> bool {
        if self.min_duration > 0
            && parse_duration_minutes(duration) < self.min_duration as f64
        {
            return false;
        }

        let title_lower = title.to_lowercase();

        if self.blacklist.iter().any(|kw| title_lower.contains(kw)) {
            return false;
        }

        if !self.whitelist.is_empty()
            && !self.whitelist.iter().any(|kw| title_lower.contains(kw))
        {
            return false;
        }

        true
    }
}

/// Split a comma-separated keyword list, trimming and lower-casing.
/// Empty entries are dropped.
fn split_keywords(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|kw| kw.trim().to_lowercase())
        .filter(|kw| !kw.is_empty())
        .collect()
}

/// Parse `H:MM:SS` or `M:SS` into fractional minutes. Anything unparsable
/// counts as zero, which fails a configured minimum-duration check.
pub fn parse_duration_minutes(duration: Option<&str>) -> f64 {
    let Some(duration) = duration else {
        return 0.0;
    };
    let parts: Result<Vec<i64>, _> = duration.split(':').map(str::parse).collect();
    match parts.as_deref() {
        Ok([m, s]) => *m as f64 + *s as f64 / 60.0,
        Ok([h, m, s]) => (*h * 60 + *m) as f64 + *s as f64 / 60.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Site;
    use pretty_assertions::assert_eq;

    fn performer(blacklist: Option<&str>, whitelist: Option<&str>, min: i32) -> PerformerRecord {
        PerformerRecord {
            id: "creator1".into(),
            name: "Creator One".into(),
            site: Site::Youtube,
            kind: "channel".into(),
            blacklist_keywords: blacklist.map(Into::into),
            whitelist_keywords: whitelist.map(Into::into),
            min_duration: min,
            scheduled_scan_enabled: true,
            auto_download: false,
            use_auth_session: false,
            last_scan: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration_minutes(Some("10:00")), 10.0);
        assert_eq!(parse_duration_minutes(Some("1:30:00")), 90.0);
        assert!(parse_duration_minutes(Some("9:59")) < 10.0);
        assert_eq!(parse_duration_minutes(Some("garbage")), 0.0);
        assert_eq!(parse_duration_minutes(None), 0.0);
    }

    #[test]
    fn is_deterministic() {
        let rules = FilterRules::compile(&performer(Some("ad"), Some("vlog"), 5), None, None);
        let first = rules.is_allowed("My vlog episode", Some("12:00"));
        let second = rules.is_allowed("My vlog episode", Some("12:00"));
        assert_eq!(first, second);
        assert!(first);
    }

    #[test]
    fn min_duration_boundary() {
        let rules = FilterRules::compile(&performer(None, None, 10), None, None);
        assert!(!rules.is_allowed("clip", Some("9:59")));
        assert!(rules.is_allowed("clip", Some("10:00")));
    }

    #[test]
    fn unparsable_duration_fails_a_set_threshold() {
        let rules = FilterRules::compile(&performer(None, None, 1), None, None);
        assert!(!rules.is_allowed("clip", None));
        assert!(!rules.is_allowed("clip", Some("n/a")));
        // No threshold, no problem.
        let rules = FilterRules::compile(&performer(None, None, 0), None, None);
        assert!(rules.is_allowed("clip", None));
    }

    #[test]
    fn blacklist_is_case_insensitive_substring() {
        let rules = FilterRules::compile(&performer(Some("AD, spam"), None, 0), None, None);
        assert!(!rules.is_allowed("Cool Ad Clip", None));
        assert!(!rules.is_allowed("SPAMMY stream", None));
        // "upload" would trip the "ad" substring; that is intended behavior.
        assert!(!rules.is_allowed("Regular upload", None));
        assert!(rules.is_allowed("Morning stream", None));
    }

    #[test]
    fn blacklist_beats_whitelist() {
        let rules =
            FilterRules::compile(&performer(Some("ad"), Some("clip"), 0), None, None);
        assert!(!rules.is_allowed("Cool Ad Clip", None));
    }

    #[test]
    fn whitelist_from_either_scope_is_enough() {
        let p = performer(None, Some("premiere"), 0);
        let rules = FilterRules::compile(&p, None, Some("live"));
        assert!(rules.is_allowed("Premiere night", None));
        assert!(rules.is_allowed("Going LIVE now", None));
        assert!(!rules.is_allowed("Regular upload", None));
    }

    #[test]
    fn empty_whitelists_mean_no_restriction() {
        let rules = FilterRules::compile(&performer(None, Some("  , "), 0), None, None);
        assert!(rules.is_allowed("Anything goes", None));
    }

    #[test]
    fn global_and_performer_blacklists_are_unioned() {
        let rules =
            FilterRules::compile(&performer(Some("teaser"), None, 0), Some("shorts"), None);
        assert!(!rules.is_allowed("New teaser!", None));
        assert!(!rules.is_allowed("Shorts compilation", None));
    }
}
