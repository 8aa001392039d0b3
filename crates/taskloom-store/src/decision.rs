use chrono::{DateTime, Duration, Utc};

use taskloom_types::{IndexStatus, IndexingState};

/// Tunables for the indexing decision state machine.
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// Failures beyond this flip a task to permanent `Failed`.
    pub max_retries: u32,
    /// Base retry backoff, doubled per attempt, jittered ±15%.
    pub base_backoff: Duration,
    /// How long a successful index stays fresh.
    pub default_ttl: Duration,
    /// Bumping this forces every task through reindexing.
    pub current_index_version: u32,
    /// Global override: reindex regardless of state.
    pub force_reindex: bool,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::seconds(2),
            default_ttl: Duration::hours(24),
            current_index_version: 1,
            force_reindex: false,
        }
    }
}

/// What to do with one task right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAction {
    Index,
    Skip,
    Retry,
}

/// Decision output: machine-readable action plus the human-readable why.
#[derive(Debug, Clone)]
pub struct IndexingDecision {
    pub should_index: bool,
    pub action: IndexAction,
    pub reason: String,
    pub backoff_until: Option<DateTime<Utc>>,
}

impl IndexingDecision {
    fn go(action: IndexAction, reason: impl Into<String>) -> Self {
        Self {
            should_index: true,
            action,
            reason: reason.into(),
            backoff_until: None,
        }
    }

    fn skip(reason: impl Into<String>) -> Self {
        Self {
            should_index: false,
            action: IndexAction::Skip,
            reason: reason.into(),
            backoff_until: None,
        }
    }
}

/// Inputs the decision needs from the skeleton.
#[derive(Debug, Clone, Copy)]
pub struct TaskActivity {
    pub last_activity: DateTime<Utc>,
    /// Bare indexed-at timestamp from pre-state stores, if any.
    pub legacy_indexed_at: Option<DateTime<Utc>>,
}

/// Decide whether a task must be (re)indexed. Rules run top-down; the
/// first that applies wins.
pub fn decide(
    state: Option<&IndexingState>,
    activity: TaskActivity,
    now: DateTime<Utc>,
    config: &DecisionConfig,
    jitter: f64,
) -> IndexingDecision {
    // 1. Global override
    if config.force_reindex {
        return IndexingDecision::go(IndexAction::Index, "FORCE_REINDEX override set");
    }

    let Some(state) = state else {
        // 6. Legacy compatibility: a bare timestamp acts like a minimal
        //    success record.
        if let Some(legacy) = activity.legacy_indexed_at {
            if activity.last_activity <= legacy {
                return IndexingDecision::skip("legacy index timestamp still covers activity");
            }
            return IndexingDecision::go(IndexAction::Index, "activity newer than legacy index");
        }
        // 7. Default
        return IndexingDecision::go(IndexAction::Index, "never indexed");
    };

    // 2. Version mismatch
    if state.index_version != config.current_index_version {
        return IndexingDecision::go(
            IndexAction::Index,
            format!(
                "index version {} behind current {}",
                state.index_version, config.current_index_version
            ),
        );
    }

    match state.index_status {
        // 3. Permanent failure
        IndexStatus::Failed => IndexingDecision::skip("permanent failure"),

        // 4. Retry with exponential backoff and jitter
        IndexStatus::Retry => {
            if state.index_retry_count >= config.max_retries {
                return IndexingDecision::skip(format!(
                    "retry budget exhausted ({} attempts)",
                    state.index_retry_count
                ));
            }
            let backoff = backoff_delay(config.base_backoff, state.index_retry_count, jitter);
            let since = state.last_index_attempt.unwrap_or(now);
            let ready_at = since + backoff;
            if now < ready_at {
                let mut decision = IndexingDecision::skip(format!(
                    "backing off attempt {}",
                    state.index_retry_count + 1
                ));
                decision.backoff_until = Some(ready_at);
                return decision;
            }
            IndexingDecision::go(IndexAction::Retry, "backoff elapsed")
        }

        // 5. Success: TTL, then unchanged-content check
        IndexStatus::Success => {
            if let Some(next) = state.next_reindex_after
                && now < next
            {
                return IndexingDecision::skip("within reindex TTL");
            }
            if let Some(indexed) = state.last_indexed_at
                && activity.last_activity <= indexed
            {
                return IndexingDecision::skip("content unchanged since last index");
            }
            IndexingDecision::go(IndexAction::Index, "TTL elapsed and content changed")
        }
    }
}

/// Exponential backoff with multiplicative jitter. Jitter must come from
/// [`sample_jitter`] (or be 1.0 in tests); the expectation is monotone
/// non-decreasing across retries either way.
pub fn backoff_delay(base: Duration, retry_count: u32, jitter: f64) -> Duration {
    let millis = base.num_milliseconds() as f64 * 2f64.powi(retry_count as i32) * jitter;
    Duration::milliseconds(millis as i64)
}

/// Uniform jitter in [0.85, 1.15].
pub fn sample_jitter() -> f64 {
    use rand::Rng;
    rand::thread_rng().gen_range(0.85..1.15)
}

/// Record a successful index run.
pub fn mark_success(
    state: &mut Option<IndexingState>,
    now: DateTime<Utc>,
    config: &DecisionConfig,
) {
    *state = Some(IndexingState::success(
        now,
        config.current_index_version,
        config.default_ttl,
    ));
}

/// Record a failed index run. Permanent errors and exhausted retry
/// budgets park the task in `Failed`; everything else schedules a retry.
pub fn mark_failure(
    state: &mut Option<IndexingState>,
    error: &str,
    is_permanent: bool,
    now: DateTime<Utc>,
    config: &DecisionConfig,
) {
    let mut next = state.clone().unwrap_or(IndexingState {
        last_indexed_at: None,
        next_reindex_after: None,
        index_status: IndexStatus::Retry,
        index_error: None,
        index_retry_count: 0,
        last_index_attempt: None,
        index_version: config.current_index_version,
    });

    next.index_retry_count += 1;
    next.index_error = Some(error.to_string());
    next.last_index_attempt = Some(now);
    next.index_status = if is_permanent || next.index_retry_count >= config.max_retries {
        IndexStatus::Failed
    } else {
        IndexStatus::Retry
    };

    *state = Some(next);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity_at(last_activity: DateTime<Utc>) -> TaskActivity {
        TaskActivity {
            last_activity,
            legacy_indexed_at: None,
        }
    }

    #[test]
    fn never_indexed_defaults_to_index() {
        let now = Utc::now();
        let decision = decide(None, activity_at(now), now, &DecisionConfig::default(), 1.0);
        assert_eq!(decision.action, IndexAction::Index);
        assert!(decision.should_index);
    }

    #[test]
    fn force_reindex_wins_over_everything() {
        let now = Utc::now();
        let config = DecisionConfig {
            force_reindex: true,
            ..Default::default()
        };
        let state = IndexingState {
            index_status: IndexStatus::Failed,
            ..IndexingState::success(now, 1, Duration::hours(24))
        };
        let decision = decide(Some(&state), activity_at(now), now, &config, 1.0);
        assert!(decision.should_index);
        assert!(decision.reason.contains("FORCE_REINDEX"));
    }

    #[test]
    fn failed_is_never_rescheduled() {
        let now = Utc::now();
        let state = IndexingState {
            index_status: IndexStatus::Failed,
            ..IndexingState::success(now - Duration::days(30), 1, Duration::hours(24))
        };
        let decision = decide(
            Some(&state),
            activity_at(now),
            now,
            &DecisionConfig::default(),
            1.0,
        );
        assert_eq!(decision.action, IndexAction::Skip);
        assert!(decision.reason.contains("permanent failure"));
    }

    #[test]
    fn version_mismatch_forces_index() {
        let now = Utc::now();
        let state = IndexingState::success(now, 1, Duration::hours(24));
        let config = DecisionConfig {
            current_index_version: 2,
            ..Default::default()
        };
        let decision = decide(Some(&state), activity_at(now - Duration::hours(1)), now, &config, 1.0);
        assert_eq!(decision.action, IndexAction::Index);
    }

    #[test]
    fn retry_backs_off_then_fires() {
        let now = Utc::now();
        let config = DecisionConfig::default(); // base 2s
        let state = IndexingState {
            index_status: IndexStatus::Retry,
            index_retry_count: 1,
            last_index_attempt: Some(now - Duration::milliseconds(500)),
            last_indexed_at: None,
            next_reindex_after: None,
            index_error: Some("transient".into()),
            index_version: 1,
        };

        // 2s * 2^1 = 4s backoff; only 500ms elapsed
        let decision = decide(Some(&state), activity_at(now), now, &config, 1.0);
        assert_eq!(decision.action, IndexAction::Skip);
        let until = decision.backoff_until.expect("backoff deadline");
        assert_eq!((until - now).num_milliseconds(), 3500);

        // Past the deadline the decision flips to retry
        let later = now + Duration::milliseconds(3600);
        let decision = decide(Some(&state), activity_at(now), later, &config, 1.0);
        assert_eq!(decision.action, IndexAction::Retry);
        assert!(decision.should_index);
    }

    #[test]
    fn retry_budget_exhausted_skips() {
        let now = Utc::now();
        let state = IndexingState {
            index_status: IndexStatus::Retry,
            index_retry_count: 3,
            last_index_attempt: Some(now - Duration::hours(1)),
            last_indexed_at: None,
            next_reindex_after: None,
            index_error: None,
            index_version: 1,
        };
        let decision = decide(
            Some(&state),
            activity_at(now),
            now,
            &DecisionConfig::default(),
            1.0,
        );
        assert_eq!(decision.action, IndexAction::Skip);
    }

    #[test]
    fn success_within_ttl_skips() {
        let now = Utc::now();
        let state = IndexingState::success(now - Duration::hours(1), 1, Duration::hours(24));
        let decision = decide(
            Some(&state),
            activity_at(now),
            now,
            &DecisionConfig::default(),
            1.0,
        );
        assert_eq!(decision.action, IndexAction::Skip);
        assert!(decision.reason.contains("TTL"));
    }

    #[test]
    fn success_past_ttl_unchanged_content_skips() {
        let now = Utc::now();
        let indexed_at = now - Duration::hours(30);
        let state = IndexingState::success(indexed_at, 1, Duration::hours(24));
        // Activity predates the index run: nothing new to embed
        let decision = decide(
            Some(&state),
            activity_at(indexed_at - Duration::hours(5)),
            now,
            &DecisionConfig::default(),
            1.0,
        );
        assert_eq!(decision.action, IndexAction::Skip);
        assert!(decision.reason.contains("unchanged"));
    }

    #[test]
    fn success_past_ttl_with_new_activity_indexes() {
        let now = Utc::now();
        let state = IndexingState::success(now - Duration::hours(30), 1, Duration::hours(24));
        let decision = decide(
            Some(&state),
            activity_at(now - Duration::minutes(10)),
            now,
            &DecisionConfig::default(),
            1.0,
        );
        assert_eq!(decision.action, IndexAction::Index);
    }

    #[test]
    fn legacy_timestamp_is_respected() {
        let now = Utc::now();
        let legacy = now - Duration::hours(2);
        let covered = TaskActivity {
            last_activity: now - Duration::hours(3),
            legacy_indexed_at: Some(legacy),
        };
        let stale = TaskActivity {
            last_activity: now - Duration::hours(1),
            legacy_indexed_at: Some(legacy),
        };
        let config = DecisionConfig::default();
        assert_eq!(decide(None, covered, now, &config, 1.0).action, IndexAction::Skip);
        assert_eq!(decide(None, stale, now, &config, 1.0).action, IndexAction::Index);
    }

    #[test]
    fn mark_failure_transitions() {
        let now = Utc::now();
        let config = DecisionConfig::default();
        let mut state = None;

        mark_failure(&mut state, "timeout", false, now, &config);
        assert_eq!(state.as_ref().unwrap().index_status, IndexStatus::Retry);
        assert_eq!(state.as_ref().unwrap().index_retry_count, 1);

        mark_failure(&mut state, "timeout", false, now, &config);
        mark_failure(&mut state, "timeout", false, now, &config);
        // Third failure hits max_retries = 3
        assert_eq!(state.as_ref().unwrap().index_status, IndexStatus::Failed);
    }

    #[test]
    fn permanent_failure_fails_immediately() {
        let now = Utc::now();
        let mut state = None;
        mark_failure(&mut state, "400 bad request", true, now, &DecisionConfig::default());
        assert_eq!(state.as_ref().unwrap().index_status, IndexStatus::Failed);
    }

    #[test]
    fn mark_success_resets_and_advances_ttl() {
        let now = Utc::now();
        let config = DecisionConfig::default();
        let mut state = None;
        mark_failure(&mut state, "transient", false, now, &config);
        mark_success(&mut state, now, &config);

        let s = state.unwrap();
        assert_eq!(s.index_status, IndexStatus::Success);
        assert_eq!(s.index_retry_count, 0);
        assert!(s.index_error.is_none());
        assert_eq!(s.next_reindex_after, Some(now + Duration::hours(24)));
    }

    #[test]
    fn backoff_expectation_is_monotone() {
        let base = Duration::seconds(2);
        let mut last = Duration::zero();
        for retry in 0..5 {
            let delay = backoff_delay(base, retry, 1.0);
            assert!(delay >= last);
            last = delay;
        }
    }

    #[test]
    fn jitter_stays_in_band() {
        for _ in 0..100 {
            let j = sample_jitter();
            assert!((0.85..1.15).contains(&j));
        }
    }
}
