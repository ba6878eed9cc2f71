// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-demand and batch pairing.
//!
//! A pairing is published in two steps: the session row is inserted, then
//! both users' daily markers are claimed in user-id order. The marker claim
//! is the linearization point. A lost claim releases whatever this call
//! claimed and deletes the session row, so no second session survives for a
//! user on the same day.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use tandem_core::clock::{today, ttl_until_midnight};
use tandem_core::{
    Candidate, ChatSession, ChatStore, DEFAULT_SCORE, Location, MarkerStore, SessionId,
    SessionStatus, TandemError, UserId,
};

use crate::geo::{distance_km, priority, within_range};
use crate::jitter::JitterSource;

/// How many times an on-demand match retries after losing a marker race.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Today's pairing as seen by one participant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub partner_id: UserId,
    pub partner_name: String,
    pub started_at: String,
}

/// A candidate scored against the requester.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub user_id: UserId,
    pub distance_km: f64,
    pub priority: f64,
}

/// A possible batch pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPair {
    pub user1: UserId,
    pub user2: UserId,
    pub distance_km: f64,
    pub priority: f64,
}

/// Result of trying to publish one pairing.
#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    Created(ChatSession),
    /// The given user already held a marker for the day.
    Taken(UserId),
}

/// Summary of one batch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub eligible_users: usize,
    pub pairs_considered: usize,
    pub sessions_created: usize,
    pub lost_races: usize,
    pub failures: usize,
}

/// Pick the highest-priority in-range candidate. Jitter is drawn once per
/// candidate on every call.
pub fn select_best(
    origin: Location,
    origin_score: f64,
    candidates: &[Candidate],
    jitter: &dyn JitterSource,
) -> Option<ScoredCandidate> {
    candidates
        .iter()
        .filter_map(|c| {
            let d = distance_km(origin, c.location);
            within_range(d).then(|| ScoredCandidate {
                user_id: c.user_id.clone(),
                distance_km: d,
                priority: priority(d, origin_score, c.score, jitter.next()),
            })
        })
        .max_by(|a, b| a.priority.total_cmp(&b.priority))
}

/// Every in-range unordered pair, highest priority first.
pub fn rank_pairs(users: &[Candidate], jitter: &dyn JitterSource) -> Vec<RankedPair> {
    let mut pairs = Vec::new();
    for (i, a) in users.iter().enumerate() {
        for b in &users[i + 1..] {
            let d = distance_km(a.location, b.location);
            if !within_range(d) {
                continue;
            }
            pairs.push(RankedPair {
                user1: a.user_id.clone(),
                user2: b.user_id.clone(),
                distance_km: d,
                priority: priority(d, a.score, b.score, jitter.next()),
            });
        }
    }
    pairs.sort_by(|a, b| b.priority.total_cmp(&a.priority));
    pairs
}

/// Pairs users into daily chat sessions.
pub struct MatchEngine {
    store: Arc<dyn ChatStore>,
    markers: Arc<dyn MarkerStore>,
    jitter: Arc<dyn JitterSource>,
    max_attempts: usize,
}

impl MatchEngine {
    pub fn new(
        store: Arc<dyn ChatStore>,
        markers: Arc<dyn MarkerStore>,
        jitter: Arc<dyn JitterSource>,
    ) -> Self {
        Self {
            store,
            markers,
            jitter,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Today's pairing for `user`, if any.
    pub async fn today_match(&self, user: &UserId) -> Result<Option<MatchResult>, TandemError> {
        self.existing_match(user, today()).await
    }

    async fn existing_match(
        &self,
        user: &UserId,
        day: NaiveDate,
    ) -> Result<Option<MatchResult>, TandemError> {
        // Without a marker there is no match, even if an unclaimed session
        // row from a pairing in flight exists.
        let Some(session_id) = self.markers.get_marker(user, day).await? else {
            return Ok(None);
        };
        let session = match self.store.get_session(&session_id).await? {
            Some(session) => Some(session),
            None => {
                warn!(user_id = %user, session_id = %session_id, "marker points at a missing session");
                self.store.session_started_on(user, day).await?
            }
        };
        match session {
            Some(session) => self.describe(user, &session).await.map(Some),
            None => Ok(None),
        }
    }

    async fn describe(
        &self,
        user: &UserId,
        session: &ChatSession,
    ) -> Result<MatchResult, TandemError> {
        let partner_id = session
            .partner_of(user)
            .cloned()
            .ok_or_else(|| TandemError::Forbidden(format!("{user} is not in session {}", session.id)))?;
        let partner_name = self
            .store
            .get_user(&partner_id)
            .await?
            .map(|u| u.display_name)
            .unwrap_or_else(|| partner_id.to_string());
        Ok(MatchResult {
            session_id: session.id.clone(),
            status: session.status,
            partner_id,
            partner_name,
            started_at: session.started_at.clone(),
        })
    }

    /// Return today's pairing for `user`, creating one if needed.
    ///
    /// Repeated calls on the same day return the same session.
    pub async fn find_or_create_match(&self, user: &UserId) -> Result<MatchResult, TandemError> {
        let day = today();
        for attempt in 1..=self.max_attempts {
            if let Some(existing) = self.existing_match(user, day).await? {
                return Ok(existing);
            }

            let me = self
                .store
                .get_user(user)
                .await?
                .ok_or_else(|| TandemError::UnknownUser(user.to_string()))?;
            let origin = me.location.ok_or(TandemError::NoLocation)?;
            let my_score = self
                .store
                .get_engagement(user)
                .await?
                .map_or(DEFAULT_SCORE, |r| r.score);

            let candidates: Vec<Candidate> = self
                .store
                .list_unmatched_users(day)
                .await?
                .into_iter()
                .filter(|c| &c.user_id != user)
                .collect();
            let best = select_best(origin, my_score, &candidates, self.jitter.as_ref())
                .ok_or(TandemError::NoCandidates)?;
            debug!(
                user_id = %user,
                partner_id = %best.user_id,
                distance_km = best.distance_km,
                priority = best.priority,
                "selected candidate"
            );

            match self.pair_users(user, &best.user_id, day).await? {
                PairOutcome::Created(session) => return self.describe(user, &session).await,
                PairOutcome::Taken(taken) => {
                    debug!(user_id = %user, taken = %taken, attempt, "lost marker race, retrying");
                }
            }
        }
        Err(TandemError::Conflict(format!(
            "could not secure a match for {user} after {} attempts",
            self.max_attempts
        )))
    }

    /// Insert a session for two users and claim both markers for `day`.
    pub async fn pair_users(
        &self,
        user1: &UserId,
        user2: &UserId,
        day: NaiveDate,
    ) -> Result<PairOutcome, TandemError> {
        let session = self.store.create_session(user1, user2).await?;
        let ttl = ttl_until_midnight(&Local::now());

        let mut order = [user1, user2];
        order.sort();
        let mut claimed: Vec<&UserId> = Vec::with_capacity(2);
        for user in order {
            match self.markers.try_mark(user, day, &session.id, ttl).await {
                Ok(true) => claimed.push(user),
                Ok(false) => {
                    self.abandon(&session, &claimed, day).await;
                    return Ok(PairOutcome::Taken(user.clone()));
                }
                Err(e) => {
                    self.abandon(&session, &claimed, day).await;
                    return Err(e);
                }
            }
        }

        info!(
            session_id = %session.id,
            user1 = %user1,
            user2 = %user2,
            "pairing created"
        );
        Ok(PairOutcome::Created(session))
    }

    async fn abandon(&self, session: &ChatSession, claimed: &[&UserId], day: NaiveDate) {
        for user in claimed {
            if let Err(e) = self.markers.clear_marker(user, day, &session.id).await {
                warn!(user_id = %user, session_id = %session.id, error = %e, "failed to release marker");
            }
        }
        if let Err(e) = self.store.discard_session(&session.id).await {
            warn!(session_id = %session.id, error = %e, "failed to discard unpublished session");
        }
    }

    /// Pair every remaining user for today, greedily by priority.
    ///
    /// Greedy selection is not an optimal matching; leftovers stay unpaired
    /// until tomorrow. A failed candidate query aborts the pass; a failed
    /// pairing is logged and skipped.
    pub async fn run_batch_matching(&self) -> Result<BatchReport, TandemError> {
        let day = today();
        let users = self.store.list_unmatched_users(day).await?;
        let mut report = BatchReport {
            eligible_users: users.len(),
            ..BatchReport::default()
        };
        if users.len() < 2 {
            info!(eligible = users.len(), "batch matching: not enough users");
            return Ok(report);
        }

        let pairs = rank_pairs(&users, self.jitter.as_ref());
        report.pairs_considered = pairs.len();

        let mut matched: HashSet<UserId> = HashSet::new();
        for pair in pairs {
            if matched.contains(&pair.user1) || matched.contains(&pair.user2) {
                continue;
            }
            match self.pair_users(&pair.user1, &pair.user2, day).await {
                Ok(PairOutcome::Created(_)) => {
                    matched.insert(pair.user1);
                    matched.insert(pair.user2);
                    report.sessions_created += 1;
                }
                Ok(PairOutcome::Taken(user)) => {
                    matched.insert(user);
                    report.lost_races += 1;
                }
                Err(e) => {
                    warn!(user1 = %pair.user1, user2 = %pair.user2, error = %e, "batch pairing failed");
                    report.failures += 1;
                }
            }
        }

        info!(
            eligible = report.eligible_users,
            created = report.sessions_created,
            lost_races = report.lost_races,
            failures = report.failures,
            "batch matching complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{MAX_DISTANCE_KM, distance_km};
    use crate::jitter::{FixedJitter, SequenceJitter};
    use proptest::prelude::*;

    fn cand(id: &str, lat: f64, lon: f64, score: f64) -> Candidate {
        Candidate {
            user_id: id.into(),
            location: Location { lat, lon },
            score,
        }
    }

    #[test]
    fn select_best_ignores_out_of_range() {
        let origin = Location { lat: 40.0, lon: -74.0 };
        let candidates = [cand("far", 42.0, -74.0, 50.0), cand("near", 40.1, -74.0, 50.0)];
        let best = select_best(origin, 50.0, &candidates, &FixedJitter(0.0)).unwrap();
        assert_eq!(best.user_id, UserId::from("near"));
        assert!(best.distance_km <= 50.0);
    }

    #[test]
    fn select_best_none_when_nobody_in_range() {
        let origin = Location { lat: 0.0, lon: 0.0 };
        let candidates = [cand("far", 10.0, 10.0, 50.0)];
        assert!(select_best(origin, 50.0, &candidates, &FixedJitter(0.5)).is_none());
        assert!(select_best(origin, 50.0, &[], &FixedJitter(0.5)).is_none());
    }

    #[test]
    fn jitter_breaks_ties() {
        let origin = Location { lat: 40.0, lon: -74.0 };
        let candidates = [cand("a", 40.1, -74.0, 50.0), cand("b", 40.1, -74.0, 50.0)];
        let best = select_best(origin, 50.0, &candidates, &SequenceJitter::new([0.1, 0.9]));
        assert_eq!(best.unwrap().user_id, UserId::from("b"));
        let best = select_best(origin, 50.0, &candidates, &SequenceJitter::new([0.9, 0.1]));
        assert_eq!(best.unwrap().user_id, UserId::from("a"));
    }

    #[test]
    fn similar_scores_preferred_at_equal_distance() {
        let origin = Location { lat: 40.0, lon: -74.0 };
        let candidates = [cand("close-score", 40.1, -74.0, 62.0), cand("far-score", 40.1, -74.0, 5.0)];
        let best = select_best(origin, 60.0, &candidates, &FixedJitter(0.0)).unwrap();
        assert_eq!(best.user_id, UserId::from("close-score"));
    }

    #[test]
    fn rank_pairs_sorted_and_gated() {
        let users = [
            cand("a", 40.0, -74.0, 50.0),
            cand("b", 40.01, -74.0, 50.0),
            cand("c", 40.2, -74.0, 50.0),
            cand("z", 10.0, 10.0, 50.0),
        ];
        let pairs = rank_pairs(&users, &FixedJitter(0.0));
        assert_eq!(pairs.len(), 3);
        assert!(pairs.windows(2).all(|w| w[0].priority >= w[1].priority));
        assert_eq!((pairs[0].user1.as_str(), pairs[0].user2.as_str()), ("a", "b"));
        assert!(pairs.iter().all(|p| p.distance_km <= 50.0));
    }

    fn nearby(offsets: Vec<(f64, f64, f64)>) -> Vec<Candidate> {
        offsets
            .into_iter()
            .enumerate()
            .map(|(i, (dlat, dlon, score))| cand(&format!("u{i}"), 40.0 + dlat, -74.0 + dlon, score))
            .collect()
    }

    proptest! {
        #[test]
        fn selected_partner_is_always_in_range(
            offsets in prop::collection::vec((-1.0f64..1.0, -1.0f64..1.0, 0.0f64..=100.0), 0..12),
            my_score in 0.0f64..=100.0,
            jitter in 0.0f64..1.0,
        ) {
            let origin = Location { lat: 40.0, lon: -74.0 };
            let candidates = nearby(offsets);
            let any_in_range = candidates
                .iter()
                .any(|c| distance_km(origin, c.location) <= MAX_DISTANCE_KM);
            match select_best(origin, my_score, &candidates, &FixedJitter(jitter)) {
                Some(best) => prop_assert!(best.distance_km <= MAX_DISTANCE_KM),
                None => prop_assert!(!any_in_range),
            }
        }

        #[test]
        fn ranked_pairs_are_all_in_range(
            offsets in prop::collection::vec((-1.0f64..1.0, -1.0f64..1.0, 0.0f64..=100.0), 0..12),
            jitter in 0.0f64..1.0,
        ) {
            let users = nearby(offsets);
            let pairs = rank_pairs(&users, &FixedJitter(jitter));
            for pair in &pairs {
                prop_assert!(pair.distance_km <= MAX_DISTANCE_KM);
                prop_assert_ne!(&pair.user1, &pair.user2);
            }
            prop_assert!(pairs.windows(2).all(|w| w[0].priority >= w[1].priority));
        }
    }

    #[test]
    fn match_result_serializes_snake_case_status() {
        let result = MatchResult {
            session_id: "s".into(),
            status: SessionStatus::Active,
            partner_id: "p".into(),
            partner_name: "Pat".into(),
            started_at: "2026-01-01T20:00:00.000Z".into(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["partner_name"], "Pat");
    }
}
