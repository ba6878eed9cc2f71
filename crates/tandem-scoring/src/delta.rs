// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The score delta formula, kept free of I/O.

use tandem_core::{MAX_SCORE, MIN_SCORE, SessionActivity};

/// Volume bonus per message sent.
pub const VOLUME_PER_MESSAGE: f64 = 0.5;
/// Cap on the volume bonus.
pub const VOLUME_CAP: f64 = 5.0;
/// Awarded on a user's first session with replies.
pub const FIRST_SESSION_BONUS: f64 = 1.0;
/// Awarded when replying no slower than the historical average.
pub const FAST_REPLY_BONUS: f64 = 3.0;
/// Ratio above which slow replies are penalized.
pub const SLOW_RATIO: f64 = 1.5;
/// Penalty per unit of ratio above [`SLOW_RATIO`].
pub const SLOW_PENALTY_PER_RATIO: f64 = 2.0;
/// Penalty per no-reply event.
pub const NO_REPLY_PENALTY: f64 = 10.0;
/// Awarded when the user ended the chat themselves.
pub const CLEAN_END_BONUS: f64 = 1.0;
/// Weight of the previous average in the reply-latency EMA.
pub const EMA_HISTORY_WEIGHT: f64 = 0.7;
/// Weight of the new session's average in the reply-latency EMA.
pub const EMA_SAMPLE_WEIGHT: f64 = 0.3;

/// Per-component result of scoring one session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeltaBreakdown {
    pub volume: f64,
    pub reply_speed: f64,
    pub no_reply: f64,
    pub clean_end: f64,
    /// New reply-latency average to store, if this session had replies.
    pub reply_avg_ms: Option<f64>,
}

impl DeltaBreakdown {
    pub fn total(&self) -> f64 {
        self.volume + self.reply_speed + self.no_reply + self.clean_end
    }
}

/// Score one user's session against their stored reply-latency history.
///
/// A history of `None` or a non-positive value means the user has none yet.
pub fn session_delta(activity: &SessionActivity, hist_avg_ms: Option<f64>) -> DeltaBreakdown {
    let mut out = DeltaBreakdown {
        volume: (f64::from(activity.message_count) * VOLUME_PER_MESSAGE).min(VOLUME_CAP),
        ..DeltaBreakdown::default()
    };

    if activity.reply_count > 0 {
        let avg = activity.total_reply_latency_ms / f64::from(activity.reply_count);
        let history = hist_avg_ms.filter(|h| *h > 0.0);
        out.reply_speed = match history {
            None => FIRST_SESSION_BONUS,
            Some(hist) => {
                let ratio = avg / hist;
                if ratio <= 1.0 {
                    FAST_REPLY_BONUS
                } else if ratio <= SLOW_RATIO {
                    0.0
                } else {
                    -SLOW_PENALTY_PER_RATIO * (ratio - SLOW_RATIO)
                }
            }
        };
        out.reply_avg_ms = Some(next_reply_average(history, avg));
    }

    out.no_reply = -NO_REPLY_PENALTY * f64::from(activity.no_reply_count);
    if activity.ended_clean {
        out.clean_end = CLEAN_END_BONUS;
    }
    out
}

/// Exponential moving average of reply latency, seeded by the first sample.
pub fn next_reply_average(history: Option<f64>, session_avg: f64) -> f64 {
    match history.filter(|h| *h > 0.0) {
        Some(hist) => hist * EMA_HISTORY_WEIGHT + session_avg * EMA_SAMPLE_WEIGHT,
        None => session_avg,
    }
}

/// Clamp a score into `[0, 100]`.
pub fn clamp_score(score: f64) -> f64 {
    score.clamp(MIN_SCORE, MAX_SCORE)
}
