//! Closed emotion vocabulary and per-user emotion reports.
//!
//! Sentiment services answer with a Korean label (`기쁨`, `슬픔`, ...), an
//! English word, or a numeric class code `"0"`..`"6"`. Everything is
//! normalised to [`Emotion`] before it reaches the prompt or the log; an
//! unrecognised label is treated as neutral.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{EmotionCount, MessageLog};

/// Detected emotion of a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Positive,
    Sad,
    Angry,
    Anxious,
    Surprised,
    Disgusted,
    #[default]
    Neutral,
}

// ── Label table ─────────────────────────────────────────────────────────

/// (emotion, accepted labels). The first label is the canonical stored form.
const LABEL_TABLE: &[(Emotion, &[&str])] = &[
    (Emotion::Positive, &["기쁨", "행복", "positive", "happy", "joy", "0"]),
    (Emotion::Sad, &["슬픔", "상처", "sad", "sadness", "hurt", "1"]),
    (Emotion::Angry, &["분노", "화남", "angry", "anger", "2"]),
    (Emotion::Anxious, &["불안", "걱정", "anxious", "anxiety", "fear", "3"]),
    (Emotion::Surprised, &["당황", "놀람", "surprised", "surprise", "embarrassed", "4"]),
    (Emotion::Disgusted, &["혐오", "disgusted", "disgust", "5"]),
    (Emotion::Neutral, &["중립", "neutral", "none", "6"]),
];

impl Emotion {
    /// All variants in table order.
    pub const ALL: [Emotion; 7] = [
        Emotion::Positive,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Anxious,
        Emotion::Surprised,
        Emotion::Disgusted,
        Emotion::Neutral,
    ];

    /// Normalise a collaborator label. Blank or unknown input is neutral.
    pub fn from_label(label: &str) -> Self {
        let needle = label.trim().to_lowercase();
        if needle.is_empty() {
            return Self::Neutral;
        }
        LABEL_TABLE
            .iter()
            .find(|(_, labels)| labels.iter().any(|l| *l == needle))
            .map(|(emotion, _)| *emotion)
            .unwrap_or(Self::Neutral)
    }

    /// Canonical Korean label, as stored in the message log.
    pub fn label(self) -> &'static str {
        match self {
            Self::Positive => "기쁨",
            Self::Sad => "슬픔",
            Self::Angry => "분노",
            Self::Anxious => "불안",
            Self::Surprised => "당황",
            Self::Disgusted => "혐오",
            Self::Neutral => "중립",
        }
    }

    /// Lowercase key used by the persona directive tables.
    pub fn key(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Anxious => "anxious",
            Self::Surprised => "surprised",
            Self::Disgusted => "disgusted",
            Self::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Reports ─────────────────────────────────────────────────────────────

/// Emotion distribution of one user over a half-open time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionSummary {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
    /// Most frequent first.
    pub counts: Vec<EmotionCount>,
}

impl EmotionSummary {
    /// The most frequent label, if any turn was scored.
    pub fn dominant(&self) -> Option<&str> {
        self.counts.first().map(|c| c.emotion.as_str())
    }

    /// Total number of scored turns.
    pub fn total(&self) -> u32 {
        self.counts.iter().map(|c| c.count).sum()
    }
}

/// End of the "today" window for the daily dominant emotion.
const DAILY_CUTOFF_HOUR: u32 = 18;

fn start_of(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

/// Monday 00:00 of the previous week up to this week's Monday 00:00.
pub fn previous_week_range(today: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let this_monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let last_monday = this_monday - Duration::days(7);
    (start_of(last_monday), start_of(this_monday))
}

/// First day of the previous month up to the first day of this month.
pub fn previous_month_range(today: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let this_first = today.with_day(1).unwrap_or(today);
    let last_first = (this_first - Duration::days(1)).with_day(1).unwrap_or(this_first);
    (start_of(last_first), start_of(this_first))
}

/// Summarise a user's scored turns in `[from, to)`.
pub fn summarize(
    log: &MessageLog,
    user_id: i64,
    (from, to): (NaiveDateTime, NaiveDateTime),
) -> Result<EmotionSummary> {
    Ok(EmotionSummary {
        from,
        to,
        counts: log.emotion_counts(user_id, from, to)?,
    })
}

/// Last week's (Monday to Sunday) emotion distribution.
pub fn weekly_summary(log: &MessageLog, user_id: i64, today: NaiveDate) -> Result<EmotionSummary> {
    summarize(log, user_id, previous_week_range(today))
}

/// Last calendar month's emotion distribution.
pub fn monthly_summary(log: &MessageLog, user_id: i64, today: NaiveDate) -> Result<EmotionSummary> {
    summarize(log, user_id, previous_month_range(today))
}

/// Most frequent emotion between 00:00 and 18:00 of `now`'s day.
pub fn dominant_emotion_today(
    log: &MessageLog,
    user_id: i64,
    now: NaiveDateTime,
) -> Result<Option<String>> {
    let day = now.date();
    let cutoff = day
        .and_hms_opt(DAILY_CUTOFF_HOUR, 0, 0)
        .unwrap_or_else(|| start_of(day));
    let summary = summarize(log, user_id, (start_of(day), cutoff))?;
    Ok(summary.dominant().map(str::to_owned))
}
