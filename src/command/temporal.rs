//! Korean relative date/time expressions resolved against a supplied "now".
//!
//! Recognised forms:
//!
//! | Expression | Meaning |
//! |---|---|
//! | 오늘 / 내일 / 모레 / 글피 | today + 0..3 days |
//! | `N일 뒤`, `N일 후` | today + N days |
//! | `N시간 뒤`, `N분 뒤` | now + N hours / minutes |
//! | `다음주 X요일`, `이번주 X요일`, `X요일` | weekday in next / this / upcoming week |
//! | `N월 N일`, `N일` | calendar day (rolls forward when already past) |
//! | 오전 / 아침 / 새벽, 오후 / 낮 / 저녁 / 밤 | meridiem |
//! | `N시`, `N시 반`, `N시 M분`, 정오 | time of day (digits or 한..열두) |
//!
//! Bare hours 1–6 without a meridiem are read as afternoon. A date without
//! a time resolves to 09:00. `밤 12시` is the midnight that closes the named
//! day, so it lands at 00:00 of the following day; `새벽 12시` stays on it.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};

/// Hour used when only a date is given.
pub const DEFAULT_HOUR: u32 = 9;

/// Spoken hour words, longest first so `열두` wins over `두`.
const HOUR_WORDS: &[(&str, u32)] = &[
    ("열두", 12),
    ("열한", 11),
    ("아홉", 9),
    ("여덟", 8),
    ("일곱", 7),
    ("여섯", 6),
    ("다섯", 5),
    ("열", 10),
    ("네", 4),
    ("세", 3),
    ("두", 2),
    ("한", 1),
];

const WEEKDAYS: &[(&str, Weekday)] = &[
    ("월요일", Weekday::Mon),
    ("화요일", Weekday::Tue),
    ("수요일", Weekday::Wed),
    ("목요일", Weekday::Thu),
    ("금요일", Weekday::Fri),
    ("토요일", Weekday::Sat),
    ("일요일", Weekday::Sun),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
    Night,
}

/// Resolve a full date and time, if the text names one.
pub fn resolve_datetime(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let now = now.with_second(0)?.with_nanosecond(0)?;
    let chars: Vec<char> = text.chars().collect();

    if let Some(hours) = amount_before(&chars, "시간", &["뒤", "후"]) {
        return Some(now + Duration::hours(i64::from(hours)));
    }
    if let Some(minutes) = amount_before(&chars, "분", &["뒤", "후"]) {
        return Some(now + Duration::minutes(i64::from(minutes)));
    }

    match (resolve_date(text, now), clock(text)) {
        (Some(date), Some((time, ends_day))) => {
            let date = if ends_day { date.succ_opt()? } else { date };
            Some(date.and_time(time))
        }
        (Some(date), None) => date.and_hms_opt(DEFAULT_HOUR, 0, 0),
        (None, Some((time, _))) => {
            let today = now.date().and_time(time);
            Some(if today <= now { today + Duration::days(1) } else { today })
        }
        (None, None) => None,
    }
}

/// Resolve a calendar day, if the text names one.
pub fn resolve_date(text: &str, now: NaiveDateTime) -> Option<NaiveDate> {
    let today = now.date();
    for (word, offset) in [("글피", 3), ("모레", 2), ("내일", 1), ("오늘", 0)] {
        if text.contains(word) {
            return Some(today + Duration::days(offset));
        }
    }

    let chars: Vec<char> = text.chars().collect();
    if let Some(days) = amount_before(&chars, "일", &["뒤", "후"]) {
        return Some(today + Duration::days(i64::from(days)));
    }
    if let Some(date) = month_day(&chars, today) {
        return Some(date);
    }
    if let Some(date) = weekday(text, today) {
        return Some(date);
    }
    day_of_month(&chars, today)
}

/// Time of day named in the text.
pub fn time_of_day(text: &str) -> Option<NaiveTime> {
    clock(text).map(|(time, _)| time)
}

/// Time of day, and whether it is the midnight ending the named day.
fn clock(text: &str) -> Option<(NaiveTime, bool)> {
    if text.contains("정오") {
        return NaiveTime::from_hms_opt(12, 0, 0).map(|t| (t, false));
    }
    let chars: Vec<char> = text.chars().collect();
    let (hour_idx, hour) = find_hour(&chars)?;
    let minute = minutes_after(&chars, hour_idx + 1).unwrap_or(0);

    let (hour, ends_day) = match meridiem(text) {
        Some(Meridiem::Night) if hour == 12 => (0, true),
        Some(Meridiem::Pm | Meridiem::Night) if hour < 12 => (hour + 12, false),
        Some(Meridiem::Am) if hour == 12 => (0, false),
        Some(_) => (hour, false),
        None if (1..=6).contains(&hour) => (hour + 12, false),
        None => (hour, false),
    };
    NaiveTime::from_hms_opt(hour, minute, 0).map(|t| (t, ends_day))
}

fn meridiem(text: &str) -> Option<Meridiem> {
    if ["오전", "아침", "새벽"].iter().any(|w| text.contains(w)) {
        Some(Meridiem::Am)
    } else if text.contains("밤") {
        Some(Meridiem::Night)
    } else if ["오후", "저녁", "낮"].iter().any(|w| text.contains(w)) {
        Some(Meridiem::Pm)
    } else {
        None
    }
}

/// Index of the `시` that closes an hour expression, and the hour.
fn find_hour(chars: &[char]) -> Option<(usize, u32)> {
    chars.iter().enumerate().find_map(|(i, c)| {
        if *c != '시' || chars.get(i + 1) == Some(&'간') {
            return None;
        }
        number_ending_at(chars, i, true)
            .filter(|h| (0..=24).contains(h))
            .map(|h| (i, h % 24))
    })
}

/// `반` or `M분` right after the hour marker.
fn minutes_after(chars: &[char], mut idx: usize) -> Option<u32> {
    while chars.get(idx) == Some(&' ') {
        idx += 1;
    }
    if chars.get(idx) == Some(&'반') {
        return Some(30);
    }
    let start = idx;
    while chars.get(idx).is_some_and(char::is_ascii_digit) {
        idx += 1;
    }
    if idx == start || chars.get(idx) != Some(&'분') {
        return None;
    }
    digits(&chars[start..idx]).filter(|m| *m < 60)
}

/// Number written directly before `chars[end]` (one space allowed).
fn number_ending_at(chars: &[char], end: usize, allow_words: bool) -> Option<u32> {
    let mut stop = end;
    if stop > 0 && chars[stop - 1] == ' ' {
        stop -= 1;
    }
    let mut start = stop;
    while start > 0 && chars[start - 1].is_ascii_digit() && stop - start < 4 {
        start -= 1;
    }
    if start < stop {
        return digits(&chars[start..stop]);
    }
    if !allow_words {
        return None;
    }
    let head: String = chars[..stop].iter().collect();
    HOUR_WORDS
        .iter()
        .find(|(word, _)| head.ends_with(word))
        .map(|(_, n)| *n)
}

fn digits(chars: &[char]) -> Option<u32> {
    chars.iter().collect::<String>().parse().ok()
}

/// `N<unit> 뒤|후`: the amount for the first such phrase.
fn amount_before(chars: &[char], unit: &str, markers: &[&str]) -> Option<u32> {
    let unit: Vec<char> = unit.chars().collect();
    (0..chars.len()).find_map(|i| {
        if !chars[i..].starts_with(&unit) {
            return None;
        }
        let mut after = i + unit.len();
        while chars.get(after) == Some(&' ') {
            after += 1;
        }
        let tail: String = chars[after.min(chars.len())..].iter().collect();
        if !markers.iter().any(|m| tail.starts_with(m)) {
            return None;
        }
        number_ending_at(chars, i, false)
    })
}

/// `N월 N일`, rolled to next year when already past.
fn month_day(chars: &[char], today: NaiveDate) -> Option<NaiveDate> {
    let month_idx = (0..chars.len()).find(|&i| {
        chars[i] == '월' && number_ending_at(chars, i, false).is_some()
    })?;
    let month = number_ending_at(chars, month_idx, false)?;
    let day_idx = (month_idx + 1..chars.len())
        .find(|&i| chars[i] == '일' && number_ending_at(chars, i, false).is_some())?;
    let day = number_ending_at(chars, day_idx, false)?;
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year < today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(this_year)
    }
}

/// Bare `N일`: that day of this month, or of next month when already past.
fn day_of_month(chars: &[char], today: NaiveDate) -> Option<NaiveDate> {
    let idx = (0..chars.len())
        .find(|&i| chars[i] == '일' && number_ending_at(chars, i, false).is_some())?;
    let day = number_ending_at(chars, idx, false)?;
    let this_month = NaiveDate::from_ymd_opt(today.year(), today.month(), day)?;
    if this_month >= today {
        return Some(this_month);
    }
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn weekday(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let target = WEEKDAYS
        .iter()
        .find(|(word, _)| text.contains(word))
        .map(|(_, wd)| *wd)?;
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let offset = i64::from(target.num_days_from_monday());
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.contains("다음주") {
        return Some(monday + Duration::days(7 + offset));
    }
    if compact.contains("이번주") {
        return Some(monday + Duration::days(offset));
    }
    let ahead = (offset - i64::from(today.weekday().num_days_from_monday())).rem_euclid(7);
    Some(today + Duration::days(ahead))
}
