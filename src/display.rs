use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;

const ELLIPSIS: &str = "...";

/// First `max` grapheme clusters of `content`, with an ellipsis when cut.
pub fn preview(content: &str, max: usize) -> String {
    let mut graphemes = content.graphemes(true);
    let head: String = graphemes.by_ref().take(max).collect();
    if graphemes.next().is_some() {
        format!("{head}{ELLIPSIS}")
    } else {
        head
    }
}

pub fn relative_time(then: OffsetDateTime, now: OffsetDateTime) -> String {
    let elapsed = now - then;
    if elapsed.is_negative() {
        return "just now".to_string();
    }
    match elapsed.whole_days() {
        0 => match (elapsed.whole_hours(), elapsed.whole_minutes()) {
            (0, 0) => "just now".to_string(),
            (0, minutes) => format!("{minutes} min ago"),
            (hours, _) => format!("{hours} h ago"),
        },
        1 => "yesterday".to_string(),
        days @ 2..=6 => format!("{days} days ago"),
        _ => format!("{}/{}", u8::from(then.month()), then.day()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    #[test]
    fn preview_truncates_on_grapheme_boundaries() {
        assert_eq!(preview("short", 200), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("e\u{301}e\u{301}e\u{301}", 2), "e\u{301}e\u{301}...");
        assert_eq!(preview("歌詞メモ", 4), "歌詞メモ");
    }

    #[test]
    fn relative_time_buckets() {
        let now = datetime!(2024-03-20 12:00 UTC);
        assert_eq!(relative_time(now - Duration::seconds(20), now), "just now");
        assert_eq!(relative_time(now + Duration::minutes(5), now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(12), now), "12 min ago");
        assert_eq!(relative_time(now - Duration::hours(5), now), "5 h ago");
        assert_eq!(relative_time(now - Duration::hours(30), now), "yesterday");
        assert_eq!(relative_time(now - Duration::days(4), now), "4 days ago");
        assert_eq!(relative_time(datetime!(2024-02-03 09:00 UTC), now), "2/3");
    }
}
