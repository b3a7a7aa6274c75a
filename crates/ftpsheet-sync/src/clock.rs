use chrono::{DateTime, FixedOffset, Utc};

/// `08:00 AM | 14-Aug-2025`
pub const DISPLAY_FORMAT: &str = "%I:%M %p | %d-%b-%Y";

/// Renders the sync instant in the reporting offset for the A1 annotation.
pub fn display_timestamp(now: DateTime<Utc>, offset: FixedOffset) -> String {
    now.with_timezone(&offset).format(DISPLAY_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plus_seven() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).expect("offset")
    }

    #[test]
    fn renders_in_reporting_offset() {
        let now = Utc.with_ymd_and_hms(2025, 8, 14, 1, 0, 1).single().expect("instant");
        assert_eq!(display_timestamp(now, plus_seven()), "08:00 AM | 14-Aug-2025");
    }

    #[test]
    fn offset_can_roll_the_date_forward() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 20, 30, 0).single().expect("instant");
        assert_eq!(display_timestamp(now, plus_seven()), "03:30 AM | 01-Jan-2026");
    }
}
