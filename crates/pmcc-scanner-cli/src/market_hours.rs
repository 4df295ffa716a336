use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// US-Eastern market-hours gate for the daemon loop. Weekends are always
/// closed; `extended_hours` additionally opens the 4am-9:30am and
/// 4pm-8pm Eastern pre/post-market windows.
pub fn is_market_open(extended_hours: bool) -> bool {
    is_market_open_at(Utc::now().with_timezone(&chrono_tz::US::Eastern), extended_hours)
}

fn is_market_open_at(now: DateTime<Tz>, extended_hours: bool) -> bool {
    if now.weekday() == Weekday::Sat || now.weekday() == Weekday::Sun {
        return false;
    }

    let time_minutes = now.hour() * 60 + now.minute();

    let premarket_open = 4 * 60;
    let regular_open = 9 * 60 + 30;
    let regular_close = 16 * 60;
    let afterhours_close = 20 * 60;

    if time_minutes >= regular_open && time_minutes < regular_close {
        return true;
    }

    if extended_hours {
        if time_minutes >= premarket_open && time_minutes < regular_open {
            return true;
        }
        if time_minutes >= regular_close && time_minutes < afterhours_close {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn eastern(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
        chrono_tz::US::Eastern.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn closed_on_saturday_during_regular_hours() {
        let sat = eastern(2026, 7, 25, 10, 0);
        assert!(!is_market_open_at(sat, false));
    }

    #[test]
    fn open_during_regular_hours_on_a_weekday() {
        let mon = eastern(2026, 7, 27, 10, 0);
        assert!(is_market_open_at(mon, false));
    }

    #[test]
    fn closed_before_premarket_without_extended_hours() {
        let early = eastern(2026, 7, 27, 5, 0);
        assert!(!is_market_open_at(early, false));
    }

    #[test]
    fn premarket_open_only_with_extended_hours_enabled() {
        let premarket = eastern(2026, 7, 27, 5, 0);
        assert!(is_market_open_at(premarket, true));
        assert!(!is_market_open_at(premarket, false));
    }

    #[test]
    fn closed_right_at_regular_close_without_extended_hours() {
        let close = eastern(2026, 7, 27, 16, 0);
        assert!(!is_market_open_at(close, false));
        assert!(is_market_open_at(close, true));
    }
}
