use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::ScheduleError;

/// Parses a cron expression, accepting both 5-field crontab syntax and the
/// crate-native 6/7-field syntax with seconds.
pub fn parse_schedule(expression: &str) -> Result<Schedule, ScheduleError> {
    let normalized = normalize_expression(expression)?;
    Schedule::from_str(&normalized).map_err(|error| ScheduleError::InvalidExpression {
        expression: expression.to_string(),
        reason: error.to_string(),
    })
}

/// Next firing time strictly after `from`.
pub fn next_occurrence(
    expression: &str,
    from: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    let schedule = parse_schedule(expression)?;
    schedule
        .after(&from)
        .next()
        .ok_or_else(|| ScheduleError::NoFutureOccurrence(expression.to_string()))
}

fn normalize_expression(expression: &str) -> Result<String, ScheduleError> {
    let expression = expression.trim();
    let field_count = expression.split_whitespace().count();

    match field_count {
        // standard crontab syntax: minute hour day month weekday
        5 => Ok(format!("0 {expression}")),
        // crate-native syntax includes seconds (+ optional year)
        6 | 7 => Ok(expression.to_string()),
        _ => Err(ScheduleError::InvalidExpression {
            expression: expression.to_string(),
            reason: format!("expected 5, 6, or 7 fields, got {field_count}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Timelike;

    #[test]
    fn five_field_crontab_syntax_is_accepted() {
        let from = Utc.with_ymd_and_hms(2025, 7, 4, 12, 0, 0).unwrap();
        let next = next_occurrence("0 6 * * *", from).expect("next run");
        assert_eq!(next.hour(), 6);
        assert_eq!(next.minute(), 0);
        assert_eq!(next.second(), 0);
        assert!(next > from);
    }

    #[test]
    fn six_field_syntax_passes_through() {
        let from = Utc.with_ymd_and_hms(2025, 7, 4, 12, 0, 0).unwrap();
        let next = next_occurrence("30 0 6 * * *", from).expect("next run");
        assert_eq!(next.second(), 30);
    }

    #[test]
    fn garbage_is_an_invalid_expression() {
        let result = parse_schedule("every tuesday at noon");
        assert!(matches!(
            result,
            Err(ScheduleError::InvalidExpression { .. })
        ));
    }

    #[test]
    fn wrong_field_count_is_an_invalid_expression() {
        let result = parse_schedule("0 6 *");
        let Err(ScheduleError::InvalidExpression { reason, .. }) = result else {
            panic!("expected invalid expression");
        };
        assert!(reason.contains("got 3"));
    }

    #[test]
    fn expired_year_field_has_no_future_occurrence() {
        let from = Utc.with_ymd_and_hms(2025, 7, 4, 12, 0, 0).unwrap();
        let result = next_occurrence("0 0 6 1 1 * 2020", from);
        assert!(matches!(result, Err(ScheduleError::NoFutureOccurrence(_))));
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        assert!(parse_schedule("  0 6 * * *  ").is_ok());
    }
}
