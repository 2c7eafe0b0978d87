use anyhow::{bail, Context};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref AGE: Regex = Regex::new(r"^(\d+)([mhdw])$").expect("valid age pattern");
}

/// Parse an age such as `90m`, `12h`, `7d` or `2w`
pub(crate) fn parse_age(text: &str) -> anyhow::Result<Duration> {
    let Some(captures) = AGE.captures(text) else {
        bail!("expected an age like 30m, 12h, 7d or 2w, got '{}'", text);
    };

    let amount: i64 = captures[1]
        .parse()
        .with_context(|| format!("age '{}' is too large", text))?;

    let duration = match &captures[2] {
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        _ => Duration::try_weeks(amount),
    };
    duration.with_context(|| format!("age '{}' is too large", text))
}

/// `field:>=<timestamp>` for documents no older than `age`
pub(crate) fn newer_than(field: &str, age: &str, now: DateTime<Utc>) -> anyhow::Result<String> {
    let since = now
        .checked_sub_signed(parse_age(age)?)
        .with_context(|| format!("age '{}' is out of range", age))?;
    Ok(format!(
        "{}:>={}",
        field,
        since.to_rfc3339_opts(SecondsFormat::Secs, true)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_age() {
        assert_eq!(parse_age("90m").unwrap(), Duration::minutes(90));
        assert_eq!(parse_age("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_age("2w").unwrap(), Duration::weeks(2));
        assert!(parse_age("7y").is_err());
        assert!(parse_age("").is_err());
        assert!(parse_age("99999999999999999999d").is_err());
    }

    #[test]
    fn test_newer_than() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            newer_than("date", "1d", now).unwrap(),
            "date:>=2024-03-09T12:00:00Z"
        );
    }
}
