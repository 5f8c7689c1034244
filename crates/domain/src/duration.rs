use std::fmt::{Display, Formatter};

use elevate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Length of one elevated-access window.
///
/// Accepts the ISO-8601 time subset used on request records ("PT9H",
/// "PT30M", "PT1H30M") as well as a bare number of hours ("9"), and always
/// renders back in the ISO form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessDuration {
    minutes: u32,
}

impl AccessDuration {
    /// Creates a duration from whole hours.
    pub fn from_hours(hours: u32) -> AppResult<Self> {
        Self::from_minutes(hours.saturating_mul(60))
    }

    /// Creates a duration from whole minutes.
    pub fn from_minutes(minutes: u32) -> AppResult<Self> {
        if minutes == 0 {
            return Err(AppError::Validation(
                "access duration must be greater than zero".to_owned(),
            ));
        }

        Ok(Self { minutes })
    }

    /// Parses "PT<h>H<m>M"-style strings or a bare hour count.
    pub fn parse(value: &str) -> AppResult<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "access duration must not be empty".to_owned(),
            ));
        }

        if let Ok(hours) = trimmed.parse::<u32>() {
            return Self::from_hours(hours);
        }

        let upper = trimmed.to_uppercase();
        let Some(body) = upper.strip_prefix("PT") else {
            return Err(AppError::Validation(format!(
                "invalid access duration '{value}'"
            )));
        };

        let mut minutes = 0_u32;
        let mut digits = String::new();
        for character in body.chars() {
            match character {
                '0'..='9' => digits.push(character),
                'H' | 'M' => {
                    let amount = digits.parse::<u32>().map_err(|error| {
                        AppError::Validation(format!("invalid access duration '{value}': {error}"))
                    })?;
                    digits.clear();
                    let scale = if character == 'H' { 60 } else { 1 };
                    minutes = minutes.saturating_add(amount.saturating_mul(scale));
                }
                _ => {
                    return Err(AppError::Validation(format!(
                        "invalid access duration '{value}'"
                    )));
                }
            }
        }

        if !digits.is_empty() {
            return Err(AppError::Validation(format!(
                "invalid access duration '{value}': trailing digits without a unit"
            )));
        }

        Self::from_minutes(minutes)
    }

    /// Returns the window length in whole minutes.
    #[must_use]
    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    /// Returns the window length as a chrono duration.
    #[must_use]
    pub fn as_chrono(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.minutes))
    }
}

impl Display for AccessDuration {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        let hours = self.minutes / 60;
        let minutes = self.minutes % 60;
        match (hours, minutes) {
            (0, m) => write!(formatter, "PT{m}M"),
            (h, 0) => write!(formatter, "PT{h}H"),
            (h, m) => write!(formatter, "PT{h}H{m}M"),
        }
    }
}

impl TryFrom<String> for AccessDuration {
    type Error = AppError;

    fn try_from(value: String) -> AppResult<Self> {
        Self::parse(value.as_str())
    }
}

impl From<AccessDuration> for String {
    fn from(value: AccessDuration) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::AccessDuration;

    #[test]
    fn parses_bare_hours() {
        let duration = AccessDuration::parse("9");
        assert_eq!(duration.map(|d| d.minutes()).ok(), Some(540));
    }

    #[test]
    fn parses_iso_hours_and_minutes() {
        let duration = AccessDuration::parse("PT1H30M");
        assert_eq!(duration.map(|d| d.minutes()).ok(), Some(90));
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert!(AccessDuration::parse("0").is_err());
        assert!(AccessDuration::parse("PT").is_err());
        assert!(AccessDuration::parse("PT5").is_err());
        assert!(AccessDuration::parse("an hour").is_err());
    }

    #[test]
    fn renders_iso_form() {
        let cases = [("PT1H", 60), ("PT30M", 30), ("PT2H15M", 135)];
        for (rendered, minutes) in cases {
            let duration = AccessDuration::from_minutes(minutes);
            assert_eq!(duration.map(|d| d.to_string()).ok(), Some(rendered.to_owned()));
        }
    }

    proptest! {
        #[test]
        fn display_round_trips(minutes in 1_u32..=6000) {
            let duration = AccessDuration::from_minutes(minutes);
            prop_assert!(duration.is_ok());
            if let Ok(duration) = duration {
                let reparsed = AccessDuration::parse(duration.to_string().as_str());
                prop_assert_eq!(reparsed.ok(), Some(duration));
            }
        }
    }
}
