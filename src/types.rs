// src/types.rs

//! Small shared types.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Log verbosity understood by the remote daemon.
///
/// Sent once in the execution request, and attached to every forwarded log
/// line. Ordered from least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteLogLevel {
    Error,
    Minimal,
    Basic,
    Detailed,
    Debug,
    Rowlevel,
}

impl Default for RemoteLogLevel {
    fn default() -> Self {
        RemoteLogLevel::Basic
    }
}

impl RemoteLogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteLogLevel::Error => "error",
            RemoteLogLevel::Minimal => "minimal",
            RemoteLogLevel::Basic => "basic",
            RemoteLogLevel::Detailed => "detailed",
            RemoteLogLevel::Debug => "debug",
            RemoteLogLevel::Rowlevel => "rowlevel",
        }
    }
}

impl fmt::Display for RemoteLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(RemoteLogLevel::Error),
            "minimal" => Ok(RemoteLogLevel::Minimal),
            "basic" => Ok(RemoteLogLevel::Basic),
            "detailed" => Ok(RemoteLogLevel::Detailed),
            "debug" => Ok(RemoteLogLevel::Debug),
            "rowlevel" => Ok(RemoteLogLevel::Rowlevel),
            other => Err(format!(
                "invalid log level: {other} (expected error, minimal, basic, detailed, debug or rowlevel)"
            )),
        }
    }
}

/// Parse a simple duration string like `"10s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{unit}'; expected ms, s, m, or h"
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration(" 2m "), Ok(Duration::from_secs(120)));
    }

    #[test]
    fn rejects_missing_or_unknown_units() {
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn oversized_minutes_and_hours_are_errors() {
        let err = parse_duration("400000000000000000m").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        assert!(parse_duration("18446744073709551615h").is_err());
        assert_eq!(
            parse_duration("18446744073709551615s"),
            Ok(Duration::from_secs(u64::MAX))
        );
    }

    #[test]
    fn log_level_parses_case_insensitively() {
        assert_eq!("Detailed".parse::<RemoteLogLevel>(), Ok(RemoteLogLevel::Detailed));
        assert!("loud".parse::<RemoteLogLevel>().is_err());
    }
}
