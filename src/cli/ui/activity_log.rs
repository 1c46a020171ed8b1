use std::fmt::{self, Display, Formatter};

use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// One `[YYYY-MM-DD HH:MM:SS] message` line of the session activity log.
pub(crate) struct LogLine<'a> {
    at: OffsetDateTime,
    message: &'a str,
}

impl<'a> LogLine<'a> {
    /// Stamps `message` with the current local time, or UTC when the local
    /// offset cannot be determined.
    pub(crate) fn now(message: &'a str) -> Self {
        let at = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        Self::at(at, message)
    }

    pub(crate) fn at(at: OffsetDateTime, message: &'a str) -> Self {
        Self { at, message }
    }
}

impl Display for LogLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let timestamp = self
            .at
            .format(TIMESTAMP_FORMAT)
            .map_err(|_error| fmt::Error)?;
        write!(f, "[{timestamp}] {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn log_line_prefixes_zero_padded_timestamp() {
        let line = LogLine::at(datetime!(2024-03-07 09:05:01 UTC), "Connected to ESP32_BLE");
        assert_snapshot!(line.to_string(), @"[2024-03-07 09:05:01] Connected to ESP32_BLE");
    }
}
