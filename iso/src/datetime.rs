use std::time::{SystemTime, UNIX_EPOCH};

/// UTC wall-clock time as recorded in volume descriptors and directory records.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IsoTimestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl IsoTimestamp {
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::from_unix(secs)
    }

    pub fn from_unix(secs: u64) -> Self {
        let days = (secs / 86_400) as i64;
        let rem = secs % 86_400;
        let (year, month, day) = civil_from_days(days);
        Self {
            year: year as u16,
            month,
            day,
            hour: (rem / 3600) as u8,
            minute: (rem % 3600 / 60) as u8,
            second: (rem % 60) as u8,
        }
    }

    /// 17-byte "dec-datetime" used in volume descriptors, GMT offset 0.
    pub(crate) fn to_descriptor_bytes(self) -> [u8; 17] {
        let text = format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}00",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        );
        let mut out = [0u8; 17];
        out[..16].copy_from_slice(&text.as_bytes()[..16]);
        out
    }

    /// 7-byte form used in directory records, GMT offset 0.
    pub(crate) fn to_record_bytes(self) -> [u8; 7] {
        [
            self.year.saturating_sub(1900).min(255) as u8,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            0,
        ]
    }
}

/// "Unset" dec-datetime: sixteen ASCII zeros and a zero offset.
pub(crate) const UNSET_DESCRIPTOR_TIME: [u8; 17] = [
    b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0',
    0,
];

// Days since 1970-01-01 to proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch() {
        let ts = IsoTimestamp::from_unix(0);
        assert_eq!((ts.year, ts.month, ts.day), (1970, 1, 1));
    }

    #[test]
    fn leap_day() {
        // 2024-02-29T12:34:56Z
        let ts = IsoTimestamp::from_unix(1_709_210_096);
        assert_eq!(
            ts,
            IsoTimestamp {
                year: 2024,
                month: 2,
                day: 29,
                hour: 12,
                minute: 34,
                second: 56,
            }
        );
        assert_eq!(&ts.to_descriptor_bytes()[..16], b"2024022912345600");
        assert_eq!(ts.to_record_bytes(), [124, 2, 29, 12, 34, 56, 0]);
    }
}
