//! # CSV Export
//!
//! Renders the roster as a CSV report with a tamper-evidence checksum.
//!
//! The last line of an export is `checksum:<n>` where `n` is the sum of the
//! UTF-16 code units of everything above it, modulo
//! [`CSV_CHECKSUM_MODULUS`](crate::CSV_CHECKSUM_MODULUS). [`verify_csv`]
//! recomputes it; any edit to the content shows up as a mismatch. This is an
//! integrity tripwire for accidental edits, not a cryptographic seal.

use crate::error::CsvVerifyError;
use crate::team::Team;
use crate::CSV_CHECKSUM_MODULUS;

const HEADER: &str = "Team Name,State,Base Time,Time Left,Time Running,\
Time Paused,Total Time,Drift(ms),Time Added,Time Subtracted,Speed";

const CHECKSUM_PREFIX: &str = "checksum:";

/// Renders `teams` as a checksummed CSV report.
#[must_use]
pub fn export_csv(teams: &[Team]) -> String {
    let mut content = String::from(HEADER);
    for team in teams {
        content.push('\n');
        content.push_str(&row(team));
    }
    let sum = checksum(&content);
    format!("{content}\n{CHECKSUM_PREFIX}{sum}")
}

/// Checks a previously exported report against its recorded checksum.
pub fn verify_csv(file: &str) -> Result<(), CsvVerifyError> {
    let Some((content, last)) = file.trim_end().rsplit_once('\n') else {
        return Err(CsvVerifyError::NoChecksum);
    };
    let Some(digits) = last.strip_prefix(CHECKSUM_PREFIX) else {
        return Err(CsvVerifyError::NoChecksum);
    };
    let recorded = digits
        .trim()
        .parse::<u32>()
        .map_err(|_| CsvVerifyError::MalformedChecksum(last.to_string()))?;

    let computed = checksum(content);
    if recorded == computed {
        Ok(())
    } else {
        Err(CsvVerifyError::ChecksumMismatch { recorded, computed })
    }
}

fn row(team: &Team) -> String {
    let total = team.time_running + team.time_paused;
    format!(
        "{},{},{},{},{},{},{},{},{},{},{}",
        team.name,
        team.state,
        hms(u64::from(team.base_time)),
        hms(u64::from(team.time_left)),
        hms(round_secs(team.time_running)),
        hms(round_secs(team.time_paused)),
        hms(round_secs(total)),
        team.final_drift_ms.unwrap_or(0),
        hms(u64::from(team.time_added)),
        hms(u64::from(team.time_subtracted)),
        team.speed,
    )
}

/// Formats whole seconds as `HH:MM:SS`.
#[must_use]
pub fn hms(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_secs(seconds: f64) -> u64 {
    seconds.round().max(0.0) as u64
}

/// Sums the UTF-16 code units of `content`, modulo the export modulus.
///
/// UTF-16 units, not bytes, so the value matches what any UTF-16 based
/// reader of the same file computes for non-ASCII team names.
fn checksum(content: &str) -> u32 {
    content
        .encode_utf16()
        .fold(0u32, |acc, unit| (acc + u32::from(unit)) % CSV_CHECKSUM_MODULUS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Action;
    use chronolink_shared::Speed;
    use std::time::SystemTime;

    fn sample_teams() -> Vec<Team> {
        let now = SystemTime::now();
        let mut a = Team::new("Alpha", 3600);
        a.apply(&Action::Start, now);
        a.apply(&Action::Add(90), now);
        a.apply(&Action::SetSpeed(Speed::Two), now);
        let b = Team::new("Beta", 300);
        vec![a, b]
    }

    #[test]
    fn test_hms_formatting() {
        assert_eq!(hms(0), "00:00:00");
        assert_eq!(hms(59), "00:00:59");
        assert_eq!(hms(61), "00:01:01");
        assert_eq!(hms(3661), "01:01:01");
        assert_eq!(hms(360_000), "100:00:00");
    }

    #[test]
    fn test_export_shape() {
        let file = export_csv(&sample_teams());
        let lines: Vec<&str> = file.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].starts_with("Alpha,running,01:00:00,01:01:30,"));
        assert!(lines[2].starts_with("Beta,ready,00:05:00,"));
        assert!(lines[3].starts_with(CHECKSUM_PREFIX));
    }

    #[test]
    fn test_export_verifies_clean() {
        let file = export_csv(&sample_teams());
        assert_eq!(verify_csv(&file), Ok(()));
    }

    #[test]
    fn test_verify_detects_edit() {
        let file = export_csv(&sample_teams());
        let tampered = file.replacen("Alpha", "Alphb", 1);
        assert!(matches!(
            verify_csv(&tampered),
            Err(CsvVerifyError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_verify_requires_checksum_line() {
        let file = export_csv(&sample_teams());
        let truncated = file.rsplit_once('\n').unwrap().0;
        assert_eq!(verify_csv(truncated), Err(CsvVerifyError::NoChecksum));
        assert_eq!(verify_csv(""), Err(CsvVerifyError::NoChecksum));
    }

    #[test]
    fn test_verify_rejects_malformed_checksum() {
        let file = "header\nrow\nchecksum:lots";
        assert!(matches!(
            verify_csv(file),
            Err(CsvVerifyError::MalformedChecksum(_))
        ));
    }

    #[test]
    fn test_checksum_counts_utf16_units() {
        // "é" is one UTF-16 unit (0xE9) but two UTF-8 bytes.
        assert_eq!(checksum("é"), 0xE9 % CSV_CHECKSUM_MODULUS);
    }

    #[test]
    fn test_drift_column_defaults_to_zero() {
        let mut team = Team::new("A", 60);
        team.final_drift_ms = Some(-42);
        let with_drift = export_csv(std::slice::from_ref(&team));
        assert!(with_drift.contains(",-42,"));

        team.final_drift_ms = None;
        let without = export_csv(std::slice::from_ref(&team));
        assert!(without.lines().nth(1).unwrap().contains(",0,"));
    }
}
