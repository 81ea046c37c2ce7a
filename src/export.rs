//! Spreadsheet exports of attendance. Every field is quoted.

use crate::models::{AttendanceRecord, AttendanceWithSession};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn row<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .map(|f| quote(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// One session's roster: `Name,Email,Student ID,Check-in Time,Points`.
pub fn session_csv(records: &[AttendanceRecord]) -> String {
    let mut lines = vec![row(["Name", "Email", "Student ID", "Check-in Time", "Points"])];
    lines.extend(records.iter().map(|r| {
        row([
            r.student_name.clone(),
            r.student_email.clone(),
            r.student_id.clone().unwrap_or_default(),
            r.checked_in_at.format(TIMESTAMP_FORMAT).to_string(),
            r.points.to_string(),
        ])
    }));
    lines.join("\n")
}

/// Every record with its session:
/// `Week,Title,Date,Name,Email,Student ID,Check-in Time,Points`.
pub fn all_sessions_csv(rows: &[AttendanceWithSession]) -> String {
    let mut lines = vec![row([
        "Week",
        "Title",
        "Date",
        "Name",
        "Email",
        "Student ID",
        "Check-in Time",
        "Points",
    ])];
    lines.extend(rows.iter().map(|AttendanceWithSession { record, session }| {
        row([
            session.week_number.to_string(),
            session.title.clone(),
            session.started_at.format(DATE_FORMAT).to_string(),
            record.student_name.clone(),
            record.student_email.clone(),
            record.student_id.clone().unwrap_or_default(),
            record.checked_in_at.format(TIMESTAMP_FORMAT).to_string(),
            record.points.to_string(),
        ])
    }));
    lines.join("\n")
}

/// File name offered for a session export, e.g. `attendance-week-3-AB12CD34.csv`.
pub fn session_file_name(week_number: i64, session_code: &str) -> String {
    format!("attendance-week-{}-{}.csv", week_number, session_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClassSession;
    use chrono::{TimeZone, Utc};

    fn record(name: &str, student_id: Option<&str>) -> AttendanceRecord {
        AttendanceRecord {
            id: 1,
            session_id: 1,
            student_name: name.to_string(),
            student_email: "a@x.edu".to_string(),
            student_id: student_id.map(str::to_string),
            checked_in_at: Utc.with_ymd_and_hms(2025, 3, 4, 9, 5, 0).unwrap(),
            points: 100,
        }
    }

    #[test]
    fn test_session_csv() {
        let csv = session_csv(&[record("Ada", Some("S1")), record("Bo", None)]);
        let lines: Vec<&str> = csv.split('\n').collect();

        assert_eq!(
            lines[0],
            r#""Name","Email","Student ID","Check-in Time","Points""#
        );
        assert_eq!(
            lines[1],
            r#""Ada","a@x.edu","S1","2025-03-04 09:05:00","100""#
        );
        assert_eq!(lines[2], r#""Bo","a@x.edu","","2025-03-04 09:05:00","100""#);
    }

    #[test]
    fn test_quotes_are_doubled() {
        let csv = session_csv(&[record("Ada \"The Countess\", Lovelace", None)]);
        assert!(csv.contains(r#""Ada ""The Countess"", Lovelace""#));
    }

    #[test]
    fn test_all_sessions_csv() {
        let session = ClassSession {
            id: 1,
            session_code: "AB12CD34".to_string(),
            week_number: 3,
            title: "CSS Flexbox".to_string(),
            is_active: false,
            started_at: Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap(),
            ended_at: None,
        };
        let csv = all_sessions_csv(&[AttendanceWithSession {
            record: record("Ada", None),
            session,
        }]);
        let lines: Vec<&str> = csv.split('\n').collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(r#""Week","Title","Date","#));
        assert!(lines[1].starts_with(r#""3","CSS Flexbox","2025-03-04","Ada""#));
    }

    #[test]
    fn test_empty_export_is_header_only() {
        assert_eq!(session_csv(&[]).lines().count(), 1);
    }
}
