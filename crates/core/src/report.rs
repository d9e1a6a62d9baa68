//! Downloadable CSV report of a commit's per-row results.

use csv::{QuoteStyle, WriterBuilder};

use crate::error::CoreError;
use crate::field::FieldKey;
use crate::import_status::RowStatus;
use crate::lead::display_name;
use crate::lead_store::ImportRow;

pub const REPORT_HEADERS: [&str; 6] = ["Row", "Email", "Phone", "Name", "Status", "Reason"];

/// Render settled rows as CSV, ascending by row number.
///
/// Every value is quoted and embedded quotes are doubled. Rows still waiting
/// for the worker are left out.
pub fn build_report(rows: &[ImportRow]) -> Result<String, CoreError> {
    let mut settled: Vec<&ImportRow> = rows.iter().filter(|r| r.status.is_settled()).collect();
    settled.sort_by_key(|r| r.row_number);

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(REPORT_HEADERS).map_err(report_error)?;
    for row in settled {
        let data = &row.normalized_data;
        let get = |field: FieldKey| data.get(&field).map(String::as_str).unwrap_or("");
        let row_number = row.row_number.to_string();
        let name = display_name(data).unwrap_or_default();
        writer
            .write_record([
                row_number.as_str(),
                get(FieldKey::Email),
                get(FieldKey::Phone),
                name.as_str(),
                row.status.report_label(),
                reason(row),
            ])
            .map_err(report_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CoreError::Internal(format!("Failed to flush report: {e}")))?;
    String::from_utf8(bytes).map_err(|e| CoreError::Internal(format!("Report is not UTF-8: {e}")))
}

/// Suggested download file name for a job's report.
pub fn report_file_name(job_id: i64) -> String {
    format!("import-{job_id}-report.csv")
}

fn reason(row: &ImportRow) -> &str {
    match (&row.message, row.status) {
        (Some(message), _) => message.as_str(),
        (None, RowStatus::Skipped) => "Skipped by user",
        (None, _) => "",
    }
}

fn report_error(e: csv::Error) -> CoreError {
    CoreError::Internal(format!("Failed to write report: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::NormalizedData;
    use std::collections::BTreeMap;

    fn import_row(n: i32, status: RowStatus, pairs: &[(FieldKey, &str)], message: Option<&str>) -> ImportRow {
        ImportRow {
            id: n as i64,
            job_id: 1,
            row_number: n,
            raw_data: BTreeMap::new(),
            normalized_data: pairs.iter().map(|(f, v)| (*f, v.to_string())).collect::<NormalizedData>(),
            status,
            lead_id: None,
            message: message.map(str::to_string),
            action: None,
            existing_lead_id: None,
        }
    }

    #[test]
    fn sorted_quoted_and_escaped() {
        let rows = vec![
            import_row(3, RowStatus::Error, &[(FieldKey::Email, "c@x.com")], Some("Bad \"value\"")),
            import_row(
                1,
                RowStatus::Imported,
                &[(FieldKey::Email, "a@x.com"), (FieldKey::FirstName, "Ann"), (FieldKey::LastName, "Lee")],
                None,
            ),
            import_row(2, RowStatus::Valid, &[], None),
        ];
        let csv = build_report(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], r#""Row","Email","Phone","Name","Status","Reason""#);
        assert_eq!(lines[1], r#""1","a@x.com","","Ann Lee","Imported","""#);
        assert_eq!(lines[2], r#""3","c@x.com","","","Error","Bad ""value""""#);
    }

    #[test]
    fn skipped_rows_get_default_reason() {
        let rows = vec![import_row(1, RowStatus::Skipped, &[(FieldKey::Phone, "+33612345678")], None)];
        let csv = build_report(&rows).unwrap();
        assert!(csv.contains(r#""1","","+33612345678","","Skipped","Skipped by user""#));
    }
}
