//! CSV rendering for registry exports.

use std::borrow::Cow;

use crate::models::Company;

/// File name offered to the browser for downloads.
pub const EXPORT_FILENAME: &str = "companies.csv";

pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Column header row, in output order.
pub const CSV_HEADERS: [&str; 6] = [
    "Register Name",
    "Business Name",
    "Status",
    "Registration Date",
    "State",
    "ABN",
];

/// `Content-Disposition` value for the export download.
pub fn content_disposition() -> String {
    format!("attachment; filename=\"{}\"", EXPORT_FILENAME)
}

/// Quote a field if it contains a comma, double quote or newline.
pub fn escape_csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

fn company_row(company: &Company) -> [&str; 6] {
    [
        company.register_name.as_deref().unwrap_or_default(),
        company.business_name.as_deref().unwrap_or_default(),
        company.status.as_deref().unwrap_or_default(),
        company.registration_date.as_deref().unwrap_or_default(),
        company.state.as_deref().unwrap_or_default(),
        company.abn.as_deref().unwrap_or_default(),
    ]
}

fn push_row<'a>(csv: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            csv.push(',');
        }
        csv.push_str(&escape_csv_field(field));
    }
    csv.push('\n');
}

/// Render the header row followed by one row per company.
pub fn render_csv(companies: &[Company]) -> String {
    let mut csv = String::with_capacity(64 * (companies.len() + 1));
    push_row(&mut csv, CSV_HEADERS);
    for company in companies {
        push_row(&mut csv, company_row(company));
    }
    csv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_plain_field_passes_through() {
        assert!(matches!(escape_csv_field("ACME PTY LTD"), Cow::Borrowed(_)));
        assert_eq!(escape_csv_field(""), "");
    }

    #[test]
    fn test_escape_special_characters() {
        assert_eq!(escape_csv_field(r#"Acme, "Inc""#), r#""Acme, ""Inc""""#);
        assert_eq!(escape_csv_field("line one\nline two"), "\"line one\nline two\"");
        assert_eq!(escape_csv_field(r#"6" Nails"#), r#""6"" Nails""#);
    }

    #[test]
    fn test_zero_rows_is_header_only() {
        let csv = render_csv(&[]);
        assert_eq!(
            csv,
            "Register Name,Business Name,Status,Registration Date,State,ABN\n"
        );
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn test_absent_fields_render_empty() {
        let company = Company {
            register_name: Some("Acme, Inc".to_string()),
            status: Some("Registered".to_string()),
            abn: Some("51824753556".to_string()),
            ..Company::with_id("c-1")
        };

        let csv = render_csv(&[company]);
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], "\"Acme, Inc\",,Registered,,,51824753556");
        assert!(!csv.contains("null"));
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition(),
            "attachment; filename=\"companies.csv\""
        );
    }
}
