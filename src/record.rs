use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One academic result row as stored in the main and staging tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub snh: Option<String>,
    pub semester_offered: Option<String>,
    pub current_major: Option<String>,
    pub course_id: Option<String>,
    pub course_name: Option<String>,
    pub grade: Option<String>,
    pub grade_remark: Option<String>,
    pub course_type: Option<String>,
    pub course_attribute: Option<String>,
    pub hours: Option<String>,
    pub credit: Option<String>,
    pub offering_unit: Option<String>,
    pub tags: Option<String>,
    pub description: Option<String>,
    pub exam_type: Option<String>,
    pub assessment_method: Option<String>,
    pub year: Option<i64>,
}

/// Column names in table order. Spreadsheet headers are matched against these
/// case-insensitively after trimming.
pub const COLUMNS: [&str; 17] = [
    "SNH",
    "Semester_Offered",
    "Current_Major",
    "Course_ID",
    "Course_Name",
    "Grade",
    "Grade_Remark",
    "Course_Type",
    "Course_Attribute",
    "Hours",
    "Credit",
    "Offering_Unit",
    "Tags",
    "Description",
    "Exam_Type",
    "Assessment_Method",
    "year",
];

impl Record {
    /// Build a record from a header-keyed row. Keys must already be normalized
    /// with [`normalize_header`].
    pub fn from_row(row: &HashMap<String, String>) -> Record {
        let get = |col: &str| -> Option<String> {
            row.get(&normalize_header(col))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
        };
        Record {
            snh: get("SNH"),
            semester_offered: get("Semester_Offered"),
            current_major: get("Current_Major"),
            course_id: get("Course_ID"),
            course_name: get("Course_Name"),
            grade: get("Grade"),
            grade_remark: get("Grade_Remark"),
            course_type: get("Course_Type"),
            course_attribute: get("Course_Attribute"),
            hours: get("Hours"),
            credit: get("Credit"),
            offering_unit: get("Offering_Unit"),
            tags: get("Tags"),
            description: get("Description"),
            exam_type: get("Exam_Type"),
            assessment_method: get("Assessment_Method"),
            year: get("year").and_then(|v| parse_leading_int(&v)),
        }
    }

    /// Text columns in [`COLUMNS`] order, excluding `year`.
    pub fn text_values(&self) -> [Option<&str>; 16] {
        [
            self.snh.as_deref(),
            self.semester_offered.as_deref(),
            self.current_major.as_deref(),
            self.course_id.as_deref(),
            self.course_name.as_deref(),
            self.grade.as_deref(),
            self.grade_remark.as_deref(),
            self.course_type.as_deref(),
            self.course_attribute.as_deref(),
            self.hours.as_deref(),
            self.credit.as_deref(),
            self.offering_unit.as_deref(),
            self.tags.as_deref(),
            self.description.as_deref(),
            self.exam_type.as_deref(),
            self.assessment_method.as_deref(),
        ]
    }

    pub fn from_sql_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
        Ok(Record {
            snh: row.get(0)?,
            semester_offered: row.get(1)?,
            current_major: row.get(2)?,
            course_id: row.get(3)?,
            course_name: row.get(4)?,
            grade: row.get(5)?,
            grade_remark: row.get(6)?,
            course_type: row.get(7)?,
            course_attribute: row.get(8)?,
            hours: row.get(9)?,
            credit: row.get(10)?,
            offering_unit: row.get(11)?,
            tags: row.get(12)?,
            description: row.get(13)?,
            exam_type: row.get(14)?,
            assessment_method: row.get(15)?,
            year: row.get(16)?,
        })
    }
}

pub fn normalize_header(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

/// `"2022"` and `" 2022.0"` both yield 2022.
fn parse_leading_int(s: &str) -> Option<i64> {
    let t = s.trim();
    let (sign, digits) = match t.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, t),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|v| sign * v)
}

/// Comma-separated column list for SQL statements, in [`COLUMNS`] order.
pub fn column_list() -> String {
    COLUMNS
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (normalize_header(k), v.to_string()))
            .collect()
    }

    #[test]
    fn missing_and_blank_columns_become_null() {
        let r = Record::from_row(&row(&[("SNH", "abc123"), ("Grade", "  ")]));
        assert_eq!(r.snh.as_deref(), Some("abc123"));
        assert_eq!(r.grade, None);
        assert_eq!(r.course_name, None);
        assert_eq!(r.year, None);
    }

    #[test]
    fn headers_match_with_trailing_space_and_case() {
        let r = Record::from_row(&row(&[
            ("Course_Attribute ", "Required"),
            ("assessment_method ", "Exam"),
            ("GRADE", "Pass"),
        ]));
        assert_eq!(r.course_attribute.as_deref(), Some("Required"));
        assert_eq!(r.assessment_method.as_deref(), Some("Exam"));
        assert_eq!(r.grade.as_deref(), Some("Pass"));
    }

    #[test]
    fn year_takes_leading_integer() {
        assert_eq!(parse_leading_int("2022"), Some(2022));
        assert_eq!(parse_leading_int("2022.0"), Some(2022));
        assert_eq!(parse_leading_int(" 2023 "), Some(2023));
        assert_eq!(parse_leading_int("n/a"), None);
        assert_eq!(parse_leading_int(""), None);
    }

    #[test]
    fn unknown_columns_are_ignored() {
        let r = Record::from_row(&row(&[("Shoe_Size", "42"), ("Credit", "3.5")]));
        assert_eq!(r.credit.as_deref(), Some("3.5"));
        assert_eq!(
            r,
            Record {
                credit: Some("3.5".into()),
                ..Record::default()
            }
        );
    }
}
