//! CSV score sheets mapped onto a fixed set of logical columns.

use std::collections::HashMap;
use std::fmt;

use csv::{ReaderBuilder, StringRecord};
use gymdb_core::{Issue, IssueKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::SourceError;

/// Logical columns a season sheet may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Gymnast,
    Country,
    MeetName,
    MeetDay,
    Junior,
    Vt1,
    Vt2,
    Ub,
    Bb,
    Fx,
    Aa,
    VtAvg,
    #[serde(rename = "vt1_d")]
    Vt1D,
    #[serde(rename = "vt2_d")]
    Vt2D,
    UbD,
    BbD,
    FxD,
    VtTotalD,
    Location,
    StartDate,
    EndDate,
}

impl Column {
    pub fn as_str(self) -> &'static str {
        match self {
            Column::Gymnast => "gymnast",
            Column::Country => "country",
            Column::MeetName => "meet_name",
            Column::MeetDay => "meet_day",
            Column::Junior => "junior",
            Column::Vt1 => "vt1",
            Column::Vt2 => "vt2",
            Column::Ub => "ub",
            Column::Bb => "bb",
            Column::Fx => "fx",
            Column::Aa => "aa",
            Column::VtAvg => "vt_avg",
            Column::Vt1D => "vt1_d",
            Column::Vt2D => "vt2_d",
            Column::UbD => "ub_d",
            Column::BbD => "bb_d",
            Column::FxD => "fx_d",
            Column::VtTotalD => "vt_total_d",
            Column::Location => "location",
            Column::StartDate => "start_date",
            Column::EndDate => "end_date",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured column. With a `header` the column is looked up by name,
/// otherwise it is taken by its position in the column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub field: Column,
    #[serde(default)]
    pub header: Option<String>,
}

impl ColumnSpec {
    pub fn positional(field: Column) -> Self {
        Self {
            field,
            header: None,
        }
    }

    pub fn named(field: Column, header: impl Into<String>) -> Self {
        Self {
            field,
            header: Some(header.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// 1-based line in the source text.
    pub line: usize,
    cells: HashMap<Column, String>,
}

impl TableRow {
    pub fn new(line: usize, cells: HashMap<Column, String>) -> Self {
        Self { line, cells }
    }

    /// Trimmed cell text; blank cells read as absent.
    pub fn text(&self, column: Column) -> Option<&str> {
        self.cells
            .get(&column)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// Numeric cell. Blank and `-` read as absent; anything else unparseable is an error.
    pub fn number(&self, column: Column) -> Result<Option<f64>, String> {
        match self.text(column) {
            None | Some("-") => Ok(None),
            Some(raw) => raw
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("{column}: not a number: {raw:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn has(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }
}

fn resolve_positions(
    label: &str,
    headers: &StringRecord,
    specs: &[ColumnSpec],
) -> Result<Vec<(Column, usize)>, SourceError> {
    let positional = specs.iter().any(|s| s.header.is_none());
    if positional && headers.len() != specs.len() {
        return Err(SourceError::HeaderWidth {
            label: label.to_string(),
            found: headers.len(),
            expected: specs.len(),
        });
    }

    let names: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    specs
        .iter()
        .enumerate()
        .map(|(idx, spec)| match &spec.header {
            None => Ok((spec.field, idx)),
            Some(header) => {
                let wanted = header.trim().to_lowercase();
                names
                    .iter()
                    .position(|n| *n == wanted)
                    .map(|pos| (spec.field, pos))
                    .ok_or_else(|| SourceError::MissingHeader {
                        label: label.to_string(),
                        column: spec.field,
                        header: header.clone(),
                    })
            }
        })
        .collect()
}

/// Read a CSV sheet. Header problems fail the whole sheet; bad rows are skipped and reported.
pub fn read_table(
    label: &str,
    text: &str,
    specs: &[ColumnSpec],
) -> Result<(Table, Vec<Issue>), SourceError> {
    let csv_err = |cause| SourceError::Csv {
        label: label.to_string(),
        cause,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers().map_err(csv_err)?.clone();
    let positions = resolve_positions(label, &headers, specs)?;

    let mut table = Table {
        columns: positions.iter().map(|(c, _)| *c).collect(),
        rows: Vec::new(),
    };
    let mut issues = Vec::new();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map(|p| p.line() as usize);
                issues.push(Issue::new(
                    IssueKind::MalformedInput,
                    label,
                    line,
                    err.to_string(),
                ));
                continue;
            }
        };
        let line = record.position().map_or(0, |p| p.line() as usize);

        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        if record.len() != headers.len() {
            issues.push(Issue::new(
                IssueKind::MalformedInput,
                label,
                Some(line),
                format!(
                    "row has {} fields, header has {}",
                    record.len(),
                    headers.len()
                ),
            ));
            continue;
        }

        let cells = positions
            .iter()
            .map(|(column, pos)| (*column, record.get(*pos).unwrap_or_default().to_string()))
            .collect();
        table.rows.push(TableRow::new(line, cells));
    }

    debug!(
        source = label,
        rows = table.rows.len(),
        skipped = issues.len(),
        "read table"
    );
    Ok((table, issues))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals_specs() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::named(Column::Gymnast, "Gymnast"),
            ColumnSpec::named(Column::Country, "Country"),
            ColumnSpec::named(Column::MeetName, "Meet"),
            ColumnSpec::named(Column::Vt1, "VT"),
            ColumnSpec::named(Column::Ub, "UB"),
        ]
    }

    #[test]
    fn columns_resolve_by_header_in_any_order() {
        let text = "UB,Meet,Gymnast,VT,Country\n14.5,Worlds QF,Simone Biles,15.1,USA\n";
        let (table, issues) = read_table("totals", text, &totals_specs()).unwrap();
        assert!(issues.is_empty());
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.text(Column::Gymnast), Some("Simone Biles"));
        assert_eq!(row.number(Column::Ub).unwrap(), Some(14.5));
        assert_eq!(row.number(Column::Vt1).unwrap(), Some(15.1));
        assert_eq!(row.line, 2);
    }

    #[test]
    fn missing_header_fails_the_sheet() {
        let text = "Gymnast,Country,Meet,VT\nA,USA,M,14.0\n";
        let err = read_table("totals", text, &totals_specs()).unwrap_err();
        match err {
            SourceError::MissingHeader { column, header, .. } => {
                assert_eq!(column, Column::Ub);
                assert_eq!(header, "UB");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn positional_specs_require_wide_enough_header() {
        let specs = vec![
            ColumnSpec::positional(Column::Gymnast),
            ColumnSpec::positional(Column::Country),
            ColumnSpec::positional(Column::MeetName),
        ];
        let err = read_table("diff", "Name,Nation\nA,USA\n", &specs).unwrap_err();
        assert!(matches!(
            err,
            SourceError::HeaderWidth {
                found: 2,
                expected: 3,
                ..
            }
        ));

        let (table, _) = read_table("diff", "a,b,c\nA,USA,Cup\n", &specs).unwrap();
        assert_eq!(table.rows[0].text(Column::MeetName), Some("Cup"));
    }

    #[test]
    fn ragged_rows_are_reported_and_blank_rows_ignored() {
        let text = "Gymnast,Country,Meet,VT,UB\n\
                    A,USA,Cup,14.0,13.0\n\
                    ,,,,\n\
                    B,USA,Cup\n\
                    C,CAN,Cup,13.5,12.0\n";
        let (table, issues) = read_table("totals", text, &totals_specs()).unwrap();
        let names: Vec<_> = table
            .rows
            .iter()
            .filter_map(|r| r.text(Column::Gymnast))
            .collect();
        assert_eq!(names, vec!["A", "C"]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::MalformedInput);
        assert_eq!(issues[0].row, Some(4));
    }

    #[test]
    fn blank_and_dash_cells_are_absent_and_junk_is_an_error() {
        let text = "Gymnast,Country,Meet,VT,UB\nA,,Cup,-,abc\n";
        let (table, _) = read_table("totals", text, &totals_specs()).unwrap();
        let row = &table.rows[0];
        assert_eq!(row.text(Column::Country), None);
        assert_eq!(row.number(Column::Vt1).unwrap(), None);
        assert!(row.number(Column::Ub).unwrap_err().contains("ub"));
        assert!(table.has(Column::Ub));
        assert!(!table.has(Column::Fx));
    }

    #[test]
    fn column_names_round_trip_through_yaml() {
        let spec: ColumnSpec = serde_yaml::from_str("field: vt1_d\nheader: VT D\n").unwrap();
        assert_eq!(spec.field, Column::Vt1D);
        assert_eq!(spec.field.to_string(), "vt1_d");
        let spec: ColumnSpec = serde_yaml::from_str("field: vt_total_d\n").unwrap();
        assert_eq!(spec.field, Column::VtTotalD);
    }
}
