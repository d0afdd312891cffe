//! Meet calendar extraction from the season's HTML calendar page.
//!
//! The page holds one table whose rows carry a date range, a meet name and a
//! location. The page omits the year, so it is supplied by the caller.

use chrono::NaiveDate;
use gymdb_core::{CalendarEntry, Issue, IssueKind};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::SourceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationLayout {
    /// Location has a cell of its own.
    Cell { index: usize },
    /// Location follows a separator inside a cell shared with another field.
    Split { cell: usize, separator: String },
}

impl Default for LocationLayout {
    fn default() -> Self {
        LocationLayout::Split {
            cell: 1,
            separator: ",".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarLayout {
    #[serde(default)]
    pub date_cell: usize,
    #[serde(default = "default_name_cell")]
    pub name_cell: usize,
    #[serde(default)]
    pub location: LocationLayout,
    /// Rows whose meet name contains any of these (case-insensitive) are dropped.
    #[serde(default)]
    pub exclude_names: Vec<String>,
}

fn default_name_cell() -> usize {
    1
}

impl Default for CalendarLayout {
    fn default() -> Self {
        Self {
            date_cell: 0,
            name_cell: default_name_cell(),
            location: LocationLayout::default(),
            exclude_names: Vec::new(),
        }
    }
}

impl CalendarLayout {
    fn min_cells(&self) -> usize {
        let location_cell = match &self.location {
            LocationLayout::Cell { index } => *index,
            LocationLayout::Split { cell, .. } => *cell,
        };
        self.date_cell.max(self.name_cell).max(location_cell) + 1
    }

    fn split_separator(&self, cell: usize) -> Option<&str> {
        match &self.location {
            LocationLayout::Split { cell: c, separator } if *c == cell => Some(separator.as_str()),
            _ => None,
        }
    }
}

/// Start and end labels of a date cell (without the year) plus their parsed dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub start_label: String,
    pub end_label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Parse a calendar date cell such as `March 1-3`, `Feb 28-Mar 2` or `May 5`.
pub fn parse_date_range(cell: &str, year: i32) -> Result<DateRange, String> {
    let cleaned = cell.replace(['–', '—'], "-");
    let parts: Vec<&str> = cleaned.split('-').map(str::trim).collect();

    let (start_label, end_label) = match parts.as_slice() {
        [single] => (single.to_string(), single.to_string()),
        [start, end] if !end.chars().any(char::is_alphabetic) => {
            let month: String = start.chars().filter(char::is_ascii_alphabetic).collect();
            (start.to_string(), format!("{month} {end}"))
        }
        [start, end] => (start.to_string(), end.to_string()),
        _ => return Err(format!("unrecognised date range {cell:?}")),
    };

    let start = parse_month_day(&start_label, year)?;
    let mut end = parse_month_day(&end_label, year)?;
    if end < start {
        // Ranges that wrap the new year.
        end = parse_month_day(&end_label, year + 1)?;
    }

    Ok(DateRange {
        start_label,
        end_label,
        start,
        end,
    })
}

fn parse_month_day(label: &str, year: i32) -> Result<NaiveDate, String> {
    let mut tokens = label.split_whitespace();
    let (Some(month_token), Some(day_token), None) = (tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(format!("expected '<month> <day>', got {label:?}"));
    };
    let month = month_number(month_token).ok_or_else(|| format!("unknown month in {label:?}"))?;
    let digits: String = day_token.chars().take_while(char::is_ascii_digit).collect();
    let day: u32 = digits
        .parse()
        .map_err(|_| format!("unknown day in {label:?}"))?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| format!("no such date {label:?} {year}"))
}

/// Parse a sheet date cell such as `Mar 4 2019`, `March 4, 2019` or `Sept 30 2019`.
pub fn parse_sheet_date(cell: &str) -> Result<NaiveDate, String> {
    let tokens: Vec<&str> = cell
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    let [month_day @ .., year] = tokens.as_slice() else {
        return Err(format!("empty date {cell:?}"));
    };
    let year: i32 = year
        .parse()
        .map_err(|_| format!("unknown year in {cell:?}"))?;
    parse_month_day(&month_day.join(" "), year)
}

/// Month number from a full or abbreviated English month name (`Sept`, `June`, `Jul`).
pub(crate) fn month_number(token: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = token.trim_end_matches('.').to_ascii_lowercase();
    if lower.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| lower.starts_with(m))
        .map(|idx| idx as u32 + 1)
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn split_once_trimmed<'a>(text: &'a str, separator: &str) -> (&'a str, Option<&'a str>) {
    match text.split_once(separator) {
        Some((head, tail)) => (head.trim(), Some(tail.trim())),
        None => (text.trim(), None),
    }
}

/// Extract meets from the calendar page. Rows that cannot be read are skipped and reported.
pub fn extract_calendar(
    label: &str,
    html: &str,
    year: i32,
    layout: &CalendarLayout,
) -> Result<(Vec<CalendarEntry>, Vec<Issue>), SourceError> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;
    let link_sel = selector("a")?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| SourceError::NoTable {
            label: label.to_string(),
        })?;

    let excluded: Vec<String> = layout
        .exclude_names
        .iter()
        .map(|s| s.to_lowercase())
        .collect();

    let mut entries = Vec::new();
    let mut issues = Vec::new();

    for (idx, row) in table.select(&row_sel).enumerate() {
        let row_no = idx + 1;
        let cells: Vec<ElementRef<'_>> = row.select(&cell_sel).collect();
        if cells.is_empty() {
            // Heading row.
            continue;
        }
        if cells.len() < layout.min_cells() {
            issues.push(Issue::new(
                IssueKind::MalformedInput,
                label,
                Some(row_no),
                format!("expected {} cells, found {}", layout.min_cells(), cells.len()),
            ));
            continue;
        }

        let name_cell = &cells[layout.name_cell];
        let name_text = cell_text(name_cell);
        let linked_name = name_cell
            .select(&link_sel)
            .next()
            .map(|a| cell_text(&a))
            .filter(|s| !s.is_empty());
        let meet_name = match (linked_name, layout.split_separator(layout.name_cell)) {
            (Some(name), _) => name,
            (None, Some(sep)) => split_once_trimmed(&name_text, sep).0.to_string(),
            (None, None) => name_text.clone(),
        };
        if meet_name.is_empty() {
            issues.push(Issue::new(
                IssueKind::MalformedInput,
                label,
                Some(row_no),
                "empty meet name",
            ));
            continue;
        }

        let lowered = meet_name.to_lowercase();
        if excluded.iter().any(|pattern| lowered.contains(pattern)) {
            debug!(meet = %meet_name, "skipping excluded calendar row");
            continue;
        }

        let date_text = cell_text(&cells[layout.date_cell]);
        let date_text = match layout.split_separator(layout.date_cell) {
            Some(sep) => split_once_trimmed(&date_text, sep).0.to_string(),
            None => date_text,
        };

        let location = match &layout.location {
            LocationLayout::Cell { index } => cell_text(&cells[*index]),
            LocationLayout::Split { cell, separator } => {
                let text = cell_text(&cells[*cell]);
                split_once_trimmed(&text, separator)
                    .1
                    .unwrap_or_default()
                    .to_string()
            }
        };

        match parse_date_range(&date_text, year) {
            Ok(range) => entries.push(CalendarEntry {
                meet_name,
                start_label: range.start_label,
                end_label: range.end_label,
                start_date: range.start,
                end_date: range.end,
                location,
            }),
            Err(detail) => {
                warn!(source = label, row = row_no, meet = %meet_name, %detail, "skipping calendar row");
                issues.push(Issue::new(
                    IssueKind::MalformedInput,
                    label,
                    Some(row_no),
                    format!("{meet_name}: {detail}"),
                ));
            }
        }
    }

    Ok((entries, issues))
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Selector(format!("{css}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn same_month_range_borrows_month() {
        let range = parse_date_range("March 1-3", 2017).unwrap();
        assert_eq!(range.start_label, "March 1");
        assert_eq!(range.end_label, "March 3");
        assert_eq!(range.start, date(2017, 3, 1));
        assert_eq!(range.end, date(2017, 3, 3));
    }

    #[test]
    fn cross_month_range_keeps_both_months() {
        let range = parse_date_range("Feb 28-Mar 2", 2017).unwrap();
        assert_eq!(range.start_label, "Feb 28");
        assert_eq!(range.end_label, "Mar 2");
        assert_eq!(range.end, date(2017, 3, 2));
    }

    #[test]
    fn single_day_uses_same_start_and_end() {
        let range = parse_date_range("May 5", 2017).unwrap();
        assert_eq!(range.start_label, "May 5");
        assert_eq!(range.end_label, "May 5");
        assert_eq!(range.start, range.end);
    }

    #[test]
    fn full_month_names_and_en_dash_are_accepted() {
        let range = parse_date_range("June 29 – July 2", 2017).unwrap();
        assert_eq!(range.start, date(2017, 6, 29));
        assert_eq!(range.end, date(2017, 7, 2));
        let range = parse_date_range("Sept 30-Oct 1", 2017).unwrap();
        assert_eq!(range.start, date(2017, 9, 30));
    }

    #[test]
    fn malformed_cells_are_rejected_not_fabricated() {
        assert!(parse_date_range("", 2017).is_err());
        assert!(parse_date_range("TBD", 2017).is_err());
        assert!(parse_date_range("Feb 30", 2017).is_err());
        assert!(parse_date_range("May 1-2-3", 2017).is_err());
    }

    #[test]
    fn sheet_dates_carry_their_own_year() {
        assert_eq!(parse_sheet_date("Mar 4 2019").unwrap(), date(2019, 3, 4));
        assert_eq!(parse_sheet_date("March 4, 2019").unwrap(), date(2019, 3, 4));
        assert_eq!(parse_sheet_date("Sept 30 2019").unwrap(), date(2019, 9, 30));
        assert!(parse_sheet_date("2019").is_err());
        assert!(parse_sheet_date("").is_err());
        assert!(parse_sheet_date("Mar 4").is_err());
    }

    #[test]
    fn year_wrapping_range_ends_next_year() {
        let range = parse_date_range("Dec 30-Jan 2", 2017).unwrap();
        assert_eq!(range.end, date(2018, 1, 2));
    }

    const PAGE: &str = r#"
        <html><body>
        <table>
          <tr><th>Date</th><th>Meet</th></tr>
          <tr><td>March 1-3</td><td><a href="/a">American Cup</a>, Newark, USA</td></tr>
          <tr><td>Feb 28-Mar 2</td><td><a href="/b">Melbourne World Cup</a>, Melbourne, Australia</td></tr>
          <tr><td>TBD</td><td><a href="/c">Mystery Invitational</a>, Nowhere</td></tr>
          <tr><td>May 5</td><td><a href="/d">Men's Cup</a>, Bern, Switzerland</td></tr>
          <tr><td>May 6</td><td><a href="/e">Flanders International Team</a></td></tr>
          <tr><td>May 9</td></tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn extracts_rows_and_reports_bad_ones() {
        let layout = CalendarLayout {
            exclude_names: vec!["men's".into()],
            ..CalendarLayout::default()
        };
        let (entries, issues) = extract_calendar("2017-calendar", PAGE, 2017, &layout).unwrap();

        let names: Vec<_> = entries.iter().map(|e| e.meet_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["American Cup", "Melbourne World Cup", "Flanders International Team"]
        );
        assert_eq!(entries[0].location, "Newark, USA");
        assert_eq!(entries[0].end_date, date(2017, 3, 3));
        assert_eq!(entries[2].location, "");

        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.kind == IssueKind::MalformedInput));
        assert!(issues[0].detail.contains("Mystery Invitational"));
    }

    #[test]
    fn separate_location_cell_layout() {
        let page = r#"<table>
            <tr><td>Apr 1-2</td><td>City of Jesolo Trophy</td><td>Jesolo, Italy</td></tr>
        </table>"#;
        let layout = CalendarLayout {
            location: LocationLayout::Cell { index: 2 },
            ..CalendarLayout::default()
        };
        let (entries, issues) = extract_calendar("cal", page, 2018, &layout).unwrap();
        assert!(issues.is_empty());
        assert_eq!(entries[0].meet_name, "City of Jesolo Trophy");
        assert_eq!(entries[0].location, "Jesolo, Italy");
        assert_eq!(entries[0].start_date, date(2018, 4, 1));
    }

    #[test]
    fn page_without_table_is_an_error() {
        let err = extract_calendar("cal", "<p>nothing</p>", 2017, &CalendarLayout::default())
            .unwrap_err();
        assert!(matches!(err, SourceError::NoTable { .. }));
    }
}
