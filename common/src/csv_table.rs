//! 結果テーブルのCSV入出力
//!
//! ヘッダは AnnotationRow の列 + filename / is_prediction / 損失列。
//! 読み込みはヘッダ名で列を引くため、列順が違うファイルや余分な列（pandasの
//! インデックス列など）があっても読める。

use crate::error::{Error, Result};
use crate::float_repr::{format_f64, parse_f64};
use crate::results::{Losses, ResultRow};
use crate::types::AnnotationRow;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashMap;

pub const RESULT_COLUMNS: &[&str] = &[
    "id",
    "filepath",
    "filename",
    "width",
    "height",
    "label",
    "label_num",
    "score",
    "bbox_xmin",
    "bbox_ymin",
    "bbox_xmax",
    "bbox_ymax",
    "bbox_width",
    "bbox_height",
    "area",
    "area_normalized",
    "area_square_root",
    "area_square_root_normalized",
    "bbox_ratio",
    "record_index",
    "num_annotations",
    "creation_date",
    "modification_date",
    "is_prediction",
    "loss_classifier",
    "loss_box_reg",
    "loss_objectness",
    "loss_rpn_box_reg",
    "loss_total",
];

pub fn write_results_csv(rows: &[ResultRow]) -> String {
    let mut out = String::new();
    out.push_str(&RESULT_COLUMNS.join(","));
    out.push('\n');

    for r in rows {
        let row = &r.row;
        let fields = [
            escape_field(&row.id),
            escape_field(&row.filepath),
            escape_field(&r.filename),
            row.width.to_string(),
            row.height.to_string(),
            escape_field(&row.label),
            row.label_num.to_string(),
            row.score.map(format_f64).unwrap_or_default(),
            format_f64(row.bbox_xmin),
            format_f64(row.bbox_ymin),
            format_f64(row.bbox_xmax),
            format_f64(row.bbox_ymax),
            format_f64(row.bbox_width),
            format_f64(row.bbox_height),
            format_f64(row.area),
            format_f64(row.area_normalized),
            format_f64(row.area_square_root),
            format_f64(row.area_square_root_normalized),
            format_f64(row.bbox_ratio),
            row.record_index.to_string(),
            row.num_annotations.to_string(),
            row.creation_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
            row.modification_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
            r.is_prediction.to_string(),
            format_f64(r.losses.loss_classifier),
            format_f64(r.losses.loss_box_reg),
            format_f64(r.losses.loss_objectness),
            format_f64(r.losses.loss_rpn_box_reg),
            format_f64(r.losses.loss_total),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }

    out
}

pub fn read_results_csv(content: &str) -> Result<Vec<ResultRow>> {
    let mut lines = split_records(content)
        .into_iter()
        .filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| Error::Deserialization("empty results table".into()))?;

    let columns: HashMap<String, usize> = parse_csv_line(&header)
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name, i))
        .collect();
    for required in RESULT_COLUMNS {
        if !columns.contains_key(*required) {
            return Err(Error::Deserialization(format!("missing column: {}", required)));
        }
    }

    lines
        .enumerate()
        .map(|(n, line)| {
            let fields = parse_csv_line(&line);
            let record = CsvRecord {
                line: n + 2,
                fields: &fields,
                columns: &columns,
            };
            record.to_result_row()
        })
        .collect()
}

struct CsvRecord<'a> {
    line: usize,
    fields: &'a [String],
    columns: &'a HashMap<String, usize>,
}

impl CsvRecord<'_> {
    fn raw(&self, column: &str) -> Result<&str> {
        self.columns
            .get(column)
            .and_then(|&i| self.fields.get(i))
            .map(|s| s.as_str())
            .ok_or_else(|| self.invalid(column, "missing field"))
    }

    fn string(&self, column: &str) -> Result<String> {
        self.raw(column).map(String::from)
    }

    fn float(&self, column: &str) -> Result<f64> {
        let raw = self.raw(column)?;
        parse_f64(raw).ok_or_else(|| self.invalid(column, raw))
    }

    fn optional_float(&self, column: &str) -> Result<Option<f64>> {
        let raw = self.raw(column)?;
        if raw.trim().is_empty() {
            Ok(None)
        } else {
            self.float(column).map(Some)
        }
    }

    fn integer<T: std::str::FromStr>(&self, column: &str) -> Result<T> {
        let raw = self.raw(column)?.trim();
        // pandas は整数列を "3.0" と書くことがある
        let raw = raw.strip_suffix(".0").unwrap_or(raw);
        raw.parse().map_err(|_| self.invalid(column, raw))
    }

    fn boolean(&self, column: &str) -> Result<bool> {
        let raw = self.raw(column)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(self.invalid(column, raw)),
        }
    }

    fn date(&self, column: &str) -> Result<Option<DateTime<Utc>>> {
        let raw = self.raw(column)?.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        if let Ok(d) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Some(d.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .map(|d| Some(d.and_utc()))
            .map_err(|_| self.invalid(column, raw))
    }

    fn invalid(&self, column: &str, value: &str) -> Error {
        Error::Deserialization(format!(
            "line {}: column {}: invalid value {:?}",
            self.line, column, value
        ))
    }

    fn to_result_row(&self) -> Result<ResultRow> {
        let row = AnnotationRow {
            id: self.string("id")?,
            filepath: self.string("filepath")?,
            width: self.integer("width")?,
            height: self.integer("height")?,
            label: self.string("label")?,
            label_num: self.integer("label_num")?,
            score: self.optional_float("score")?,
            bbox_xmin: self.float("bbox_xmin")?,
            bbox_ymin: self.float("bbox_ymin")?,
            bbox_xmax: self.float("bbox_xmax")?,
            bbox_ymax: self.float("bbox_ymax")?,
            bbox_width: self.float("bbox_width")?,
            bbox_height: self.float("bbox_height")?,
            area: self.float("area")?,
            area_normalized: self.float("area_normalized")?,
            area_square_root: self.float("area_square_root")?,
            area_square_root_normalized: self.float("area_square_root_normalized")?,
            bbox_ratio: self.float("bbox_ratio")?,
            record_index: self.integer("record_index")?,
            num_annotations: self.integer("num_annotations")?,
            creation_date: self.date("creation_date")?,
            modification_date: self.date("modification_date")?,
        };

        Ok(ResultRow {
            row,
            filename: self.string("filename")?,
            is_prediction: self.boolean("is_prediction")?,
            losses: Losses {
                loss_classifier: self.float("loss_classifier")?,
                loss_box_reg: self.float("loss_box_reg")?,
                loss_objectness: self.float("loss_objectness")?,
                loss_rpn_box_reg: self.float("loss_rpn_box_reg")?,
                loss_total: self.float("loss_total")?,
            },
        })
    }
}

fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// レコード単位に分割（クォート内の改行はフィールドの一部として残す）
fn split_records(content: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut record = String::new();
    let mut in_quotes = false;

    for c in content.chars() {
        match c {
            '"' => {
                // `""` は閉じて開き直すのと同じなので反転だけでよい
                in_quotes = !in_quotes;
                record.push(c);
            }
            '\n' if !in_quotes => {
                if record.ends_with('\r') {
                    record.pop();
                }
                records.push(std::mem::take(&mut record));
            }
            _ => record.push(c),
        }
    }
    if !record.is_empty() {
        records.push(record);
    }

    records
}

/// 1行をフィールドに分割（ダブルクォート内のカンマ、`""` エスケープに対応）
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn result_row(id: &str, prediction: bool) -> ResultRow {
        ResultRow {
            row: AnnotationRow {
                id: id.to_string(),
                filepath: format!("/img/{}, copy.jpg", id),
                width: 300,
                height: 600,
                label: "say \"cheese\"".to_string(),
                label_num: 1,
                score: prediction.then_some(0.75),
                bbox_xmin: 0.0,
                bbox_ymin: 60.0,
                bbox_xmax: 300.0,
                bbox_ymax: 60.0,
                bbox_width: 300.0,
                bbox_height: 0.0,
                area: 0.0,
                area_normalized: 0.0,
                area_square_root: 0.0,
                area_square_root_normalized: 0.0,
                bbox_ratio: f64::INFINITY,
                record_index: 0,
                num_annotations: 1,
                creation_date: Utc.timestamp_opt(1_700_000_000, 0).single(),
                modification_date: None,
            },
            filename: format!("{}, copy.jpg", id),
            is_prediction: prediction,
            losses: Losses {
                loss_total: 2.5,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_write_then_read() {
        let rows = vec![result_row("a", true), result_row("a", false)];
        let csv = write_results_csv(&rows);
        let restored = read_results_csv(&csv).unwrap();
        assert_eq!(restored, rows);
    }

    #[test]
    fn test_header_line() {
        let csv = write_results_csv(&[]);
        assert_eq!(csv.lines().next().unwrap(), RESULT_COLUMNS.join(","));
    }

    #[test]
    fn test_missing_column_rejected() {
        let result = read_results_csv("id,filepath\na,b\n");
        assert!(matches!(result, Err(Error::Deserialization(_))));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(read_results_csv(""), Err(Error::Deserialization(_))));
    }

    #[test]
    fn test_invalid_value_reports_line() {
        let mut csv = write_results_csv(&[result_row("a", true)]);
        csv = csv.replace(",true,", ",maybe,");
        let err = read_results_csv(&csv).unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(err.to_string().contains("is_prediction"));
    }

    #[test]
    fn test_pandas_style_values() {
        let header = format!("{},{}", "", RESULT_COLUMNS.join(","));
        let line = ",0,/img/x.jpg,x.jpg,10.0,20,car,0,,1,2,3,4,2,2,4,0.02,2,0.141,1.0,0.0,1,\
                    2023-11-14 22:13:20,,True,0,0,0,0,0.5";
        let rows = read_results_csv(&format!("{}\n{}\n", header, line)).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row.width, 10);
        assert_eq!(rows[0].row.score, None);
        assert!(rows[0].is_prediction);
        assert!(rows[0].row.creation_date.is_some());
    }

    #[test]
    fn test_newline_inside_quoted_field() {
        let mut row = result_row("a", true);
        row.row.filepath = "/img/two\nlines.jpg".to_string();
        row.row.label = "multi\r\nline".to_string();

        let csv = write_results_csv(&[row.clone(), result_row("b", false)]);
        let restored = read_results_csv(&csv).unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0], row);
        assert_eq!(restored[1].row.id, "b");
    }

    #[test]
    fn test_crlf_line_endings() {
        let rows = vec![result_row("a", true), result_row("b", false)];
        let csv = write_results_csv(&rows).replace('\n', "\r\n");
        assert_eq!(read_results_csv(&csv).unwrap(), rows);
    }

    #[test]
    fn test_parse_csv_line_quotes() {
        assert_eq!(
            parse_csv_line(r#"a,"b,c","d ""e""",,f"#),
            vec!["a", "b,c", "d \"e\"", "", "f"]
        );
    }
}
