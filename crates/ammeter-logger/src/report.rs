//! CSV export of a sampling session.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local, Utc};

use crate::state::{Reading, SamplingWindow};

/// Format of the `received_datetime` column.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Write readings as CSV.
///
/// One `read_<n>` column is emitted per entry of the longest `last_reads`
/// list; shorter rows leave the extra cells empty. `time_from_start` is the
/// local time since the window's start, or the device ticks in seconds when
/// no start is known.
pub fn write_csv<W: Write>(mut writer: W, readings: &[Reading], window: &SamplingWindow) -> io::Result<()> {
    let read_columns = readings.iter().map(|r| r.last_reads.len()).max().unwrap_or(0);

    let mut header: Vec<String> = ["received_epoch", "name", "received_datetime", "ticks", "latest"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend((1..=read_columns).map(|n| format!("read_{}", n)));
    header.push("time_from_start".to_string());
    header.push("average".to_string());
    write_row(&mut writer, &header)?;

    for reading in readings {
        let mut row = Vec::with_capacity(header.len());
        row.push(reading.received_epoch.to_string());
        row.push(reading.name.clone());
        row.push(format_datetime(reading.received_epoch));
        row.push(reading.ticks.to_string());
        row.push(reading.current_amps.to_string());
        for n in 0..read_columns {
            row.push(reading.last_reads.get(n).map(f64::to_string).unwrap_or_default());
        }
        row.push(time_from_start(reading, window).to_string());
        row.push(reading.average.to_string());
        write_row(&mut writer, &row)?;
    }

    writer.flush()
}

/// Write readings to a CSV file, replacing any existing file.
pub fn write_csv_file(path: impl AsRef<Path>, readings: &[Reading], window: &SamplingWindow) -> io::Result<()> {
    let file = File::create(path.as_ref())?;
    write_csv(BufWriter::new(file), readings, window)?;
    tracing::info!(path = %path.as_ref().display(), rows = readings.len(), "wrote report");
    Ok(())
}

fn time_from_start(reading: &Reading, window: &SamplingWindow) -> f64 {
    match window.start {
        Some(start) => reading.received_epoch - start.local,
        None => reading.ticks as f64 / 1000.0,
    }
}

fn format_datetime(epoch: f64) -> String {
    let micros = (epoch * 1_000_000.0).round() as i64;
    match DateTime::<Utc>::from_timestamp_micros(micros) {
        Some(utc) => utc.with_timezone(&Local).format(DATETIME_FORMAT).to_string(),
        None => String::new(),
    }
}

fn write_row<W: Write>(writer: &mut W, fields: &[String]) -> io::Result<()> {
    let line: Vec<Cow<'_, str>> = fields.iter().map(|f| escape(f)).collect();
    writeln!(writer, "{}", line.join(","))
}

fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::WindowMark;

    fn reading(epoch: f64, ticks: i64, reads: Vec<f64>) -> Reading {
        Reading {
            received_epoch: epoch,
            name: "ch1".to_string(),
            ticks,
            current_amps: 0.5,
            last_reads: reads,
            average: 0.25,
        }
    }

    fn render(readings: &[Reading], window: &SamplingWindow) -> Vec<String> {
        let mut out = Vec::new();
        write_csv(&mut out, readings, window).unwrap();
        String::from_utf8(out).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_header_has_one_column_per_read() {
        let lines = render(&[reading(10.0, 1000, vec![0.1, 0.2, 0.3])], &SamplingWindow::default());
        assert_eq!(
            lines[0],
            "received_epoch,name,received_datetime,ticks,latest,read_1,read_2,read_3,time_from_start,average"
        );
    }

    #[test]
    fn test_time_from_start_uses_window_start() {
        let window = SamplingWindow {
            start: Some(WindowMark { reported: 100, local: 8.0 }),
            stop: None,
        };
        let lines = render(&[reading(10.5, 1000, vec![0.1])], &window);
        let fields: Vec<&str> = lines[1].split(',').collect();

        assert_eq!(fields[0], "10.5");
        assert_eq!(fields[1], "ch1");
        assert_eq!(fields[3], "1000");
        assert_eq!(fields[5], "0.1");
        assert_eq!(fields[6], "2.5");
        assert_eq!(fields[7], "0.25");
    }

    #[test]
    fn test_time_from_start_falls_back_to_ticks() {
        let lines = render(&[reading(10.0, 1500, vec![])], &SamplingWindow::default());
        let fields: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(fields[5], "1.5");
    }

    #[test]
    fn test_short_read_lists_are_padded() {
        let lines = render(
            &[reading(1.0, 1, vec![0.1, 0.2]), reading(2.0, 2, vec![0.3])],
            &SamplingWindow::default(),
        );
        assert_eq!(lines[2].split(',').nth(6), Some(""));
    }

    #[test]
    fn test_empty_session_writes_header_only() {
        let lines = render(&[], &SamplingWindow::default());
        assert_eq!(lines, vec!["received_epoch,name,received_datetime,ticks,latest,time_from_start,average"]);
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("ch1"), "ch1");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
