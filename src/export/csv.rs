use super::{ExportError, LapRow};
use crate::models::{Lap, Sample};
use std::path::Path;

/// Export the lap table to CSV format (suitable for spreadsheet plotting)
pub fn export_laps<P: AsRef<Path>>(laps: &[Lap], output_path: P) -> Result<(), ExportError> {
    let mut writer = ::csv::Writer::from_path(output_path)?;

    for (index, lap) in laps.iter().enumerate() {
        writer.serialize(LapRow::from_lap(index, lap))?;
    }

    writer.flush()?;
    Ok(())
}

/// Export raw samples of one channel as `timestamp,value,source`
pub fn export_samples<P: AsRef<Path>>(samples: &[Sample], output_path: P) -> Result<(), ExportError> {
    let mut writer = ::csv::Writer::from_path(output_path)?;

    for sample in samples {
        writer.serialize(sample)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LapField, MetricSource, Phase, SampleSource};
    use tempfile::NamedTempFile;

    #[test]
    fn test_export_laps() {
        let mut work = Lap::open(Phase::Work, 1, 0);
        work.end_ts = Some(30_000);
        work.max_window_avg_bpm = Some(165.0);
        work.set_metric(LapField::Speed, Some(6.5), MetricSource::Manual);

        let mut rest = Lap::open(Phase::Rest, 1, 30_000);
        rest.end_ts = Some(45_000);
        rest.set_metric(LapField::Speed, Some(0.0), MetricSource::Forced);

        let temp_file = NamedTempFile::new().unwrap();
        export_laps(&[work, rest], temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("index,lap,start_ts,end_ts,duration_sec,max_30s_bpm"));
        assert!(lines[1].contains("Work #1"));
        assert!(lines[1].contains("manual"));
        assert!(lines[2].contains("forced"));
    }

    #[test]
    fn test_export_samples() {
        let samples = vec![
            Sample::new(0, 120.0, SampleSource::Device),
            Sample::new(500, 121.0, SampleSource::Simulated),
        ];

        let temp_file = NamedTempFile::new().unwrap();
        export_samples(&samples, temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.starts_with("timestamp,value,source"));
        assert!(content.contains("500,121.0,simulated"));
    }
}
