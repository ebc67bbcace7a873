use super::{ExportError, SessionSnapshot};
use crate::zones::ZoneDistribution;
use std::io::Write;
use std::path::Path;

/// Export a session report to human-readable text format
pub fn export_session_report<P: AsRef<Path>>(snapshot: &SessionSnapshot, output_path: P) -> Result<(), ExportError> {
    let mut file = std::fs::File::create(output_path)?;
    write_session_report(snapshot, &mut file)?;
    Ok(())
}

/// Render the report into any writer
pub fn write_session_report<W: Write>(snapshot: &SessionSnapshot, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "=")?;
    writeln!(out, "INTERVAL SESSION REPORT")?;
    writeln!(out, "=")?;
    writeln!(out)?;

    writeln!(out, "Session: {}", snapshot.session_id)?;
    writeln!(out, "Exported: {}", snapshot.exported_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(out, "State: {}", snapshot.state)?;
    if let Some(config) = &snapshot.config {
        writeln!(
            out,
            "Plan: warmup {}s, {} x ({}s work / {}s rest), cooldown {}s",
            config.warmup_sec, config.reps, config.work_sec, config.rest_sec, config.cooldown_sec
        )?;
    }
    writeln!(out, "Elapsed: {}s", snapshot.elapsed_sec)?;
    writeln!(out)?;

    writeln!(out, "LAPS")?;
    writeln!(out, "-")?;
    for row in snapshot.lap_rows() {
        writeln!(
            out,
            "{:>2}  {:<12} {:>6}  max30s {:>6}  speed {:>5} ({})  incline {:>4} ({})",
            row.index + 1,
            row.lap,
            row.duration_sec.map_or("open".to_string(), |d| format!("{:.0}s", d)),
            row.max_30s_bpm.map_or("--".to_string(), |v| format!("{:.1}", v)),
            row.speed.map_or("--".to_string(), |v| format!("{:.1}", v)),
            row.speed_source,
            row.incline.map_or("--".to_string(), |v| format!("{:.1}", v)),
            row.incline_source,
        )?;
    }
    writeln!(out)?;

    let distribution = snapshot.zone_distribution();
    writeln!(out, "TIME IN ZONE")?;
    writeln!(out, "-")?;
    let bounds = snapshot.thresholds.bounds();
    for (zone, secs) in distribution.seconds.iter().enumerate() {
        let range = match zone {
            0 => format!("< {:.0}", bounds[0]),
            5 => format!(">= {:.0}", bounds[4]),
            z => format!("{:.0}-{:.0}", bounds[z - 1], bounds[z]),
        };
        writeln!(
            out,
            "{}  {:<9} {:>7.1}s  {:>6}%",
            ZoneDistribution::zone_label(zone),
            range,
            secs,
            distribution.percent[zone]
        )?;
    }
    if let Some(zone) = distribution.dominant_zone() {
        writeln!(out, "Dominant zone: {}", ZoneDistribution::zone_label(zone))?;
    }

    Ok(())
}
