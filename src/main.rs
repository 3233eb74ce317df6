mod cli;

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDateTime};
use clap::Parser;
use rollcall_core::{Config, Roster, Timetable};
use rollcall_gateway::IngestServer;
use rollcall_history::{HistoryFilter, HistoryRecord, Ledger, ReportWriter};
use rollcall_period::{classify, PeriodMonitor, SnapshotGenerator};
use rollcall_presence::PresenceStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::{Cli, Commands};

const DEFAULT_FILTER: &str = "rollcall=info,rollcall_gateway=info,rollcall_period=info,warn";
const VERBOSE_FILTER: &str = "rollcall=debug,rollcall_core=debug,rollcall_presence=debug,\
rollcall_history=debug,rollcall_gateway=debug,rollcall_period=debug,warn";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    let config_path = cli.config.as_deref();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config_path).await,
        Commands::ConfigSample { output } => config_sample(output),
        Commands::Status => status(config_path),
        Commands::History {
            date,
            label,
            limit,
            json,
        } => history(config_path, HistoryFilter { date, label, limit }, json),
    }
}

async fn serve(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let roster = Arc::new(
        Roster::load(&config.roster_path)
            .with_context(|| format!("Failed to load roster {}", config.roster_path.display()))?,
    );
    let timetable = Arc::new(Timetable::load(&config.timetable_path).with_context(|| {
        format!(
            "Failed to load timetable {}",
            config.timetable_path.display()
        )
    })?);
    let cutoff = config.period.cutoff()?;
    info!(
        "Loaded {} roster entries, {} timetable intervals, {} safe zones",
        roster.len(),
        timetable.len(),
        config.safe_zones.len()
    );

    let ledger = Ledger::open(&config.storage.db_path).with_context(|| {
        format!(
            "Failed to open database {}",
            config.storage.db_path.display()
        )
    })?;
    let generator = Arc::new(SnapshotGenerator::new(
        roster.clone(),
        config.safe_zones.clone(),
        ledger.clone(),
        ReportWriter::new(config.storage.report_dir.clone()),
    ));
    let store = PresenceStore::new(roster);
    let mut monitor = PeriodMonitor::new(timetable, cutoff, store.clone(), generator, ledger)
        .with_poll_interval(config.period.poll_interval());

    let server = IngestServer::bind(&config.listener.addr(), store).await?;
    let shutdown = CancellationToken::new();
    let listener = tokio::spawn(server.serve(shutdown.clone()));

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                signal.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    monitor.run(shutdown.clone()).await;
    if monitor.is_halted() && !shutdown.is_cancelled() {
        info!("Day closed; listener stays up until shutdown");
        shutdown.cancelled().await;
    }

    listener.await.context("Listener task failed")??;
    monitor.finish().await;

    if monitor.lost_snapshots() > 0 {
        tracing::warn!(
            "{} snapshots were not fully persisted this run",
            monitor.lost_snapshots()
        );
    }
    info!("Rollcall stopped");
    Ok(())
}

fn config_sample(output: Option<PathBuf>) -> Result<()> {
    let path = output.unwrap_or_else(|| PathBuf::from("./rollcall.sample.yaml"));
    Config::sample().save(&path)?;
    println!("Sample configuration written to {}", path.display());
    Ok(())
}

fn status(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let timetable = Timetable::load(&config.timetable_path)?;
    let now = Local::now().naive_local();
    print!("{}", render_status(now, &timetable, config.period.cutoff()?));
    Ok(())
}

fn render_status(now: NaiveDateTime, timetable: &Timetable, cutoff: chrono::NaiveTime) -> String {
    let period = classify(now, timetable, cutoff);
    let mut out = format!("{}  {}\n", now.format("%a %Y-%m-%d %H:%M"), period);

    let today = timetable.intervals_for(now.weekday());
    if today.is_empty() {
        out.push_str("No intervals scheduled today\n");
    }
    for interval in today {
        out.push_str(&format!(
            "  {:02}:{:02}-{:02}:{:02}  {}{}\n",
            interval.start_minute / 60,
            interval.start_minute % 60,
            interval.end_minute / 60,
            interval.end_minute % 60,
            interval.label,
            if interval.is_break { " (break)" } else { "" }
        ));
    }
    out
}

fn history(config_path: Option<&Path>, filter: HistoryFilter, json: bool) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let ledger = Ledger::open(&config.storage.db_path)?;
    let records = ledger.query_history(&filter)?;
    println!("{}", render_history(&records, json)?);
    Ok(())
}

fn render_history(records: &[HistoryRecord], json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(records)?);
    }
    if records.is_empty() {
        return Ok("No history records".to_string());
    }
    Ok(records
        .iter()
        .map(|record| record.to_string())
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Weekday};
    use rollcall_core::Interval;
    use rollcall_history::{AttendanceRow, AttendanceStatus};
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &Path) -> PathBuf {
        fs::write(dir.join("roster.yaml"), "- id: 1\n  name: A\n- id: 2\n  name: B\n").unwrap();
        fs::write(
            dir.join("timetable.yaml"),
            "- day: mon\n  start: \"09:10\"\n  end: \"10:00\"\n  label: Math\n",
        )
        .unwrap();
        let config = dir.join("rollcall.yaml");
        fs::write(
            &config,
            format!(
                "roster_path: {}\ntimetable_path: {}\nsafe_zones: [Room1]\nstorage:\n  db_path: {}\n  report_dir: {}\n",
                dir.join("roster.yaml").display(),
                dir.join("timetable.yaml").display(),
                dir.join("rollcall.db").display(),
                dir.join("reports").display()
            ),
        )
        .unwrap();
        config
    }

    fn math_row() -> HistoryRecord {
        let row = AttendanceRow {
            entity_id: 1,
            name: "A".to_string(),
            label: "Math".to_string(),
            status: AttendanceStatus::Present,
            location: "Room1".to_string(),
        };
        let generated_at = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        HistoryRecord::from_row(&row, generated_at)
    }

    #[test]
    fn test_config_sample_is_loadable_yaml() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("sample.yaml");
        config_sample(Some(out.clone())).unwrap();

        let text = fs::read_to_string(&out).unwrap();
        assert!(text.contains("safe_zones"));
        assert!(text.contains("poll_interval_secs: 15"));
        assert!(text.contains("port: 12000"));
        assert!(Config::load(Some(out.as_path())).is_ok());
    }

    #[test]
    fn test_history_reads_recorded_rows() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());
        history(Some(config.as_path()), HistoryFilter::default(), true).unwrap();

        let ledger = Ledger::open(&dir.path().join("rollcall.db")).unwrap();
        ledger.append_history(&[math_row()]).unwrap();
        let filter = HistoryFilter {
            label: Some("Math".to_string()),
            ..Default::default()
        };
        let records = ledger.query_history(&filter).unwrap();
        drop(ledger);
        history(Some(config.as_path()), filter, false).unwrap();

        let text = render_history(&records, false).unwrap();
        assert!(text.contains("2026-03-02"));
        assert!(text.contains("PRESENT"));
    }

    #[test]
    fn test_render_history_empty() {
        assert_eq!(render_history(&[], true).unwrap(), "[]");
        assert_eq!(render_history(&[], false).unwrap(), "No history records");
        assert!(render_history(&[math_row()], true).unwrap().contains("\"Math\""));
    }

    #[test]
    fn test_render_status_lists_today() {
        let timetable = Timetable::new(vec![Interval {
            day: Weekday::Mon,
            start_minute: 550,
            end_minute: 600,
            label: "Math".to_string(),
            is_break: false,
        }]);
        let cutoff = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let text = render_status(monday.and_hms_opt(9, 20, 0).unwrap(), &timetable, cutoff);
        assert!(text.contains("CLASS(Math)"));
        assert!(text.contains("09:10-10:00  Math"));

        let sunday = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let text = render_status(sunday.and_hms_opt(9, 20, 0).unwrap(), &timetable, cutoff);
        assert!(text.contains("FREE"));
        assert!(text.contains("No intervals scheduled today"));
    }

    #[test]
    fn test_status_loads_config() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());
        status(Some(config.as_path())).unwrap();
    }

    #[tokio::test]
    async fn test_missing_roster_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());
        fs::remove_file(dir.path().join("roster.yaml")).unwrap();

        let err = serve(Some(config.as_path())).await.unwrap_err();
        assert!(format!("{:#}", err).contains("roster"));
    }
}
