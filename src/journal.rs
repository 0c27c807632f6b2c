//! Append-only JSONL trade journal, one file per UTC day.

use std::{
    fs::{create_dir_all, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::Mutex;
use tracing::warn;

pub const BOT_TRADE_DIR: &str = "ha-bot";

pub type SharedTradeJournal = Arc<Mutex<TradeJournal>>;

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn resolve_repo_root() -> Option<PathBuf> {
    let mut cursor = std::env::current_dir().ok()?;
    loop {
        if cursor.join(".git").is_dir() {
            return Some(cursor);
        }
        if !cursor.pop() {
            return None;
        }
    }
}

/// `$TRADES_DIR/ha-bot`, else `<repo root>/TRADES/ha-bot`, else `./TRADES/ha-bot`.
pub fn resolve_trades_dir() -> PathBuf {
    trades_dir_from(std::env::var("TRADES_DIR").ok(), resolve_repo_root())
}

fn trades_dir_from(trades_env: Option<String>, repo_root: Option<PathBuf>) -> PathBuf {
    if let Some(raw) = trades_env {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed).join(BOT_TRADE_DIR);
        }
    }

    repo_root
        .unwrap_or_default()
        .join("TRADES")
        .join(BOT_TRADE_DIR)
}

/// Writes each event to `trades-<day>.jsonl`, where the day comes from the
/// event's own `ts` (UTC). Events without a parsable `ts` go to today's file.
pub struct TradeJournal {
    dir: PathBuf,
    current: Option<(String, File)>,
}

impl TradeJournal {
    pub fn open(dir: PathBuf) -> std::io::Result<Self> {
        create_dir_all(&dir)?;
        let mut journal = Self { dir, current: None };
        journal.file_for(&day_key(None))?;
        Ok(journal)
    }

    pub fn day_file(&self, day: &str) -> PathBuf {
        self.dir.join(format!("trades-{}.jsonl", day))
    }

    fn file_for(&mut self, day: &str) -> std::io::Result<&mut File> {
        if self.current.as_ref().map(|(d, _)| d.as_str()) != Some(day) {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.day_file(day))?;
            self.current = Some((day.to_string(), file));
        }
        self.current
            .as_mut()
            .map(|(_, file)| file)
            .ok_or_else(|| std::io::Error::other("journal file not open"))
    }

    /// Failures are logged and swallowed; the journal never stops a cycle.
    pub fn write_event(&mut self, event: serde_json::Value) {
        let day = day_key(event.get("ts").and_then(|ts| ts.as_str()));
        let write_result = serde_json::to_string(&event)
            .map_err(std::io::Error::from)
            .and_then(|line| {
                let file = self.file_for(&day)?;
                writeln!(file, "{}", line)?;
                file.flush()
            });

        if let Err(e) = write_result {
            warn!("Trade journal write failed: {}", e);
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn day_key(ts: Option<&str>) -> String {
    ts.and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d")
        .to_string()
}

pub async fn write_trade_event(journal: &SharedTradeJournal, event: serde_json::Value) {
    let mut guard = journal.lock().await;
    guard.write_event(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trades_dir_resolution() {
        assert_eq!(
            trades_dir_from(Some("/tmp/journal".into()), Some(PathBuf::from("/repo"))),
            PathBuf::from("/tmp/journal/ha-bot")
        );
        assert_eq!(
            trades_dir_from(Some("  ".into()), Some(PathBuf::from("/repo"))),
            PathBuf::from("/repo/TRADES/ha-bot")
        );
        assert_eq!(
            trades_dir_from(None, None),
            PathBuf::from("TRADES/ha-bot")
        );
    }

    #[test]
    fn test_events_appended_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = TradeJournal::open(dir.path().join("ha-bot")).unwrap();

        journal.write_event(json!({"kind": "bot_start", "ts": "2026-03-01T10:00:00.000Z"}));
        journal.write_event(json!({"kind": "signal", "side": "Buy", "ts": "2026-03-01T10:15:00.000Z"}));

        let contents = std::fs::read_to_string(journal.day_file("2026-03-01")).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "bot_start");
        assert_eq!(lines[1]["side"], "Buy");
    }

    #[test]
    fn test_rotates_on_event_day() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = TradeJournal::open(dir.path().join("ha-bot")).unwrap();

        journal.write_event(json!({"kind": "a", "ts": "2026-03-01T23:59:59.900Z"}));
        journal.write_event(json!({"kind": "b", "ts": "2026-03-02T00:00:00.100Z"}));
        // Offsets are normalised to UTC before picking the day.
        journal.write_event(json!({"kind": "c", "ts": "2026-03-02T01:30:00+02:00"}));

        let first = std::fs::read_to_string(journal.day_file("2026-03-01")).unwrap();
        let second = std::fs::read_to_string(journal.day_file("2026-03-02")).unwrap();
        assert_eq!(first.lines().count(), 2);
        assert!(first.contains("\"c\""));
        assert_eq!(second.lines().count(), 1);
    }

    #[test]
    fn test_event_without_ts_goes_to_today() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = TradeJournal::open(dir.path().join("ha-bot")).unwrap();
        journal.write_event(json!({"kind": "untimed"}));

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let contents = std::fs::read_to_string(journal.day_file(&today)).unwrap();
        assert!(contents.contains("untimed"));
    }

    #[tokio::test]
    async fn test_shared_journal_reopens_in_append_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ha-bot");
        let ts = "2026-03-01T12:00:00.000Z";

        let shared: SharedTradeJournal =
            Arc::new(Mutex::new(TradeJournal::open(path.clone()).unwrap()));
        write_trade_event(&shared, json!({"kind": "first", "ts": ts})).await;
        drop(shared);

        let mut reopened = TradeJournal::open(path).unwrap();
        reopened.write_event(json!({"kind": "second", "ts": ts}));

        let contents = std::fs::read_to_string(reopened.day_file("2026-03-01")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
