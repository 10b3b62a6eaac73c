//! Append-only audit trail of counted messages and administrative commands.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{
    config::Config,
    domain::{ChannelId, UserId},
    errors::Error,
    Result,
};

const AUDIT_MAX_TEXT: usize = 500;

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    pub channel_id: ChannelId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl AuditEvent {
    fn base(event: &str, channel: ChannelId, user: Option<UserId>, username: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: event.to_string(),
            channel_id: channel,
            user_id: user,
            username: (!username.is_empty()).then(|| username.to_string()),
            content: None,
            outcome: None,
            command: None,
            error: None,
            context: None,
        }
    }

    /// A message that was evaluated as a count, with what the game made of it.
    pub fn count(
        channel: ChannelId,
        user: UserId,
        username: &str,
        content: &str,
        outcome: &str,
    ) -> Self {
        Self {
            content: Some(content.to_string()),
            outcome: Some(outcome.to_string()),
            ..Self::base("count", channel, Some(user), username)
        }
    }

    pub fn command(
        channel: ChannelId,
        user: UserId,
        username: &str,
        command: &str,
        outcome: &str,
    ) -> Self {
        Self {
            command: Some(command.to_string()),
            outcome: Some(outcome.to_string()),
            ..Self::base("command", channel, Some(user), username)
        }
    }

    pub fn error(
        channel: ChannelId,
        user: Option<UserId>,
        username: &str,
        error: &str,
        context: Option<&str>,
    ) -> Self {
        Self {
            error: Some(error.to_string()),
            context: context.map(|s| s.to_string()),
            ..Self::base("error", channel, user, username)
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    /// `None` when no audit path is configured.
    pub fn from_config(cfg: &Config) -> Option<Self> {
        cfg.audit_log_path
            .as_ref()
            .map(|p| Self::new(p.clone(), cfg.audit_log_json))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        if let Some(s) = &event.content {
            event.content = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        // Plain text blocks for reading with `less`.
        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&json_value_to_display(v));
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}

fn json_value_to_display(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_text_adds_ellipsis() {
        let s = "ä".repeat(AUDIT_MAX_TEXT + 10);
        let t = truncate_text(&s, AUDIT_MAX_TEXT);
        assert!(t.ends_with("..."));
        assert_eq!(t.chars().count(), AUDIT_MAX_TEXT + 3);
        assert_eq!(truncate_text("short", AUDIT_MAX_TEXT), "short");
    }

    #[test]
    fn json_lines_skip_empty_fields() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLogger::new(dir.path().join("audit.log"), true);

        log.write(AuditEvent::count(
            ChannelId(-100),
            UserId(7),
            "ada",
            "2+2",
            "accepted 4",
        ))
        .unwrap();
        log.write(AuditEvent::command(
            ChannelId(-100),
            UserId(7),
            "",
            "/enable",
            "registered",
        ))
        .unwrap();

        let written = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<serde_json::Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "count");
        assert_eq!(lines[0]["channel_id"], -100);
        assert_eq!(lines[0]["user_id"], 7);
        assert_eq!(lines[0]["content"], "2+2");
        assert!(lines[0].get("command").is_none());
        assert_eq!(lines[1]["command"], "/enable");
        assert!(lines[1].get("username").is_none());
    }

    #[test]
    fn plain_text_truncates_content() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLogger::new(dir.path().join("audit.log"), false);
        let content = "9".repeat(AUDIT_MAX_TEXT + 1);
        log.write(AuditEvent::count(
            ChannelId(1),
            UserId(2),
            "u",
            &content,
            "ignored",
        ))
        .unwrap();

        let written = std::fs::read_to_string(log.path()).unwrap();
        assert!(written.contains("event: count"));
        assert!(written.contains("..."));
        assert!(!written.contains(&content));
    }
}
