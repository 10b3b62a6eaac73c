use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed runtime configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub database_path: PathBuf,

    // Administration
    pub admin_users: Vec<i64>,

    // Highscores
    pub sweep_interval: Duration,

    // Acknowledgments
    pub positive_emoji: String,
    pub negative_emoji: String,

    // Outbound throttling
    pub global_min_interval: Duration,
    pub chat_min_interval: Duration,

    // Audit
    pub audit_log_path: Option<PathBuf>,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `load` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let database_path = get("TALLY_DATABASE_PATH")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("tally.db"));

        let admin_users = parse_csv_i64(get("TALLY_ADMIN_USERS"));

        let sweep_interval = Duration::from_secs(
            parse_u64(get("TALLY_SWEEP_INTERVAL_SECS"))
                .filter(|s| *s > 0)
                .unwrap_or(3600),
        );

        let positive_emoji = get("TALLY_POSITIVE_EMOJI")
            .and_then(non_empty)
            .unwrap_or_else(|| "✅".to_string());
        let negative_emoji = get("TALLY_NEGATIVE_EMOJI")
            .and_then(non_empty)
            .unwrap_or_else(|| "❌".to_string());

        // Telegram allows ~30 msg/s globally and ~1 msg/s per chat.
        let global_min_interval =
            Duration::from_millis(parse_u64(get("TALLY_GLOBAL_MIN_INTERVAL_MS")).unwrap_or(40));
        let chat_min_interval =
            Duration::from_millis(parse_u64(get("TALLY_CHAT_MIN_INTERVAL_MS")).unwrap_or(1050));

        let audit_log_path = get("TALLY_AUDIT_LOG_PATH")
            .and_then(non_empty)
            .map(PathBuf::from);
        let audit_log_json = parse_bool(get("TALLY_AUDIT_LOG_JSON")).unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            database_path,
            admin_users,
            sweep_interval,
            positive_emoji,
            negative_emoji,
            global_min_interval,
            chat_min_interval,
            audit_log_path,
            audit_log_json,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }
        out.push((key.to_string(), val.to_string()));
    }
    out
}

fn parse_bool(v: Option<String>) -> Option<bool> {
    v.map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn token_is_required() {
        assert!(matches!(load(&[]), Err(Error::Config(_))));
        assert!(matches!(
            load(&[("TELEGRAM_BOT_TOKEN", "  ")]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn defaults_apply() {
        let cfg = load(&[("TELEGRAM_BOT_TOKEN", "t")]).unwrap();
        assert_eq!(cfg.database_path, PathBuf::from("tally.db"));
        assert!(cfg.admin_users.is_empty());
        assert_eq!(cfg.sweep_interval, Duration::from_secs(3600));
        assert_eq!(cfg.positive_emoji, "✅");
        assert_eq!(cfg.negative_emoji, "❌");
        assert_eq!(cfg.chat_min_interval, Duration::from_millis(1050));
        assert!(cfg.audit_log_path.is_none());
        assert!(!cfg.audit_log_json);
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let cfg = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TALLY_SWEEP_INTERVAL_SECS", "soon"),
            ("TALLY_GLOBAL_MIN_INTERVAL_MS", "-3"),
            ("TALLY_ADMIN_USERS", "1, x, 42,,"),
            ("TALLY_AUDIT_LOG_JSON", "YES"),
        ])
        .unwrap();
        assert_eq!(cfg.sweep_interval, Duration::from_secs(3600));
        assert_eq!(cfg.global_min_interval, Duration::from_millis(40));
        assert_eq!(cfg.admin_users, vec![1, 42]);
        assert!(cfg.audit_log_json);
    }

    #[test]
    fn dotenv_lines() {
        let parsed = parse_dotenv("# c\nA=1\n B = \"two\" \nbad\n=x\nC='3'\n");
        assert_eq!(
            parsed,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two".to_string()),
                ("C".to_string(), "3".to_string()),
            ]
        );
    }
}
