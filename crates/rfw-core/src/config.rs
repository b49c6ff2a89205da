use std::{
    env, fs,
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, governor::GovernorConfig, sequencer::BatchPacing, Result};

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub telegram_allowed_users: Vec<i64>,

    // Relay
    /// Personal destination that receives relayed content.
    pub destination_chat_id: i64,
    /// Chat the Telegram adapter forwards source messages into to read them.
    /// Never the destination: scratch copies must not show up there.
    pub scratch_chat_id: i64,
    pub temp_dir: PathBuf,

    // Batch pacing
    pub batch_delay: Duration,
    pub batch_long_delay: Duration,
    pub batch_long_delay_every: u32,
    pub progress_every: u32,
    pub max_batch_size: u32,

    // Throttling
    pub throttle_max_retries: u32,

    // Liveness endpoint (None = disabled)
    pub health_port: Option<u16>,
    pub health_bind: IpAddr,

    // Telegram limits
    pub telegram_message_limit: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let cfg = Self::from_lookup(env_str)?;

        fs::create_dir_all(&cfg.temp_dir)?;
        Ok(cfg)
    }

    /// Build a config from any key lookup. Does not touch the filesystem.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;
        let telegram_allowed_users = parse_csv_i64(get("TELEGRAM_ALLOWED_USERS"));
        let Some(&owner) = telegram_allowed_users.first() else {
            return Err(Error::Config(
                "TELEGRAM_ALLOWED_USERS environment variable is required".to_string(),
            ));
        };

        // The destination defaults to the owner's private chat.
        let destination_chat_id = parse_opt::<i64>(&get, "RELAY_DESTINATION_CHAT_ID")?.unwrap_or(owner);
        let scratch_chat_id = parse_opt::<i64>(&get, "RELAY_SCRATCH_CHAT_ID")?.ok_or_else(|| {
            Error::Config("RELAY_SCRATCH_CHAT_ID environment variable is required".to_string())
        })?;
        if scratch_chat_id == destination_chat_id {
            return Err(Error::Config(
                "RELAY_SCRATCH_CHAT_ID must differ from the destination chat".to_string(),
            ));
        }
        let temp_dir = PathBuf::from(get("TEMP_DIR").unwrap_or("/tmp/rfw".to_string()));

        let batch_delay =
            Duration::from_millis(parse_opt::<u64>(&get, "BATCH_DELAY_MS")?.unwrap_or(800));
        let batch_long_delay =
            Duration::from_millis(parse_opt::<u64>(&get, "BATCH_LONG_DELAY_MS")?.unwrap_or(1500));
        let batch_long_delay_every = parse_opt::<u32>(&get, "BATCH_LONG_DELAY_EVERY")?.unwrap_or(5);
        let progress_every = parse_opt::<u32>(&get, "PROGRESS_EVERY")?.unwrap_or(10);
        let max_batch_size = parse_opt::<u32>(&get, "MAX_BATCH_SIZE")?.unwrap_or(1000).max(1);

        let throttle_max_retries = parse_opt::<u32>(&get, "THROTTLE_MAX_RETRIES")?.unwrap_or(3);

        // Port 0 disables the endpoint.
        let health_port = match parse_opt::<u16>(&get, "HEALTH_PORT")?.unwrap_or(8080) {
            0 => None,
            p => Some(p),
        };
        let health_bind = parse_opt::<IpAddr>(&get, "HEALTH_BIND")?
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let telegram_message_limit = parse_opt::<usize>(&get, "TELEGRAM_MESSAGE_LIMIT")?
            .unwrap_or(4096)
            .max(64);

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            destination_chat_id,
            scratch_chat_id,
            temp_dir,
            batch_delay,
            batch_long_delay,
            batch_long_delay_every,
            progress_every,
            max_batch_size,
            throttle_max_retries,
            health_port,
            health_bind,
            telegram_message_limit,
        })
    }

    pub fn pacing(&self) -> BatchPacing {
        BatchPacing {
            delay: self.batch_delay,
            long_delay: self.batch_long_delay,
            long_every: self.batch_long_delay_every,
            progress_every: self.progress_every,
        }
    }

    pub fn governor(&self) -> GovernorConfig {
        GovernorConfig {
            max_retries: self.throttle_max_retries,
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

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
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

/// Absent keys are `None`; present but unparsable keys are a config error.
fn parse_opt<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw}"))),
    }
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
