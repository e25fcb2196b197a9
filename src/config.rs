//! Saver configuration from environment variables and command line

use std::env;

/// Value of `SAVER_INPUT` / `SAVER_OUTPUT` meaning stdin / stdout
pub const STDIO: &str = "-";

/// Configuration for the saver runtime
///
/// Loaded from environment variables (after `.env`), then overridden by
/// command-line flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaverConfig {
    /// Own identity in `/sys/<system_id>/<kind>/<system>/<control>`
    pub system_id: String,

    /// Capacity of the inbound event channel
    pub channel_buffer: usize,

    /// How long shutdown waits for pending publications
    pub shutdown_grace_ms: u64,

    /// Inbound lines: `-` for stdin or a file path
    pub input: String,

    /// Outbound JSON lines: `-` for stdout or a file path
    pub output: String,

    pub rust_log: String,

    /// Debug output requested on the command line
    pub debug: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parsed command-line flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub help: bool,
    pub debug: bool,
    pub system_id: Option<String>,
}

impl CliArgs {
    /// Parse flags (without the program name)
    ///
    /// Supported: `-h`/`--help`, `-d`/`--debug`, `--system-id <id>`.
    pub fn parse<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = CliArgs::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => parsed.help = true,
                "-d" | "--debug" => parsed.debug = true,
                "--system-id" => {
                    let id = args.next().ok_or_else(|| {
                        ConfigError::InvalidValue("--system-id requires a value".to_string())
                    })?;
                    parsed.system_id = Some(id);
                }
                other => {
                    if let Some(id) = other.strip_prefix("--system-id=") {
                        parsed.system_id = Some(id.to_string());
                    } else {
                        return Err(ConfigError::InvalidValue(format!("unknown argument '{}'", other)));
                    }
                }
            }
        }

        Ok(parsed)
    }
}

pub fn usage(program: &str) -> String {
    format!(
        "Universal min/max saver.\n\
         {} [-h] [--help] [-d] [--debug] [--system-id <id>]\n\
         -h, --help        Shows this help\n\
         -d, --debug       Enable debug output\n\
         --system-id       Own system id (overrides SAVER_SYSTEM_ID)\n\
         \n\
         Environment: SAVER_SYSTEM_ID, SAVER_CHANNEL_BUFFER, SAVER_SHUTDOWN_GRACE_MS,\n\
         SAVER_INPUT, SAVER_OUTPUT, RUST_LOG",
        program
    )
}

impl SaverConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SAVER_SYSTEM_ID` (required unless `--system-id` is given)
    /// - `SAVER_CHANNEL_BUFFER` (default: 1000)
    /// - `SAVER_SHUTDOWN_GRACE_MS` (default: 2000)
    /// - `SAVER_INPUT` (default: `-`)
    /// - `SAVER_OUTPUT` (default: `-`)
    /// - `RUST_LOG` (default: info)
    pub fn from_env(args: &CliArgs) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok(), args)
    }

    /// Same as `from_env` with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F, args: &CliArgs) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let system_id = args
            .system_id
            .clone()
            .or_else(|| lookup("SAVER_SYSTEM_ID"))
            .map(|id| id.trim().to_string())
            .ok_or_else(|| ConfigError::MissingVariable("SAVER_SYSTEM_ID".to_string()))?;

        if system_id.is_empty() || system_id.contains(['/', '+', '#']) {
            return Err(ConfigError::InvalidValue(format!(
                "system id '{}' must be a single non-empty topic level",
                system_id
            )));
        }

        let channel_buffer = parse_or(&lookup, "SAVER_CHANNEL_BUFFER", 1_000usize)?;
        if channel_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "SAVER_CHANNEL_BUFFER must be greater than 0".to_string(),
            ));
        }

        let shutdown_grace_ms = parse_or(&lookup, "SAVER_SHUTDOWN_GRACE_MS", 2_000u64)?;

        let input = lookup("SAVER_INPUT").unwrap_or_else(|| STDIO.to_string());
        let output = lookup("SAVER_OUTPUT").unwrap_or_else(|| STDIO.to_string());
        let rust_log = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            system_id,
            channel_buffer,
            shutdown_grace_ms,
            input,
            output,
            rust_log,
            debug: args.debug,
        })
    }

    /// Default log filter; `--debug` wins over `RUST_LOG`
    pub fn log_filter(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.rust_log
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}='{}' is not a valid number", name, raw))),
    }
}
