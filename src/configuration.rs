use crate::error::ConfigError;

/// Smallest HMAC secret we accept for signing access tokens (256 bits).
const MIN_SECRET_LENGTH: usize = 32;
/// bcrypt ignores input past this many bytes.
const BCRYPT_MAX_INPUT: usize = 72;
const BCRYPT_MIN_COST: u32 = 4;
const BCRYPT_MAX_COST: u32 = 31;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub password: PasswordPolicy,
    #[serde(default)]
    pub security: SecuritySettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Access token signing settings
///
/// Intentionally not `Debug`: the secret must never end up in a log line.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_expiry: i64, // seconds (e.g., 900 for 15 minutes)
    pub issuer: String,
}

/// Refresh token (session) settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct SessionSettings {
    #[serde(default = "default_refresh_token_days")]
    pub refresh_token_days: i64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_token_days: default_refresh_token_days(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

fn default_refresh_token_days() -> i64 {
    7
}

fn default_cleanup_interval() -> u64 {
    3600
}

/// Password strength policy and hashing parameters
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PasswordPolicy {
    /// Counted in characters
    pub min_length: usize,
    /// Counted in UTF-8 bytes; bcrypt ignores anything past 72
    pub max_length: usize,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
    /// bcrypt work factor
    pub hash_cost: u32,
    /// Upper bound on bcrypt computations running at the same time
    pub max_concurrent_hashes: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: BCRYPT_MAX_INPUT,
            require_lowercase: true,
            require_uppercase: true,
            require_digit: true,
            require_special: false,
            hash_cost: bcrypt::DEFAULT_COST,
            max_concurrent_hashes: 4,
        }
    }
}

impl PasswordPolicy {
    /// Human readable summary, used verbatim for every policy rejection.
    pub fn describe(&self) -> String {
        let mut classes = Vec::new();
        if self.require_lowercase {
            classes.push("a lowercase letter");
        }
        if self.require_uppercase {
            classes.push("an uppercase letter");
        }
        if self.require_digit {
            classes.push("a digit");
        }
        if self.require_special {
            classes.push("a special character");
        }

        let mut summary = format!(
            "at least {} characters and at most {} bytes",
            self.min_length, self.max_length
        );
        if !classes.is_empty() {
            summary.push_str(" including ");
            summary.push_str(&classes.join(", "));
        }
        summary
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SecuritySettings {
    pub login_attempts_per_minute: u32,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            login_attempts_per_minute: 10,
        }
    }
}

impl Settings {
    /// Reject configurations the service must not start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if self.jwt.issuer.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.issuer".to_string()));
        }
        if self.jwt.access_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "jwt.access_token_expiry must be positive".to_string(),
            ));
        }
        if self.session.refresh_token_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "session.refresh_token_days must be positive".to_string(),
            ));
        }
        if self.session.cleanup_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "session.cleanup_interval_seconds must be positive".to_string(),
            ));
        }

        let policy = &self.password;
        if !(BCRYPT_MIN_COST..=BCRYPT_MAX_COST).contains(&policy.hash_cost) {
            return Err(ConfigError::InvalidValue(format!(
                "password.hash_cost must be between {} and {}",
                BCRYPT_MIN_COST,
                BCRYPT_MAX_COST
            )));
        }
        if policy.min_length == 0 || policy.min_length > policy.max_length {
            return Err(ConfigError::InvalidValue(
                "password.min_length must be between 1 and password.max_length".to_string(),
            ));
        }
        if policy.max_length > BCRYPT_MAX_INPUT {
            return Err(ConfigError::InvalidValue(format!(
                "password.max_length cannot exceed {} (bcrypt input limit)",
                BCRYPT_MAX_INPUT
            )));
        }
        if policy.max_concurrent_hashes == 0 {
            return Err(ConfigError::InvalidValue(
                "password.max_concurrent_hashes must be at least 1".to_string(),
            ));
        }
        if self.security.login_attempts_per_minute == 0 {
            return Err(ConfigError::InvalidValue(
                "security.login_attempts_per_minute must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load settings from an optional `configuration` file overlaid by
/// `APP_<SECTION>__<KEY>` environment variables.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
