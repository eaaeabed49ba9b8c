use anyhow::{bail, Context};
use serde::Deserialize;

use crate::borrow_lifecycle::BorrowPolicy;
use crate::postgres::PostgresConfig;

const DEFAULT_SETTINGS: &str = include_str!("../config/default.toml");
const DEFAULT_JWT_SECRET: &str = "secretkey";
/// Upper bound for every period given in days
const MAX_PERIOD_DAYS: i64 = 3650;
const MAX_EXTENSIONS: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub in_memory: bool,
    pub hostname: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub bcrypt_cost: u32,
    pub min_password_length: usize,
    /// Domain appended to 8 digit student ids on login
    pub student_email_domain: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BorrowingSettings {
    pub max_active_borrows: usize,
    pub loan_days: i64,
    pub extension_days: i64,
    pub max_extensions: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    pub service_name: String,
    pub jaeger_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
/// Admin account created at startup when no account with this email exists
pub struct BootstrapAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub borrowing: BorrowingSettings,
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Settings {
    /// Loads embedded defaults, then `libraryservice.toml`, then the file named by
    /// `LIBRARYSERVICE_CONFIG`, then `LIBRARYSERVICE__SECTION__KEY` environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(
                DEFAULT_SETTINGS,
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name("libraryservice").required(false));

        if let Ok(custom_path) = std::env::var("LIBRARYSERVICE_CONFIG") {
            builder = builder.add_source(config::File::with_name(&custom_path).required(true));
        }

        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix("LIBRARYSERVICE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults overridden by the given TOML document
    pub fn from_toml(overrides: &str) -> anyhow::Result<Self> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(
                DEFAULT_SETTINGS,
                config::FileFormat::Toml,
            ))
            .add_source(config::File::from_str(overrides, config::FileFormat::Toml))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be > 0");
        }
        if self.auth.jwt_secret.trim().is_empty() {
            bail!("auth.jwt_secret must not be empty");
        }
        if !(1..=MAX_PERIOD_DAYS).contains(&self.auth.token_ttl_days) {
            bail!("auth.token_ttl_days must be in 1..={}", MAX_PERIOD_DAYS);
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            bail!("auth.bcrypt_cost must be in 4..=31");
        }
        if self.borrowing.max_active_borrows == 0 {
            bail!("borrowing.max_active_borrows must be > 0");
        }
        if !(1..=MAX_PERIOD_DAYS).contains(&self.borrowing.loan_days)
            || !(1..=MAX_PERIOD_DAYS).contains(&self.borrowing.extension_days)
        {
            bail!(
                "borrowing.loan_days and borrowing.extension_days must be in 1..={}",
                MAX_PERIOD_DAYS
            );
        }
        if self.borrowing.max_extensions > MAX_EXTENSIONS {
            bail!("borrowing.max_extensions must be <= {}", MAX_EXTENSIONS);
        }
        Ok(())
    }

    /// True while tokens are signed with the secret shipped in the default config
    pub fn uses_default_jwt_secret(&self) -> bool {
        self.auth.jwt_secret == DEFAULT_JWT_SECRET
    }

    pub fn borrow_policy(&self) -> BorrowPolicy {
        BorrowPolicy {
            max_active_borrows: self.borrowing.max_active_borrows,
            loan_days: self.borrowing.loan_days,
            extension_days: self.borrowing.extension_days,
            max_extensions: self.borrowing.max_extensions,
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            hostname: self.database.hostname.clone(),
            username: self.database.username.clone(),
            password: self.database.password.clone(),
        }
    }
}
