use std::env;
use std::time::Duration;

use anyhow::Context;

use crate::models::ActorRole;
use crate::schedule::{TimeUnit, UrgencyThresholds, Window};

#[derive(Clone, Debug)]
pub struct Config {
    /// Absent means the in-memory store is used.
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    pub sweep_interval: Duration,
    pub lifecycle: LifecycleConfig,
    /// Accounts created at boot when running on the in-memory store.
    pub seed_accounts: Vec<SeedAccount>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedAccount {
    pub email: String,
    pub password: String,
    pub role: ActorRole,
}

/// Time windows and urgency thresholds the engine runs with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LifecycleConfig {
    pub approval_window: Window,
    pub payment_window: Window,
    pub case_payment_window: Window,
    pub urgency: UrgencyThresholds,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            approval_window: Window::new(24, TimeUnit::Hours),
            payment_window: Window::new(10, TimeUnit::Minutes),
            case_payment_window: Window::new(7, TimeUnit::Days),
            urgency: UrgencyThresholds::default(),
        }
    }
}

const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
const MAX_SESSION_TTL_HOURS: i64 = 366 * 24;

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let session_ttl_hours = match env::var("SESSION_TTL_HOURS") {
            Ok(raw) => parse_session_ttl_hours(&raw)?,
            Err(_) => DEFAULT_SESSION_TTL_HOURS,
        };
        let sweep_interval_ms = env::var("SWEEP_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1000);

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl_hours,
            sweep_interval: Duration::from_millis(sweep_interval_ms.clamp(50, 1000)),
            lifecycle: LifecycleConfig::from_env()?,
            seed_accounts: match env::var("SEED_ACCOUNTS") {
                Ok(raw) => parse_seed_accounts(&raw)?,
                Err(_) => Vec::new(),
            },
        })
    }
}

impl LifecycleConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let cfg = Self {
            approval_window: window_var("LAWYER_APPROVAL_WINDOW", defaults.approval_window)?,
            payment_window: window_var("CLIENT_PAYMENT_WINDOW", defaults.payment_window)?,
            case_payment_window: window_var("CASE_PAYMENT_WINDOW", defaults.case_payment_window)?,
            urgency: UrgencyThresholds {
                critical: ratio_var("URGENCY_CRITICAL_RATIO", defaults.urgency.critical)?,
                warning: ratio_var("URGENCY_WARNING_RATIO", defaults.urgency.warning)?,
            },
        };
        if cfg.urgency.critical > cfg.urgency.warning {
            anyhow::bail!("URGENCY_CRITICAL_RATIO must not exceed URGENCY_WARNING_RATIO");
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Every window must produce a representable deadline from today.
    pub fn validate(&self) -> anyhow::Result<()> {
        let now = chrono::Utc::now();
        for (key, window) in [
            ("LAWYER_APPROVAL_WINDOW", self.approval_window),
            ("CLIENT_PAYMENT_WINDOW", self.payment_window),
            ("CASE_PAYMENT_WINDOW", self.case_payment_window),
        ] {
            window
                .deadline_from(now)
                .with_context(|| format!("{key}={window} is out of range"))?;
        }
        Ok(())
    }
}

pub fn parse_session_ttl_hours(raw: &str) -> anyhow::Result<i64> {
    let hours: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("SESSION_TTL_HOURS={raw}"))?;
    if !(1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
        anyhow::bail!("SESSION_TTL_HOURS must be within 1..={MAX_SESSION_TTL_HOURS}, got {hours}");
    }
    Ok(hours)
}

fn window_var(key: &str, default: Window) -> anyhow::Result<Window> {
    match env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("{key}={raw}")),
        Err(_) => Ok(default),
    }
}

fn ratio_var(key: &str, default: f64) -> anyhow::Result<f64> {
    match env::var(key) {
        Ok(raw) => {
            let v: f64 = raw.trim().parse().with_context(|| format!("{key}={raw}"))?;
            if !(0.0..=1.0).contains(&v) {
                anyhow::bail!("{key} must be within 0..=1, got {v}");
            }
            Ok(v)
        }
        Err(_) => Ok(default),
    }
}

/// `email:password:role` entries separated by `;`. Role is `client` or `lawyer`.
pub fn parse_seed_accounts(raw: &str) -> anyhow::Result<Vec<SeedAccount>> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            let (Some(email), Some(password), Some(role)) = (parts.next(), parts.next(), parts.next())
            else {
                anyhow::bail!("SEED_ACCOUNTS entry must be email:password:role, got {entry:?}");
            };
            let role = match role.trim() {
                "client" => ActorRole::Client,
                "lawyer" => ActorRole::Lawyer,
                other => anyhow::bail!("unknown role in SEED_ACCOUNTS: {other}"),
            };
            Ok(SeedAccount {
                email: email.trim().to_string(),
                password: password.to_string(),
                role,
            })
        })
        .collect()
}
