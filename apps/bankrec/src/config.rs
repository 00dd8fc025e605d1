use std::{fs, io, path::Path};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "bankrec.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub database: String,
    pub login: String,
    pub password: String,
    pub journal_id: Option<i64>,
    pub page_limit: u32,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8069".into(),
            database: "odoo".into(),
            login: "admin".into(),
            password: "admin".into(),
            journal_id: None,
            page_limit: 80,
            log_filter: "info".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    database: Option<String>,
    login: Option<String>,
    password: Option<String>,
    journal_id: Option<i64>,
    page_limit: Option<u32>,
    log_filter: Option<String>,
}

/// Defaults, then the TOML file, then the environment. A missing default
/// file is fine; an explicit `path` must exist.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
            apply_file(&mut settings, file_cfg);
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()));
        }
    }

    apply_env(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.database {
        settings.database = v;
    }
    if let Some(v) = file_cfg.login {
        settings.login = v;
    }
    if let Some(v) = file_cfg.password {
        settings.password = v;
    }
    if file_cfg.journal_id.is_some() {
        settings.journal_id = file_cfg.journal_id;
    }
    if let Some(v) = file_cfg.page_limit {
        settings.page_limit = v;
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
}

/// Looks up `BANKREC_<KEY>` then `APP__<KEY>`; the prefixed form wins.
fn lookup_pair(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    env(&format!("APP__{key}")).or_else(|| env(&format!("BANKREC_{key}")))
}

fn apply_env(settings: &mut Settings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup_pair(&env, "SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup_pair(&env, "DATABASE") {
        settings.database = v;
    }
    if let Some(v) = lookup_pair(&env, "LOGIN") {
        settings.login = v;
    }
    if let Some(v) = lookup_pair(&env, "PASSWORD") {
        settings.password = v;
    }
    if let Some(v) = lookup_pair(&env, "JOURNAL_ID") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.journal_id = Some(parsed);
        }
    }
    if let Some(v) = lookup_pair(&env, "PAGE_LIMIT") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.page_limit = parsed;
        }
    }
    if let Some(v) = lookup_pair(&env, "LOG_FILTER") {
        settings.log_filter = v;
    }
}
