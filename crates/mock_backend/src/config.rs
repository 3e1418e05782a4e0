use std::{collections::HashMap, fs};

#[derive(Debug)]
pub struct Settings {
    pub bind_addr: String,
    /// Seconds between synthetic samples for running machines; 0 disables.
    pub sample_every_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".into(),
            sample_every_secs: 4,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("mock_backend.toml") {
        apply_file(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("MOCK_BACKEND_BIND") {
        settings.bind_addr = v;
    }
    if let Ok(v) = std::env::var("MOCK_BACKEND_SAMPLE_EVERY_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.sample_every_secs = parsed;
        }
    }

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("bind_addr").and_then(toml::Value::as_str) {
        settings.bind_addr = v.to_string();
    }
    if let Some(v) = file_cfg
        .get("sample_every_secs")
        .and_then(toml::Value::as_integer)
    {
        settings.sample_every_secs = u64::try_from(v).unwrap_or(0);
    }
}
