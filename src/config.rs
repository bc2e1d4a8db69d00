use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "gavel", version = "0.1", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Whether to flush the existing database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> std::io::Result<Config> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub judge: JudgeConfig,
    pub languages: Vec<LanguageConfig>,
}

#[derive(Deserialize, Debug)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

/// Resource policy for the judging pipeline. Every field has a default so a
/// minimal config file (`"judge": {}`) is valid.
#[derive(Deserialize, Debug, Default)]
pub struct JudgeConfig {
    pub workers: Option<u8>,
    pub queue_capacity: Option<usize>,
    pub memory_limit_mb: Option<u32>,
    pub cpus: Option<u32>,
    pub default_time_limit_secs: Option<u64>,
}

impl JudgeConfig {
    pub fn workers(&self) -> u8 {
        self.workers.unwrap_or(4)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(64)
    }

    pub fn memory_limit_mb(&self) -> u32 {
        self.memory_limit_mb.unwrap_or(128)
    }

    pub fn cpus(&self) -> u32 {
        self.cpus.unwrap_or(1)
    }

    pub fn default_time_limit_secs(&self) -> u64 {
        self.default_time_limit_secs.unwrap_or(5)
    }
}

/// Execution contract for one language: where the source lands inside the
/// container and how it is compiled and run. Adding a language is a config
/// change only; the judging pipeline never branches on the language name.
#[derive(Deserialize, Debug, Clone)]
pub struct LanguageConfig {
    pub name: String,
    pub file_name: String,
    pub image: String,
    pub compile: Option<String>,
    pub run: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let file = std::fs::File::open("data/config.json").unwrap();
        let reader = std::io::BufReader::new(file);
        let config: Config = serde_json::from_reader(reader).unwrap();
        assert_eq!(config.server.bind_address, Some("127.0.0.1".to_string()));
        assert_eq!(config.judge.memory_limit_mb(), 128);
        assert_eq!(config.languages[0].name, "java");
        assert!(config.languages[0].compile.is_some());
    }

    #[test]
    fn test_judge_defaults() {
        let judge = JudgeConfig::default();
        assert_eq!(judge.workers(), 4);
        assert_eq!(judge.queue_capacity(), 64);
        assert_eq!(judge.default_time_limit_secs(), 5);
    }
}
