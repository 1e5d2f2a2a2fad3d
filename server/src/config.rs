// Configuration for the speech server

use std::path::PathBuf;
use std::time::Duration;

use tts_core::PipelineConfig;

/// Where rendered audio goes.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputTarget {
    /// Clock-driven playback with no device attached
    Null,
    /// Record everything played to a WAV file
    Wav(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    /// Attach Base64 WAV audio to chunk events on `/events`
    pub stream_audio: bool,
    pub output: OutputTarget,
    pub espeak_program: String,
    pub espeak_voice: String,
    pub pipeline: PipelineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
            stream_audio: false,
            output: OutputTarget::Null,
            espeak_program: "espeak-ng".to_string(),
            espeak_voice: "en-us".to_string(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let rate_limit_per_minute = std::env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit_per_minute);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| parse_origins(&origins));

        let stream_audio = std::env::var("TTS_STREAM_AUDIO")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.stream_audio);

        let output = match std::env::var("TTS_OUTPUT_WAV") {
            Ok(path) if !path.trim().is_empty() => OutputTarget::Wav(PathBuf::from(path.trim())),
            _ => OutputTarget::Null,
        };

        Self {
            port,
            rate_limit_per_minute,
            request_timeout_secs,
            cors_allowed_origins,
            stream_audio,
            output,
            espeak_program: std::env::var("ESPEAK_PATH").unwrap_or(defaults.espeak_program),
            espeak_voice: std::env::var("ESPEAK_VOICE").unwrap_or(defaults.espeak_voice),
            pipeline: PipelineConfig::from_env(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_origins(origins: &str) -> Vec<String> {
    origins
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins_skips_blanks() {
        assert_eq!(
            parse_origins("http://a.test, ,http://b.test,"),
            vec!["http://a.test", "http://b.test"]
        );
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" 1 "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8085);
        assert_eq!(config.output, OutputTarget::Null);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }
}
