//! Configuração do agente carregada a partir de `capture-agent.toml`.
//!
//! A struct [`AgentConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! Variáveis de ambiente `CAPTURE_AGENT_*` têm precedência sobre o arquivo.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::capture::{DEFAULT_MARKER, DEFAULT_MAX_LINE_BYTES};

/// Arquivo lido quando nenhum caminho é informado.
pub const DEFAULT_CONFIG_FILE: &str = "capture-agent.toml";

/// Configuração de nível superior carregada de `capture-agent.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Endereço de escuta; precisa ser loopback.
    #[serde(default = "default_host")]
    pub host: String,

    /// Porta HTTP do agente.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub forward: ForwardConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Como o programa de captura é invocado e como sua saída é lida.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Executável do interpretador (ex.: "python").
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Script passado como único argumento ao interpretador.
    #[serde(default = "default_script")]
    pub script: String,

    /// Prefixo da linha que carrega o payload.
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Tamanho máximo de uma linha não terminada mantida em buffer.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,

    /// Tempo máximo da captura em segundos; `0` desativa o limite.
    #[serde(default = "default_capture_timeout_secs")]
    pub timeout_secs: u64,

    /// Quantos bytes de stdout/stderr guardar para diagnóstico.
    #[serde(default = "default_diagnostic_bytes")]
    pub diagnostic_bytes: usize,
}

/// Destino remoto que recebe o payload capturado.
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    #[serde(default = "default_forward_url")]
    pub url: String,

    /// Tempo máximo de espera pela resposta remota, em segundos.
    #[serde(default = "default_forward_timeout_secs")]
    pub timeout_secs: u64,
}

/// Retenção dos jobs em memória.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Atraso em milissegundos entre o primeiro poll de um job terminal e sua remoção.
    #[serde(default = "default_reap_delay_ms")]
    pub reap_delay_ms: u64,
}

/// Configuração de logging via `tracing-subscriber`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filtro padrão quando `RUST_LOG` não está definido.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `"pretty"` ou `"json"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9876
}

fn default_interpreter() -> String {
    "python".to_string()
}

fn default_script() -> String {
    "scripts/demo.py".to_string()
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}

fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}

fn default_capture_timeout_secs() -> u64 {
    120
}

fn default_diagnostic_bytes() -> usize {
    64 * 1024
}

fn default_forward_url() -> String {
    "http://127.0.0.1:3030/api/v1/fingerprint".to_string()
}

fn default_forward_timeout_secs() -> u64 {
    70
}

fn default_reap_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            script: default_script(),
            marker: default_marker(),
            max_line_bytes: default_max_line_bytes(),
            timeout_secs: default_capture_timeout_secs(),
            diagnostic_bytes: default_diagnostic_bytes(),
        }
    }
}

impl CaptureConfig {
    /// Limite de tempo da captura, ou `None` quando desativado.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            url: default_forward_url(),
            timeout_secs: default_forward_timeout_secs(),
        }
    }
}

impl ForwardConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            reap_delay_ms: default_reap_delay_ms(),
        }
    }
}

impl JobsConfig {
    pub fn reap_delay(&self) -> Duration {
        Duration::from_millis(self.reap_delay_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            capture: CaptureConfig::default(),
            forward: ForwardConfig::default(),
            jobs: JobsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Carrega a configuração do caminho informado, de `CAPTURE_AGENT_CONFIG`
    /// ou de `capture-agent.toml` no diretório atual.
    ///
    /// Usa valores padrão se o arquivo implícito não existir; um caminho
    /// explícito inexistente é erro.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("CAPTURE_AGENT_CONFIG").map(PathBuf::from));

        let mut config = match &explicit {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        // Variáveis de ambiente têm precedência sobre o arquivo de configuração.
        config.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str::<AgentConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Aplica sobrescritas `CAPTURE_AGENT_*` obtidas pela função `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup("CAPTURE_AGENT_PORT") {
            self.port = port
                .parse()
                .with_context(|| format!("CAPTURE_AGENT_PORT is not a valid port: {port}"))?;
        }
        if let Some(url) = lookup("CAPTURE_AGENT_FORWARD_URL") {
            self.forward.url = url;
        }
        if let Some(interpreter) = lookup("CAPTURE_AGENT_INTERPRETER") {
            self.capture.interpreter = interpreter;
        }
        if let Some(script) = lookup("CAPTURE_AGENT_SCRIPT") {
            self.capture.script = script;
        }
        Ok(())
    }

    /// Rejeita combinações que o agente não consegue usar.
    pub fn validate(&self) -> Result<()> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("host is not an IP address: {}", self.host))?;
        if !ip.is_loopback() {
            bail!("host must be a loopback address, got {ip}");
        }
        if self.capture.interpreter.trim().is_empty() {
            bail!("capture.interpreter must not be empty");
        }
        if self.capture.marker.is_empty() {
            bail!("capture.marker must not be empty");
        }
        if self.capture.max_line_bytes == 0 {
            bail!("capture.max_line_bytes must be greater than zero");
        }
        if self.forward.url.trim().is_empty() {
            bail!("forward.url must not be empty");
        }
        Ok(())
    }

    /// Endereço de escuta já validado.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("host is not an IP address: {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = AgentConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9876);
        assert_eq!(config.capture.marker, "FINGERPRINT_WSQ_B64:");
        assert_eq!(config.capture.timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.forward.timeout(), Duration::from_secs(70));
        assert_eq!(config.jobs.reap_delay(), Duration::from_millis(2000));
        assert_eq!(config.logging.format, "pretty");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            port = 9000

            [capture]
            interpreter = "python3"
            timeout_secs = 0

            [forward]
            url = "http://10.0.0.5:3030/api/v1/fingerprint"
        "#;
        let config: AgentConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.capture.interpreter, "python3");
        assert_eq!(config.capture.script, "scripts/demo.py");
        assert_eq!(config.capture.timeout(), None);
        assert_eq!(config.forward.url, "http://10.0.0.5:3030/api/v1/fingerprint");
        assert_eq!(config.forward.timeout_secs, 70);
    }

    #[test]
    fn example_file_matches_defaults() {
        let config: AgentConfig =
            toml::from_str(include_str!("../capture-agent.example.toml")).unwrap();
        let defaults = AgentConfig::default();
        assert_eq!(config.port, defaults.port);
        assert_eq!(config.capture.marker, defaults.capture.marker);
        assert_eq!(config.capture.max_line_bytes, defaults.capture.max_line_bytes);
        assert_eq!(config.forward.url, defaults.forward.url);
        assert_eq!(config.jobs.reap_delay_ms, defaults.jobs.reap_delay_ms);
    }

    #[test]
    fn overrides_take_precedence() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CAPTURE_AGENT_PORT", "7000"),
            ("CAPTURE_AGENT_FORWARD_URL", "http://127.0.0.1:1/x"),
            ("CAPTURE_AGENT_SCRIPT", "/opt/capture.py"),
        ]);
        let mut config = AgentConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.forward.url, "http://127.0.0.1:1/x");
        assert_eq!(config.capture.script, "/opt/capture.py");
        assert_eq!(config.capture.interpreter, "python");
    }

    #[test]
    fn invalid_port_override_is_rejected() {
        let mut config = AgentConfig::default();
        let result = config.apply_overrides(|k| {
            (k == "CAPTURE_AGENT_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn non_loopback_host_is_rejected() {
        let config = AgentConfig {
            host: "0.0.0.0".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AgentConfig {
            host: "::1".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_marker_is_rejected() {
        let mut config = AgentConfig::default();
        config.capture.marker.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_path_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 9100\n[jobs]\nreap_delay_ms = 50").unwrap();
        let config = AgentConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.jobs.reap_delay_ms, 50);
        assert_eq!(config.listen_addr().unwrap().port(), config.port);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let result = AgentConfig::load(Some(Path::new("/nonexistent/capture-agent.toml")));
        assert!(result.is_err());
    }
}
