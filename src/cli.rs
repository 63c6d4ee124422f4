//! Interface de linha de comando do capture-agent baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (serve, capture, status)
//! e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// capture-agent: ponte local entre o leitor biométrico e o serviço remoto.
#[derive(Debug, Parser)]
#[command(name = "capture-agent", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração TOML.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inicia o agente HTTP na interface de loopback.
    Serve {
        /// Porta de escuta (sobrescreve a configuração).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Executa uma captura isolada, sem encaminhar ao serviço remoto.
    Capture {
        /// Decodifica o payload base64 e grava os bytes neste arquivo.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Consulta o `GET /status` de um agente em execução.
    Status {
        /// URL base do agente (padrão: endereço da configuração).
        #[arg(long)]
        url: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_serve_with_port() {
        let cli = Cli::parse_from(["capture-agent", "serve", "--port", "9999"]);
        match cli.command {
            Command::Serve { port } => assert_eq!(port, Some(9999)),
            _ => panic!("expected Serve command"),
        }
    }

    #[test]
    fn cli_parses_capture_output() {
        let cli = Cli::parse_from(["capture-agent", "capture", "-o", "finger.wsq"]);
        match cli.command {
            Command::Capture { output } => {
                assert_eq!(output.unwrap(), PathBuf::from("finger.wsq"));
            }
            _ => panic!("expected Capture command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "capture-agent",
            "--config",
            "/etc/agent.toml",
            "--verbose",
            "status",
            "--url",
            "http://127.0.0.1:9876",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config.unwrap(), PathBuf::from("/etc/agent.toml"));
        match cli.command {
            Command::Status { url } => assert_eq!(url.unwrap(), "http://127.0.0.1:9876"),
            _ => panic!("expected Status command"),
        }
    }

    #[test]
    fn cli_rejects_missing_subcommand() {
        assert!(Cli::try_parse_from(["capture-agent"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
