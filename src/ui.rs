//! Interface de terminal do capture-agent: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`CaptureProgress`] acompanha visualmente
//! os subcomandos `capture` e `status` no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

/// Indicador visual de progresso para um subcomando da CLI.
///
/// Exibe um spinner animado enquanto espera e mensagens coloridas
/// para sucesso (verde), falha (vermelho) e avisos (amarelo).
pub struct CaptureProgress {
    // Spinner do indicatif.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl CaptureProgress {
    /// Inicia o spinner com a descrição informada.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(description.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Imprime um aviso acima do spinner sem interrompê-lo.
    pub fn warn(&self, message: &str) {
        self.pb
            .println(format!("  {} {message}", self.yellow.apply_to("!")));
    }

    /// Finaliza o spinner com uma mensagem de sucesso em verde.
    pub fn success(&self, message: &str) {
        self.pb.finish_and_clear();
        eprintln!("  {} {message}", self.green.apply_to("✓"));
    }

    /// Finaliza o spinner com uma mensagem de falha em vermelho.
    pub fn failure(&self, message: &str) {
        self.pb.finish_and_clear();
        eprintln!("  {} {message}", self.red.apply_to("✗"));
    }

    /// Imprime o auto-relato do agente formatado em JSON.
    pub fn print_status(&self, status: &Value) {
        let busy = status
            .get("isProcessing")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let header = if busy {
            self.yellow.apply_to("─── Agent Status (busy) ───")
        } else {
            self.green.apply_to("─── Agent Status (idle) ───")
        };
        println!();
        println!("{header}");
        println!("{}", serde_json::to_string_pretty(status).unwrap_or_default());
    }
}
