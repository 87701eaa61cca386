//! Terminal operator backed by dialoguer.

use async_trait::async_trait;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input};
use tracing::warn;

use super::Operator;

/// Prompts on the controlling terminal.
///
/// Prompts block, so they run on the blocking pool. If a prompt cannot be
/// shown (no TTY, closed stdin) confirmations answer "no" and inputs keep
/// their default.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleOperator {
    color: bool,
}

impl ConsoleOperator {
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

impl Default for ConsoleOperator {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl Operator for ConsoleOperator {
    fn show(&mut self, text: &str) {
        println!("{text}");
    }

    async fn confirm(&mut self, prompt: &str) -> bool {
        let prompt = prompt.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .default(false)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!(error = %e, "confirmation prompt failed; answering no");
                false
            }
            Err(e) => {
                warn!(error = %e, "confirmation prompt task failed; answering no");
                false
            }
        }
    }

    async fn input(&mut self, prompt: &str, default: &str) -> String {
        let prompt = prompt.to_string();
        let fallback = default.to_string();
        let initial = fallback.clone();
        let answer = tokio::task::spawn_blocking(move || {
            Input::<String>::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .default(initial)
                .allow_empty(true)
                .interact_text()
        })
        .await;

        match answer {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!(error = %e, "input prompt failed; using default");
                fallback
            }
            Err(e) => {
                warn!(error = %e, "input prompt task failed; using default");
                fallback
            }
        }
    }

    fn color(&self) -> bool {
        self.color
    }
}
