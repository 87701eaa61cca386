//! Non-interactive operator driven by a queue of answers.

use std::collections::VecDeque;

use async_trait::async_trait;

use super::Operator;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Answer {
    Confirm(bool),
    Input(String),
}

/// Replays scripted answers in order.
///
/// When the queue runs dry (or the next answer is of the wrong kind),
/// confirmations are `false` and inputs take their default.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answers: VecDeque<Answer>,
    prompts: Vec<String>,
    output: Vec<String>,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a yes/no answer.
    pub fn then_confirm(mut self, answer: bool) -> Self {
        self.answers.push_back(Answer::Confirm(answer));
        self
    }

    /// Queue a text answer.
    pub fn then_input(mut self, answer: impl Into<String>) -> Self {
        self.answers.push_back(Answer::Input(answer.into()));
        self
    }

    /// Every prompt asked so far.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Everything shown so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Answers that were never consumed.
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    fn show(&mut self, text: &str) {
        self.output.push(text.to_string());
    }

    async fn confirm(&mut self, prompt: &str) -> bool {
        self.prompts.push(prompt.to_string());
        match self.answers.front() {
            Some(Answer::Confirm(answer)) => {
                let answer = *answer;
                self.answers.pop_front();
                answer
            }
            _ => false,
        }
    }

    async fn input(&mut self, prompt: &str, default: &str) -> String {
        self.prompts.push(prompt.to_string());
        match self.answers.front() {
            Some(Answer::Input(_)) => match self.answers.pop_front() {
                Some(Answer::Input(text)) => text,
                _ => default.to_string(),
            },
            _ => default.to_string(),
        }
    }
}
