use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Result of waiting for the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heard {
    Word(String),
    /// timeout or empty input
    Nothing,
    /// source is gone for good
    Closed,
}

/// Produces already recognized words.
///
/// Speech recognition lives outside this process, anything able to hand over
/// a word fits here.
#[async_trait]
pub trait CommandSource: Send {
    async fn listen(&mut self, timeout: Duration) -> Heard;
}

/// One word per line on standard input
pub struct StdinCommandSource {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinCommandSource {
    pub fn new() -> Self {
        StdinCommandSource {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinCommandSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandSource for StdinCommandSource {
    async fn listen(&mut self, timeout: Duration) -> Heard {
        match tokio::time::timeout(timeout, self.lines.next_line()).await {
            Err(_) => Heard::Nothing,
            Ok(Ok(Some(line))) => to_heard(&line),
            Ok(Ok(None)) => Heard::Closed,
            Ok(Err(error)) => {
                tracing::error!(%error, "Failed reading commands");
                Heard::Closed
            }
        }
    }
}

/// Fixed list of words, closes once they run out
pub struct ScriptedCommandSource {
    words: VecDeque<String>,
}

impl ScriptedCommandSource {
    pub fn new(words: &[&str]) -> Self {
        ScriptedCommandSource {
            words: words.iter().map(|word| word.to_string()).collect(),
        }
    }
}

#[async_trait]
impl CommandSource for ScriptedCommandSource {
    async fn listen(&mut self, _timeout: Duration) -> Heard {
        match self.words.pop_front() {
            Some(word) => to_heard(&word),
            None => Heard::Closed,
        }
    }
}

fn to_heard(line: &str) -> Heard {
    let word = line.trim();
    if word.is_empty() {
        Heard::Nothing
    } else {
        Heard::Word(word.to_owned())
    }
}
