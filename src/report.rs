//! Operator-facing progress reporting.
//!
//! Every component that talks to the operator takes `&dyn Reporter` instead
//! of printing directly, so the CLI owns presentation and tests can collect
//! output. There is no global printer state.

use std::cell::RefCell;

/// Sink for operator-facing messages.
pub trait Reporter {
    fn success(&self, msg: &str);
    fn warning(&self, msg: &str);
    fn error(&self, msg: &str);
    fn info(&self, msg: &str);

    /// Section header announcing the next operation.
    fn step(&self, msg: &str) {
        self.info(msg);
    }
}

/// Plain console reporter: prefixed lines, warnings/errors on stderr.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn success(&self, msg: &str) {
        println!("\u{2713} {}", msg);
    }

    fn warning(&self, msg: &str) {
        eprintln!("\u{26a0} {}", msg);
    }

    fn error(&self, msg: &str) {
        eprintln!("\u{2717} {}", msg);
    }

    fn info(&self, msg: &str) {
        println!("\u{2139} {}", msg);
    }

    fn step(&self, msg: &str) {
        println!();
        println!("\u{25b6} {}", msg);
        println!("{}", "\u{2500}".repeat(56));
    }
}

/// Collects messages instead of printing them. Used by tests that assert on
/// warnings (e.g. the partition-index fallback).
#[derive(Debug, Default)]
pub struct MemoryReporter {
    messages: RefCell<Vec<(Level, String)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Warning,
    Error,
    Info,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.borrow().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.at_level(Level::Warning)
    }

    pub fn errors(&self) -> Vec<String> {
        self.at_level(Level::Error)
    }

    fn at_level(&self, level: Level) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn push(&self, level: Level, msg: &str) {
        self.messages.borrow_mut().push((level, msg.to_string()));
    }
}

impl Reporter for MemoryReporter {
    fn success(&self, msg: &str) {
        self.push(Level::Success, msg);
    }

    fn warning(&self, msg: &str) {
        self.push(Level::Warning, msg);
    }

    fn error(&self, msg: &str) {
        self.push(Level::Error, msg);
    }

    fn info(&self, msg: &str) {
        self.push(Level::Info, msg);
    }
}
