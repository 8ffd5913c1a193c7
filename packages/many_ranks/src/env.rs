//! Where environment variables come from.
//!
//! The report header quotes the run tag and, when enabled, the whole
//! environment, so the source of those strings is a seam: production code
//! reads the process environment, tests substitute a fixed map.

use std::fmt::Debug;

pub(crate) trait EnvSource: Debug + Send + Sync + 'static {
    /// The value of one variable, when set.
    fn var(&self, name: &str) -> Option<String>;

    /// Every variable as a `KEY=VALUE` line, in process order.
    fn snapshot(&self) -> Vec<String>;
}

/// The real process environment.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn snapshot(&self) -> Vec<String> {
        std::env::vars()
            .map(|(key, value)| format!("{key}={value}"))
            .collect()
    }
}

/// A fixed environment for tests. Later entries shadow earlier ones.
#[cfg(test)]
#[derive(Clone, Debug, Default)]
pub(crate) struct FakeEnv {
    vars: Vec<(String, String)>,
}

#[cfg(test)]
impl FakeEnv {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(mut self, name: &str, value: &str) -> Self {
        self.vars.push((name.to_string(), value.to_string()));
        self
    }
}

#[cfg(test)]
impl EnvSource for FakeEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    fn snapshot(&self) -> Vec<String> {
        self.vars
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect()
    }
}
