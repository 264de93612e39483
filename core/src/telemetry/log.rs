use log::{debug, info, warn};

/// Thin wrapper over the `log` facade that tags lines with a scope, usually a scan id.
#[derive(Debug, Clone, Default)]
pub struct LogManager {
    scope: Option<String>,
}

impl LogManager {
    pub fn new() -> Self {
        Self { scope: None }
    }

    pub fn scoped(scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
        }
    }

    pub fn format(&self, message: &str) -> String {
        match &self.scope {
            Some(scope) => format!("[{}] {}", scope, message),
            None => message.to_string(),
        }
    }

    pub fn record(&self, message: &str) {
        info!("{}", self.format(message));
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", self.format(message));
    }

    pub fn debug(&self, message: &str) {
        debug!("{}", self.format(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_lines_carry_prefix() {
        assert_eq!(LogManager::scoped("scan-1").format("started"), "[scan-1] started");
        assert_eq!(LogManager::new().format("started"), "started");
    }
}
