use thiserror::Error;

/// Errors raised while assembling the core from its configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// A tunable or path failed validation, or logging could not start.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A host bridge is absent and no desktop default can stand in.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    /// A desktop default bridge could not be constructed.
    #[error("Failed to create default {bridge}: {message}")]
    DefaultBridge {
        bridge: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bridge_error_names_the_bridge() {
        let err = Error::DefaultBridge {
            bridge: "SettingsStore",
            message: "database is locked".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to create default SettingsStore: database is locked"
        );
    }
}
