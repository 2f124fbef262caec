use thiserror::Error;

/// Rejection of tool arguments, raised before any remote call is attempted.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("missing required argument `{0}`")]
    Missing(String),
    #[error("argument `{name}` is not valid JSON: {reason}")]
    MalformedJson { name: String, reason: String },
    #[error("argument `{name}` is invalid: {reason}")]
    Invalid { name: String, reason: String },
    #[error("unknown argument `{0}`")]
    Unknown(String),
}

impl ArgumentError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid { name: name.into(), reason: reason.into() }
    }

    pub fn argument(&self) -> &str {
        match self {
            Self::Missing(name) | Self::Unknown(name) => name,
            Self::MalformedJson { name, .. } | Self::Invalid { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ArgumentError;

    #[test]
    fn messages_name_the_argument() {
        let error = ArgumentError::MalformedJson {
            name: "filter_params".to_owned(),
            reason: "expected value at line 1 column 2".to_owned(),
        };
        assert_eq!(error.argument(), "filter_params");
        assert!(error.to_string().contains("filter_params"));

        let error = ArgumentError::invalid("limit", "must not be negative");
        assert_eq!(error.to_string(), "argument `limit` is invalid: must not be negative");
    }
}
