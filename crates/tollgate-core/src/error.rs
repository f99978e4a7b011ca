/// Errors that can occur while looking up, triggering, or approving runs.
///
/// Library crates return this type directly; the binary renders it through
/// `miette` at the boundary.
///
/// # Examples
///
/// ```
/// use tollgate_core::TollgateError;
///
/// let err = TollgateError::Gate("previous pipeline didn't pass".into());
/// assert!(err.to_string().contains("didn't pass"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TollgateError {
    /// Network failure talking to the build service.
    #[error("transport error: {0}")]
    #[diagnostic(code(tollgate::transport))]
    Transport(String),

    /// The build service answered with a non-success status.
    #[error("build service returned {status}: {body}")]
    #[diagnostic(
        code(tollgate::http),
        help("a 401 usually means the token is wrong or expired")
    )]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// A response payload was not the JSON shape we expected.
    #[error("failed to decode {what}: {source}")]
    #[diagnostic(code(tollgate::decode))]
    Decode {
        /// The record that was being decoded.
        what: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The application or its run list could not be resolved.
    #[error("could not look up {target}")]
    #[diagnostic(
        code(tollgate::lookup),
        help("check the username, application name, and commit hash")
    )]
    Lookup {
        /// What was being looked up.
        target: String,
        /// The transport or decode failure behind it.
        #[source]
        source: Box<TollgateError>,
    },

    /// The upstream run did not pass, so approval is refused.
    #[error("{0}")]
    #[diagnostic(code(tollgate::gate))]
    Gate(String),

    /// No manual-approval pipeline matched the commit.
    #[error("{0}")]
    #[diagnostic(
        code(tollgate::not_found),
        help("the pipeline name must match a pipeline with manual approval enabled")
    )]
    NotFound(String),

    /// The trigger response carried no workflow item with a run ID.
    #[error("trigger response did not contain a run ID")]
    MissingRunId,

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(tollgate::config))]
    Config(String),

    /// Filesystem or output stream failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl TollgateError {
    /// Wrap `source` as a failed lookup of `target`.
    pub fn lookup(target: impl Into<String>, source: TollgateError) -> Self {
        TollgateError::Lookup {
            target: target.into(),
            source: Box::new(source),
        }
    }

    /// Build a [`TollgateError::Decode`] for the record named `what`.
    pub fn decode(what: impl Into<String>, source: serde_json::Error) -> Self {
        TollgateError::Decode {
            what: what.into(),
            source,
        }
    }
}
