//! Error kinds for the SATP packet pipeline.

/// Failure modes the pipeline can produce.
///
/// Per-packet errors (`Malformed`, `BadAuth`, `NoRoute`) are meant to be
/// caught at the call site, counted, logged, and otherwise swallowed — they
/// never unwind past `Pipeline::on_plain`/`on_wire`. `CryptoInit` is fatal
/// for the `Connection` that raised it; `Io` surfaces collaborator failures
/// unchanged.
#[derive(Debug, thiserror::Error)]
pub enum AnytunError {
    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("authentication failed")]
    BadAuth,

    #[error("no route to destination")]
    NoRoute,

    #[error("crypto initialization failed: {0}")]
    CryptoInit(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AnytunError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        AnytunError::Malformed(detail.into())
    }

    /// Builds a `CryptoInit` error and logs it at `tracing::error!` right
    /// where it is raised — this kind is fatal for the `Connection` that
    /// raised it, so by the time it is constructed it is already on its way
    /// out, never locally recovered like `Malformed`/`BadAuth`/`NoRoute`.
    pub fn crypto_init(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        tracing::error!(detail = %detail, "crypto initialization failed");
        AnytunError::CryptoInit(detail)
    }

    /// Short tag used for structured log fields and counter names.
    pub fn kind(&self) -> &'static str {
        match self {
            AnytunError::Malformed(_) => "malformed",
            AnytunError::BadAuth => "bad_auth",
            AnytunError::NoRoute => "no_route",
            AnytunError::CryptoInit(_) => "crypto_init",
            AnytunError::Io(_) => "io",
        }
    }
}
