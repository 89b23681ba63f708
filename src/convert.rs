//! Eager (whole-document) conversion entry points.
//!
//! These run one session to its terminal state and hand back the finished
//! Markdown. Use [`crate::session::SessionSlot`] directly when a display
//! needs live snapshots or may start a new conversion mid-stream.

use crate::backend::{ConversionBackend, HttpBackend};
use crate::config::ClientConfig;
use crate::error::MarkstreamError;
use crate::input::ConversionRequest;
use crate::output;
use crate::progress::{NoopObserver, ObserverRef};
use crate::session::{ConversionSession, SessionOutcome};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Convert a document path or URL through the configured HTTP backend.
///
/// # Errors
/// - [`MarkstreamError::Validation`] — bad input; nothing was sent
/// - [`MarkstreamError::ApiKeyMissing`] — the backend has no stored key
/// - [`MarkstreamError::Session`] — the conversion failed mid-way
pub async fn convert(
    input: impl AsRef<str>,
    config: &ClientConfig,
) -> Result<String, MarkstreamError> {
    let request = ConversionRequest::parse(input.as_ref())?;
    let backend = HttpBackend::new(config)?;
    if !backend.has_api_key().await? {
        return Err(MarkstreamError::ApiKeyMissing);
    }
    convert_with(request, &backend, config, Arc::new(NoopObserver)).await
}

/// Run one session against any backend, reporting to `observer`.
pub async fn convert_with(
    request: ConversionRequest,
    backend: &dyn ConversionBackend,
    config: &ClientConfig,
    observer: ObserverRef,
) -> Result<String, MarkstreamError> {
    info!("Starting conversion: {}", request);
    let mut session = ConversionSession::new(request, config, observer);
    match session.run(backend).await {
        SessionOutcome::Completed(markdown) => Ok(markdown),
        SessionOutcome::Failed { error, .. } => Err(error.into()),
        SessionOutcome::Cancelled => Err(MarkstreamError::Cancelled),
    }
}

/// Convert and write the result atomically to `output_path`.
///
/// Nothing is written when the conversion fails. Returns the byte length
/// of the written document.
pub async fn convert_to_file(
    input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ClientConfig,
) -> Result<usize, MarkstreamError> {
    let markdown = convert(input, config).await?;
    output::write_markdown(output_path.as_ref(), &markdown).await?;
    Ok(markdown.len())
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<str>,
    config: &ClientConfig,
) -> Result<String, MarkstreamError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| MarkstreamError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[tokio::test]
    async fn invalid_url_never_reaches_backend() {
        // Port 9 (discard) is never contacted: validation fails first.
        let config = ClientConfig::builder()
            .base_url("http://127.0.0.1:9")
            .build()
            .unwrap();
        let err = convert("https://", &config).await.unwrap_err();
        assert!(matches!(
            err,
            MarkstreamError::Validation(ValidationError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn convert_sync_reports_validation_errors() {
        let err = convert_sync("", &ClientConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            MarkstreamError::Validation(ValidationError::NoFileSelected)
        ));
    }
}
