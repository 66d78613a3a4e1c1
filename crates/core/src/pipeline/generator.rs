//! # Section Generator
//!
//! Performs one independent streaming call per section and accumulates the
//! artifact. Errors are returned to the caller as values; the coordinator
//! records them on the section instead of failing the session.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::backend::GenerationBackend;
use crate::error::{PipelineError, Result};
use crate::models::SectionRequest;
use crate::stream::StreamReader;

/// Runs section generations against a backend
pub struct SectionGenerator {
    backend: Arc<dyn GenerationBackend>,
    /// Caps concurrent section streams when set
    limiter: Option<Arc<Semaphore>>,
}

impl SectionGenerator {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            limiter: None,
        }
    }

    /// Allow at most `max` section streams at once
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.limiter = Some(Arc::new(Semaphore::new(max.max(1))));
        self
    }

    /// Generate the complete artifact for one section
    pub async fn generate(&self, request: &SectionRequest) -> Result<String> {
        let _permit = match &self.limiter {
            Some(limiter) => Some(
                limiter
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::TaskFailed(e.to_string()))?,
            ),
            None => None,
        };

        tracing::debug!(
            index = request.section_index,
            total = request.total_sections,
            "section generation started"
        );

        let body = self.backend.open_section(request).await?;
        let artifact = StreamReader::new(body)
            .with_label(format!("section {}", request.section_index))
            .collect_text()
            .await?;

        if artifact.trim().is_empty() {
            return Err(PipelineError::Upstream {
                message: "section stream produced no content".to_string(),
                code: None,
            });
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColorScheme, OutlineRequest, Style};
    use crate::stream::ByteStream;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CannedBackend {
        body: &'static str,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CannedBackend {
        fn new(body: &'static str) -> Self {
            Self {
                body,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for CannedBackend {
        async fn open_outline(&self, _request: &OutlineRequest) -> Result<ByteStream> {
            Err(PipelineError::connection("not used"))
        }

        async fn open_section(&self, _request: &SectionRequest) -> Result<ByteStream> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            let items: Vec<Result<Vec<u8>>> = vec![Ok(self.body.as_bytes().to_vec())];
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    fn request(index: usize) -> SectionRequest {
        SectionRequest {
            instructions: String::new(),
            section_text: "# Intro".to_string(),
            section_index: index,
            total_sections: 3,
            style: Style::Business,
            color_scheme: ColorScheme::Blue,
        }
    }

    #[tokio::test]
    async fn test_generate_accumulates_artifact() {
        let backend = Arc::new(CannedBackend::new(
            "data: {\"content\": \"<h1>\"}\ndata: {\"content\": \"Intro</h1>\"}\ndata: [DONE]\n",
        ));
        let generator = SectionGenerator::new(backend);
        assert_eq!(generator.generate(&request(0)).await.unwrap(), "<h1>Intro</h1>");
    }

    #[tokio::test]
    async fn test_error_event_is_returned() {
        let backend = Arc::new(CannedBackend::new(
            "data: {\"error\": {\"message\": \"quota\", \"code\": \"rate_limited\"}}\n",
        ));
        let generator = SectionGenerator::new(backend);
        let err = generator.generate(&request(0)).await.unwrap_err();
        assert_eq!(
            err,
            PipelineError::Upstream {
                message: "quota".to_string(),
                code: Some("rate_limited".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_empty_artifact_is_failure() {
        let generator = SectionGenerator::new(Arc::new(CannedBackend::new("data: [DONE]\n")));
        assert!(generator.generate(&request(0)).await.is_err());
    }


    #[tokio::test]
    async fn test_concurrency_cap() {
        let backend = Arc::new(CannedBackend::new("data: {\"content\": \"x\"}\n"));
        let generator =
            Arc::new(SectionGenerator::new(backend.clone()).with_max_concurrency(2));

        let mut handles = Vec::new();
        for i in 0..6 {
            let generator = generator.clone();
            handles.push(tokio::spawn(async move { generator.generate(&request(i)).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(backend.peak.load(Ordering::SeqCst) <= 2);
    }
}
