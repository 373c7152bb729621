//! Retrieval-augmented answering.
//!
//! [`Contextor::answer_with_context`] answers a question from one collection
//! and returns `None` when nothing relevant was retrieved.
//! [`Contextor::chat`] runs a chat turn with optional combined context and
//! always returns a [`ChatOutcome`]; failures are carried inside it.

pub mod api_types;
pub mod cfg;
mod error;
pub mod prompt;

pub use api_types::{AskOptions, ChatOutcome, ChatRequest, QaAnswer};
pub use cfg::ContextorConfig;
pub use error::ContextorError;
pub use prompt::{ComposedPrompt, PromptTemplate};

use std::sync::Arc;
use std::time::Instant;

use ai_llm_service::{GenerateOptions, LlmBackend, LlmGateway, LlmProvider};
use rag_store::{CombinedRetriever, RagHit, RagStore, RetrieverPart};
use tracing::{info, instrument, warn};

use api_types::unique_sources;

/// Question plus the hits retrieved for it.
struct AnswerContext {
    question: String,
    collection: String,
    hits: Vec<RagHit>,
}

/// Answering front end over a [`RagStore`] and an [`LlmGateway`].
pub struct Contextor {
    cfg: ContextorConfig,
    template: PromptTemplate,
    store: Arc<RagStore>,
    gateway: Arc<LlmGateway>,
}

impl Contextor {
    pub fn new(cfg: ContextorConfig, store: Arc<RagStore>, gateway: Arc<LlmGateway>) -> Self {
        let template = PromptTemplate::document_qa(&cfg.language);
        Self {
            cfg,
            template,
            store,
            gateway,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn config(&self) -> &ContextorConfig {
        &self.cfg
    }

    pub fn store(&self) -> &Arc<RagStore> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<LlmGateway> {
        &self.gateway
    }

    /// Retrieves from the requested collection, composes the prompt and
    /// generates with the requested backend.
    ///
    /// Returns `Ok(None)` when no chunk passes the score threshold; the
    /// backend is neither resolved nor called in that case.
    pub async fn answer_with_context(
        &self,
        question: &str,
        opts: &AskOptions,
    ) -> Result<Option<QaAnswer>, ContextorError> {
        let Some(ctx) = self.retrieve_for_answer(question, opts).await? else {
            return Ok(None);
        };
        let kind = opts.backend.unwrap_or(self.cfg.default_backend);
        let backend = self
            .gateway
            .backend(kind, opts.model.as_deref(), opts.api_key.as_deref())
            .await?;
        self.generate_answer(ctx, opts, backend.as_ref()).await.map(Some)
    }

    /// [`answer_with_context`](Self::answer_with_context) with an explicit backend.
    pub async fn answer_with_backend(
        &self,
        question: &str,
        opts: &AskOptions,
        backend: &dyn LlmBackend,
    ) -> Result<Option<QaAnswer>, ContextorError> {
        let Some(ctx) = self.retrieve_for_answer(question, opts).await? else {
            return Ok(None);
        };
        self.generate_answer(ctx, opts, backend).await.map(Some)
    }

    async fn retrieve_for_answer(
        &self,
        question: &str,
        opts: &AskOptions,
    ) -> Result<Option<AnswerContext>, ContextorError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ContextorError::InvalidInput("question must not be empty".into()));
        }
        let collection = opts
            .collection
            .clone()
            .unwrap_or_else(|| self.cfg.default_collection.clone());
        let k = opts.top_k.unwrap_or(self.cfg.top_k);
        let threshold = opts.score_threshold.unwrap_or(self.cfg.score_threshold);

        let hits = self.store.retrieve(&collection, question, k, threshold).await?;
        if hits.is_empty() {
            info!(%collection, "no relevant documents");
            return Ok(None);
        }
        Ok(Some(AnswerContext {
            question: question.to_string(),
            collection,
            hits,
        }))
    }

    #[instrument(skip_all, fields(backend = %backend.kind(), model = backend.model()))]
    async fn generate_answer(
        &self,
        ctx: AnswerContext,
        opts: &AskOptions,
        backend: &dyn LlmBackend,
    ) -> Result<QaAnswer, ContextorError> {
        let AnswerContext {
            question,
            collection,
            hits,
        } = ctx;
        let prompt = prompt::compose(&question, &hits, &self.template, self.store.counter().as_ref());
        let gen_opts = GenerateOptions {
            temperature: Some(opts.temperature.unwrap_or(self.cfg.temperature)),
            max_tokens: Some(self.cfg.max_output_tokens),
            system: None,
        };
        let answer = backend.generate(&prompt.text, &gen_opts).await?;
        info!(
            %collection,
            hits = hits.len(),
            prompt_tokens = prompt.token_count,
            "answer generated"
        );

        Ok(QaAnswer {
            answer,
            sources: unique_sources(&hits),
            prompt_tokens: prompt.token_count,
            prompt_over_soft_limit: prompt.over_soft_limit,
            model: backend.model().to_string(),
            hits,
        })
    }

    /// One chat turn. Never fails; see [`ChatOutcome::success`].
    pub async fn chat(&self, req: &ChatRequest) -> ChatOutcome {
        let started = Instant::now();
        match self
            .gateway
            .backend(req.backend, req.model.as_deref(), req.api_key.as_deref())
            .await
        {
            Ok(backend) => self.chat_with_backend(req, backend.as_ref()).await,
            Err(e) => {
                let model = req
                    .model
                    .clone()
                    .unwrap_or_else(|| self.default_model(req.backend));
                failure(model, started, &ContextorError::from(e))
            }
        }
    }

    /// [`chat`](Self::chat) with an explicit backend.
    #[instrument(skip_all, fields(backend = %backend.kind(), model = backend.model()))]
    pub async fn chat_with_backend(&self, req: &ChatRequest, backend: &dyn LlmBackend) -> ChatOutcome {
        let started = Instant::now();
        match self.try_chat(req, backend).await {
            Ok((response, sources)) => {
                let elapsed = started.elapsed();
                info!(
                    latency_ms = elapsed.as_millis() as u64,
                    context_sources = sources.len(),
                    response_len = response.len(),
                    "chat succeeded"
                );
                ChatOutcome {
                    success: true,
                    response,
                    model_used: backend.model().to_string(),
                    context_sources_used: sources,
                    processing_time_ms: elapsed.as_millis() as u64,
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    error_message: None,
                }
            }
            Err(e) => failure(backend.model().to_string(), started, &e),
        }
    }

    async fn try_chat(
        &self,
        req: &ChatRequest,
        backend: &dyn LlmBackend,
    ) -> Result<(String, Vec<String>), ContextorError> {
        let message = req.message.trim();
        if message.is_empty() {
            return Err(ContextorError::InvalidInput("message must not be empty".into()));
        }

        let mut hits = Vec::new();
        if req.use_context {
            let retriever = self.combined_retriever(&req.context_sources);
            hits = self.store.retrieve_combined(&retriever, message).await?;
            hits.truncate(self.cfg.max_context_docs);
        }
        let sources = unique_sources(&hits);

        let prompt = prompt::compose_chat(message, &hits, &self.cfg.language, self.store.counter().as_ref());
        let gen_opts = GenerateOptions {
            temperature: Some(req.temperature.unwrap_or(self.cfg.temperature)),
            max_tokens: Some(req.max_tokens.unwrap_or(self.cfg.chat_max_tokens)),
            system: None,
        };
        let response = backend.generate(&prompt.text, &gen_opts).await?;
        Ok((response, sources))
    }

    fn combined_retriever(&self, collections: &[String]) -> CombinedRetriever {
        if collections.is_empty() {
            return CombinedRetriever::with_defaults(self.cfg.top_k, self.cfg.score_threshold);
        }
        CombinedRetriever::new(
            collections
                .iter()
                .map(|c| RetrieverPart {
                    collection: c.clone(),
                    k: self.cfg.top_k,
                    threshold: self.cfg.score_threshold,
                })
                .collect(),
        )
    }

    fn default_model(&self, kind: LlmProvider) -> String {
        let gw = self.gateway.config();
        match kind {
            LlmProvider::Ollama => gw.local.model.clone(),
            LlmProvider::Gemini => gw.cloud.model.clone(),
            LlmProvider::OpenAI => gw
                .openai
                .as_ref()
                .map(|c| c.model.clone())
                .unwrap_or_default(),
        }
    }
}

fn failure(model: String, started: Instant, err: &ContextorError) -> ChatOutcome {
    let message = err.user_message();
    warn!(error = %err, "chat failed");
    ChatOutcome {
        success: false,
        response: String::new(),
        model_used: model,
        context_sources_used: Vec::new(),
        processing_time_ms: started.elapsed().as_millis() as u64,
        timestamp: chrono::Utc::now().to_rfc3339(),
        error_message: Some(message),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use ai_llm_service::backend::BoxFuture;
    use ai_llm_service::config::llm_model_config::LlmModelConfig;
    use ai_llm_service::error_handler::{
        FORBIDDEN_MESSAGE, ProviderError, ProviderErrorKind, RATE_LIMIT_MESSAGE,
    };
    use ai_llm_service::retry::RetryPolicy;
    use ai_llm_service::{AiLlmError, GatewayConfig};
    use rag_store::{EmbeddingsProvider, RagConfig, RagError, TokenCounter};

    use super::*;

    /// One bucket per known keyword.
    struct KeywordEmbedder;
    const KEYWORDS: [&str; 4] = ["urlaub", "drucker", "kantine", "gehalt"];

    impl EmbeddingsProvider for KeywordEmbedder {
        fn model_id(&self) -> String {
            "test:keywords".into()
        }
        fn embed_batch<'a>(
            &'a self,
            texts: &'a [String],
        ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, RagError>> {
            Box::pin(async move {
                Ok(texts
                    .iter()
                    .map(|t| {
                        let t = t.to_lowercase();
                        KEYWORDS.iter().map(|k| if t.contains(k) { 1.0 } else { 0.0 }).collect()
                    })
                    .collect())
            })
        }
    }

    struct Words;
    impl TokenCounter for Words {
        fn count(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    /// Records prompts; replies with `reply` or fails with `fail`.
    struct FakeBackend {
        prompts: Mutex<Vec<String>>,
        fail: Option<fn() -> AiLlmError>,
    }

    impl FakeBackend {
        fn ok() -> Self {
            Self { prompts: Mutex::new(Vec::new()), fail: None }
        }
        fn failing(f: fn() -> AiLlmError) -> Self {
            Self { prompts: Mutex::new(Vec::new()), fail: Some(f) }
        }
        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl LlmBackend for FakeBackend {
        fn kind(&self) -> LlmProvider {
            LlmProvider::Ollama
        }
        fn model(&self) -> &str {
            "fake-model"
        }
        fn generate<'a>(
            &'a self,
            prompt: &'a str,
            _opts: &'a GenerateOptions,
        ) -> BoxFuture<'a, Result<String, AiLlmError>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let res = match self.fail {
                Some(f) => Err(f()),
                None => Ok("Antwort laut Dokument 1".to_string()),
            };
            Box::pin(async move { res })
        }
    }

    fn model_cfg(provider: LlmProvider, model: &str, endpoint: &str) -> LlmModelConfig {
        LlmModelConfig {
            provider,
            model: model.into(),
            endpoint: endpoint.into(),
            api_key: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: Some(1),
        }
    }

    fn gateway() -> Arc<LlmGateway> {
        Arc::new(
            LlmGateway::new(GatewayConfig {
                local: model_cfg(LlmProvider::Ollama, "llama3", "http://localhost:11434"),
                cloud: model_cfg(LlmProvider::Gemini, "gemini-pro", "https://example.invalid/v1beta"),
                openai: None,
                embedding: model_cfg(LlmProvider::Ollama, "all-minilm", "http://localhost:11434"),
                rate_limit_requests: 14,
                rate_limit_window: Duration::from_secs(60),
                retry: RetryPolicy::default(),
                health_timeout_secs: Some(1),
            })
            .unwrap(),
        )
    }

    async fn contextor(root: &std::path::Path) -> Contextor {
        let store = RagStore::new(RagConfig::new_default(root), Arc::new(KeywordEmbedder), Arc::new(Words)).unwrap();
        for (dir, file, text) in [
            ("rag_docs", "urlaub.txt", "Urlaub wird im Portal beantragt."),
            ("rag_docs", "it.txt", "Der Drucker steht im Flur."),
            ("cag_docs", "faq.md", "Resturlaub verfällt im März."),
        ] {
            let d = root.join(dir);
            std::fs::create_dir_all(&d).unwrap();
            std::fs::write(d.join(file), text).unwrap();
            store.process_documents(&d, dir).await.unwrap();
        }
        Contextor::new(ContextorConfig::default(), Arc::new(store), gateway())
    }

    fn ask(collection: &str) -> AskOptions {
        AskOptions { collection: Some(collection.into()), ..Default::default() }
    }

    #[tokio::test]
    async fn answers_from_retrieved_documents() {
        let tmp = tempfile::tempdir().unwrap();
        let c = contextor(tmp.path()).await;
        let backend = FakeBackend::ok();

        let qa = c
            .answer_with_backend("Wie beantrage ich Urlaub?", &ask("rag_docs"), &backend)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(qa.sources, vec!["urlaub.txt"]);
        assert_eq!(qa.model, "fake-model");
        let prompt = &backend.prompts.lock().unwrap()[0];
        assert!(prompt.contains("--- Document 1 (Source: urlaub.txt) ---"));
        assert!(prompt.contains("Wie beantrage ich Urlaub?"));
        assert!(!prompt.contains("Drucker"));
    }

    #[tokio::test]
    async fn nothing_relevant_means_no_answer_and_no_call() {
        let tmp = tempfile::tempdir().unwrap();
        let c = contextor(tmp.path()).await;
        let backend = FakeBackend::ok();

        let qa = c
            .answer_with_backend("Was gibt es zu Mittag?", &ask("rag_docs"), &backend)
            .await
            .unwrap();
        assert!(qa.is_none());
        assert_eq!(backend.calls(), 0);

        let missing = c
            .answer_with_backend("Urlaub?", &ask("does_not_exist"), &backend)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn no_hits_skip_backend_resolution() {
        let tmp = tempfile::tempdir().unwrap();
        let c = contextor(tmp.path()).await;
        // Gemini without a key would fail to resolve.
        let opts = AskOptions {
            collection: Some("does_not_exist".into()),
            backend: Some(LlmProvider::Gemini),
            ..Default::default()
        };

        let qa = c.answer_with_context("Urlaub?", &opts).await.unwrap();
        assert!(qa.is_none());
    }

    #[tokio::test]
    async fn chat_uses_combined_context() {
        let tmp = tempfile::tempdir().unwrap();
        let c = contextor(tmp.path()).await;
        let backend = FakeBackend::ok();

        let out = c
            .chat_with_backend(&ChatRequest::new("Urlaub?", LlmProvider::Ollama), &backend)
            .await;
        assert!(out.success);
        assert_eq!(out.context_sources_used, vec!["urlaub.txt", "faq.md"]);
        assert_eq!(out.error_message, None);
        let prompt = &backend.prompts.lock().unwrap()[0];
        assert!(prompt.contains("[urlaub.txt]: Urlaub wird im Portal beantragt."));
        assert!(prompt.contains("BENUTZERANFRAGE: Urlaub?"));
    }

    #[tokio::test]
    async fn chat_without_context_skips_retrieval() {
        let tmp = tempfile::tempdir().unwrap();
        let c = contextor(tmp.path()).await;
        let backend = FakeBackend::ok();
        let mut req = ChatRequest::new("Urlaub?", LlmProvider::Ollama);
        req.use_context = false;

        let out = c.chat_with_backend(&req, &backend).await;
        assert!(out.success);
        assert!(out.context_sources_used.is_empty());
    }

    #[tokio::test]
    async fn chat_failures_become_user_messages() {
        let tmp = tempfile::tempdir().unwrap();
        let c = contextor(tmp.path()).await;
        let req = ChatRequest::new("Urlaub?", LlmProvider::Gemini);

        let rl = FakeBackend::failing(|| {
            ProviderError::new(LlmProvider::Gemini, ProviderErrorKind::RateLimited { retry_after_secs: None })
                .into()
        });
        let out = c.chat_with_backend(&req, &rl).await;
        assert!(!out.success);
        assert!(out.response.is_empty());
        assert!(out.context_sources_used.is_empty());
        assert_eq!(out.error_message.as_deref(), Some(RATE_LIMIT_MESSAGE));

        let forbidden = FakeBackend::failing(|| {
            ProviderError::new(LlmProvider::Gemini, ProviderErrorKind::Forbidden).into()
        });
        let out = c.chat_with_backend(&req, &forbidden).await;
        assert_eq!(out.error_message.as_deref(), Some(FORBIDDEN_MESSAGE));
    }

    #[tokio::test]
    async fn chat_without_gemini_key_fails_softly() {
        let tmp = tempfile::tempdir().unwrap();
        let c = contextor(tmp.path()).await;

        let out = c.chat(&ChatRequest::new("Hallo", LlmProvider::Gemini)).await;
        assert!(!out.success);
        assert_eq!(out.model_used, "gemini-pro");
        assert!(out.error_message.is_some());
    }

    #[tokio::test]
    async fn broken_collection_asks_for_rebuild() {
        let tmp = tempfile::tempdir().unwrap();
        let c = contextor(tmp.path()).await;
        std::fs::create_dir_all(tmp.path().join("broken_vectorstore")).unwrap();

        let mut req = ChatRequest::new("Urlaub?", LlmProvider::Ollama);
        req.context_sources = vec!["broken".into()];
        let out = c.chat_with_backend(&req, &FakeBackend::ok()).await;
        assert!(!out.success);
        assert!(out.error_message.unwrap().contains("rebuild the vector database"));
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let c = contextor(tmp.path()).await;
        let err = c
            .answer_with_backend("   ", &AskOptions::default(), &FakeBackend::ok())
            .await
            .unwrap_err();
        assert!(matches!(err, ContextorError::InvalidInput(_)));
    }
}
