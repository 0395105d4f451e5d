//! Orchestration of a full analysis run
//!
//! preprocess → chunk → attribute speakers → (embed) → code → consolidate →
//! summarize. Code generation is the only concurrent stage and the only one
//! that can be cancelled; nothing is returned until consolidation is done.

use crate::coding::{CodeGenerator, CodingContext, CodingError, RawCode};
use crate::error::{AnalysisError, Result};
use crate::postprocess::{
    self, ConsolidatedAnalysis, Finding, HierarchyNode, PostprocessConfig, Summary, ThemeHierarchy,
};
use crate::project::{ProjectContext, ProjectLoader, SkippedFile, TranscriptSource};
use crate::text::chunking::{Chunk, ChunkId, Chunker, ChunkingConfig, ChunkingStatistics, ClusterId};
use crate::text::preprocess::{PreprocessConfig, Preprocessor};
use crate::transcript::{ParticipantType, SpeakerTurns};
use crate::util::datetime;
use crate::util::scoped_cache::ScopedCache;
use crate::util::shutdown::ShutdownWait;
use crate::vector::{Embedder, InMemoryVectorStore, VectorError};
use chrono::{DateTime, Local};
use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub inputs_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub preprocess: PreprocessConfig,
    pub postprocess: PostprocessConfig,
    pub max_concurrency: usize,
    pub enable_cache: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            inputs_dir: PathBuf::from("inputs"),
            chunking: ChunkingConfig::default(),
            preprocess: PreprocessConfig::default(),
            postprocess: PostprocessConfig::default(),
            max_concurrency: 4,
            enable_cache: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningKind {
    Service,
    Parse,
    Embedding,
}

/// A chunk whose codes (or embedding) are missing from the result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub chunk_id: ChunkId,
    pub cluster_id: ClusterId,
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    fn from_coding(chunk: &Chunk, e: &CodingError) -> Self {
        let kind = match e {
            CodingError::Service { .. } => WarningKind::Service,
            CodingError::Parse(_) => WarningKind::Parse,
        };
        Self {
            chunk_id: chunk.id,
            cluster_id: chunk.cluster_id,
            kind,
            message: e.to_string(),
        }
    }

    fn from_embedding(chunk: &Chunk, e: &VectorError) -> Self {
        Self {
            chunk_id: chunk.id,
            cluster_id: chunk.cluster_id,
            kind: WarningKind::Embedding,
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub cluster_id: ClusterId,
    pub file_name: String,
    pub participant_type: ParticipantType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorIndexInfo {
    pub count: usize,
    pub dimension: Option<usize>,
}

/// Everything a run produced; exporters are views over this
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub project_name: String,
    pub timestamp: DateTime<Local>,
    pub model: String,
    pub source_files: Vec<SourceFile>,
    pub original_texts: BTreeMap<ClusterId, String>,
    pub processed_texts: BTreeMap<ClusterId, String>,
    pub chunks: Vec<Chunk>,
    pub chunk_info: ChunkingStatistics,
    pub codes: BTreeMap<ClusterId, ThemeHierarchy>,
    pub consolidated_analysis: ConsolidatedAnalysis,
    pub cluster_summaries: BTreeMap<ClusterId, Summary>,
    pub top_findings: Vec<Finding>,
    pub insights: Vec<String>,
    pub code_hierarchy: HierarchyNode,
    pub warnings: Vec<Warning>,
    pub warning_count: usize,
    pub skipped_files: Vec<SkippedFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_index: Option<VectorIndexInfo>,
}

impl AnalysisResult {
    pub fn source_file(&self, cluster_id: ClusterId) -> Option<&SourceFile> {
        self.source_files.iter().find(|s| s.cluster_id == cluster_id)
    }
}

pub struct Analyzer {
    config: AnalyzerConfig,
    chunker: Chunker,
    preprocessor: Preprocessor,
    generator: Arc<dyn CodeGenerator>,
    embedder: Arc<dyn Embedder>,
    cache: Option<ScopedCache<String, Vec<RawCode>>>,
    semaphore: Arc<Semaphore>,
    vector_store: RwLock<InMemoryVectorStore>,
}

impl Analyzer {
    pub fn new(
        config: AnalyzerConfig,
        generator: Arc<dyn CodeGenerator>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        if config.max_concurrency == 0 {
            return Err(AnalysisError::config("max concurrency must be at least 1"));
        }
        let chunker = Chunker::new(config.chunking.clone()).map_err(|e| AnalysisError::config(e.to_string()))?;
        let preprocessor = Preprocessor::new(&config.preprocess);
        let cache = config.enable_cache.then(ScopedCache::new);
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        Ok(Self {
            config,
            chunker,
            preprocessor,
            generator,
            embedder,
            cache,
            semaphore,
            vector_store: RwLock::new(InMemoryVectorStore::new()),
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Load `inputs/<project_name>` and analyze it.
    pub async fn analyze_project(
        &self,
        project_name: &str,
        shutdown: &mut ShutdownWait,
    ) -> Result<AnalysisResult> {
        let loaded = ProjectLoader::new(&self.config.inputs_dir).load(project_name)?;
        let mut result = self
            .analyze_sources(project_name, loaded.sources, loaded.context, shutdown)
            .await?;
        let mut skipped = loaded.skipped_files;
        skipped.append(&mut result.skipped_files);
        result.skipped_files = skipped;
        Ok(result)
    }

    pub async fn analyze_sources(
        &self,
        project_name: &str,
        sources: Vec<TranscriptSource>,
        context: ProjectContext,
        shutdown: &mut ShutdownWait,
    ) -> Result<AnalysisResult> {
        info!(
            "analyzing project {} ({} transcripts, model {})",
            project_name,
            sources.len(),
            self.generator.model()
        );
        let project = Arc::new(context);
        let mut skipped_files = vec![];
        let mut chunks: Vec<Chunk> = vec![];
        let mut processed_texts = BTreeMap::new();
        let mut contexts: BTreeMap<ClusterId, CodingContext> = BTreeMap::new();

        for (index, source) in sources.iter().enumerate() {
            let processed = self.preprocessor.clean(&source.raw_text);
            match self.chunk_source(index, source, &processed) {
                Ok(mut source_chunks) => {
                    debug!("{}: {} chunks", source.file_name, source_chunks.len());
                    chunks.append(&mut source_chunks);
                }
                Err(e) => {
                    warn!("skipping {}: {}", source.file_name, e);
                    skipped_files.push(SkippedFile {
                        file_name: source.file_name.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            }
            processed_texts.insert(source.cluster_id, processed);
            contexts.insert(
                source.cluster_id,
                CodingContext::new(source.participant_type, project.clone()),
            );
        }
        if chunks.is_empty() {
            return Err(AnalysisError::validation("no chunks were produced from the transcripts"));
        }
        let chunk_info = ChunkingStatistics::from_chunks(&chunks, self.config.chunking.chunk_size);
        info!("{}", chunk_info.summary());

        let mut warnings = vec![];
        let vector_index = if self.embedder.is_enabled() {
            tokio::select! {
                biased;
                _ = shutdown.wait() => return Err(AnalysisError::Cancelled),
                index = self.embed_chunks(&chunks, &mut warnings) => Some(index),
            }
        } else {
            None
        };

        let default_context = CodingContext::new(ParticipantType::Unknown, project.clone());
        let dispatch = stream::iter(chunks.iter().map(|chunk| {
            let context = contexts.get(&chunk.cluster_id).unwrap_or(&default_context);
            async move { (chunk, self.code_chunk(chunk, context).await) }
        }))
        .buffer_unordered(self.config.max_concurrency)
        .collect::<Vec<_>>();

        let outcomes = tokio::select! {
            biased;
            _ = shutdown.wait() => {
                warn!("analysis cancelled, abandoning in-flight requests");
                return Err(AnalysisError::Cancelled);
            }
            outcomes = dispatch => outcomes,
        };

        let mut raw_codes: BTreeMap<ClusterId, Vec<RawCode>> =
            contexts.keys().map(|id| (*id, vec![])).collect();
        let mut succeeded = 0;
        for (chunk, outcome) in outcomes {
            match outcome {
                Ok(codes) => {
                    succeeded += 1;
                    raw_codes.entry(chunk.cluster_id).or_default().extend(codes);
                }
                Err(e) => {
                    warn!("no codes for chunk {}: {}", chunk.id, e);
                    warnings.push(Warning::from_coding(chunk, &e));
                }
            }
        }
        if succeeded == 0 {
            return Err(AnalysisError::NoSuccessfulChunks {
                attempted: chunks.len(),
            });
        }
        warnings.sort_by_key(|w| (w.chunk_id, w.kind as u8));
        info!(
            "coded {} of {} chunks ({} warnings)",
            succeeded,
            chunks.len(),
            warnings.len()
        );

        let postprocess_config = &self.config.postprocess;
        let codes = postprocess::consolidate(&raw_codes, postprocess_config);
        let cluster_summaries = codes
            .iter()
            .map(|(id, hierarchy)| (*id, postprocess::summarize(*id, hierarchy, postprocess_config)))
            .collect();
        let Summary {
            insights,
            top_findings,
        } = postprocess::summarize_all(&codes, postprocess_config);

        Ok(AnalysisResult {
            project_name: project_name.to_string(),
            timestamp: datetime::now(),
            model: self.generator.model().to_string(),
            source_files: sources
                .iter()
                .map(|s| SourceFile {
                    cluster_id: s.cluster_id,
                    file_name: s.file_name.clone(),
                    participant_type: s.participant_type,
                })
                .collect(),
            original_texts: sources
                .iter()
                .map(|s| (s.cluster_id, s.raw_text.clone()))
                .collect(),
            processed_texts,
            chunk_info,
            consolidated_analysis: postprocess::consolidated_analysis(&codes),
            code_hierarchy: postprocess::code_hierarchy(&codes),
            codes,
            cluster_summaries,
            top_findings,
            insights,
            warning_count: warnings.len(),
            warnings,
            skipped_files,
            vector_index,
            chunks,
        })
    }

    fn chunk_source(
        &self,
        index: usize,
        source: &TranscriptSource,
        processed: &str,
    ) -> Result<Vec<Chunk>> {
        let mut chunks = self
            .chunker
            .chunk(processed, index, source.cluster_id, None)?;
        let turns = SpeakerTurns::parse(processed);
        if !turns.is_empty() {
            for chunk in chunks.iter_mut() {
                chunk.speaker = turns.speaker_for(chunk.byte_range()).map(str::to_string);
            }
        }
        Ok(chunks)
    }

    async fn generate_bounded(
        &self,
        chunk: &Chunk,
        context: &CodingContext,
    ) -> std::result::Result<Vec<RawCode>, CodingError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| CodingError::service(None, e.to_string(), false))?;
        self.generator.generate(chunk, context).await
    }

    async fn code_chunk(
        &self,
        chunk: &Chunk,
        context: &CodingContext,
    ) -> std::result::Result<Vec<RawCode>, CodingError> {
        let Some(cache) = &self.cache else {
            return self.generate_bounded(chunk, context).await;
        };
        let key = context.content_hash(chunk);
        let (codes, computed) = cache
            .get_or_try_init(key, || self.generate_bounded(chunk, context))
            .await?;
        if computed {
            return Ok(codes);
        }
        debug!("cache hit for chunk {}", chunk.id);
        Ok(codes
            .into_iter()
            .map(|mut code| {
                code.chunk_id = chunk.id;
                code
            })
            .collect())
    }

    async fn embed_chunks(&self, chunks: &[Chunk], warnings: &mut Vec<Warning>) -> VectorIndexInfo {
        let outcomes: Vec<_> = stream::iter(chunks.iter().map(|chunk| async move {
            let _permit = self.semaphore.acquire().await.ok();
            (chunk, self.embedder.embed(&chunk.text).await)
        }))
        .buffer_unordered(self.config.max_concurrency)
        .collect()
        .await;

        let mut store = self.vector_store.write().await;
        *store = InMemoryVectorStore::new();
        let mut ordered = outcomes;
        ordered.sort_by_key(|(chunk, _)| chunk.id);
        for (chunk, outcome) in ordered {
            let added = outcome.and_then(|vector| store.add(chunk.id, vector));
            if let Err(e) = added {
                warn!("no embedding for chunk {}: {}", chunk.id, e);
                warnings.push(Warning::from_embedding(chunk, &e));
            }
        }
        info!("embedded {} of {} chunks", store.len(), chunks.len());
        VectorIndexInfo {
            count: store.len(),
            dimension: store.dimension(),
        }
    }

    /// Chunks of the last run closest to `query`. Empty when embeddings are disabled.
    pub async fn search_similar(&self, query: &str, top_k: usize) -> Result<Vec<(ChunkId, f32)>> {
        if !self.embedder.is_enabled() {
            return Ok(vec![]);
        }
        let vector = self.embedder.embed(query).await?;
        let store = self.vector_store.read().await;
        if store.is_empty() {
            return Ok(vec![]);
        }
        Ok(store.search(&vector, top_k)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::Priority;
    use crate::util::shutdown::create_lock_and_wait;
    use crate::util::tracing::tracing_init_test;
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks how many calls overlap at once
    #[derive(Default)]
    struct InFlight {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl InFlight {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    struct MockGenerator {
        fail_seq: Option<usize>,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: InFlight,
    }

    impl MockGenerator {
        fn new(fail_seq: Option<usize>, delay: Duration) -> Self {
            Self {
                fail_seq,
                delay,
                calls: AtomicUsize::new(0),
                in_flight: InFlight::default(),
            }
        }
    }

    impl CodeGenerator for MockGenerator {
        fn generate<'a>(
            &'a self,
            chunk: &'a Chunk,
            _context: &'a CodingContext,
        ) -> BoxFuture<'a, std::result::Result<Vec<RawCode>, CodingError>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.in_flight.enter();
                tokio::time::sleep(self.delay).await;
                self.in_flight.exit();
                if self.fail_seq == Some(chunk.id.seq) {
                    return Err(CodingError::service(Some(503), "unavailable", true));
                }
                Ok(vec![
                    RawCode::new(chunk.id, 0, format!("Theme {}", chunk.id.seq))
                        .with_priority(Priority::High)
                        .with_quote(chunk.text.trim(), chunk.speaker.as_deref()),
                ])
            }
            .boxed()
        }

        fn model(&self) -> &str {
            "mock-model"
        }
    }

    struct LengthEmbedder;

    impl Embedder for LengthEmbedder {
        fn embed<'a>(
            &'a self,
            text: &'a str,
        ) -> BoxFuture<'a, std::result::Result<Vec<f32>, VectorError>> {
            let price = if text.contains("price") { 1.0 } else { 0.0 };
            futures::future::ready(Ok(vec![price, 1.0 - price])).boxed()
        }

        fn is_enabled(&self) -> bool {
            true
        }
    }

    struct SlowEmbedder {
        delay: Duration,
        in_flight: InFlight,
    }

    impl Embedder for SlowEmbedder {
        fn embed<'a>(
            &'a self,
            _text: &'a str,
        ) -> BoxFuture<'a, std::result::Result<Vec<f32>, VectorError>> {
            async move {
                self.in_flight.enter();
                tokio::time::sleep(self.delay).await;
                self.in_flight.exit();
                Ok(vec![1.0, 0.0])
            }
            .boxed()
        }

        fn is_enabled(&self) -> bool {
            true
        }
    }

    fn config() -> AnalyzerConfig {
        AnalyzerConfig {
            chunking: ChunkingConfig::new(40, 0),
            ..Default::default()
        }
    }

    fn five_sentences() -> String {
        (1..=5)
            .map(|i| format!("Sentence {} talks about price.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn analyzer(generator: Arc<MockGenerator>, embedder: Arc<dyn Embedder>) -> Analyzer {
        Analyzer::new(config(), generator, embedder).unwrap()
    }

    #[tokio::test]
    async fn test_failed_chunk_becomes_warning() {
        tracing_init_test(tracing::Level::DEBUG);
        let generator = Arc::new(MockGenerator::new(Some(2), Duration::ZERO));
        let analyzer = analyzer(generator.clone(), Arc::new(crate::vector::NoopEmbedder));
        let sources = vec![TranscriptSource::new(1, "BUYER_1.txt", five_sentences())];
        let (_lock, mut wait) = create_lock_and_wait();

        let result = analyzer
            .analyze_sources("demo", sources, ProjectContext::default(), &mut wait)
            .await
            .unwrap();

        assert_eq!(result.chunks.len(), 5);
        let themes: Vec<_> = result.codes[&1]
            .iter()
            .map(|t| t.canonical_name.as_str())
            .collect();
        assert_eq!(themes, vec!["Theme 0", "Theme 1", "Theme 3", "Theme 4"]);
        assert_eq!(result.warning_count, 1);
        assert_eq!(result.warnings[0].chunk_id, ChunkId::new(0, 2));
        assert_eq!(result.warnings[0].kind, WarningKind::Service);
        assert_eq!(result.model, "mock-model");
        assert_eq!(result.top_findings.len(), 4);
        assert_eq!(result.source_files[0].participant_type, ParticipantType::Buyer);
        assert!(result.vector_index.is_none());
    }

    #[tokio::test]
    async fn test_all_chunks_failing() {
        let generator = Arc::new(MockGenerator::new(Some(0), Duration::ZERO));
        let analyzer = analyzer(generator, Arc::new(crate::vector::NoopEmbedder));
        let sources = vec![TranscriptSource::new(1, "a.txt", "Only one sentence.")];
        let (_lock, mut wait) = create_lock_and_wait();
        let err = analyzer
            .analyze_sources("demo", sources, ProjectContext::default(), &mut wait)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoSuccessfulChunks { attempted: 1 }));
    }

    #[tokio::test]
    async fn test_no_chunks() {
        let generator = Arc::new(MockGenerator::new(None, Duration::ZERO));
        let analyzer = analyzer(generator, Arc::new(crate::vector::NoopEmbedder));
        let sources = vec![TranscriptSource::new(1, "a.txt", "  \n\n ")];
        let (_lock, mut wait) = create_lock_and_wait();
        let err = analyzer
            .analyze_sources("demo", sources, ProjectContext::default(), &mut wait)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[tokio::test]
    async fn test_identical_chunks_generated_once() {
        let generator = Arc::new(MockGenerator::new(None, Duration::from_millis(20)));
        let analyzer = analyzer(generator.clone(), Arc::new(crate::vector::NoopEmbedder));
        let sources = vec![
            TranscriptSource::new(1, "a.txt", "The same words."),
            TranscriptSource::new(2, "b.txt", "The same words."),
            TranscriptSource::new(3, "c.txt", "The same words."),
        ];
        let (_lock, mut wait) = create_lock_and_wait();
        let result = analyzer
            .analyze_sources("demo", sources, ProjectContext::default(), &mut wait)
            .await
            .unwrap();

        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.codes.len(), 3);
        // cache hits carry the requesting chunk's id
        assert_eq!(result.codes[&2].themes()[0].first_seen, ChunkId::new(1, 0));
        assert_eq!(result.codes[&3].themes()[0].first_seen, ChunkId::new(2, 0));
        assert_eq!(result.consolidated_analysis.common_themes.len(), 1);
    }

    #[tokio::test]
    async fn test_same_text_different_speakers() {
        let generator = Arc::new(MockGenerator::new(None, Duration::ZERO));
        let analyzer = analyzer(generator.clone(), Arc::new(crate::vector::NoopEmbedder));
        let sources = vec![
            TranscriptSource::new(
                1,
                "a.txt",
                "Moderator: Tell me more.\nIt is far too expensive for me.",
            ),
            TranscriptSource::new(
                2,
                "b.txt",
                "P1: Tell me more about it.\nIt is far too expensive for me.",
            ),
        ];
        let (_lock, mut wait) = create_lock_and_wait();
        let result = analyzer
            .analyze_sources("demo", sources, ProjectContext::default(), &mut wait)
            .await
            .unwrap();

        let repeated = result
            .chunks
            .iter()
            .find(|c| c.id == ChunkId::new(1, 1))
            .unwrap();
        assert_eq!(repeated.speaker.as_deref(), Some("P1"));
        // same text under another speaker is a separate request
        assert_eq!(result.chunks.len(), 4);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 4);

        let quote = result.codes[&2]
            .iter()
            .flat_map(|t| t.all_quotes())
            .find(|q| q.chunk_id == ChunkId::new(1, 1))
            .unwrap();
        assert_eq!(quote.text, "It is far too expensive for me.");
        assert_eq!(quote.speaker, "P1");
    }

    #[tokio::test]
    async fn test_dispatch_respects_concurrency_limit() {
        let generator = Arc::new(MockGenerator::new(None, Duration::from_millis(20)));
        let embedder = Arc::new(SlowEmbedder {
            delay: Duration::from_millis(20),
            in_flight: InFlight::default(),
        });
        let analyzer = Analyzer::new(
            AnalyzerConfig {
                max_concurrency: 2,
                enable_cache: false,
                ..config()
            },
            generator.clone(),
            embedder.clone(),
        )
        .unwrap();
        let text = (1..=8)
            .map(|i| format!("Sentence {} talks about price.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let sources = vec![TranscriptSource::new(1, "a.txt", text)];
        let (_lock, mut wait) = create_lock_and_wait();
        let result = analyzer
            .analyze_sources("demo", sources, ProjectContext::default(), &mut wait)
            .await
            .unwrap();

        assert_eq!(result.chunks.len(), 8);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 8);
        assert_eq!(generator.in_flight.peak(), 2);
        assert_eq!(embedder.in_flight.peak(), 2);
        assert_eq!(result.vector_index.map(|v| v.count), Some(8));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let generator = Arc::new(MockGenerator::new(None, Duration::from_secs(30)));
        let analyzer = analyzer(generator, Arc::new(crate::vector::NoopEmbedder));
        let sources = vec![TranscriptSource::new(1, "a.txt", five_sentences())];
        let (lock, mut wait) = create_lock_and_wait();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            lock.unlock();
        });

        let err = analyzer
            .analyze_sources("demo", sources, ProjectContext::default(), &mut wait)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Cancelled));
        assert_eq!(err.exit_code(), 130);
    }

    #[tokio::test]
    async fn test_speaker_attribution() {
        let generator = Arc::new(MockGenerator::new(None, Duration::ZERO));
        let analyzer = analyzer(generator, Arc::new(crate::vector::NoopEmbedder));
        let text = "Moderator: Thoughts on it?\nP1 [00:01 - 00:09]: Too expensive.";
        let sources = vec![TranscriptSource::new(1, "a.txt", text)];
        let (_lock, mut wait) = create_lock_and_wait();
        let result = analyzer
            .analyze_sources("demo", sources, ProjectContext::default(), &mut wait)
            .await
            .unwrap();
        let speakers: Vec<_> = result
            .chunks
            .iter()
            .map(|c| c.speaker.as_deref())
            .collect();
        assert_eq!(speakers, vec![Some("Moderator"), Some("P1")]);
    }

    #[tokio::test]
    async fn test_embeddings_and_search() {
        let generator = Arc::new(MockGenerator::new(None, Duration::ZERO));
        let analyzer = analyzer(generator, Arc::new(LengthEmbedder));
        let text = "We discussed the price at length. The colour was nice.";
        let sources = vec![TranscriptSource::new(1, "a.txt", text)];
        let (_lock, mut wait) = create_lock_and_wait();
        let result = analyzer
            .analyze_sources("demo", sources, ProjectContext::default(), &mut wait)
            .await
            .unwrap();
        assert_eq!(
            result.vector_index,
            Some(VectorIndexInfo {
                count: 2,
                dimension: Some(2)
            })
        );

        let nearest = analyzer.search_similar("what about price", 1).await.unwrap();
        assert_eq!(nearest.len(), 1);
        assert_eq!(nearest[0].0, ChunkId::new(0, 0));
    }

    #[tokio::test]
    async fn test_analyze_project() {
        let inputs = tempfile::TempDir::new().unwrap();
        let transcripts = inputs.path().join("demo").join("transcripts");
        std::fs::create_dir_all(&transcripts).unwrap();
        std::fs::write(transcripts.join("BUYER_1.txt"), "It costs too much.").unwrap();

        let generator = Arc::new(MockGenerator::new(None, Duration::ZERO));
        let analyzer = Analyzer::new(
            AnalyzerConfig {
                inputs_dir: inputs.path().to_path_buf(),
                ..config()
            },
            generator,
            Arc::new(crate::vector::NoopEmbedder),
        )
        .unwrap();
        let (_lock, mut wait) = create_lock_and_wait();
        let result = analyzer.analyze_project("demo", &mut wait).await.unwrap();
        assert_eq!(result.project_name, "demo");
        assert_eq!(result.codes[&1].len(), 1);
        assert_eq!(result.original_texts[&1], "It costs too much.");
    }
}
