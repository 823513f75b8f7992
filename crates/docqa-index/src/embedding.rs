//! Embedding service trait and implementations.
//!
//! - `OnnxEmbeddingService` loads a sentence-transformer ONNX export (e.g.
//!   all-mpnet-base-v2) via ort and tokenizes with the HuggingFace tokenizers
//!   crate. This is the production embedding backend.
//! - `HashedTokenEmbedding` hashes content words into a fixed number of
//!   buckets. Deterministic and model-free; used by tests and selectable with
//!   `retrieval.embedding_backend = "hashed"`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use docqa_core::config::RetrievalConfig;
use docqa_core::error::DocqaError;
use ort::session::Session;
use ort::value::TensorRef;
use tokenizers::Tokenizer;
use tracing::info;

use crate::text;

/// Service for generating text embeddings.
///
/// Used for both index build (chunks) and retrieval (queries); the two must
/// come from the same service for scores to mean anything.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, DocqaError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;

    /// Identifier recorded in index snapshots.
    fn model_name(&self) -> &str;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// `EmbeddingService::embed` returns `impl Future` and so cannot be used as
/// a trait object. Every `EmbeddingService` gets this trait through the
/// blanket impl below.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, DocqaError>> + Send + 'a>>;

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, DocqaError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }

    fn model_name(&self) -> &str {
        EmbeddingService::model_name(self)
    }
}

/// Build the embedder selected by `retrieval.embedding_backend`.
pub fn from_config(config: &RetrievalConfig) -> Result<Arc<dyn DynEmbeddingService>, DocqaError> {
    match config.embedding_backend.as_str() {
        "onnx" => {
            let svc = OnnxEmbeddingService::from_directory(
                Path::new(&config.model_dir),
                &config.embedding_model,
            )?;
            Ok(Arc::new(svc))
        }
        "hashed" => Ok(Arc::new(HashedTokenEmbedding::new(config.hashed_dimensions))),
        other => Err(DocqaError::Config(format!(
            "Unknown embedding backend '{}'",
            other
        ))),
    }
}

// ---------------------------------------------------------------------------
// OnnxEmbeddingService - ONNX Runtime inference
// ---------------------------------------------------------------------------

/// ONNX Runtime-backed sentence-transformer.
///
/// Expects a model directory containing `model.onnx` and `tokenizer.json`.
/// The model takes `input_ids` and `attention_mask` (plus `token_type_ids`
/// for BERT-style exports) and yields token embeddings of shape
/// `[1, seq_len, hidden]`, which are mean-pooled under the attention mask and
/// L2-normalised.
pub struct OnnxEmbeddingService {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    dimensions: usize,
    wants_token_types: bool,
    model_name: String,
}

impl std::fmt::Debug for OnnxEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingService")
            .field("model_name", &self.model_name)
            .field("dimensions", &self.dimensions)
            .field("wants_token_types", &self.wants_token_types)
            .finish()
    }
}

impl OnnxEmbeddingService {
    pub fn from_directory(model_dir: &Path, model_name: &str) -> Result<Self, DocqaError> {
        Self::from_files(
            &model_dir.join("model.onnx"),
            &model_dir.join("tokenizer.json"),
            model_name,
        )
    }

    pub fn from_files(
        model_path: &Path,
        tokenizer_path: &Path,
        model_name: &str,
    ) -> Result<Self, DocqaError> {
        if !model_path.exists() {
            return Err(DocqaError::Embedding(format!(
                "ONNX model not found at {}",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(DocqaError::Embedding(format!(
                "Tokenizer not found at {}",
                tokenizer_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| DocqaError::Embedding(format!("ONNX session builder: {}", e)))?
            .with_intra_threads(1)
            .map_err(|e| DocqaError::Embedding(format!("ONNX set threads: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| DocqaError::Embedding(format!("ONNX load model: {}", e)))?;

        // all-mpnet-base-v2 is 768 wide; dynamic axes report -1.
        let dimensions = session
            .outputs()
            .first()
            .and_then(|out| out.dtype().tensor_shape())
            .and_then(|shape| shape.last().copied())
            .map(|d| if d > 0 { d as usize } else { 768 })
            .unwrap_or(768);

        let wants_token_types = session
            .inputs()
            .iter()
            .any(|input| input.name() == "token_type_ids");

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| DocqaError::Embedding(format!("Failed to load tokenizer: {}", e)))?;

        info!(
            model = %model_path.display(),
            dimensions,
            wants_token_types,
            "Loaded ONNX embedding model"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions,
            wants_token_types,
            model_name: model_name.to_string(),
        })
    }
}

fn onnx_embed(
    session: &Mutex<Session>,
    tokenizer: &Tokenizer,
    wants_token_types: bool,
    text: &str,
) -> Result<Vec<f32>, DocqaError> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| DocqaError::Embedding(format!("Tokenization failed: {}", e)))?;

    let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
    let attention_mask: Vec<i64> = encoding
        .get_attention_mask()
        .iter()
        .map(|&m| m as i64)
        .collect();
    let token_type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();
    let seq_len = input_ids.len();

    let array = |name: &str, values: Vec<i64>| {
        ndarray::Array2::from_shape_vec((1, seq_len), values)
            .map_err(|e| DocqaError::Embedding(format!("{} array: {}", name, e)))
    };
    let ids_array = array("input_ids", input_ids)?;
    let mask_array = array("attention_mask", attention_mask.clone())?;
    let type_array = array("token_type_ids", token_type_ids)?;

    let ids_ref = TensorRef::from_array_view(&ids_array)
        .map_err(|e| DocqaError::Embedding(format!("TensorRef input_ids: {}", e)))?;
    let mask_ref = TensorRef::from_array_view(&mask_array)
        .map_err(|e| DocqaError::Embedding(format!("TensorRef attention_mask: {}", e)))?;

    let mut session = session
        .lock()
        .map_err(|e| DocqaError::Embedding(format!("Session lock poisoned: {}", e)))?;
    let outputs = if wants_token_types {
        let type_ref = TensorRef::from_array_view(&type_array)
            .map_err(|e| DocqaError::Embedding(format!("TensorRef token_type_ids: {}", e)))?;
        session.run(ort::inputs![
            "input_ids" => ids_ref,
            "attention_mask" => mask_ref,
            "token_type_ids" => type_ref,
        ])
    } else {
        session.run(ort::inputs![
            "input_ids" => ids_ref,
            "attention_mask" => mask_ref,
        ])
    }
    .map_err(|e| DocqaError::Embedding(format!("ONNX inference failed: {}", e)))?;

    let (shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| DocqaError::Embedding(format!("Extract embeddings: {}", e)))?;

    let hidden_dim = match shape.iter().copied().collect::<Vec<i64>>().as_slice() {
        [_, _, hidden] if *hidden > 0 => *hidden as usize,
        other => {
            return Err(DocqaError::Embedding(format!(
                "Unexpected output shape: {:?}",
                other
            )))
        }
    };

    let mut pooled = mean_pool(data, &attention_mask, hidden_dim);
    l2_normalize(&mut pooled);
    Ok(pooled)
}

/// Average the token rows of a `[seq_len, hidden]` buffer whose mask is set.
fn mean_pool(data: &[f32], mask: &[i64], hidden_dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_dim];
    let mut count = 0.0f32;

    for (tok_idx, &mask_val) in mask.iter().enumerate() {
        if mask_val > 0 {
            let row = &data[tok_idx * hidden_dim..(tok_idx + 1) * hidden_dim];
            for (acc, v) in pooled.iter_mut().zip(row) {
                *acc += v;
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        for val in &mut pooled {
            *val /= count;
        }
    }
    pooled
}

fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

impl EmbeddingService for OnnxEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DocqaError> {
        if text.trim().is_empty() {
            return Err(DocqaError::Embedding("Cannot embed empty text".to_string()));
        }

        // Inference is CPU-bound; keep it off the async workers.
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let wants_token_types = self.wants_token_types;
        let text_owned = text.to_string();

        tokio::task::spawn_blocking(move || {
            onnx_embed(&session, &tokenizer, wants_token_types, &text_owned)
        })
        .await
        .map_err(|e| DocqaError::Embedding(format!("Embedding task panicked: {}", e)))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// ---------------------------------------------------------------------------
// HashedTokenEmbedding - deterministic feature hashing
// ---------------------------------------------------------------------------

pub const DEFAULT_HASHED_DIMENSIONS: usize = 384;

/// Bag-of-words embedding: each content word adds 1.0 to the bucket chosen by
/// its FNV-1a hash, then the vector is L2-normalised.
///
/// All components are non-negative, so two texts sharing a word always have
/// positive cosine similarity. Texts made only of stopwords fall back to
/// hashing every token.
#[derive(Debug, Clone)]
pub struct HashedTokenEmbedding {
    dimensions: usize,
    model_name: String,
}

impl Default for HashedTokenEmbedding {
    fn default() -> Self {
        Self::new(DEFAULT_HASHED_DIMENSIONS)
    }
}

impl HashedTokenEmbedding {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_name: format!("hashed-token-{}", dimensions),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut words = text::content_words(text);
        if words.is_empty() {
            words = text::tokens(text);
        }
        if words.is_empty() {
            words.push(text.trim().to_string());
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for word in &words {
            let bucket = (fnv1a(word.as_bytes()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

/// 64-bit FNV-1a; stable across processes, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

impl EmbeddingService for HashedTokenEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DocqaError> {
        if text.trim().is_empty() {
            return Err(DocqaError::Embedding("Cannot embed empty text".to_string()));
        }
        Ok(self.vectorize(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    // ---- Hashed embedding ----

    #[tokio::test]
    async fn test_hashed_dimension() {
        let service = HashedTokenEmbedding::default();
        let vec = service.embed("hello world").await.unwrap();
        assert_eq!(vec.len(), 384);
        assert_eq!(EmbeddingService::dimensions(&service), 384);
    }

    #[tokio::test]
    async fn test_hashed_deterministic() {
        let service = HashedTokenEmbedding::new(64);
        let v1 = service.embed("same text").await.unwrap();
        let v2 = service.embed("same text").await.unwrap();
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_hashed_is_unit_length() {
        let service = HashedTokenEmbedding::default();
        let v = service.embed("testbed nodes and experiments").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_shared_words_score_higher() {
        let service = HashedTokenEmbedding::default();
        let q = service.embed("How do I reserve a node?").await.unwrap();
        let related = service
            .embed("To reserve a node, open the reservation page.")
            .await
            .unwrap();
        let unrelated = service.embed("Bananas grow in tropical climates.").await.unwrap();
        let s_rel = cosine_similarity(&q, &related);
        let s_unrel = cosine_similarity(&q, &unrelated);
        assert!(s_rel > 0.0);
        assert!(s_rel > s_unrel);
    }

    #[tokio::test]
    async fn test_hashed_empty_text_fails() {
        let service = HashedTokenEmbedding::default();
        assert!(matches!(
            service.embed("").await,
            Err(DocqaError::Embedding(_))
        ));
        assert!(service.embed("  \n").await.is_err());
    }

    #[tokio::test]
    async fn test_stopword_only_text_still_embeds() {
        let service = HashedTokenEmbedding::default();
        let v = service.embed("what is it?").await.unwrap();
        assert!(v.iter().any(|x| *x > 0.0));
    }

    #[tokio::test]
    async fn test_dyn_dispatch() {
        let service: Arc<dyn DynEmbeddingService> = Arc::new(HashedTokenEmbedding::new(16));
        let v = service.embed_boxed("dynamic").await.unwrap();
        assert_eq!(v.len(), 16);
        assert_eq!(service.model_name(), "hashed-token-16");
    }

    #[test]
    fn test_fnv_known_value() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    // ---- Pooling ----

    #[test]
    fn test_mean_pool_respects_mask() {
        let data = [1.0, 2.0, 3.0, 4.0, 100.0, 100.0];
        let pooled = mean_pool(&data, &[1, 1, 0], 2);
        assert_eq!(pooled, vec![2.0, 3.0]);
    }

    #[test]
    fn test_l2_normalize_zero_vector_untouched() {
        let mut v = vec![0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    // ---- Backend selection ----

    #[test]
    fn test_from_config_hashed() {
        let config = RetrievalConfig {
            embedding_backend: "hashed".into(),
            hashed_dimensions: 32,
            ..Default::default()
        };
        let svc = from_config(&config).unwrap();
        assert_eq!(svc.dimensions(), 32);
    }

    #[test]
    fn test_from_config_unknown_backend() {
        let config = RetrievalConfig {
            embedding_backend: "word2vec".into(),
            ..Default::default()
        };
        assert!(matches!(from_config(&config), Err(DocqaError::Config(_))));
    }

    #[test]
    fn test_onnx_missing_model() {
        let result = OnnxEmbeddingService::from_directory(Path::new("/nonexistent"), "m");
        assert!(matches!(result, Err(DocqaError::Embedding(_))));
    }
}
