//! # harmon-core — Harmonização de Predições NER Biomédicas
//!
//! Este crate reconcilia predições de entidades nomeadas produzidas por
//! etiquetadores independentes que operam sobre **visões diferentes e
//! lossy do mesmo documento**, e as remonta em um único stream de rótulos
//! alinhado à sequência de tokens original.
//!
//! Três fontes opinam sobre cada token:
//!
//! 1. Um modelo neural de **spans** (fronteiras de entidade, tags B/I/O/E/S),
//!    que viu o texto re-tokenizado em subwords e truncado.
//! 2. Um modelo neural de **ids** (tipo de entidade, ex: "B-CHEBI"),
//!    sobre a mesma visão subword.
//! 3. Um anotador **baseado em regras**, cujas features viajam na quarta
//!    coluna do stream de referência CoNLL.
//!
//! ## Arquitetura do Pipeline
//!
//! O dado flui em passada única, sem retrocesso:
//!
//! 1. **Segmentação** ([`segment`]): o stream de referência é reagrupado em
//!    documentos pelos marcadores `# doc_id = ⟨id⟩`.
//! 2. **Detokenização** ([`detok`]): cada arquivo de predições subword é
//!    desfeito de volta para tokens originais, um cursor por stream.
//! 3. **Alinhamento e fusão** ([`merge`]): linha a linha, a identidade dos
//!    tokens é verificada e a [`MergeStrategy`] escolhe o rótulo final.
//! 4. **Saída** ([`pipeline`]): os documentos fundidos são escritos em
//!    streaming no mesmo formato CoNLL da referência.
//!
//! Desalinhamento é condição **fatal e reportada** ([`error`]): o núcleo
//! detecta e aborta, nunca remenda em silêncio.
//!
//! Ao redor do núcleo, [`collection`] cuida da manutenção da coleção
//! (deduplicação, exportação PubAnnotation, fusão de anotações externas) e
//! [`terminology`] restaura tipos de entidade a partir de uma tabela de
//! conceitos imutável.
//!
//! ## Exemplo de Uso
//!
//! ```no_run
//! use std::path::PathBuf;
//! use harmon_core::{harmonise, HarmoniseConfig, MergeStrategy};
//!
//! let config = HarmoniseConfig {
//!     target: PathBuf::from("merged.conll"),
//!     reference: PathBuf::from("oger.conll"),
//!     tokens: PathBuf::from("bert_tokens.txt"),
//!     span_labels: Some(PathBuf::from("span_preds.txt")),
//!     id_labels: Some(PathBuf::from("id_preds.txt")),
//!     strategy: MergeStrategy::IdsFirst,
//! };
//! harmonise(&config)?;
//! # Ok::<(), harmon_core::MergeError>(())
//! ```

pub mod collection;
pub mod detok;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod row;
pub mod segment;
pub mod strategy;
pub mod terminology;

pub use detok::{Detokenizer, LabelKind, PredictionUnit};
pub use error::MergeError;
pub use merge::PredictionMerger;
pub use pipeline::{harmonise, HarmoniseConfig};
pub use row::{DataRow, Row};
pub use segment::{Document, DocumentReader};
pub use strategy::MergeStrategy;
pub use terminology::Terminology;
