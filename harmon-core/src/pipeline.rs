//! # Pipeline de Harmonização
//!
//! Orquestra os módulos do crate para uma execução completa: o
//! [segmentador](crate::segment) produz os documentos de referência, o
//! [fusor](crate::merge) calcula os rótulos finais e o resultado é
//! escrito em streaming, documento a documento.
//!
//! A execução é mono-thread, de passada única e tudo-ou-nada: qualquer
//! violação de alinhamento aborta a execução inteira. Um arquivo de saída
//! parcial deixado por uma falha não é válido e deve ser descartado pelo
//! chamador.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::error::MergeError;
use crate::merge::PredictionMerger;
use crate::segment::DocumentReader;
use crate::strategy::MergeStrategy;

/// Configuração de uma execução de harmonização.
///
/// As estratégias `spans-only`/`spans-alone`/`spans-first` exigem
/// `span_labels`; `ids-only`/`ids-first`/`spans-first` exigem `id_labels`.
/// Um caminho obrigatório ausente é reportado antes de abrir qualquer
/// stream.
#[derive(Debug, Clone)]
pub struct HarmoniseConfig {
    /// Caminho do arquivo de saída.
    pub target: PathBuf,
    /// Stream de referência: CoNLL de 4 colunas com marcadores de documento.
    pub reference: PathBuf,
    /// Arquivo de tokens emitidos pelo tokenizador do modelo.
    pub tokens: PathBuf,
    /// Arquivo de rótulos do modelo de spans (opcional).
    pub span_labels: Option<PathBuf>,
    /// Arquivo de rótulos do modelo de ids (opcional).
    pub id_labels: Option<PathBuf>,
    /// Estratégia de fusão.
    pub strategy: MergeStrategy,
}

/// Executa uma harmonização completa: funde as predições e restaura as
/// fronteiras de documento no arquivo de saída.
pub fn harmonise(config: &HarmoniseConfig) -> Result<(), MergeError> {
    let mut merger = PredictionMerger::open(
        &config.tokens,
        config.span_labels.as_deref(),
        config.id_labels.as_deref(),
        config.strategy,
    )?;
    let docs = DocumentReader::open(&config.reference)?;

    let target = File::create(&config.target).map_err(|e| MergeError::io(&config.target, e))?;
    let mut out = BufWriter::new(target);
    let werr = |e| MergeError::io(&config.target, e);

    for doc in docs {
        let doc = doc?;
        writeln!(out, "# doc_id = {}", doc.docid).map_err(werr)?;
        for row in merger.iter_merge(&doc.rows) {
            writeln!(out, "{}", row?).map_err(werr)?;
        }
    }
    // A checagem de sobras só roda quando a fusão em si terminou bem, para
    // não mascarar a causa original de uma falha.
    merger.finish()?;
    out.flush().map_err(werr)
}
