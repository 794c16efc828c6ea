//! # Erros do Pipeline de Harmonização
//!
//! Todos os erros deste crate são **fatais**: uma violação de alinhamento
//! aborta a execução inteira em vez de pular o documento problemático.
//! Saída parcial silenciosa seria pior que uma parada dura, pois os
//! consumidores downstream assumem alinhamento posicional com o formato
//! de referência.

use std::path::PathBuf;

use thiserror::Error;

/// Erro fatal do pipeline de harmonização.
///
/// Cada variante nomeia os caminhos, tokens ou documentos ofensores,
/// de modo que a mensagem final seja suficiente para localizar o problema
/// nos arquivos de entrada.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Falha de E/S ao abrir ou ler um dos arquivos do pipeline.
    #[error("erro de E/S em {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// O arquivo de tokens e o arquivo de rótulos de um mesmo stream
    /// têm quantidades diferentes de linhas.
    #[error("comprimento desigual entre {} e {}", .tokens.display(), .labels.display())]
    LengthMismatch { tokens: PathBuf, labels: PathBuf },

    /// Um token de referência e o token predito emparelhado falharam
    /// em todas as relaxações de identidade.
    #[error("tokens conflitantes: {reference} vs. {predicted}")]
    TokenMismatch {
        reference: String,
        predicted: String,
    },

    /// Um stream de predições foi consultado mas não tinha mais unidades
    /// (menos tokens originais do que as linhas de referência exigem).
    #[error("predições de {stream} esgotadas antes do fim da referência ({})", .path.display())]
    ExhaustedEarly {
        stream: &'static str,
        path: PathBuf,
    },

    /// Um stream de predições ainda tinha unidades não lidas depois que
    /// o stream de referência foi consumido por completo.
    #[error("sobraram predições não consumidas no stream de {stream} ({})", .path.display())]
    LeftoverPredictions {
        stream: &'static str,
        path: PathBuf,
    },

    /// A estratégia de fusão selecionada exige um arquivo de predições
    /// que não foi fornecido. Detectado antes de abrir qualquer stream.
    #[error("a estratégia {strategy} exige o arquivo de predições de {input}")]
    MissingInput {
        strategy: String,
        input: &'static str,
    },

    /// Linha, marcador ou documento malformado ou inconsistente.
    #[error("inconsistência estrutural: {message}")]
    Structural { message: String },
}

impl MergeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn structural(message: impl Into<String>) -> Self {
        Self::Structural {
            message: message.into(),
        }
    }
}
