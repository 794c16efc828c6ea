//! # Detokenizador WordPiece
//!
//! Os modelos de etiquetagem neurais operam sobre uma visão **subword** do
//! texto: palavras quebradas em pedaços do vocabulário do modelo, tokens
//! estruturais `[CLS]`/`[SEP]` inseridos e sequências longas truncadas.
//! Este módulo desfaz essas três transformações e devolve uma sequência
//! preguiçosa de pares `(token original, rótulo)`.
//!
//! ## Entrada
//!
//! Dois arquivos paralelos, linha a linha:
//! - **arquivo de tokens**: um subword emitido por linha. Quando o passo de
//!   etiquetagem truncou uma sequência longa demais, os sub-tokens restantes
//!   da posição truncada foram re-unidos em uma única linha separada por
//!   espaços — assim o comprimento original continua recuperável.
//! - **arquivo de rótulos**: um rótulo por linha, mesma contagem de linhas.
//!
//! ## Reconstrução
//!
//! - O primeiro token de uma linha multi-token carrega o rótulo da linha;
//!   os demais recebem o marcador de descarte `X`.
//! - Pedaços de continuação (prefixo `##`) são fundidos ao token em
//!   acumulação; o rótulo do pedaço é descartado.
//! - `[CLS]` e `[SEP]` são consumidos em silêncio e não produzem unidade.
//! - Rótulos iguais a `X`, `[CLS]` ou `[SEP]` são substituídos pelo rótulo
//!   "fora de entidade" do formato do stream antes de serem anexados a uma
//!   unidade real — posições suprimidas voltam a "sem entidade" em vez de
//!   vazar um marcador interno.
//!
//! O design é um cursor de consumo explícito (`next_unit` / exaustão
//! verificável), sem geradores cooperativos: o laço de alinhamento vira uma
//! função síncrona comum.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use crate::error::MergeError;

/// Tokens estruturais inseridos pelo tokenizador do modelo.
const CTRL_TOKENS: [&str; 2] = ["[CLS]", "[SEP]"];

/// Prefixo que marca um pedaço de continuação de subword.
const CONTINUATION: &str = "##";

/// Marcador interno de rótulo descartado.
const IGNORE_LABEL: &str = "X";

/// Formato dos rótulos de um stream de predições.
///
/// Determina qual é o rótulo "fora de entidade" usado ao suprimir
/// marcadores internos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    /// Rótulos de extensão (B/I/O/E/S), sem tipo de entidade.
    Spans,
    /// Rótulos com identificador de tipo (ex: "B-CHEBI", "O-NIL").
    Ids,
}

impl LabelKind {
    /// Rótulo que denota "não faz parte de nenhuma entidade".
    pub fn outside(self) -> &'static str {
        match self {
            LabelKind::Spans => "O",
            LabelKind::Ids => "O-NIL",
        }
    }

    /// Nome do stream para mensagens de erro.
    pub fn as_str(self) -> &'static str {
        match self {
            LabelKind::Spans => "spans",
            LabelKind::Ids => "ids",
        }
    }
}

/// A saída atômica do detokenizador: um token original e seu rótulo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionUnit {
    pub token: String,
    pub label: String,
}

/// Cursor sobre um par (arquivo de tokens, arquivo de rótulos).
///
/// Produz uma [`PredictionUnit`] por token *original* (pré-subword), sob
/// demanda e apenas para frente; nunca guarda mais de uma unidade pendente.
pub struct Detokenizer {
    tokens: Lines<Box<dyn BufRead>>,
    labels: Lines<Box<dyn BufRead>>,
    token_path: PathBuf,
    label_path: PathBuf,
    kind: LabelKind,
    /// Tokens restaurados de uma linha truncada, ainda não consumidos.
    restored: VecDeque<(String, String)>,
    /// Unidade em acumulação: recebe os pedaços `##` até a próxima palavra.
    pending: Option<PredictionUnit>,
}

impl Detokenizer {
    /// Abre os dois arquivos do stream.
    pub fn open(
        token_path: impl AsRef<Path>,
        label_path: impl AsRef<Path>,
        kind: LabelKind,
    ) -> Result<Self, MergeError> {
        let token_path = token_path.as_ref().to_path_buf();
        let label_path = label_path.as_ref().to_path_buf();
        let tokens = File::open(&token_path).map_err(|e| MergeError::io(&token_path, e))?;
        let labels = File::open(&label_path).map_err(|e| MergeError::io(&label_path, e))?;
        Ok(Self::from_readers(
            Box::new(BufReader::new(tokens)),
            Box::new(BufReader::new(labels)),
            kind,
            token_path,
            label_path,
        ))
    }

    /// Constrói o cursor a partir de leitores arbitrários (usado nos testes).
    pub(crate) fn from_readers(
        tokens: Box<dyn BufRead>,
        labels: Box<dyn BufRead>,
        kind: LabelKind,
        token_path: PathBuf,
        label_path: PathBuf,
    ) -> Self {
        Self {
            tokens: tokens.lines(),
            labels: labels.lines(),
            token_path,
            label_path,
            kind,
            restored: VecDeque::new(),
            pending: None,
        }
    }

    pub fn kind(&self) -> LabelKind {
        self.kind
    }

    /// Caminho do arquivo de rótulos, para mensagens de erro do alinhador.
    pub(crate) fn source_path(&self) -> &Path {
        &self.label_path
    }

    /// Avança para a próxima unidade, ou `None` no fim do stream.
    ///
    /// Erros de comprimento desigual entre os dois arquivos são detectados
    /// no ponto em que um deles termina antes do outro.
    pub fn next_unit(&mut self) -> Result<Option<PredictionUnit>, MergeError> {
        loop {
            let Some((token, label)) = self.next_subword()? else {
                // Fim das duas fontes: libera a última unidade acumulada.
                return Ok(self.pending.take());
            };

            if let Some(piece) = token.strip_prefix(CONTINUATION) {
                // Funde o pedaço ao token em acumulação. O rótulo do pedaço
                // é descartado: vale o rótulo atribuído quando a unidade
                // começou.
                match &mut self.pending {
                    Some(unit) => unit.token.push_str(piece),
                    None => {
                        return Err(MergeError::structural(format!(
                            "continuação {token:?} sem token anterior em {}",
                            self.token_path.display()
                        )))
                    }
                }
                continue;
            }

            // Começou uma palavra nova: o que estava acumulado está completo.
            let finished = self.pending.take();
            if !CTRL_TOKENS.contains(&token.as_str()) {
                let label = if label == IGNORE_LABEL || CTRL_TOKENS.contains(&label.as_str()) {
                    self.kind.outside().to_string()
                } else {
                    label
                };
                self.pending = Some(PredictionUnit { token, label });
            }
            if finished.is_some() {
                return Ok(finished);
            }
        }
    }

    /// Confirma que o stream foi consumido por completo.
    ///
    /// Uma unidade restante é o erro fatal de sobras de predições.
    /// O chamador só deve invocar esta checagem após uma fusão
    /// bem-sucedida, para não mascarar a causa original de uma falha.
    pub fn assert_exhausted(&mut self) -> Result<(), MergeError> {
        if self.next_unit()?.is_some() {
            return Err(MergeError::LeftoverPredictions {
                stream: self.kind.as_str(),
                path: self.label_path.clone(),
            });
        }
        Ok(())
    }

    /// Próximo par (subword, rótulo) cru, já com linhas truncadas
    /// re-expandidas. Linhas de tokens vazias consomem seu rótulo e não
    /// produzem nada.
    fn next_subword(&mut self) -> Result<Option<(String, String)>, MergeError> {
        loop {
            if let Some(pair) = self.restored.pop_front() {
                return Ok(Some(pair));
            }
            match (self.tokens.next(), self.labels.next()) {
                (None, None) => return Ok(None),
                (Some(tok_line), Some(label_line)) => {
                    let tok_line = tok_line.map_err(|e| MergeError::io(&self.token_path, e))?;
                    let label_line =
                        label_line.map_err(|e| MergeError::io(&self.label_path, e))?;
                    let label = label_line.trim();
                    for (i, token) in tok_line.split_whitespace().enumerate() {
                        // Só o primeiro token da linha fica com o rótulo;
                        // os restaurados da truncagem são descartáveis.
                        let label = if i == 0 { label } else { IGNORE_LABEL };
                        self.restored.push_back((token.to_string(), label.to_string()));
                    }
                }
                // Uma fonte terminou antes da outra.
                (Some(_), None) | (None, Some(_)) => {
                    return Err(MergeError::LengthMismatch {
                        tokens: self.token_path.clone(),
                        labels: self.label_path.clone(),
                    })
                }
            }
        }
    }
}
