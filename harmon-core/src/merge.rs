//! # Alinhador de Streams / Fusor de Predições
//!
//! Co-itera o stream de linhas de referência com um ou dois streams
//! detokenizados, impondo a identidade dos tokens a cada passo e
//! delegando a escolha do rótulo final à [`MergeStrategy`].
//!
//! ## Invariantes de alinhamento
//!
//! - Cada linha que não é fronteira consome **exatamente uma** unidade de
//!   cada stream aberto — exceto linhas cujo token é um único caractere
//!   apagado pelo tokenizador do modelo, que não consomem nada.
//! - A identidade do token precisa valer (igualdade exata, ou uma das duas
//!   relaxações documentadas abaixo); caso contrário a execução aborta.
//! - Ao final, todo stream aberto precisa estar esgotado.
//!
//! ## Relaxações de identidade
//!
//! 1. O token predito é o marcador de fora-de-vocabulário `[UNK]`.
//! 2. O token de referência tem mais de 50 caracteres — o teto aplicado ao
//!    montar a entrada dos modelos — e começa com o token predito (caso
//!    das sequências biológicas muito longas, truncadas rio acima).

use crate::detok::{Detokenizer, LabelKind};
use crate::error::MergeError;
use crate::row::{DataRow, Row};
use crate::strategy::{MergeStrategy, NIL};

/// Marcador de fora-de-vocabulário do tokenizador do modelo.
const UNK_TOKEN: &str = "[UNK]";

/// Teto de comprimento aplicado aos tokens na entrada dos modelos.
/// Acima dele vale a relaxação de prefixo.
const LONG_TOKEN_CAP: usize = 50;

/// Fusor de predições: mantém os cursores dos streams detokenizados e a
/// estratégia ativa durante uma execução.
pub struct PredictionMerger {
    spans: Option<Detokenizer>,
    ids: Option<Detokenizer>,
    strategy: MergeStrategy,
}

impl PredictionMerger {
    /// Valida a configuração e abre os streams exigidos pela estratégia.
    ///
    /// Um caminho obrigatório ausente é um erro de configuração, detectado
    /// **antes** de abrir qualquer arquivo.
    pub fn open(
        tokens: &std::path::Path,
        span_labels: Option<&std::path::Path>,
        id_labels: Option<&std::path::Path>,
        strategy: MergeStrategy,
    ) -> Result<Self, MergeError> {
        let missing = |input| MergeError::MissingInput {
            strategy: strategy.to_string(),
            input,
        };
        let span_path = strategy
            .uses_spans()
            .then(|| span_labels.ok_or_else(|| missing("spans")))
            .transpose()?;
        let id_path = strategy
            .uses_ids()
            .then(|| id_labels.ok_or_else(|| missing("ids")))
            .transpose()?;

        let spans = span_path
            .map(|p| Detokenizer::open(tokens, p, LabelKind::Spans))
            .transpose()?;
        let ids = id_path
            .map(|p| Detokenizer::open(tokens, p, LabelKind::Ids))
            .transpose()?;
        Ok(Self {
            spans,
            ids,
            strategy,
        })
    }

    /// Itera as linhas fundidas de um documento, preguiçosamente.
    ///
    /// Fronteiras de sentença passam direto; as demais linhas saem com o
    /// rótulo calculado pela estratégia ativa.
    pub fn iter_merge<'a>(
        &'a mut self,
        rows: &'a [Row],
    ) -> impl Iterator<Item = Result<Row, MergeError>> + 'a {
        rows.iter().map(move |row| match row {
            Row::Boundary => Ok(Row::Boundary),
            Row::Data(data) => {
                let label = self.merge_row(data)?;
                Ok(Row::Data(DataRow {
                    label,
                    ..data.clone()
                }))
            }
        })
    }

    /// Calcula o rótulo de saída de uma linha de dados, consumindo uma
    /// unidade de cada stream aberto quando aplicável.
    pub fn merge_row(&mut self, row: &DataRow) -> Result<String, MergeError> {
        let feat = normalize_feature(&row.label)?;
        if is_erased_token(&row.token) {
            // O tokenizador do modelo apaga esses caracteres em silêncio:
            // não existe predição para eles.
            return Ok(format!("O-{NIL}"));
        }
        let span = next_label(self.spans.as_mut(), &row.token)?;
        let id = next_label(self.ids.as_mut(), &row.token)?;
        self.strategy.decide(&feat, span.as_deref(), id.as_deref())
    }

    /// Checagem de fechamento: todo stream aberto precisa estar esgotado.
    ///
    /// Deve ser chamada apenas após uma fusão bem-sucedida, para não
    /// mascarar a causa original de uma falha anterior.
    pub fn finish(mut self) -> Result<(), MergeError> {
        for stream in [&mut self.spans, &mut self.ids] {
            if let Some(stream) = stream {
                stream.assert_exhausted()?;
            }
        }
        Ok(())
    }
}

/// Consome a próxima unidade de um stream (se aberto) e devolve seu rótulo,
/// depois de verificar a identidade do token.
fn next_label(
    stream: Option<&mut Detokenizer>,
    ref_token: &str,
) -> Result<Option<String>, MergeError> {
    let Some(stream) = stream else {
        return Ok(None);
    };
    let unit = stream.next_unit()?.ok_or_else(|| MergeError::ExhaustedEarly {
        stream: stream.kind().as_str(),
        path: stream.source_path().to_path_buf(),
    })?;
    check_same_token(ref_token, &unit.token)?;
    Ok(Some(unit.label))
}

/// Verifica a identidade entre o token de referência e o token predito.
fn check_same_token(ref_token: &str, pred_token: &str) -> Result<(), MergeError> {
    if ref_token == pred_token {
        return Ok(());
    }
    if pred_token == UNK_TOKEN {
        // Token raro, fora do vocabulário do modelo.
        return Ok(());
    }
    if ref_token.chars().count() > LONG_TOKEN_CAP && ref_token.starts_with(pred_token) {
        // Sequência longa truncada rio acima: o predito é um prefixo.
        return Ok(());
    }
    Err(MergeError::TokenMismatch {
        reference: ref_token.to_string(),
        predicted: pred_token.to_string(),
    })
}

/// Normaliza a feature de referência para a fusão.
///
/// `O` (ou qualquer feature com prefixo `O`) vira [`NIL`]; caso contrário
/// fica o menor lexicográfico dos tipos alternativos separados por `;`.
/// O desempate pelo menor é herdado do comportamento observado e mantido
/// por compatibilidade.
pub fn normalize_feature(feature: &str) -> Result<String, MergeError> {
    if feature == "O" {
        return Ok(NIL.to_string());
    }
    let (prefix, types) = feature.split_once('-').ok_or_else(|| {
        MergeError::structural(format!("feature de referência malformada: {feature:?}"))
    })?;
    if prefix == "O" {
        return Ok(NIL.to_string());
    }
    let ty = types.split(';').min().unwrap_or(types);
    Ok(ty.to_string())
}

/// O token é um único caractere que o tokenizador do modelo apaga?
///
/// O tokenizador remove caracteres das categorias Unicode C* e o símbolo
/// de substituição; para eles não há unidade predita a consumir.
fn is_erased_token(token: &str) -> bool {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => is_erased_char(c),
        _ => false,
    }
}

fn is_erased_char(c: char) -> bool {
    c == '\u{FFFD}' || c.is_control() || is_format_char(c) || is_private_use_char(c)
}

/// Caracteres de formatação (categoria Cf). `char::is_control` cobre só a
/// categoria Cc, então as faixas Cf são enumeradas aqui. Pontos de código
/// não atribuídos (Cn) ficam de fora.
fn is_format_char(c: char) -> bool {
    matches!(c,
        '\u{00AD}'
        | '\u{0600}'..='\u{0605}'
        | '\u{061C}'
        | '\u{06DD}'
        | '\u{070F}'
        | '\u{0890}'..='\u{0891}'
        | '\u{08E2}'
        | '\u{180E}'
        | '\u{200B}'..='\u{200F}'
        | '\u{202A}'..='\u{202E}'
        | '\u{2060}'..='\u{2064}'
        | '\u{2066}'..='\u{206F}'
        | '\u{FEFF}'
        | '\u{FFF9}'..='\u{FFFB}'
        | '\u{110BD}'
        | '\u{110CD}'
        | '\u{13430}'..='\u{1343F}'
        | '\u{1BCA0}'..='\u{1BCA3}'
        | '\u{1D173}'..='\u{1D17A}'
        | '\u{E0001}'
        | '\u{E0020}'..='\u{E007F}'
    )
}

fn is_private_use_char(c: char) -> bool {
    matches!(c, '\u{E000}'..='\u{F8FF}' | '\u{F0000}'..='\u{FFFFD}' | '\u{100000}'..='\u{10FFFD}')
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::PathBuf;

    use super::*;

    fn detok(tokens: &str, labels: &str, kind: LabelKind) -> Detokenizer {
        Detokenizer::from_readers(
            Box::new(Cursor::new(tokens.to_string())),
            Box::new(Cursor::new(labels.to_string())),
            kind,
            PathBuf::from("tokens.txt"),
            PathBuf::from("labels.txt"),
        )
    }

    fn data_row(token: &str, feature: &str) -> DataRow {
        DataRow {
            token: token.to_string(),
            start: 0,
            end: token.len() as u64,
            label: feature.to_string(),
        }
    }

    #[test]
    fn test_normalize_feature() {
        assert_eq!(normalize_feature("O").unwrap(), "NIL");
        assert_eq!(normalize_feature("B-CHEBI").unwrap(), "CHEBI");
        // Empate multi-tipo: menor lexicográfico
        assert_eq!(normalize_feature("B-PR;CHEBI").unwrap(), "CHEBI");
        assert_eq!(normalize_feature("O-NIL").unwrap(), "NIL");
        assert!(normalize_feature("BCHEBI").is_err());
    }

    #[test]
    fn test_check_same_token() {
        assert!(check_same_token("virus", "virus").is_ok());
        assert!(check_same_token("virus", "[UNK]").is_ok());
        // Sequência longa: prefixo basta acima do teto
        let long = "ACGT".repeat(20);
        assert!(check_same_token(&long, "ACGTACGT").is_ok());
        // Abaixo do teto o prefixo não basta
        assert!(check_same_token("ACGTACGT", "ACGT").is_err());
        assert!(matches!(
            check_same_token("virus", "viral"),
            Err(MergeError::TokenMismatch { .. })
        ));
    }

    #[test]
    fn test_erased_tokens() {
        assert!(is_erased_token("\u{7}"));
        assert!(is_erased_token("\u{AD}"));
        assert!(is_erased_token("\u{200B}"));
        assert!(is_erased_token("\u{FFFD}"));
        assert!(!is_erased_token("a"));
        // Só tokens de um único caractere contam
        assert!(!is_erased_token("\u{7}\u{7}"));
        assert!(!is_erased_token(""));
    }

    #[test]
    fn test_control_rows_consume_nothing() {
        // N linhas de controle intercaladas com M linhas comuns consomem
        // exatamente M unidades.
        let mut merger = PredictionMerger {
            spans: None,
            ids: Some(detok(
                "alpha\nbeta\n",
                "B-PR\nO-NIL\n",
                LabelKind::Ids,
            )),
            strategy: MergeStrategy::IdsOnly,
        };
        assert_eq!(merger.merge_row(&data_row("\u{7}", "O")).unwrap(), "O-NIL");
        assert_eq!(merger.merge_row(&data_row("alpha", "O")).unwrap(), "B-PR");
        assert_eq!(merger.merge_row(&data_row("\u{FFFD}", "O")).unwrap(), "O-NIL");
        assert_eq!(merger.merge_row(&data_row("beta", "O")).unwrap(), "O-NIL");
        assert!(merger.finish().is_ok());
    }

    #[test]
    fn test_merge_both_streams() {
        let mut merger = PredictionMerger {
            spans: Some(detok("caffeine\nlevels\n", "B\nO\n", LabelKind::Spans)),
            ids: Some(detok(
                "caffeine\nlevels\n",
                "O-NIL\nO-NIL\n",
                LabelKind::Ids,
            )),
            strategy: MergeStrategy::IdsFirst,
        };
        // id NIL: cai para a feature de referência
        assert_eq!(
            merger.merge_row(&data_row("caffeine", "B-CHEBI")).unwrap(),
            "B-CHEBI"
        );
        assert_eq!(merger.merge_row(&data_row("levels", "O")).unwrap(), "O-NIL");
        assert!(merger.finish().is_ok());
    }

    #[test]
    fn test_exhausted_early() {
        let mut merger = PredictionMerger {
            spans: None,
            ids: Some(detok("alpha\n", "B-PR\n", LabelKind::Ids)),
            strategy: MergeStrategy::IdsOnly,
        };
        assert_eq!(merger.merge_row(&data_row("alpha", "O")).unwrap(), "B-PR");
        assert!(matches!(
            merger.merge_row(&data_row("beta", "O")),
            Err(MergeError::ExhaustedEarly { .. })
        ));
    }

    #[test]
    fn test_leftover_predictions() {
        let merger = PredictionMerger {
            spans: None,
            ids: Some(detok("alpha\n", "B-PR\n", LabelKind::Ids)),
            strategy: MergeStrategy::IdsOnly,
        };
        assert!(matches!(
            merger.finish(),
            Err(MergeError::LeftoverPredictions { .. })
        ));
    }

    #[test]
    fn test_token_mismatch_is_fatal() {
        let mut merger = PredictionMerger {
            spans: None,
            ids: Some(detok("alpha\n", "B-PR\n", LabelKind::Ids)),
            strategy: MergeStrategy::IdsOnly,
        };
        assert!(matches!(
            merger.merge_row(&data_row("beta", "O")),
            Err(MergeError::TokenMismatch { .. })
        ));
    }

    #[test]
    fn test_iter_merge_preserves_boundaries() {
        let mut merger = PredictionMerger {
            spans: None,
            ids: Some(detok("alpha\n", "B-GO\n", LabelKind::Ids)),
            strategy: MergeStrategy::IdsOnly,
        };
        let rows = vec![
            Row::Boundary,
            Row::Data(data_row("alpha", "O")),
            Row::Boundary,
        ];
        let merged: Vec<Row> = merger
            .iter_merge(&rows)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(merged[0], Row::Boundary);
        assert_eq!(merged[2], Row::Boundary);
        match &merged[1] {
            Row::Data(row) => assert_eq!(row.label, "B-GO"),
            Row::Boundary => panic!("esperava linha de dados"),
        }
    }

    #[test]
    fn test_unknown_token_relaxation() {
        let mut merger = PredictionMerger {
            spans: None,
            ids: Some(detok("[UNK]\n", "B-SO\n", LabelKind::Ids)),
            strategy: MergeStrategy::IdsOnly,
        };
        assert_eq!(merger.merge_row(&data_row("𝜶-helix", "O")).unwrap(), "B-SO");
    }
}
