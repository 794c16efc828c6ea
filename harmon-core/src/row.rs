//! # Linhas de Referência — Formato CoNLL de 4 Colunas
//!
//! O stream de referência é um arquivo TSV onde cada linha de dados tem
//! quatro campos: `token`, `offset inicial`, `offset final` e `rótulo`
//! (a feature do anotador baseado em regras na entrada, o rótulo fundido
//! na saída). Linhas em branco marcam fronteiras de sentença.
//!
//! A serialização precisa ser **bit-exata** com a convenção de entrada:
//! campos unidos por tabulação, sem aspas, linhas terminadas por `\n`.
//! Por isso o codec é orientado a linhas e feito à mão — um leitor CSV
//! genérico descartaria as linhas em branco que aqui carregam significado.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MergeError;

/// Uma linha de dados do stream de referência (ou de saída).
///
/// Os offsets referem-se ao texto original do documento e atravessam o
/// pipeline intocados: apenas o campo `label` é substituído na fusão.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRow {
    /// O token original, exatamente como anotado.
    pub token: String,
    /// Offset inicial no texto do documento (inclusivo).
    pub start: u64,
    /// Offset final no texto do documento (exclusivo).
    pub end: u64,
    /// Na entrada: a feature do anotador de regras (ex: "B-CHEBI", "O").
    /// Na saída: o rótulo fundido (ex: "B-CHEBI", "O-NIL").
    pub label: String,
}

/// Uma linha do stream de referência.
///
/// `Boundary` representa a linha em branco que separa sentenças; ela é
/// preservada na saída e nunca é repassada aos streams detokenizados.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Row {
    /// Fronteira de sentença (linha em branco).
    Boundary,
    /// Linha de dados com token, offsets e rótulo.
    Data(DataRow),
}

impl Row {
    /// Interpreta uma linha do arquivo de referência.
    ///
    /// Uma linha vazia — ou cujos campos separados por tabulação são todos
    /// vazios — é uma fronteira de sentença. Qualquer outra linha precisa
    /// ter exatamente quatro campos com offsets decimais.
    pub fn parse(line: &str) -> Result<Row, MergeError> {
        if line.split('\t').all(str::is_empty) {
            return Ok(Row::Boundary);
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 4 {
            return Err(MergeError::structural(format!(
                "esperados 4 campos, encontrados {}: {line:?}",
                fields.len()
            )));
        }
        let offset = |raw: &str| {
            raw.parse::<u64>().map_err(|_| {
                MergeError::structural(format!("offset inválido {raw:?} em {line:?}"))
            })
        };
        Ok(Row::Data(DataRow {
            token: fields[0].to_string(),
            start: offset(fields[1])?,
            end: offset(fields[2])?,
            label: fields[3].to_string(),
        }))
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self, Row::Boundary)
    }
}

impl fmt::Display for Row {
    /// Serializa a linha no formato TSV de saída (sem o `\n` final).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Row::Boundary => Ok(()),
            Row::Data(row) => write!(
                f,
                "{}\t{}\t{}\t{}",
                row.token, row.start, row.end, row.label
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_row() {
        let row = Row::parse("caffeine\t120\t128\tB-CHEBI").unwrap();
        assert_eq!(
            row,
            Row::Data(DataRow {
                token: "caffeine".to_string(),
                start: 120,
                end: 128,
                label: "B-CHEBI".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_boundary() {
        assert_eq!(Row::parse("").unwrap(), Row::Boundary);
        // Linha só com tabulações: todos os campos vazios
        assert_eq!(Row::parse("\t\t\t").unwrap(), Row::Boundary);
    }

    #[test]
    fn test_parse_wrong_arity() {
        assert!(Row::parse("token\t1\t2").is_err());
        assert!(Row::parse("token\t1\t2\tO\textra").is_err());
    }

    #[test]
    fn test_parse_bad_offset() {
        assert!(Row::parse("token\tum\t2\tO").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let line = "SARS-CoV-2\t0\t10\tB-NCBITaxon";
        let row = Row::parse(line).unwrap();
        assert_eq!(row.to_string(), line);
        assert_eq!(Row::Boundary.to_string(), "");
    }
}
