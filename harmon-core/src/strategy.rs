//! # Estratégias de Fusão de Rótulos
//!
//! Até três fontes parcialmente sobrepostas opinam sobre cada token:
//!
//! | Fonte   | Autoridade                                  | Forma            |
//! |---------|---------------------------------------------|------------------|
//! | spans   | extensão da entidade (fronteiras)           | B/I/O/E/S        |
//! | ids     | tipo da entidade                            | ex: "B-CHEBI"    |
//! | feature | tipo, vindo do anotador baseado em regras   | já normalizada   |
//!
//! A estratégia escolhida na partida decide quais fontes são abertas e como
//! as opiniões são combinadas em um único rótulo de saída. São cinco
//! variantes fechadas em enum — a despachagem é um `match` exaustivo
//! verificado em compilação, não um nome de método montado em tempo de
//! execução.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MergeError;

/// Sentinela para "nenhum tipo aplicável".
pub const NIL: &str = "NIL";

/// Estratégia de combinação das predições de spans e ids.
///
/// Fixada pela vida inteira de uma execução de fusão.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Usa só o modelo de spans + a feature de referência: extensão do
    /// modelo, tipo das regras. Sem tipo, sem entidade.
    SpansOnly,
    /// Usa as três fontes; em desacordo de tipo, a feature de referência
    /// vence o modelo de ids.
    SpansFirst,
    /// Usa as três fontes; em desacordo de tipo, o modelo de ids vence.
    /// É o padrão.
    IdsFirst,
    /// Repassa o rótulo do modelo de ids sem alteração.
    IdsOnly,
    /// Usa só o modelo de spans, com o tipo fictício `MISC` — útil quando
    /// não há nenhuma fonte de tipos disponível.
    SpansAlone,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::IdsFirst
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeStrategy::SpansOnly => "spans-only",
            MergeStrategy::SpansFirst => "spans-first",
            MergeStrategy::IdsFirst => "ids-first",
            MergeStrategy::IdsOnly => "ids-only",
            MergeStrategy::SpansAlone => "spans-alone",
        };
        write!(f, "{name}")
    }
}

impl FromStr for MergeStrategy {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spans-only" => Ok(MergeStrategy::SpansOnly),
            "spans-first" => Ok(MergeStrategy::SpansFirst),
            "ids-first" => Ok(MergeStrategy::IdsFirst),
            "ids-only" => Ok(MergeStrategy::IdsOnly),
            "spans-alone" => Ok(MergeStrategy::SpansAlone),
            other => Err(MergeError::structural(format!(
                "estratégia de fusão desconhecida: {other:?}"
            ))),
        }
    }
}

impl MergeStrategy {
    /// A estratégia exige o stream de predições de spans?
    pub fn uses_spans(self) -> bool {
        !matches!(self, MergeStrategy::IdsOnly)
    }

    /// A estratégia exige o stream de predições de ids?
    pub fn uses_ids(self) -> bool {
        matches!(
            self,
            MergeStrategy::SpansFirst | MergeStrategy::IdsFirst | MergeStrategy::IdsOnly
        )
    }

    /// Calcula o rótulo de saída de um token.
    ///
    /// `feat` é a feature de referência já normalizada ([`NIL`] quando não
    /// há entidade); `span` e `id` são os rótulos crus dos streams abertos.
    /// Função de decisão pura: não consome stream nenhum.
    pub fn decide(
        self,
        feat: &str,
        span: Option<&str>,
        id: Option<&str>,
    ) -> Result<String, MergeError> {
        match self {
            MergeStrategy::SpansOnly => {
                let tag = required(span, "spans")?;
                if tag != "O" && feat != NIL {
                    Ok(format!("{tag}-{feat}"))
                } else {
                    Ok(format!("O-{NIL}"))
                }
            }
            MergeStrategy::SpansAlone => {
                // O tipo fictício MISC mantém a saída no formato de duas
                // partes que a conversão CoNLL→standoff espera.
                let tag = required(span, "spans")?;
                if tag == "O" {
                    Ok(format!("O-{NIL}"))
                } else {
                    Ok(format!("{tag}-MISC"))
                }
            }
            MergeStrategy::IdsOnly => Ok(required(id, "ids")?.to_string()),
            MergeStrategy::SpansFirst => decide_both(feat, span, id, true),
            MergeStrategy::IdsFirst => decide_both(feat, span, id, false),
        }
    }
}

/// Regra combinada das estratégias `spans-first` e `ids-first`.
///
/// O modelo de spans manda nas *fronteiras*; o modelo de ids e a feature de
/// referência mandam no *tipo*. `prefer_feat` decide qual fonte de tipo
/// vence quando as duas discordam e nenhuma é [`NIL`].
fn decide_both(
    feat: &str,
    span: Option<&str>,
    id: Option<&str>,
    prefer_feat: bool,
) -> Result<String, MergeError> {
    let mut tag = required(span, "spans")?;
    let id_label = required(id, "ids")?;
    // Descarta o marcador B/I/O do rótulo de ids: só o tipo interessa aqui.
    let (_, mut ty) = id_label.split_once('-').ok_or_else(|| {
        MergeError::structural(format!("rótulo de ids sem marcador: {id_label:?}"))
    })?;

    if tag != "O" {
        if feat != NIL && (prefer_feat || ty == NIL) {
            ty = feat;
        } else if ty == NIL {
            // Nenhuma fonte de tipo: rebaixa a extensão para "fora".
            tag = "O";
        }
    } else if ty != NIL {
        // O modelo de ids viu entidade onde o de spans não viu: trata o
        // token como interior de entidade.
        tag = "I";
    }
    Ok(format!("{tag}-{ty}"))
}

fn required<'a>(label: Option<&'a str>, stream: &str) -> Result<&'a str, MergeError> {
    label.ok_or_else(|| {
        MergeError::structural(format!("estratégia consultou o stream de {stream} fechado"))
    })
}
