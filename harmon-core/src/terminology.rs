//! # Tabela de Terminologia
//!
//! Os anotadores externos emitem identificadores de conceito (ex:
//! `CHEBI:27732`) sem o tipo de entidade nem o nome preferido — essa
//! informação vive em uma terminologia à parte, em formato BTH (TSV sem
//! cabeçalho). Este módulo carrega a terminologia **uma única vez**, na
//! construção, em uma tabela imutável de consulta; nada de cache
//! preenchido sob demanda nem estado mutável global.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::MergeError;
use crate::row::Row;
use crate::segment::Document;

/// Informação de um conceito da terminologia.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermEntry {
    /// Tipo de entidade (ex: "chemical"), com `/` normalizado para `_`.
    pub entity_type: String,
    /// Nome preferido do conceito.
    pub preferred_name: String,
    /// Base de dados de origem (ex: "CHEBI").
    pub db: String,
}

/// Tabela imutável: identificador de conceito → [`TermEntry`].
pub struct Terminology {
    entries: HashMap<String, TermEntry>,
}

impl Terminology {
    /// Carrega uma terminologia em formato BTH, sem cabeçalho:
    /// seis colunas `_, db, cid, _, nome preferido, tipo`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MergeError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| MergeError::io(&path, e))?;
        Self::from_reader(BufReader::new(file), path)
    }

    pub(crate) fn from_reader(
        reader: impl BufRead,
        path: PathBuf,
    ) -> Result<Self, MergeError> {
        let mut entries = HashMap::new();
        for line in reader.lines() {
            let line = line.map_err(|e| MergeError::io(&path, e))?;
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let &[_, db, cid, _, preferred_name, entity_type] = fields.as_slice() else {
                return Err(MergeError::structural(format!(
                    "linha BTH com {} campos (esperados 6) em {}",
                    fields.len(),
                    path.display()
                )));
            };
            entries.insert(
                cid.to_string(),
                TermEntry {
                    entity_type: entity_type.replace('/', "_"),
                    preferred_name: preferred_name.to_string(),
                    db: db.to_string(),
                },
            );
        }
        Ok(Self { entries })
    }

    pub fn get(&self, cid: &str) -> Option<&TermEntry> {
        self.entries.get(cid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Restaura a informação de tipo nos rótulos de um documento.
    ///
    /// Rótulos da forma `TAG-CID` são reescritos para `TAG-TIPO` segundo a
    /// tabela; um identificador ausente é erro estrutural nomeando o
    /// conceito e o documento. Devolve quantos rótulos foram reescritos.
    pub fn enrich_document(&self, doc: &mut Document) -> Result<usize, MergeError> {
        let mut rewritten = 0;
        for row in &mut doc.rows {
            let Row::Data(row) = row else { continue };
            if row.label == "O" {
                continue;
            }
            let Some((tag, cid)) = row.label.split_once('-') else {
                continue;
            };
            if cid == "NIL" {
                continue;
            }
            let entry = self.get(cid).ok_or_else(|| {
                MergeError::structural(format!(
                    "conceito desconhecido {cid:?} no documento {}",
                    doc.docid
                ))
            })?;
            row.label = format!("{tag}-{}", entry.entity_type);
            rewritten += 1;
        }
        Ok(rewritten)
    }
}
