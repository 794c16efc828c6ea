//! # Segmentador de Documentos
//!
//! O stream de referência é um arquivo único e plano contendo a coleção
//! inteira; as fronteiras de documento viajam dentro do próprio stream,
//! como linhas-marcador da forma `# doc_id = ⟨id⟩`. Este módulo reagrupa
//! as linhas em documentos, um por marcador, materializando no máximo um
//! documento por vez — a memória fica limitada ao tamanho do maior
//! documento, não da coleção.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::MergeError;
use crate::row::Row;

/// Prefixo literal das linhas-marcador de documento.
const MARKER_PREFIX: &str = "# doc_id =";

/// Um documento da coleção: identificador mais as linhas de anotação,
/// com as fronteiras de sentença preservadas como [`Row::Boundary`].
///
/// Um documento sem nenhuma linha é válido (marcador no fim do arquivo)
/// e produz um documento de saída sem conteúdo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub docid: String,
    pub rows: Vec<Row>,
}

impl Document {
    /// Verdadeiro se o documento não tem nenhuma linha de dados.
    pub fn is_empty(&self) -> bool {
        !self.rows.iter().any(|row| !row.is_boundary())
    }
}

/// Extrai o identificador de uma linha-marcador, se for uma.
pub fn parse_marker(line: &str) -> Option<&str> {
    line.strip_prefix(MARKER_PREFIX).map(str::trim)
}

/// Iterador preguiçoso de documentos sobre o stream de referência.
///
/// Cada chamada a `next` lê linhas até o próximo marcador (exclusivo) ou o
/// fim do arquivo. Linhas de dados antes do primeiro marcador são um erro
/// estrutural: o marcador é a única forma sancionada de abrir um documento.
pub struct DocumentReader<R: BufRead> {
    lines: Lines<R>,
    path: PathBuf,
    /// Marcador já lido que pertence ao próximo documento.
    next_docid: Option<String>,
    finished: bool,
}

impl DocumentReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MergeError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| MergeError::io(&path, e))?;
        Ok(Self::new(BufReader::new(file), path))
    }
}

impl<R: BufRead> DocumentReader<R> {
    pub fn new(reader: R, path: PathBuf) -> Self {
        Self {
            lines: reader.lines(),
            path,
            next_docid: None,
            finished: false,
        }
    }

    fn fail(&mut self, error: MergeError) -> Option<Result<Document, MergeError>> {
        self.finished = true;
        Some(Err(error))
    }
}

impl<R: BufRead> Iterator for DocumentReader<R> {
    type Item = Result<Document, MergeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let mut docid = self.next_docid.take();
        let mut rows = Vec::new();
        loop {
            match self.lines.next() {
                None => {
                    self.finished = true;
                    return docid.map(|docid| Ok(Document { docid, rows }));
                }
                Some(Err(e)) => return self.fail(MergeError::io(&self.path, e)),
                Some(Ok(line)) => {
                    if let Some(id) = parse_marker(&line) {
                        match docid.take() {
                            // Fecha o documento corrente; o marcador fica
                            // guardado para a próxima chamada.
                            Some(current) => {
                                self.next_docid = Some(id.to_string());
                                return Some(Ok(Document {
                                    docid: current,
                                    rows,
                                }));
                            }
                            None => docid = Some(id.to_string()),
                        }
                    } else if docid.is_none() {
                        return self.fail(MergeError::structural(format!(
                            "linha de dados antes do primeiro marcador de documento em {}",
                            self.path.display()
                        )));
                    } else {
                        match Row::parse(&line) {
                            Ok(row) => rows.push(row),
                            Err(e) => return self.fail(e),
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::row::DataRow;

    fn reader(content: &str) -> DocumentReader<Cursor<String>> {
        DocumentReader::new(Cursor::new(content.to_string()), PathBuf::from("ref.conll"))
    }

    #[test]
    fn test_two_documents() {
        let content = "\
# doc_id = 101
virus\t0\t5\tO

# doc_id = 102
caffeine\t0\t8\tB-CHEBI
";
        let docs: Vec<Document> = reader(content).map(Result::unwrap).collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].docid, "101");
        assert_eq!(
            docs[0].rows,
            vec![
                Row::Data(DataRow {
                    token: "virus".to_string(),
                    start: 0,
                    end: 5,
                    label: "O".to_string(),
                }),
                Row::Boundary,
            ]
        );
        assert_eq!(docs[1].docid, "102");
        assert_eq!(docs[1].rows.len(), 1);
    }

    #[test]
    fn test_trailing_empty_document() {
        let content = "# doc_id = 101\nvirus\t0\t5\tO\n# doc_id = 102\n";
        let docs: Vec<Document> = reader(content).map(Result::unwrap).collect();
        assert_eq!(docs.len(), 2);
        assert!(docs[1].rows.is_empty());
        assert!(docs[1].is_empty());
    }

    #[test]
    fn test_rows_before_first_marker() {
        let mut docs = reader("virus\t0\t5\tO\n");
        assert!(matches!(
            docs.next(),
            Some(Err(MergeError::Structural { .. }))
        ));
        // Iterador encerra depois do erro
        assert!(docs.next().is_none());
    }

    #[test]
    fn test_empty_stream() {
        assert!(reader("").next().is_none());
    }

    #[test]
    fn test_parse_marker() {
        assert_eq!(parse_marker("# doc_id = 12345"), Some("12345"));
        assert_eq!(parse_marker("token\t0\t5\tO"), None);
    }
}
