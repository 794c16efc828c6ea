//! # Utilitários de Coleção
//!
//! Manutenção da coleção de documentos CoNLL ao redor da fusão
//! propriamente dita: deduplicação, descarte de documentos vazios,
//! remoção de anotações ("naked CoNLL"), fusão de anotações externas e
//! exportação para o formato PubAnnotation.
//!
//! Diferente do núcleo de fusão, que é estritamente streaming, estas
//! operações trabalham sobre a coleção materializada — elas reordenam,
//! comparam e removem documentos inteiros.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use rayon::prelude::*;
use regex::Regex;
use serde_json::json;

use crate::error::MergeError;
use crate::row::{DataRow, Row};
use crate::segment::{Document, DocumentReader};

/// Carrega uma coleção inteira de um arquivo CoNLL com marcadores.
pub fn load_collection(path: impl AsRef<Path>) -> Result<Vec<Document>, MergeError> {
    DocumentReader::open(path)?.collect()
}

/// Escreve uma coleção no mesmo formato CoNLL de entrada, com um marcador
/// `# doc_id = ⟨id⟩` por documento.
pub fn write_collection(
    path: impl AsRef<Path>,
    docs: &[Document],
) -> Result<(), MergeError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| MergeError::io(path, e))?;
    let mut out = BufWriter::new(file);
    let werr = |e| MergeError::io(path, e);
    for doc in docs {
        writeln!(out, "# doc_id = {}", doc.docid).map_err(werr)?;
        for row in &doc.rows {
            writeln!(out, "{row}").map_err(werr)?;
        }
    }
    out.flush().map_err(werr)
}

/// Remove as ocorrências não-finais de documentos duplicados.
///
/// Quando o mesmo identificador aparece mais de uma vez, vale a **última**
/// ocorrência (presume-se ser a re-anotação mais recente). Devolve quantos
/// documentos foram removidos.
pub fn dedup_documents(docs: &mut Vec<Document>) -> usize {
    let before = docs.len();
    let mut seen = HashSet::new();
    let mut kept: Vec<Document> = docs
        .drain(..)
        .rev()
        .filter(|doc| seen.insert(doc.docid.clone()))
        .collect();
    kept.reverse();
    *docs = kept;
    before - docs.len()
}

/// Remove documentos sem nenhuma linha de dados. Devolve quantos saíram.
pub fn drop_empty_documents(docs: &mut Vec<Document>) -> usize {
    let before = docs.len();
    docs.retain(|doc| !doc.is_empty());
    before - docs.len()
}

/// Zera as anotações de um documento: todo rótulo vira `O`.
///
/// Produz o "CoNLL pelado" usado como entrada neutra para re-anotação.
pub fn strip_annotations(doc: &mut Document) {
    for row in &mut doc.rows {
        if let Row::Data(row) = row {
            row.label = "O".to_string();
        }
    }
}

/// Um trecho de entidade reconstruído a partir dos rótulos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpan {
    /// Offset inicial no texto do documento (da primeira linha do trecho).
    pub start: u64,
    /// Offset final no texto do documento (da última linha do trecho).
    pub end: u64,
    /// Tipo da entidade.
    pub entity_type: String,
}

/// Reconstrói os trechos de entidade de uma sequência de linhas rotuladas.
///
/// Máquina de estados sobre os prefixos `B`/`I`/`E`/`S`/`O`:
/// - `B-X` e `S-X` abrem um trecho novo (fechando o anterior, se houver);
///   `S-X` fecha imediatamente.
/// - `I-X` e `E-X` continuam um trecho do mesmo tipo; de tipo diferente ou
///   sem trecho aberto, valem como início (anotação inconsistente é
///   tolerada aqui — este não é o caminho de validação).
/// - `O`, tipo `NIL` e fronteiras de sentença fecham o trecho corrente.
pub fn label_spans(rows: &[Row]) -> Vec<LabelSpan> {
    let mut spans = Vec::new();
    // (tipo, início, fim) do trecho em aberto
    let mut open: Option<(String, u64, u64)> = None;

    for row in rows {
        let Row::Data(row) = row else {
            close(&mut spans, &mut open);
            continue;
        };
        let (tag, ty) = match row.label.split_once('-') {
            Some((tag, ty)) if tag != "O" && ty != "NIL" => (tag, ty),
            _ => {
                close(&mut spans, &mut open);
                continue;
            }
        };
        let continues = (tag == "I" || tag == "E")
            && matches!(&open, Some((open_ty, _, _)) if open_ty == ty);
        if continues {
            if let Some((_, _, end)) = &mut open {
                *end = row.end;
            }
            if tag == "E" {
                close(&mut spans, &mut open);
            }
        } else {
            close(&mut spans, &mut open);
            open = Some((ty.to_string(), row.start, row.end));
            if tag == "S" {
                close(&mut spans, &mut open);
            }
        }
    }
    close(&mut spans, &mut open);
    spans
}

fn close(spans: &mut Vec<LabelSpan>, open: &mut Option<(String, u64, u64)>) {
    if let Some((entity_type, start, end)) = open.take() {
        spans.push(LabelSpan {
            start,
            end,
            entity_type,
        });
    }
}

/// Exporta cada documento como um arquivo JSON no formato PubAnnotation
/// (`⟨docid⟩.json` dentro de `out_dir`), em paralelo.
pub fn export_pubannotation(
    docs: &[Document],
    out_dir: impl AsRef<Path>,
    sourcedb: &str,
) -> Result<(), MergeError> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir).map_err(|e| MergeError::io(out_dir, e))?;

    docs.par_iter().try_for_each(|doc| {
        let denotations: Vec<_> = label_spans(&doc.rows)
            .iter()
            .enumerate()
            .map(|(i, span)| {
                json!({
                    "id": format!("T{}", i + 1),
                    "span": { "begin": span.start, "end": span.end },
                    "obj": span.entity_type,
                })
            })
            .collect();
        let payload = json!({
            "sourcedb": sourcedb,
            "sourceid": doc.docid,
            "denotations": denotations,
        });
        let path = out_dir.join(format!("{}.json", doc.docid));
        let body = serde_json::to_string(&payload)
            .map_err(|e| MergeError::structural(e.to_string()))?;
        fs::write(&path, body).map_err(|e| MergeError::io(&path, e))
    })
}

/// Resultado de uma fusão de anotações externas.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExternalMergeReport {
    /// Rótulos `O` da coleção primária preenchidos a partir das externas.
    pub filled: usize,
    /// Identificadores da coleção primária que nenhuma externa mencionou.
    pub unmerged: Vec<String>,
}

/// Incorpora anotações de coleções externas na coleção primária.
///
/// As coleções são alinhadas documento a documento pelo identificador —
/// as externas podem estar fora de ordem em relação à primária, mas
/// precisam concordar posição a posição entre si. Um documento externo sem
/// contraparte na primária, ou um grupo externo com identificadores
/// divergentes, é erro estrutural. Sentenças são conferidas pelo texto,
/// sem considerar diferenças de espaçamento.
///
/// A fusão em si é posicional por offsets: um rótulo externo diferente de
/// `O` preenche a linha primária de mesmo offset cujo rótulo ainda é `O`.
pub fn merge_external(
    primary: &mut [Document],
    external: &[Vec<Document>],
) -> Result<ExternalMergeReport, MergeError> {
    let mut report = ExternalMergeReport::default();
    if external.is_empty() {
        report.unmerged = primary.iter().map(|d| d.docid.clone()).collect();
        return Ok(report);
    }

    let mut by_id: HashMap<String, usize> = primary
        .iter()
        .enumerate()
        .map(|(i, doc)| (doc.docid.clone(), i))
        .collect();

    let group_len = external.iter().map(Vec::len).min().unwrap_or(0);
    for i in 0..group_len {
        let group: Vec<&Document> = external.iter().map(|coll| &coll[i]).collect();
        let docid = &group[0].docid;
        if group.iter().any(|doc| &doc.docid != docid) {
            let ids: Vec<&str> = group.iter().map(|d| d.docid.as_str()).collect();
            return Err(MergeError::structural(format!(
                "identificadores inconsistentes entre coleções externas: {ids:?}"
            )));
        }
        let index = by_id.remove(docid).ok_or_else(|| {
            MergeError::structural(format!("documento ausente na coleção primária: {docid}"))
        })?;
        let doc = &mut primary[index];

        for ext in group {
            check_sentences(doc, ext)?;
            report.filled += fill_labels(doc, ext);
        }
    }

    report.unmerged = by_id.into_keys().collect();
    report.unmerged.sort();
    Ok(report)
}

/// Confere as sentenças de dois documentos alinhados: mesma posição de
/// início ou mesmo texto após unificar o espaçamento.
fn check_sentences(doc: &Document, ext: &Document) -> Result<(), MergeError> {
    let ws = Regex::new(r"\s+").expect("regex fixa");
    let loose = |s: &str| ws.replace_all(s, " ").trim().to_string();

    for (a, b) in sentences(&doc.rows).zip(sentences(&ext.rows)) {
        let same_start = match (a.first(), b.first()) {
            (Some(first_a), Some(first_b)) => first_a.start == first_b.start,
            _ => true,
        };
        let text = |rows: &[&DataRow]| {
            rows.iter()
                .map(|r| r.token.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        };
        if !same_start && loose(&text(&a)) != loose(&text(&b)) {
            return Err(MergeError::structural(format!(
                "texto da sentença não confere no documento {}",
                doc.docid
            )));
        }
    }
    Ok(())
}

/// Itera as sentenças de um documento (grupos de linhas de dados entre
/// fronteiras).
fn sentences<'a>(rows: &'a [Row]) -> impl Iterator<Item = Vec<&'a DataRow>> + 'a {
    rows.split(|row| row.is_boundary()).map(|sentence| {
        sentence
            .iter()
            .filter_map(|row| match row {
                Row::Data(data) => Some(data),
                Row::Boundary => None,
            })
            .collect()
    })
}

fn fill_labels(doc: &mut Document, ext: &Document) -> usize {
    let ext_labels: HashMap<(u64, u64), &str> = ext
        .rows
        .iter()
        .filter_map(|row| match row {
            Row::Data(data) if data.label != "O" => {
                Some(((data.start, data.end), data.label.as_str()))
            }
            _ => None,
        })
        .collect();

    let mut filled = 0;
    for row in &mut doc.rows {
        let Row::Data(row) = row else { continue };
        if row.label != "O" {
            continue;
        }
        if let Some(label) = ext_labels.get(&(row.start, row.end)) {
            row.label = label.to_string();
            filled += 1;
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(docid: &str, rows: Vec<Row>) -> Document {
        Document {
            docid: docid.to_string(),
            rows,
        }
    }

    fn data(token: &str, start: u64, end: u64, label: &str) -> Row {
        Row::Data(DataRow {
            token: token.to_string(),
            start,
            end,
            label: label.to_string(),
        })
    }

    #[test]
    fn test_dedup_keeps_last() {
        let mut docs = vec![
            doc("101", vec![data("old", 0, 3, "O")]),
            doc("102", vec![]),
            doc("101", vec![data("new", 0, 3, "O")]),
        ];
        assert_eq!(dedup_documents(&mut docs), 1);
        assert_eq!(docs.len(), 2);
        // A ocorrência antiga de "101" saiu; a ordem relativa se mantém
        assert_eq!(docs[0].docid, "102");
        assert_eq!(docs[1].docid, "101");
        assert_eq!(docs[1].rows, vec![data("new", 0, 3, "O")]);
    }

    #[test]
    fn test_drop_empty() {
        let mut docs = vec![
            doc("101", vec![data("a", 0, 1, "O")]),
            doc("102", vec![Row::Boundary]),
            doc("103", vec![]),
        ];
        assert_eq!(drop_empty_documents(&mut docs), 2);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].docid, "101");
    }

    #[test]
    fn test_strip_annotations() {
        let mut d = doc(
            "101",
            vec![data("caffeine", 0, 8, "B-CHEBI"), Row::Boundary],
        );
        strip_annotations(&mut d);
        assert_eq!(d.rows[0], data("caffeine", 0, 8, "O"));
        assert_eq!(d.rows[1], Row::Boundary);
    }

    #[test]
    fn test_label_spans() {
        let rows = vec![
            data("spike", 0, 5, "B-PR"),
            data("protein", 6, 13, "I-PR"),
            data("and", 14, 17, "O-NIL"),
            data("caffeine", 18, 26, "S-CHEBI"),
        ];
        assert_eq!(
            label_spans(&rows),
            vec![
                LabelSpan {
                    start: 0,
                    end: 13,
                    entity_type: "PR".to_string(),
                },
                LabelSpan {
                    start: 18,
                    end: 26,
                    entity_type: "CHEBI".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_label_spans_inconsistent_inside() {
        // I- sem B- anterior vale como início
        let rows = vec![data("orphan", 0, 6, "I-GO"), data("x", 7, 8, "O-NIL")];
        assert_eq!(
            label_spans(&rows),
            vec![LabelSpan {
                start: 0,
                end: 6,
                entity_type: "GO".to_string(),
            }]
        );
    }

    #[test]
    fn test_boundary_closes_span() {
        let rows = vec![
            data("spike", 0, 5, "B-PR"),
            Row::Boundary,
            data("protein", 6, 13, "I-PR"),
        ];
        assert_eq!(label_spans(&rows).len(), 2);
    }

    #[test]
    fn test_export_pubannotation() {
        let docs = vec![doc(
            "12345",
            vec![data("caffeine", 10, 18, "B-CHEBI"), data("x", 19, 20, "O-NIL")],
        )];
        let dir = tempfile::tempdir().unwrap();
        export_pubannotation(&docs, dir.path(), "pubmed").unwrap();

        let body = fs::read_to_string(dir.path().join("12345.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["sourcedb"], "pubmed");
        assert_eq!(parsed["sourceid"], "12345");
        assert_eq!(parsed["denotations"][0]["obj"], "CHEBI");
        assert_eq!(parsed["denotations"][0]["span"]["begin"], 10);
        assert_eq!(parsed["denotations"][0]["span"]["end"], 18);
    }

    #[test]
    fn test_merge_external_fills_outside_labels() {
        let mut primary = vec![doc(
            "101",
            vec![data("caffeine", 0, 8, "O"), data("levels", 9, 15, "O")],
        )];
        let external = vec![vec![doc(
            "101",
            vec![data("caffeine", 0, 8, "B-CHEBI"), data("levels", 9, 15, "O")],
        )]];
        let report = merge_external(&mut primary, &external).unwrap();
        assert_eq!(report.filled, 1);
        assert!(report.unmerged.is_empty());
        assert_eq!(primary[0].rows[0], data("caffeine", 0, 8, "B-CHEBI"));
    }

    #[test]
    fn test_merge_external_missing_document() {
        let mut primary = vec![doc("101", vec![])];
        let external = vec![vec![doc("999", vec![])]];
        assert!(matches!(
            merge_external(&mut primary, &external),
            Err(MergeError::Structural { .. })
        ));
    }

    #[test]
    fn test_merge_external_inconsistent_ids() {
        let mut primary = vec![doc("101", vec![])];
        let external = vec![vec![doc("101", vec![])], vec![doc("102", vec![])]];
        assert!(matches!(
            merge_external(&mut primary, &external),
            Err(MergeError::Structural { .. })
        ));
    }

    #[test]
    fn test_merge_external_reports_unmerged() {
        let mut primary = vec![doc("101", vec![]), doc("102", vec![])];
        let external = vec![vec![doc("101", vec![])]];
        let report = merge_external(&mut primary, &external).unwrap();
        assert_eq!(report.unmerged, vec!["102".to_string()]);
    }
}
