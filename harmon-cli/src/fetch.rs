//! Download da lista de identificadores (PMIDs) da coleção.
//!
//! O serviço remoto exporta um TSV com linhas de comentário `#` e um
//! cabeçalho; daqui interessa só a coluna `pmid`, filtrada por uma lista
//! opcional de identificadores ruins (separados por vírgula).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

/// Endpoint público de exportação da lista de PMIDs.
pub const PMID_URL: &str = "https://www.ncbi.nlm.nih.gov/research/coronavirus-api/export?";

/// Resultado de um download de identificadores.
pub struct FetchSummary {
    /// Identificadores aceitos.
    pub accepted: usize,
    /// Identificadores rejeitados pela lista de ruins.
    pub rejected: usize,
    /// Cópia bruta do TSV baixado.
    pub tsv_path: PathBuf,
    /// Lista final, um identificador por linha.
    pub txt_path: PathBuf,
}

/// Baixa a lista de PMIDs e escreve `all_pmids.tsv` (bruto) e
/// `all_pmids.txt` (filtrado) em `out_dir`.
pub fn fetch_pmids(
    url: &str,
    bad_pmids: Option<&Path>,
    out_dir: &Path,
) -> anyhow::Result<FetchSummary> {
    anyhow::ensure!(
        url.starts_with("https://"),
        "apenas URLs https:// são aceitas: {url}"
    );
    fs::create_dir_all(out_dir)
        .with_context(|| format!("criando diretório {}", out_dir.display()))?;

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;
    let body = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .with_context(|| format!("baixando {url}"))?
        .text()?;

    let tsv_path = out_dir.join("all_pmids.tsv");
    fs::write(&tsv_path, &body)
        .with_context(|| format!("escrevendo {}", tsv_path.display()))?;

    let bad = match bad_pmids {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("lendo lista de PMIDs ruins {}", path.display()))?;
            raw.split(',')
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect()
        }
        None => HashSet::new(),
    };

    let (ids, rejected) = extract_pmids(&body, &bad);
    let txt_path = out_dir.join("all_pmids.txt");
    let mut listing = ids.join("\n");
    if !listing.is_empty() {
        listing.push('\n');
    }
    fs::write(&txt_path, listing)
        .with_context(|| format!("escrevendo {}", txt_path.display()))?;

    Ok(FetchSummary {
        accepted: ids.len(),
        rejected,
        tsv_path,
        txt_path,
    })
}

/// Extrai a coluna `pmid` do TSV exportado, ignorando comentários e o
/// cabeçalho, e aplicando a lista de identificadores ruins.
fn extract_pmids(tsv: &str, bad: &HashSet<String>) -> (Vec<String>, usize) {
    let mut lines = tsv.lines().filter(|line| !line.starts_with('#'));
    let column = lines
        .next()
        .map(|header| {
            header
                .split('\t')
                .position(|name| name == "pmid")
                .unwrap_or(0)
        })
        .unwrap_or(0);

    let mut ids = Vec::new();
    let mut rejected = 0;
    for line in lines {
        let Some(id) = line.split('\t').nth(column) else {
            continue;
        };
        let id = id.trim();
        if id.is_empty() {
            continue;
        }
        if bad.contains(id) {
            rejected += 1;
        } else {
            ids.push(id.to_string());
        }
    }
    (ids, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_pmids() {
        let tsv = "\
# exportado em 2020-05-15
pmid\ttitle\tjournal
32150360\tx\ty
32155444\tx\ty
32100486\tx\ty
";
        let bad: HashSet<String> = ["32155444".to_string()].into_iter().collect();
        let (ids, rejected) = extract_pmids(tsv, &bad);
        assert_eq!(ids, vec!["32150360".to_string(), "32100486".to_string()]);
        assert_eq!(rejected, 1);
    }

    #[test]
    fn test_extract_pmids_empty_input() {
        let (ids, rejected) = extract_pmids("", &HashSet::new());
        assert!(ids.is_empty());
        assert_eq!(rejected, 0);
    }
}
