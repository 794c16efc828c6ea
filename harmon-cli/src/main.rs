//! `harmon` — ferramenta de linha de comando do pipeline de harmonização.
//!
//! Subcomandos cobrem o ciclo da coleção: baixar a lista de identificadores
//! (`fetch-pmids`), sanear a coleção CoNLL (`clean`, `strip`), fundir as
//! predições dos modelos com a anotação de referência (`harmonise`),
//! restaurar tipos de entidade pela terminologia (`enrich`) e exportar
//! para PubAnnotation (`export`).

mod fetch;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use harmon_core::collection::{
    dedup_documents, drop_empty_documents, export_pubannotation, load_collection,
    strip_annotations, write_collection,
};
use harmon_core::{harmonise, HarmoniseConfig, MergeStrategy, Terminology};

#[derive(Parser)]
#[command(name = "harmon")]
#[command(about = "Harmonização de predições NER biomédicas (spans/ids/regras)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Funde as predições dos modelos com a anotação de referência
    Harmonise {
        /// Caminho do arquivo de saída
        #[arg(short = 't', long = "tgt-path", value_name = "PATH")]
        tgt_path: PathBuf,

        /// Arquivo de entrada com os documentos em CoNLL de 4 colunas
        #[arg(short = 'o', long = "oger-pred", value_name = "PATH")]
        oger_pred: PathBuf,

        /// Arquivo de entrada com os tokens emitidos pelo tokenizador
        #[arg(short = 'b', long = "bert-tokens", value_name = "PATH")]
        bert_tokens: PathBuf,

        /// Arquivo de entrada com as predições de spans
        #[arg(short = 's', long = "span-pred", value_name = "PATH")]
        span_pred: Option<PathBuf>,

        /// Arquivo de entrada com as predições de ids
        #[arg(short = 'i', long = "id-pred", value_name = "PATH")]
        id_pred: Option<PathBuf>,

        /// Estratégia para combinar as predições de spans e ids
        #[arg(
            short = 'm',
            long = "merge-strategy",
            value_name = "STRATEGY",
            default_value_t = MergeStrategy::default()
        )]
        merge_strategy: MergeStrategy,
    },

    /// Baixa a lista de PMIDs da coleção
    FetchPmids {
        /// Endpoint de exportação
        #[arg(long, default_value = fetch::PMID_URL)]
        url: String,

        /// Arquivo com PMIDs ruins a descartar (separados por vírgula)
        #[arg(long, value_name = "PATH")]
        bad_pmids: Option<PathBuf>,

        /// Diretório de saída
        #[arg(short = 'd', long, value_name = "DIR")]
        out_dir: PathBuf,
    },

    /// Remove documentos duplicados e vazios de uma coleção CoNLL
    Clean {
        input: PathBuf,
        output: PathBuf,
    },

    /// Zera as anotações de uma coleção (CoNLL "pelado")
    Strip {
        input: PathBuf,
        output: PathBuf,
    },

    /// Restaura tipos de entidade a partir de uma terminologia BTH
    Enrich {
        input: PathBuf,
        output: PathBuf,

        /// Terminologia em formato BTH (TSV sem cabeçalho)
        #[arg(short = 'T', long, value_name = "PATH")]
        terminology: PathBuf,
    },

    /// Exporta cada documento como JSON no formato PubAnnotation
    Export {
        input: PathBuf,
        out_dir: PathBuf,

        /// Base de dados de origem gravada nos arquivos exportados
        #[arg(long, default_value = "pubmed")]
        sourcedb: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    match Cli::parse().command {
        Commands::Harmonise {
            tgt_path,
            oger_pred,
            bert_tokens,
            span_pred,
            id_pred,
            merge_strategy,
        } => {
            info!("harmonizando {} [{merge_strategy}]", oger_pred.display());
            let config = HarmoniseConfig {
                target: tgt_path.clone(),
                reference: oger_pred,
                tokens: bert_tokens,
                span_labels: span_pred,
                id_labels: id_pred,
                strategy: merge_strategy,
            };
            harmonise(&config)?;
            info!("saída escrita em {}", tgt_path.display());
        }

        Commands::FetchPmids {
            url,
            bad_pmids,
            out_dir,
        } => {
            info!("baixando lista de PMIDs de {url}");
            let summary = fetch::fetch_pmids(&url, bad_pmids.as_deref(), &out_dir)?;
            if summary.rejected > 0 {
                warn!("{} PMIDs descartados pela lista de ruins", summary.rejected);
            }
            info!(
                "{} PMIDs escritos em {} (TSV bruto em {})",
                summary.accepted,
                summary.txt_path.display(),
                summary.tsv_path.display()
            );
        }

        Commands::Clean { input, output } => {
            let mut docs = load_collection(&input)?;
            let duplicates = dedup_documents(&mut docs);
            if duplicates > 0 {
                warn!("{duplicates} documentos duplicados removidos");
            }
            let empty = drop_empty_documents(&mut docs);
            if empty > 0 {
                warn!("{empty} documentos vazios removidos");
            }
            write_collection(&output, &docs)?;
            info!("{} documentos escritos em {}", docs.len(), output.display());
        }

        Commands::Strip { input, output } => {
            let mut docs = load_collection(&input)?;
            for doc in &mut docs {
                strip_annotations(doc);
            }
            write_collection(&output, &docs)?;
            info!("{} documentos escritos em {}", docs.len(), output.display());
        }

        Commands::Enrich {
            input,
            output,
            terminology,
        } => {
            let table = Terminology::load(&terminology)
                .with_context(|| format!("carregando terminologia {}", terminology.display()))?;
            info!("terminologia carregada: {} conceitos", table.len());
            let mut docs = load_collection(&input)?;
            let mut rewritten = 0;
            for doc in &mut docs {
                rewritten += table.enrich_document(doc)?;
            }
            write_collection(&output, &docs)?;
            info!("{rewritten} rótulos restaurados em {}", output.display());
        }

        Commands::Export {
            input,
            out_dir,
            sourcedb,
        } => {
            let docs = load_collection(&input)?;
            export_pubannotation(&docs, &out_dir, &sourcedb)?;
            info!(
                "{} documentos exportados para {}",
                docs.len(),
                out_dir.display()
            );
        }
    }
    Ok(())
}
