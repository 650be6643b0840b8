//! # Processamento em Lote de Artigos
//!
//! O enriquecimento de um documento é síncrono e limitado por CPU; o
//! paralelismo acontece entre documentos, nunca dentro de um. Este módulo
//! percorre um lote com `rayon`, compartilhando o matcher imutável entre
//! as threads, e suporta cancelamento cooperativo conferido uma vez por
//! documento.
//!
//! Falhas individuais não derrubam o lote: cada erro é registrado com o
//! identificador do artigo e o processamento continua.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::extractor::Article;
use crate::pipeline::{EnrichmentOutput, PipelineError};

/// Resumo das métricas coletadas ao processar um lote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BatchOutcome {
    pub processed: usize,
    pub skipped_empty: usize,
    pub cancelled: usize,
    pub errors: Vec<(String, String)>,
}

enum DocumentStatus {
    Processed,
    SkippedEmpty,
    Cancelled,
    Failed(String, String),
}

/// Processa um lote de artigos em paralelo.
///
/// `process` recebe cada artigo não vazio e devolve o resultado do
/// pipeline; artigos sem texto contam como `skipped_empty`. Quando a
/// flag `cancel` é acionada, os documentos ainda não iniciados contam
/// como `cancelled` e nenhum novo processamento começa.
pub fn process_articles<F>(articles: &[Article], cancel: &AtomicBool, process: F) -> BatchOutcome
where
    F: Fn(&Article) -> Result<EnrichmentOutput, PipelineError> + Sync,
{
    let statuses: Vec<DocumentStatus> = articles
        .par_iter()
        .map(|article| {
            if cancel.load(Ordering::Relaxed) {
                return DocumentStatus::Cancelled;
            }
            if article.is_empty() {
                return DocumentStatus::SkippedEmpty;
            }
            match process(article) {
                Ok(_) => DocumentStatus::Processed,
                Err(err) => {
                    let identifier = article.identifier();
                    warn!(article = identifier.as_str(), error = %err, "falha ao processar artigo");
                    DocumentStatus::Failed(identifier, err.to_string())
                }
            }
        })
        .collect();

    let mut outcome = BatchOutcome::default();
    for status in statuses {
        match status {
            DocumentStatus::Processed => outcome.processed += 1,
            DocumentStatus::SkippedEmpty => outcome.skipped_empty += 1,
            DocumentStatus::Cancelled => outcome.cancelled += 1,
            DocumentStatus::Failed(identifier, message) => {
                outcome.errors.push((identifier, message));
            }
        }
    }
    outcome
}
