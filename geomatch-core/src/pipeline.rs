//! # Pipeline de Enriquecimento Geográfico
//!
//! Orquestra os quatro estágios do enriquecimento de um artigo: carga do
//! catálogo, aplicação de sinais, desambiguação e agregação. O pipeline
//! não carrega lógica de negócio; sua única função é compor estágios
//! injetáveis para que cada um seja testável e substituível de forma
//! independente. As assinaturas genéricas garantem em tempo de compilação
//! que cada estágio devolve o tipo esperado pelo seguinte.
//!
//! O módulo também fornece as implementações padrão de cada estágio,
//! derivadas do payload de extração, para uso pela CLI e pelos jobs em
//! lote.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::aggregator::{aggregate_with_primary_city, AggregatedCity, CitySummary, SuppressedEntry};
use crate::catalog::{CatalogError, CatalogMetadata, CatalogRecord};
use crate::extractor::{Article, ExtractionMetadata, ExtractionPayload};
use crate::signals::Signals;

/// Match bruto que atravessa os estágios do pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMatch {
    pub surface: String,
    pub candidate_id: Option<String>,
    pub score: f64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<Signals>,
    #[serde(default)]
    pub confidence: f64,
}

/// Trilha de auditoria da desambiguação.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DisambiguationAudit {
    pub suppressed: Vec<SuppressedEntry>,
}

/// Metadados anexados ao resultado do enriquecimento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EnrichmentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_version: Option<String>,
    pub catalog_entries: usize,
    pub extraction: ExtractionMetadata,
    pub matches_total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<CatalogMetadata>,
}

/// Estrutura padronizada do resultado do enriquecimento geográfico.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EnrichmentOutput {
    pub article_id: String,
    pub matches: Vec<RawMatch>,
    pub primary_city: Option<CitySummary>,
    pub mentioned_cities: Vec<AggregatedCity>,
    pub disambiguation: DisambiguationAudit,
    pub metadata: EnrichmentMetadata,
}

/// Erros propagados pelos estágios do pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("falha ao carregar o catálogo: {0}")]
    CatalogLoad(#[from] CatalogError),
}

/// Executa o fluxo completo de enriquecimento geográfico.
///
/// Os estágios rodam em ordem fixa:
///
/// 1. `load_catalog` carrega o catálogo de localidades.
/// 2. `apply_signals` ajusta os matches brutos com sinais contextuais.
/// 3. `disambiguate` resolve candidatos pendentes.
/// 4. `aggregate` consolida o resultado final.
///
/// O artigo e o catálogo passam inalterados por todos os estágios.
pub fn enrich_geo<L, S, D, G>(
    article: &Article,
    raw_matches: Vec<RawMatch>,
    load_catalog: L,
    apply_signals: S,
    disambiguate: D,
    aggregate: G,
) -> Result<EnrichmentOutput, PipelineError>
where
    L: FnOnce() -> Result<Vec<CatalogRecord>, CatalogError>,
    S: FnOnce(Vec<RawMatch>, &Article, &[CatalogRecord]) -> Vec<RawMatch>,
    D: FnOnce(Vec<RawMatch>, &Article, &[CatalogRecord]) -> Vec<RawMatch>,
    G: FnOnce(Vec<RawMatch>, &Article, &[CatalogRecord]) -> EnrichmentOutput,
{
    let catalog = load_catalog()?;
    let enriched = apply_signals(raw_matches, article, &catalog);
    let resolved = disambiguate(enriched, article, &catalog);
    Ok(aggregate(resolved, article, &catalog))
}

/// Converte o payload de extração nos matches brutos do pipeline.
pub fn build_raw_matches(extraction: &ExtractionPayload) -> Vec<RawMatch> {
    extraction
        .matches
        .iter()
        .map(|item| {
            let surface = if item.surface.is_empty() {
                item.name.clone()
            } else {
                item.surface.clone()
            };
            RawMatch {
                surface,
                candidate_id: item.city_id.clone().filter(|id| !id.is_empty()),
                score: item.score,
                method: item.method.clone(),
                signals: item.signals.clone(),
                confidence: item.confidence.unwrap_or(item.score),
            }
        })
        .collect()
}

/// Estágio padrão de sinais: normaliza a confiança dos matches.
///
/// Os sinais em si já vêm calculados pela extração; aqui apenas
/// garantimos que todo match carregue uma confiança utilizável.
pub fn default_apply_signals(
    matches: Vec<RawMatch>,
    _article: &Article,
    _catalog: &[CatalogRecord],
) -> Vec<RawMatch> {
    matches
        .into_iter()
        .map(|mut item| {
            if item.confidence == 0.0 {
                item.confidence = item.score;
            }
            item
        })
        .collect()
}

fn normalize_name(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_name_index(catalog: &[CatalogRecord]) -> HashMap<String, Vec<&CatalogRecord>> {
    let mut index: HashMap<String, Vec<&CatalogRecord>> = HashMap::new();
    for entry in catalog {
        for variant in entry.variants() {
            let key = normalize_name(variant);
            if key.is_empty() {
                continue;
            }
            index.entry(key).or_default().push(entry);
        }
    }
    index
}

/// Estágio padrão de desambiguação para matches sem candidato.
///
/// Procura a superfície no índice de nomes do catálogo; um candidato
/// único resolve direto, e empates são reduzidos pelo estado de contexto
/// derivado dos sinais. Matches que permanecem sem candidato seguem
/// adiante e acabam na trilha de não resolvidos da agregação.
pub fn default_disambiguate(
    matches: Vec<RawMatch>,
    _article: &Article,
    catalog: &[CatalogRecord],
) -> Vec<RawMatch> {
    let name_index = build_name_index(catalog);
    matches
        .into_iter()
        .map(|mut item| {
            if item.candidate_id.is_some() {
                return item;
            }
            let Some(candidates) = name_index.get(&normalize_name(&item.surface)) else {
                return item;
            };
            let context_state = item
                .signals
                .as_ref()
                .and_then(|signals| signals.context_state.as_deref());

            let selected = if candidates.len() == 1 {
                Some(candidates[0])
            } else if let Some(state) = context_state {
                let state_upper = state.to_uppercase();
                let filtered: Vec<&&CatalogRecord> = candidates
                    .iter()
                    .filter(|candidate| candidate.state_code.to_uppercase() == state_upper)
                    .collect();
                if filtered.len() == 1 {
                    Some(*filtered[0])
                } else {
                    None
                }
            } else {
                None
            };

            if let Some(record) = selected {
                if !record.id.is_empty() {
                    item.candidate_id = Some(record.id.clone());
                }
            }
            item
        })
        .collect()
}

/// Estágio padrão de agregação: monta o [`EnrichmentOutput`] final.
pub fn aggregate_result(
    matches: Vec<RawMatch>,
    article: &Article,
    catalog: &[CatalogRecord],
    extraction: &ExtractionPayload,
    article_id: &str,
    catalog_metadata: Option<&CatalogMetadata>,
) -> EnrichmentOutput {
    let outcome = aggregate_with_primary_city(&matches, catalog);

    let catalog_version = catalog_metadata
        .map(|metadata| metadata.version.clone())
        .filter(|version| !version.is_empty())
        .or_else(|| article.catalog_version.clone());

    let metadata = EnrichmentMetadata {
        catalog_version,
        catalog_entries: catalog.len(),
        extraction: extraction.metadata.clone(),
        matches_total: matches.len(),
        catalog: catalog_metadata.cloned(),
    };

    EnrichmentOutput {
        article_id: article_id.to_string(),
        matches,
        primary_city: outcome.primary_city,
        mentioned_cities: outcome.mentioned_cities,
        disambiguation: DisambiguationAudit {
            suppressed: outcome.suppressed,
        },
        metadata,
    }
}

/// Resolve o identificador do artigo com a cadeia de fallbacks informada.
pub fn resolve_article_id(article: &serde_json::Value, id_field: &str, fallbacks: &[String]) -> String {
    let mut candidates: Vec<&str> = vec![id_field];
    candidates.extend(fallbacks.iter().map(String::as_str));
    for field in candidates {
        if let Some(value) = article.get(field) {
            match value {
                serde_json::Value::String(text) if !text.is_empty() => return text.clone(),
                serde_json::Value::Number(number) => return number.to_string(),
                _ => {}
            }
        }
    }
    "unknown-article".to_string()
}
