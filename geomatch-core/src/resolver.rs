//! # Resolução de Cidades em um Documento
//!
//! Combina as menções vindas do motor de NER com os padrões
//! determinísticos do gazetteer e resolve cada uma contra o catálogo. A
//! confiança final de cada ocorrência é o produto da pontuação do match
//! pela confiança da desambiguação; os dois fatores nunca se misturam
//! antes dessa composição.

use serde::{Deserialize, Serialize};

use crate::disambiguation::{CityCandidate, ResolutionStatus};
use crate::gazetteer::{find_city_pattern_matches, split_city_surface, CityGazetteer};
use crate::ner::{is_location_label, EntitySpan};
use crate::normalizer::{extract_state_mentions, find_sentence_containing};

/// Pontuação atribuída a menções vindas de padrões determinísticos.
const PATTERN_SCORE: f64 = 0.9;

/// Ocorrência de cidade resolvida dentro de um documento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityOccurrence {
    pub city_id: Option<String>,
    pub surface: String,
    pub start: usize,
    pub end: usize,
    pub sentence: String,
    pub status: ResolutionStatus,
    pub state_suffix: Option<String>,
    pub method: String,
    pub confidence: f64,
    pub candidates: Vec<CityCandidate>,
}

/// Resolve as menções de cidade de um documento completo.
///
/// Os spans do NER com rótulo de localidade entram primeiro; padrões
/// determinísticos complementam, ignorando spans já cobertos. O contexto
/// de estados é extraído uma única vez do texto inteiro e compartilhado
/// por todas as resoluções.
pub fn resolve_document_cities(
    text: &str,
    ner_spans: &[EntitySpan],
    gazetteer: &CityGazetteer,
) -> Vec<CityOccurrence> {
    let state_mentions = extract_state_mentions(text);

    let mut city_spans: Vec<EntitySpan> = ner_spans
        .iter()
        .filter(|span| is_location_label(&span.label))
        .cloned()
        .collect();

    let mut seen_spans: std::collections::HashSet<(usize, usize)> =
        city_spans.iter().map(|span| (span.start, span.end)).collect();
    for pattern in find_city_pattern_matches(text) {
        let span = (pattern.start, pattern.end);
        if seen_spans.contains(&span) {
            continue;
        }
        seen_spans.insert(span);
        city_spans.push(EntitySpan {
            label: "CITY_PATTERN".to_string(),
            text: pattern.surface,
            start: pattern.start,
            end: pattern.end,
            score: PATTERN_SCORE,
            method: "pattern".to_string(),
        });
    }

    let mut occurrences = Vec::with_capacity(city_spans.len());
    for span in city_spans {
        let (city_name, state_suffix) = split_city_surface(&span.text);
        let resolution = gazetteer.resolve(&city_name, state_suffix.as_deref(), &state_mentions);
        let sentence = find_sentence_containing(text, span.start, span.end);

        occurrences.push(CityOccurrence {
            city_id: resolution.city.map(|record| record.id),
            surface: span.text,
            start: span.start,
            end: span.end,
            sentence,
            status: resolution.status,
            state_suffix,
            method: span.method,
            confidence: span.score * resolution.confidence,
            candidates: resolution.candidates,
        });
    }

    occurrences
}
