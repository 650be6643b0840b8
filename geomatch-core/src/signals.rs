//! # Sinais Contextuais das Ocorrências
//!
//! Deriva sinais adicionais para cada ocorrência encontrada pelo matcher:
//! posição de destaque (título), presença de marcador administrativo na
//! vizinhança e estado mencionado na mesma sentença. Os pesos documentados
//! abaixo foram calibrados para favorecer menções em posições de maior
//! destaque e dar peso significativo a cargos públicos comuns em notícias.
//!
//! A derivação é idempotente: os mesmos campos e a mesma ocorrência sempre
//! produzem o mesmo triplo de sinais e a mesma confiança ajustada.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::extractor::{FieldMatch, FieldPayload};
use crate::normalizer::{extract_state_mentions, find_sentence_containing};

/// Reforço aplicado a ocorrências no título.
pub const TITLE_BOOST_WEIGHT: f64 = 0.4;
/// Reforço aplicado quando há marcador administrativo por perto.
pub const ADMIN_MARKER_WEIGHT: f64 = 0.6;

/// Janela, em caracteres normalizados, para a busca de marcadores.
const ADMIN_WINDOW: usize = 48;

/// Cargos administrativos que reforçam a leitura municipal da menção.
const ADMIN_KEYWORDS: &[&str] = &[
    "prefeito",
    "prefeita",
    "governador",
    "governadora",
    "vereador",
    "vereadora",
    "secretario",
    "secretaria",
];

/// Triplo de sinais anexado a cada ocorrência.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub title_boost: f64,
    pub admin_marker: bool,
    pub context_state: Option<String>,
}

impl Default for Signals {
    fn default() -> Self {
        Self {
            title_boost: 0.0,
            admin_marker: false,
            context_state: None,
        }
    }
}

/// Converte um intervalo em bytes do texto original para o intervalo
/// equivalente em caracteres do texto normalizado.
fn normalized_span(offsets: &[usize], start: usize, end: usize) -> (usize, usize) {
    if offsets.is_empty() {
        return (0, 0);
    }
    let last = end.saturating_sub(1);
    let norm_start = offsets.partition_point(|&offset| offset < start);
    let norm_end = offsets.partition_point(|&offset| offset <= last);
    (norm_start, norm_end)
}

fn detect_admin_marker(normalized_text: &str, start: usize, end: usize) -> bool {
    let chars: Vec<char> = normalized_text.chars().collect();
    let window_start = start.saturating_sub(ADMIN_WINDOW);
    let window_end = (end + ADMIN_WINDOW).min(chars.len());
    if window_start >= window_end {
        return false;
    }
    let window: String = chars[window_start..window_end].iter().collect();
    ADMIN_KEYWORDS.iter().any(|keyword| window.contains(keyword))
}

fn extract_context_state(text: &str, start: usize, end: usize) -> Option<String> {
    let sentence = find_sentence_containing(text, start, end);
    let mentions = extract_state_mentions(&sentence);
    // Quando mais de um estado aparece na mesma sentença, o primeiro em
    // ordem alfabética é o representante determinístico.
    mentions.into_iter().next()
}

fn compute_signals(
    item: &FieldMatch,
    fields: &BTreeMap<String, FieldPayload>,
) -> (Signals, f64) {
    let field_info = fields.get(&item.field);

    let title_boost = if item.field == "title" {
        TITLE_BOOST_WEIGHT
    } else {
        0.0
    };
    let mut admin_marker = false;
    let mut context_state = None;

    if let Some(field) = field_info {
        let (norm_start, norm_end) = normalized_span(&field.offsets, item.start, item.end);
        admin_marker = detect_admin_marker(&field.normalized_text, norm_start, norm_end);
        context_state = extract_context_state(&field.text, item.start, item.end);
    }

    let signals = Signals {
        title_boost,
        admin_marker,
        context_state,
    };

    let confidence = item.score
        + title_boost
        + if admin_marker { ADMIN_MARKER_WEIGHT } else { 0.0 };
    (signals, confidence)
}

/// Anexa os sinais derivados e a confiança ajustada a cada ocorrência.
///
/// A confiança ajustada é `score + title_boost + peso administrativo`,
/// nunca negativa. Sinais já presentes na ocorrência são preservados.
pub fn enrich_matches_with_signals(
    matches: Vec<FieldMatch>,
    fields: &BTreeMap<String, FieldPayload>,
) -> Vec<FieldMatch> {
    matches
        .into_iter()
        .map(|mut item| {
            if item.signals.is_none() {
                let (signals, confidence) = compute_signals(&item, fields);
                item.signals = Some(signals);
                item.confidence = Some(confidence.max(0.0));
            } else if item.confidence.is_none() {
                let (_, confidence) = compute_signals(&item, fields);
                item.confidence = Some(confidence.max(0.0));
            }
            item
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize_text_with_offsets;

    fn field_payload(text: &str) -> FieldPayload {
        let normalized = normalize_text_with_offsets(text);
        FieldPayload {
            text: text.to_string(),
            normalized_text: normalized.text,
            offsets: normalized.offsets,
        }
    }

    fn field_match(field: &str, text: &str, surface: &str) -> FieldMatch {
        let start = text.find(surface).unwrap();
        FieldMatch {
            field: field.to_string(),
            city_id: Some("1".to_string()),
            name: surface.to_string(),
            state_code: None,
            surface: surface.to_string(),
            start,
            end: start + surface.len(),
            method: "automaton".to_string(),
            score: 1.0,
            signals: None,
            confidence: None,
        }
    }

    #[test]
    fn test_title_occurrence_receives_boost() {
        let title = "Natal recebe investimento";
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), field_payload(title));

        let enriched = enrich_matches_with_signals(
            vec![field_match("title", title, "Natal")],
            &fields,
        );
        let signals = enriched[0].signals.as_ref().unwrap();
        assert_eq!(signals.title_boost, TITLE_BOOST_WEIGHT);
        assert!(!signals.admin_marker);
        assert_eq!(enriched[0].confidence, Some(1.4));
    }

    #[test]
    fn test_admin_marker_detected_inside_window() {
        let body = "O prefeito de Natal anunciou obras no centro.";
        let mut fields = BTreeMap::new();
        fields.insert("body".to_string(), field_payload(body));

        let enriched =
            enrich_matches_with_signals(vec![field_match("body", body, "Natal")], &fields);
        let signals = enriched[0].signals.as_ref().unwrap();
        assert_eq!(signals.title_boost, 0.0);
        assert!(signals.admin_marker);
        assert_eq!(enriched[0].confidence, Some(1.0 + ADMIN_MARKER_WEIGHT));
    }

    #[test]
    fn test_admin_marker_outside_window_is_ignored() {
        let filler = "a".repeat(80);
        let body = format!("prefeito {filler} Natal segue em festa");
        let mut fields = BTreeMap::new();
        fields.insert("body".to_string(), field_payload(&body));

        let enriched =
            enrich_matches_with_signals(vec![field_match("body", &body, "Natal")], &fields);
        let signals = enriched[0].signals.as_ref().unwrap();
        assert!(!signals.admin_marker);
    }

    #[test]
    fn test_context_state_from_sentence_is_alphabetically_first() {
        let body = "Encontro entre SP e BA definiu o calendário. Outra frase.";
        let mut fields = BTreeMap::new();
        fields.insert("body".to_string(), field_payload(body));

        let mut item = field_match("body", body, "Encontro");
        item.score = 1.0;
        let enriched = enrich_matches_with_signals(vec![item], &fields);
        let signals = enriched[0].signals.as_ref().unwrap();
        assert_eq!(signals.context_state.as_deref(), Some("BA"));
    }

    #[test]
    fn test_enrichment_is_idempotent() {
        let body = "O prefeito de Natal (RN) anunciou obras.";
        let mut fields = BTreeMap::new();
        fields.insert("body".to_string(), field_payload(body));

        let first = enrich_matches_with_signals(vec![field_match("body", body, "Natal")], &fields);
        let second = enrich_matches_with_signals(first.clone(), &fields);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_field_keeps_neutral_signals() {
        let fields = BTreeMap::new();
        let enriched = enrich_matches_with_signals(
            vec![field_match("summary", "Natal em alta", "Natal")],
            &fields,
        );
        let signals = enriched[0].signals.as_ref().unwrap();
        assert_eq!(signals.title_boost, 0.0);
        assert!(!signals.admin_marker);
        assert_eq!(signals.context_state, None);
        assert_eq!(enriched[0].confidence, Some(1.0));
    }
}
