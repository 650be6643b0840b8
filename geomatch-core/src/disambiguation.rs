//! # Heurísticas de Desambiguação de Cidades
//!
//! Avalia o conjunto de candidatos retornados pelo gazetteer e aplica
//! regras contextuais para atribuir um status e um fator de confiança.
//! Esse fator representa apenas a parcela de desambiguação e deve ser
//! combinado com a pontuação do tipo de match (automato, padrão, NER)
//! multiplicando os dois valores. Os pesos ficam documentados aqui para
//! facilitar calibração futura.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::catalog::CatalogRecord;

pub const CONFIDENCE_RESOLVED: f64 = 0.95;
pub const CONFIDENCE_AMBIGUOUS: f64 = 0.5;
pub const CONFIDENCE_UNKNOWN_STATE: f64 = 0.4;
pub const CONFIDENCE_FOREIGN: f64 = 0.2;

/// Status atribuído a uma menção após a desambiguação.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// Um único candidato sobreviveu com contexto suficiente.
    Resolved,
    /// Mais de um candidato permaneceu após os filtros.
    Ambiguous,
    /// O contexto de estado foi insuficiente ou contraditório.
    UnknownState,
    /// Nenhum candidato no catálogo; provavelmente não é município.
    Foreign,
}

/// Candidato a resolução com peso proporcional ao tamanho da lista.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityCandidate {
    pub city_id: String,
    pub name: String,
    pub state_code: String,
    pub score: f64,
}

/// Resultado da desambiguação de uma menção a cidade.
#[derive(Debug, Clone, PartialEq)]
pub struct DisambiguationResult {
    pub city: Option<CatalogRecord>,
    pub status: ResolutionStatus,
    pub confidence: f64,
    pub candidates: Vec<CityCandidate>,
}

/// Superfícies que aparecem com frequência fora de contexto municipal e
/// exigem reforço de estado para alcançar alta confiança.
fn ambiguous_states(surface_key: &str) -> Option<&'static [&'static str]> {
    match surface_key {
        "natal" => Some(&["RN"]),
        "esperanca" => Some(&["PB"]),
        "palmas" => Some(&["TO"]),
        _ => None,
    }
}

fn strip_accents(text: &str) -> String {
    text.nfkd().filter(|ch| !is_combining_mark(*ch)).collect()
}

fn normalize_surface(surface: &str) -> String {
    surface.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn make_candidates(entries: &[&CatalogRecord]) -> Vec<CityCandidate> {
    if entries.is_empty() {
        return Vec::new();
    }
    let weight = 1.0 / entries.len() as f64;
    entries
        .iter()
        .map(|entry| CityCandidate {
            city_id: entry.id.clone(),
            name: entry.name.clone(),
            state_code: entry.state_code.clone(),
            score: weight,
        })
        .collect()
}

/// Verdadeiro quando o contexto sustenta um nome sabidamente ambíguo.
fn has_reliable_context(
    surface_key: &str,
    candidate_state: &str,
    state_suffix: Option<&str>,
    context_states: &BTreeSet<String>,
) -> bool {
    let Some(required_states) = ambiguous_states(surface_key) else {
        return true;
    };

    if let Some(suffix) = state_suffix {
        if required_states.contains(&suffix.to_uppercase().as_str()) {
            return true;
        }
    }
    if context_states.contains(&candidate_state.to_uppercase()) {
        return true;
    }
    required_states
        .iter()
        .any(|state| context_states.contains(*state))
}

/// Avalia candidatos do gazetteer e define status e confiança.
///
/// As etapas principais são:
///
/// 1. Filtrar pela sigla explícita ("Cidade - UF" ou similar) quando
///    existente. Sem candidato nessa sigla, o contexto é considerado
///    insuficiente e o status vira `unknown_state`, preservando a lista
///    anterior para auditoria.
/// 2. Usar menções a estados no texto para reduzir a lista, apenas quando
///    a redução não a esvazia.
/// 3. Para nomes marcados como ambíguos, exigir ao menos uma indicação de
///    estado (no texto ou na superfície) para atingir `resolved`; caso
///    contrário o status fica `unknown_state` com confiança reduzida.
pub fn disambiguate_city(
    surface: &str,
    candidates: &[CatalogRecord],
    state_suffix: Option<&str>,
    context_states: &BTreeSet<String>,
) -> DisambiguationResult {
    if candidates.is_empty() {
        return DisambiguationResult {
            city: None,
            status: ResolutionStatus::Foreign,
            confidence: CONFIDENCE_FOREIGN,
            candidates: Vec::new(),
        };
    }

    let context_set: BTreeSet<String> = context_states
        .iter()
        .filter(|state| !state.is_empty())
        .map(|state| state.to_uppercase())
        .collect();

    let mut filtered: Vec<&CatalogRecord> = candidates.iter().collect();
    if let Some(suffix) = state_suffix {
        let suffix_upper = suffix.to_uppercase();
        let by_state: Vec<&CatalogRecord> = filtered
            .iter()
            .copied()
            .filter(|candidate| candidate.state_code.to_uppercase() == suffix_upper)
            .collect();
        if by_state.is_empty() {
            return DisambiguationResult {
                city: None,
                status: ResolutionStatus::UnknownState,
                confidence: CONFIDENCE_UNKNOWN_STATE,
                candidates: make_candidates(&filtered),
            };
        }
        filtered = by_state;
    }

    if filtered.len() > 1 && !context_set.is_empty() {
        let by_context: Vec<&CatalogRecord> = filtered
            .iter()
            .copied()
            .filter(|candidate| context_set.contains(&candidate.state_code.to_uppercase()))
            .collect();
        if !by_context.is_empty() {
            filtered = by_context;
        }
    }

    if filtered.len() == 1 {
        let candidate = filtered[0];
        let surface_key = normalize_surface(&strip_accents(surface));
        if !has_reliable_context(&surface_key, &candidate.state_code, state_suffix, &context_set) {
            return DisambiguationResult {
                city: None,
                status: ResolutionStatus::UnknownState,
                confidence: CONFIDENCE_UNKNOWN_STATE,
                candidates: make_candidates(&filtered),
            };
        }
        return DisambiguationResult {
            city: Some(candidate.clone()),
            status: ResolutionStatus::Resolved,
            confidence: CONFIDENCE_RESOLVED,
            candidates: make_candidates(&filtered),
        };
    }

    DisambiguationResult {
        city: None,
        status: ResolutionStatus::Ambiguous,
        confidence: CONFIDENCE_AMBIGUOUS,
        candidates: make_candidates(&filtered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str, state_code: &str) -> CatalogRecord {
        CatalogRecord {
            id: id.to_string(),
            name: name.to_string(),
            state_code: state_code.to_string(),
            ..Default::default()
        }
    }

    fn states(codes: &[&str]) -> BTreeSet<String> {
        codes.iter().map(|code| code.to_string()).collect()
    }

    #[test]
    fn test_requires_context_for_natal() {
        let candidates = vec![record("2408102", "Natal", "RN")];

        let result = disambiguate_city("Natal", &candidates, None, &BTreeSet::new());
        assert_eq!(result.status, ResolutionStatus::UnknownState);
        assert!(result.city.is_none());
        assert_eq!(result.confidence, CONFIDENCE_UNKNOWN_STATE);

        let with_context = disambiguate_city("Natal", &candidates, None, &states(&["RN"]));
        assert_eq!(with_context.status, ResolutionStatus::Resolved);
        assert_eq!(with_context.confidence, CONFIDENCE_RESOLVED);
        assert_eq!(with_context.city.unwrap().id, "2408102");
    }

    #[test]
    fn test_uses_state_suffix_for_ambiguous_palmas() {
        let candidates = vec![
            record("1721000", "Palmas", "TO"),
            record("4117602", "Palmas", "PR"),
        ];

        let ambiguous = disambiguate_city("Palmas", &candidates, None, &BTreeSet::new());
        assert_eq!(ambiguous.status, ResolutionStatus::Ambiguous);
        assert!(ambiguous.city.is_none());
        assert_eq!(ambiguous.candidates.len(), 2);
        assert_eq!(ambiguous.candidates[0].score, 0.5);

        let with_context = disambiguate_city("Palmas", &candidates, None, &states(&["TO"]));
        assert_eq!(with_context.status, ResolutionStatus::Resolved);
        assert_eq!(with_context.city.unwrap().state_code, "TO");

        let explicit = disambiguate_city("Palmas", &candidates, Some("TO"), &BTreeSet::new());
        assert_eq!(explicit.status, ResolutionStatus::Resolved);
        assert_eq!(explicit.city.unwrap().id, "1721000");
    }

    #[test]
    fn test_unmatched_suffix_keeps_audit_candidates() {
        let candidates = vec![record("2408102", "Natal", "RN")];
        let result = disambiguate_city("Natal", &candidates, Some("SP"), &BTreeSet::new());
        assert_eq!(result.status, ResolutionStatus::UnknownState);
        assert!(result.city.is_none());
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].city_id, "2408102");
    }

    #[test]
    fn test_empty_candidate_set_is_foreign() {
        let result = disambiguate_city("Lisboa", &[], None, &BTreeSet::new());
        assert_eq!(result.status, ResolutionStatus::Foreign);
        assert_eq!(result.confidence, CONFIDENCE_FOREIGN);
        assert!(result.candidates.is_empty());
    }

    #[test]
    fn test_unambiguous_name_resolves_without_context() {
        let candidates = vec![record("2504009", "Campina Grande", "PB")];
        let result = disambiguate_city("Campina Grande", &candidates, None, &BTreeSet::new());
        assert_eq!(result.status, ResolutionStatus::Resolved);
        assert_eq!(result.city.unwrap().id, "2504009");
    }

    #[test]
    fn test_accented_ambiguous_surface_matches_key() {
        let candidates = vec![record("2506301", "Esperança", "PB")];
        let without = disambiguate_city("Esperança", &candidates, None, &BTreeSet::new());
        assert_eq!(without.status, ResolutionStatus::UnknownState);

        let with = disambiguate_city("Esperança", &candidates, None, &states(&["PB"]));
        assert_eq!(with.status, ResolutionStatus::Resolved);
    }

    #[test]
    fn test_context_narrows_multiple_candidates() {
        let candidates = vec![
            record("1", "Bonito", "MS"),
            record("2", "Bonito", "PE"),
            record("3", "Bonito", "BA"),
        ];
        let result = disambiguate_city("Bonito", &candidates, None, &states(&["PE"]));
        assert_eq!(result.status, ResolutionStatus::Resolved);
        assert_eq!(result.city.unwrap().id, "2");
    }
}
