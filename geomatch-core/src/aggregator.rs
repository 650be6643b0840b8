//! # Agregação de Ocorrências por Cidade
//!
//! Consolida as ocorrências de um documento em totais por município e
//! seleciona a cidade primária através de uma cascata determinística de
//! desempates. Cada estágio restringe o conjunto de candidatas; empates
//! seguem para o estágio seguinte e as perdedoras são registradas com o
//! nome da regra que as eliminou, formando a trilha de auditoria.
//!
//! A seleção é uma função pura do multiconjunto de candidatas: não há
//! estado mutável escondido nem dependência de ordem de iteração.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogRecord;
use crate::pipeline::RawMatch;
use crate::signals::Signals;

/// Bônus aplicado quando o estado do contexto coincide com o da cidade.
pub const CONTEXT_MATCH_BONUS: f64 = 0.3;
/// Penalidade aplicada quando o contexto aponta outro estado.
pub const CONTEXT_MISMATCH_PENALTY: f64 = 0.7;

const TOLERANCE: f64 = 1e-6;

fn nearly_equal(left: f64, right: f64) -> bool {
    (left - right).abs() <= TOLERANCE
}

/// Ajuste aplicado à confiança de um match durante a agregação.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: f64,
}

/// Match preparado para agregação, com a confiança ajustada e a lista de
/// ajustes aplicados.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPayload {
    pub city_id: Option<String>,
    pub surface: String,
    pub method: String,
    pub score: f64,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<Signals>,
    pub adjusted_confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<Adjustment>,
}

/// Totais consolidados de uma cidade dentro de um documento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedCity {
    pub city_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    pub score: f64,
    pub occurrences: usize,
    pub admin_markers: usize,
    pub title_boost_sum: f64,
    pub context_matches: usize,
    pub context_mismatches: usize,
    pub matches: Vec<MatchPayload>,
}

/// Resumo de cidade sem a lista de matches, usado para a cidade primária.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitySummary {
    pub city_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    pub score: f64,
    pub occurrences: usize,
    pub admin_markers: usize,
    pub title_boost_sum: f64,
    pub context_matches: usize,
    pub context_mismatches: usize,
}

impl AggregatedCity {
    pub fn summary(&self) -> CitySummary {
        CitySummary {
            city_id: self.city_id.clone(),
            name: self.name.clone(),
            state_code: self.state_code.clone(),
            score: self.score,
            occurrences: self.occurrences,
            admin_markers: self.admin_markers,
            title_boost_sum: self.title_boost_sum,
            context_matches: self.context_matches,
            context_mismatches: self.context_mismatches,
        }
    }
}

/// Entrada da trilha de auditoria com o motivo da supressão.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressedEntry {
    pub city_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    pub score: f64,
    pub occurrences: usize,
    pub reason: String,
    pub rule: String,
}

/// Resultado completo da agregação de um documento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AggregationOutcome {
    pub primary_city: Option<CitySummary>,
    pub mentioned_cities: Vec<AggregatedCity>,
    pub suppressed: Vec<SuppressedEntry>,
}

fn catalog_by_id(catalog: &[CatalogRecord]) -> HashMap<&str, &CatalogRecord> {
    catalog
        .iter()
        .filter(|record| !record.id.is_empty())
        .map(|record| (record.id.as_str(), record))
        .collect()
}

fn prepare_match_payload(raw: &RawMatch) -> MatchPayload {
    let confidence = if raw.confidence != 0.0 {
        raw.confidence
    } else {
        raw.score
    };
    MatchPayload {
        city_id: raw.candidate_id.clone(),
        surface: raw.surface.clone(),
        method: raw.method.clone(),
        score: raw.score,
        confidence,
        signals: raw.signals.clone(),
        adjusted_confidence: confidence,
        adjustments: Vec::new(),
    }
}

/// Aplica o bônus ou penalidade de contexto contra o estado da cidade.
///
/// Retorna o status do ajuste para alimentar os contadores do grupo.
fn context_adjust(payload: &mut MatchPayload, city_state: Option<&str>) -> Option<&'static str> {
    let context_state = payload
        .signals
        .as_ref()
        .and_then(|signals| signals.context_state.as_deref())?;
    let city_state = city_state?;
    if city_state.is_empty() {
        return None;
    }

    if context_state == city_state {
        payload.adjusted_confidence += CONTEXT_MATCH_BONUS;
        payload.adjustments.push(Adjustment {
            kind: "context_match".to_string(),
            value: CONTEXT_MATCH_BONUS,
        });
        Some("match")
    } else {
        payload.adjusted_confidence = (payload.adjusted_confidence - CONTEXT_MISMATCH_PENALTY).max(0.0);
        payload.adjustments.push(Adjustment {
            kind: "context_mismatch".to_string(),
            value: -CONTEXT_MISMATCH_PENALTY,
        });
        Some("mismatch")
    }
}

/// Consolida os matches individuais em pontuações por cidade.
///
/// Menções sem cidade definida são ignoradas aqui; o chamador as reporta
/// como não resolvidas na trilha de auditoria.
pub fn aggregate_city_mentions(matches: &[RawMatch], catalog: &[CatalogRecord]) -> Vec<AggregatedCity> {
    let by_id = catalog_by_id(catalog);
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, AggregatedCity> = HashMap::new();

    for raw in matches {
        let Some(city_id) = raw.candidate_id.as_deref().filter(|id| !id.is_empty()) else {
            continue;
        };
        let entry = by_id.get(city_id);
        let name = entry
            .map(|record| record.name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| {
                if raw.surface.is_empty() {
                    city_id.to_string()
                } else {
                    raw.surface.clone()
                }
            });
        let state_code = entry
            .map(|record| record.state_code.clone())
            .filter(|state| !state.is_empty());

        let mut prepared = prepare_match_payload(raw);
        let context_status = context_adjust(&mut prepared, state_code.as_deref());

        let group = grouped.entry(city_id.to_string()).or_insert_with(|| {
            order.push(city_id.to_string());
            AggregatedCity {
                city_id: city_id.to_string(),
                name,
                state_code,
                score: 0.0,
                occurrences: 0,
                admin_markers: 0,
                title_boost_sum: 0.0,
                context_matches: 0,
                context_mismatches: 0,
                matches: Vec::new(),
            }
        });

        group.score += prepared.adjusted_confidence;
        group.occurrences += 1;

        if let Some(signals) = &prepared.signals {
            if signals.admin_marker {
                group.admin_markers += 1;
            }
            group.title_boost_sum += signals.title_boost;
        }
        match context_status {
            Some("match") => group.context_matches += 1,
            Some("mismatch") => group.context_mismatches += 1,
            _ => {}
        }

        group.matches.push(prepared);
    }

    order
        .into_iter()
        .map(|city_id| grouped.remove(&city_id).expect("grupo registrado"))
        .collect()
}

fn register_suppression(
    store: &mut Vec<SuppressedEntry>,
    seen: &mut std::collections::HashSet<String>,
    record: &AggregatedCity,
    reason: &str,
    rule: &str,
) {
    if !seen.insert(record.city_id.clone()) {
        return;
    }
    store.push(SuppressedEntry {
        city_id: Some(record.city_id.clone()),
        name: Some(record.name.clone()),
        state_code: record.state_code.clone(),
        score: record.score,
        occurrences: record.occurrences,
        reason: reason.to_string(),
        rule: rule.to_string(),
    });
}

/// Seleciona a cidade primária aplicando a cascata de desempates.
///
/// Estágios, na ordem: maior score (tolerância 1e-6), mais marcadores
/// administrativos, maior reforço de título, menos conflitos de estado,
/// mais ocorrências e, por fim, o menor identificador, que garante um
/// vencedor único.
pub fn primary_city_selection(
    aggregated: &[AggregatedCity],
) -> (Option<AggregatedCity>, Vec<SuppressedEntry>) {
    if aggregated.is_empty() {
        return (None, Vec::new());
    }

    let mut suppressed: Vec<SuppressedEntry> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut remaining: Vec<usize> = (0..aggregated.len()).collect();

    // Cada estágio devolve a medida da candidata; o melhor valor segue.
    struct Stage {
        reason: &'static str,
        rule: &'static str,
        keep: fn(&AggregatedCity, &[&AggregatedCity]) -> bool,
    }

    let stages = [
        Stage {
            reason: "lower_score",
            rule: "score",
            keep: |item, pool| {
                let best = pool
                    .iter()
                    .map(|c| c.score)
                    .fold(f64::NEG_INFINITY, f64::max);
                nearly_equal(item.score, best)
            },
        },
        Stage {
            reason: "tie_break",
            rule: "admin_marker",
            keep: |item, pool| {
                let best = pool.iter().map(|c| c.admin_markers).max().unwrap_or(0);
                item.admin_markers == best
            },
        },
        Stage {
            reason: "tie_break",
            rule: "title_boost",
            keep: |item, pool| {
                let best = pool
                    .iter()
                    .map(|c| c.title_boost_sum)
                    .fold(f64::NEG_INFINITY, f64::max);
                nearly_equal(item.title_boost_sum, best)
            },
        },
        Stage {
            reason: "tie_break",
            rule: "context_state",
            keep: |item, pool| {
                let best = pool
                    .iter()
                    .map(|c| c.context_mismatches)
                    .min()
                    .unwrap_or(0);
                item.context_mismatches == best
            },
        },
        Stage {
            reason: "tie_break",
            rule: "occurrences",
            keep: |item, pool| {
                let best = pool.iter().map(|c| c.occurrences).max().unwrap_or(0);
                item.occurrences == best
            },
        },
    ];

    for stage in &stages {
        let pool: Vec<&AggregatedCity> = remaining.iter().map(|&i| &aggregated[i]).collect();
        let (kept, dropped): (Vec<usize>, Vec<usize>) = remaining
            .iter()
            .copied()
            .partition(|&i| (stage.keep)(&aggregated[i], &pool));
        for index in dropped {
            register_suppression(&mut suppressed, &mut seen, &aggregated[index], stage.reason, stage.rule);
        }
        remaining = kept;
        if remaining.len() == 1 {
            return (Some(aggregated[remaining[0]].clone()), suppressed);
        }
    }

    remaining.sort_by(|&a, &b| aggregated[a].city_id.cmp(&aggregated[b].city_id));
    let selected = remaining[0];
    for &index in &remaining[1..] {
        register_suppression(&mut suppressed, &mut seen, &aggregated[index], "tie_break", "city_id");
    }
    (Some(aggregated[selected].clone()), suppressed)
}

/// Chave de ordenação usada para listar as cidades mencionadas.
fn mention_order(a: &AggregatedCity, b: &AggregatedCity) -> std::cmp::Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.admin_markers.cmp(&a.admin_markers))
        .then_with(|| b.title_boost_sum.total_cmp(&a.title_boost_sum))
        .then_with(|| a.context_mismatches.cmp(&b.context_mismatches))
        .then_with(|| b.occurrences.cmp(&a.occurrences))
        .then_with(|| a.city_id.cmp(&b.city_id))
}

/// Agrega as menções e seleciona a cidade primária do documento.
///
/// A trilha `suppressed` reúne as perdedoras de cada estágio e as menções
/// sem candidato resolvido (`reason = "missing_candidate"`).
pub fn aggregate_with_primary_city(matches: &[RawMatch], catalog: &[CatalogRecord]) -> AggregationOutcome {
    let mut mentioned = aggregate_city_mentions(matches, catalog);
    mentioned.sort_by(mention_order);

    let (primary, mut suppressed) = primary_city_selection(&mentioned);

    for raw in matches {
        if raw
            .candidate_id
            .as_deref()
            .map(|id| !id.is_empty())
            .unwrap_or(false)
        {
            continue;
        }
        let score = if raw.confidence != 0.0 {
            raw.confidence
        } else {
            raw.score
        };
        suppressed.push(SuppressedEntry {
            city_id: None,
            name: Some(raw.surface.clone()),
            state_code: None,
            score,
            occurrences: 1,
            reason: "missing_candidate".to_string(),
            rule: "candidate_id".to_string(),
        });
    }

    AggregationOutcome {
        primary_city: primary.map(|city| city.summary()),
        mentioned_cities: mentioned,
        suppressed,
    }
}
