//! # Gazetteer de Municípios
//!
//! Índice em memória de nomes e nomes alternativos do catálogo, usado para
//! resolver superfícies textuais em candidatos canônicos. A resolução
//! delega as regras contextuais ao módulo de desambiguação e devolve o
//! resultado completo, incluindo a lista de candidatos para auditoria.
//!
//! O módulo também oferece padrões determinísticos sobre o texto cru
//! ("Cidade - UF", "prefeito de X", "município de X") que complementam as
//! menções vindas do motor de NER.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::CatalogRecord;
use crate::disambiguation::{disambiguate_city, DisambiguationResult};

static CITY_STATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<name>[A-ZÁ-ÚÂÊÎÔÛÃÕÇ][\wÀ-ÿ' .-]{2,}?)\s*[-/]\s*(?P<uf>[A-Z]{2})\b")
        .expect("padrão cidade-UF válido")
});

static PREFEITO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)prefeit[ao]\s+de\s+(?P<name>[A-ZÁ-ÚÂÊÎÔÛÃÕÇ][\wÀ-ÿ' .-]+)")
        .expect("padrão prefeito válido")
});

static MUNICIPIO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)munic[ií]pio\s+de\s+(?P<name>[A-ZÁ-ÚÂÊÎÔÛÃÕÇ][\wÀ-ÿ' .-]+)")
        .expect("padrão município válido")
});

/// Match determinístico de padrão textual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub surface: String,
    pub start: usize,
    pub end: usize,
    pub state_suffix: Option<String>,
}

/// Índice de nomes para resolução de menções.
pub struct CityGazetteer {
    cities: Vec<CatalogRecord>,
    by_name: HashMap<String, Vec<usize>>,
}

impl CityGazetteer {
    pub fn new(cities: impl IntoIterator<Item = CatalogRecord>) -> Self {
        let cities: Vec<CatalogRecord> = cities.into_iter().collect();
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, city) in cities.iter().enumerate() {
            for variant in city.variants() {
                let key = Self::normalize(variant);
                if key.is_empty() {
                    continue;
                }
                by_name.entry(key).or_default().push(index);
            }
        }
        Self { cities, by_name }
    }

    fn normalize(name: &str) -> String {
        name.to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Candidatos cujo nome ou alias bate com a superfície informada.
    pub fn candidates(&self, surface: &str) -> Vec<CatalogRecord> {
        self.by_name
            .get(&Self::normalize(surface))
            .map(|indices| indices.iter().map(|&i| self.cities[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Resolve uma menção usando as dicas contextuais disponíveis.
    pub fn resolve(
        &self,
        surface: &str,
        state_suffix: Option<&str>,
        context_states: &BTreeSet<String>,
    ) -> DisambiguationResult {
        let candidates = self.candidates(surface);
        disambiguate_city(surface, &candidates, state_suffix, context_states)
    }
}

/// Extrai o nome canônico e a sigla opcional de uma superfície.
///
/// Reconhece os formatos "Cidade - UF" e "Cidade/UF"; qualquer outro texto
/// volta inalterado, sem sigla.
pub fn split_city_surface(surface: &str) -> (String, Option<String>) {
    let text = surface.trim();
    for separator in ['-', '/'] {
        if !text.contains(separator) {
            continue;
        }
        let parts: Vec<&str> = text
            .split(separator)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        if parts.len() >= 2 {
            let last = parts[parts.len() - 1];
            if last.len() == 2 && last.chars().all(|ch| ch.is_ascii_alphabetic()) {
                let name = parts[..parts.len() - 1].join(&separator.to_string());
                return (name.trim().to_string(), Some(last.to_uppercase()));
            }
        }
    }
    (text.to_string(), None)
}

/// Candidatos a cidade encontrados por padrões determinísticos no texto.
pub fn find_city_pattern_matches(text: &str) -> Vec<PatternMatch> {
    let mut matches = Vec::new();
    for captures in CITY_STATE_PATTERN.captures_iter(text) {
        let whole = captures.get(0).expect("match completo presente");
        let state = captures.name("uf").map(|m| m.as_str().to_uppercase());
        matches.push(PatternMatch {
            surface: whole.as_str().trim().to_string(),
            start: whole.start(),
            end: whole.end(),
            state_suffix: state,
        });
    }
    for pattern in [&*PREFEITO_PATTERN, &*MUNICIPIO_PATTERN] {
        for captures in pattern.captures_iter(text) {
            let name = captures.name("name").expect("grupo name presente");
            matches.push(PatternMatch {
                surface: name.as_str().trim().to_string(),
                start: name.start(),
                end: name.end(),
                state_suffix: None,
            });
        }
    }
    matches
}
