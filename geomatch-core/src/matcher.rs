//! # Motor de Matching de Municípios
//!
//! Identifica menções a municípios usando um automato multi-padrão no
//! estilo Aho-Corasick construído uma única vez a partir do catálogo. A
//! construção é proporcional ao tamanho total das chaves; a varredura é
//! linear no tamanho do texto mais o número de matches, independente do
//! tamanho do catálogo.
//!
//! O automato é representado como uma arena de nós endereçados por índice,
//! com transições `(caractere, índice)` e links de falha como índices
//! simples. Isso mantém a estrutura plana, sem ciclos de posse.
//!
//! A varredura acontece sobre o texto normalizado; os intervalos são
//! traduzidos de volta para offsets do texto original, e `surface` é o
//! recorte literal do texto cru. Um passe complementar de regex captura
//! sequências de palavras capitalizadas fora do catálogo como candidatas
//! não resolvidas. Matches sobrepostos de municípios diferentes são
//! emitidos todos; a deduplicação é responsabilidade dos estágios de
//! desambiguação e agregação.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogPayload, CatalogRecord};
use crate::normalizer::normalize_text_with_offsets;

/// Pontuação atribuída a matches exatos do automato.
const AUTOMATON_SCORE: f64 = 1.0;
/// Pontuação atribuída a candidatas do passe de regex.
const FALLBACK_SCORE: f64 = 0.6;

/// Sequências de duas ou mais palavras capitalizadas, com conectores
/// minúsculos opcionais no meio ("Vila Imaginária", "Rio de Janeiro").
static PROPER_SEQUENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-ZÁÀÂÃÉÊÍÓÔÕÚÇ][\wÀ-ÿ']+(?:\s+(?:d[aeo]s?\s+)?[A-ZÁÀÂÃÉÊÍÓÔÕÚÇ][\wÀ-ÿ']+)+")
        .expect("regex de nomes próprios válida")
});

/// Uma correspondência de cidade encontrada no texto.
///
/// `start` e `end` são offsets em bytes no texto original; `surface` é o
/// recorte literal correspondente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityMatch {
    pub city_id: Option<String>,
    pub name: String,
    pub state_code: Option<String>,
    pub surface: String,
    pub start: usize,
    pub end: usize,
    pub method: String,
    pub score: f64,
}

#[derive(Debug, Clone)]
struct CityKeyword {
    length: usize,
    city_id: Option<String>,
    name: String,
    state_code: Option<String>,
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<char, usize>,
    fail: usize,
    outputs: Vec<usize>,
}

/// Automato de busca de municípios.
///
/// Imutável após a construção; pode ser compartilhado entre threads que
/// processam documentos diferentes em paralelo.
pub struct CityMatcher {
    nodes: Vec<Node>,
    keywords: Vec<CityKeyword>,
}

impl CityMatcher {
    /// Constrói o automato a partir do payload completo do catálogo.
    pub fn from_payload(payload: &CatalogPayload) -> Self {
        Self::new(&payload.data)
    }

    /// Constrói o automato a partir da lista de registros.
    ///
    /// Registros sem identificador ou sem nome são ignorados. Cada nome
    /// canônico e cada nome alternativo vira uma chave normalizada.
    pub fn new(records: &[CatalogRecord]) -> Self {
        let mut matcher = Self {
            nodes: vec![Node::default()],
            keywords: Vec::new(),
        };

        for record in records {
            if record.id.is_empty() || record.name.is_empty() {
                continue;
            }
            let state_code = if record.state_code.is_empty() {
                None
            } else {
                Some(record.state_code.clone())
            };
            for variant in record.variants() {
                let normalized = normalize_text_with_offsets(variant);
                let key = normalized.text.trim();
                if key.is_empty() {
                    continue;
                }
                let keyword = CityKeyword {
                    length: key.chars().count(),
                    city_id: Some(record.id.clone()),
                    name: record.name.clone(),
                    state_code: state_code.clone(),
                };
                matcher.insert_keyword(key, keyword);
            }
        }

        matcher.build_fail_transitions();
        matcher
    }

    fn insert_keyword(&mut self, key: &str, keyword: CityKeyword) {
        let mut node = 0usize;
        for ch in key.chars() {
            node = match self.nodes[node].children.get(&ch) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[node].children.insert(ch, next);
                    next
                }
            };
        }
        let keyword_index = self.keywords.len();
        self.keywords.push(keyword);
        self.nodes[node].outputs.push(keyword_index);
    }

    fn build_fail_transitions(&mut self) {
        let mut queue = VecDeque::new();
        let root_children: Vec<usize> = self.nodes[0].children.values().copied().collect();
        for child in root_children {
            self.nodes[child].fail = 0;
            queue.push_back(child);
        }

        while let Some(index) = queue.pop_front() {
            let transitions: Vec<(char, usize)> = self.nodes[index]
                .children
                .iter()
                .map(|(&ch, &child)| (ch, child))
                .collect();
            for (ch, child) in transitions {
                queue.push_back(child);
                let mut fail = self.nodes[index].fail;
                let fallback = loop {
                    if let Some(&next) = self.nodes[fail].children.get(&ch) {
                        if next != child {
                            break next;
                        }
                    }
                    if fail == 0 {
                        break 0;
                    }
                    fail = self.nodes[fail].fail;
                };
                self.nodes[child].fail = fallback;
                let inherited = self.nodes[fallback].outputs.clone();
                self.nodes[child].outputs.extend(inherited);
            }
        }
    }

    fn is_word_char(ch: char) -> bool {
        ch.is_ascii_lowercase() || ch.is_ascii_digit()
    }

    fn boundary_ok(chars: &[char], start: usize, end: usize) -> bool {
        let before_ok = start == 0 || !Self::is_word_char(chars[start - 1]);
        let after_ok = end >= chars.len() || !Self::is_word_char(chars[end]);
        before_ok && after_ok
    }

    fn automaton_matches(&self, text: &str) -> Vec<CityMatch> {
        let normalized = normalize_text_with_offsets(text);
        let chars: Vec<char> = normalized.text.chars().collect();
        let mut matches = Vec::new();

        let mut state = 0usize;
        for (index, &ch) in chars.iter().enumerate() {
            state = loop {
                if let Some(&next) = self.nodes[state].children.get(&ch) {
                    break next;
                }
                if state == 0 {
                    break 0;
                }
                state = self.nodes[state].fail;
            };

            for &keyword_index in &self.nodes[state].outputs {
                let keyword = &self.keywords[keyword_index];
                let end = index + 1;
                let Some(start) = end.checked_sub(keyword.length) else {
                    continue;
                };
                if !Self::boundary_ok(&chars, start, end) {
                    continue;
                }
                let (orig_start, orig_end) = normalized.original_span(text, start, end);
                matches.push(CityMatch {
                    city_id: keyword.city_id.clone(),
                    name: keyword.name.clone(),
                    state_code: keyword.state_code.clone(),
                    surface: text[orig_start..orig_end].to_string(),
                    start: orig_start,
                    end: orig_end,
                    method: "automaton".to_string(),
                    score: AUTOMATON_SCORE,
                });
            }
        }

        matches
    }

    fn fallback_matches(&self, text: &str, taken: &[(usize, usize)]) -> Vec<CityMatch> {
        let mut matches = Vec::new();
        for found in PROPER_SEQUENCE_REGEX.find_iter(text) {
            let overlaps = taken
                .iter()
                .any(|&(start, end)| found.start() < end && start < found.end());
            if overlaps {
                continue;
            }
            matches.push(CityMatch {
                city_id: None,
                name: found.as_str().to_string(),
                state_code: None,
                surface: found.as_str().to_string(),
                start: found.start(),
                end: found.end(),
                method: "regex".to_string(),
                score: FALLBACK_SCORE,
            });
        }
        matches
    }

    /// Encontra todas as menções a municípios no texto.
    ///
    /// O resultado vem ordenado por `(start, end)`. Spans sobrepostos de
    /// municípios homônimos aparecem repetidos, um por candidato.
    pub fn find_matches(&self, text: &str) -> Vec<CityMatch> {
        let mut matches = self.automaton_matches(text);
        let taken: Vec<(usize, usize)> = matches.iter().map(|m| (m.start, m.end)).collect();
        matches.extend(self.fallback_matches(text, &taken));
        matches.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
        matches
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

    fn sample_matcher() -> CityMatcher {
        CityMatcher::new(&[
            record("2504009", "Campina Grande", "PB"),
            record("3304557", "Rio de Janeiro", "RJ"),
        ])
    }

    #[test]
    fn test_detects_catalog_cities_with_correct_offsets() {
        let matcher = sample_matcher();
        let text = "Campina Grande firmou acordo com o Rio de Janeiro hoje.";
        let matches = matcher.find_matches(text);

        assert_eq!(matches.len(), 2);

        let first = &matches[0];
        assert_eq!(first.city_id.as_deref(), Some("2504009"));
        assert_eq!(first.name, "Campina Grande");
        assert_eq!(first.state_code.as_deref(), Some("PB"));
        assert_eq!(first.surface, "Campina Grande");
        assert_eq!((first.start, first.end), (0, 14));
        assert_eq!(first.method, "automaton");
        assert_eq!(first.score, 1.0);

        let second = &matches[1];
        assert_eq!(second.city_id.as_deref(), Some("3304557"));
        assert_eq!(second.surface, "Rio de Janeiro");
        assert_eq!((second.start, second.end), (35, 49));
    }

    #[test]
    fn test_accented_surface_is_sliced_from_original_text() {
        let matcher = CityMatcher::new(&[record("3550308", "São Paulo", "SP")]);
        let text = "Visita a São Paulo amanhã";
        let matches = matcher.find_matches(text);
        let hit = matches
            .iter()
            .find(|m| m.method == "automaton")
            .expect("match do automato");
        assert_eq!(hit.surface, "São Paulo");
        assert_eq!(&text[hit.start..hit.end], "São Paulo");
    }

    #[test]
    fn test_word_boundary_rejects_embedded_names() {
        let matcher = CityMatcher::new(&[record("2408102", "Natal", "RN")]);
        let matches = matcher.find_matches("O espírito Natalino tomou conta da cidade");
        assert!(matches.iter().all(|m| m.method != "automaton"));
    }

    #[test]
    fn test_hyphenated_mention_still_matches() {
        let matcher = CityMatcher::new(&[record("3550308", "São Paulo", "SP")]);
        let matches = matcher.find_matches("A rota São-Paulo continua ativa");
        let hit = matches
            .iter()
            .find(|m| m.city_id.is_some())
            .expect("match do automato");
        assert_eq!(hit.surface, "São-Paulo");
    }

    #[test]
    fn test_alt_names_are_indexed() {
        let mut rec = record("2408102", "Natal", "RN");
        rec.alt_names = vec!["Cidade do Sol".to_string()];
        let matcher = CityMatcher::new(&[rec]);
        let matches = matcher.find_matches("Conhecida como Cidade do Sol, a capital recebe turistas");
        let hit = matches
            .iter()
            .find(|m| m.city_id.is_some())
            .expect("match por nome alternativo");
        assert_eq!(hit.name, "Natal");
        assert_eq!(hit.surface, "Cidade do Sol");
    }

    #[test]
    fn test_every_catalog_name_is_found_at_word_boundaries() {
        let records = vec![
            record("1", "Alfa", "AA"),
            record("2", "Beta Norte", "BB"),
            record("3", "Gama do Sul", "CC"),
        ];
        let matcher = CityMatcher::new(&records);
        for rec in &records {
            let text = format!("Notícia sobre {} divulgada ontem.", rec.name);
            let expected_start = text.find(&rec.name).unwrap();
            let found = matcher
                .find_matches(&text)
                .into_iter()
                .find(|m| m.city_id.as_deref() == Some(rec.id.as_str()))
                .unwrap_or_else(|| panic!("{} não encontrado", rec.name));
            assert_eq!(found.start, expected_start);
            assert_eq!(found.end, expected_start + rec.name.len());
        }
    }

    #[test]
    fn test_fallback_regex_marks_method_and_score() {
        let matcher = CityMatcher::new(&[]);
        let text = "O evento ocorreu em Vila Imaginária na semana passada.";
        let matches = matcher.find_matches(text);

        assert_eq!(matches.len(), 1);
        let fallback = &matches[0];
        let expected_start = text.find("Vila Imaginária").unwrap();

        assert_eq!(fallback.city_id, None);
        assert_eq!(fallback.state_code, None);
        assert_eq!(fallback.surface, "Vila Imaginária");
        assert_eq!(
            (fallback.start, fallback.end),
            (expected_start, expected_start + "Vila Imaginária".len())
        );
        assert_eq!(fallback.method, "regex");
        assert_eq!(fallback.score, 0.6);
    }

    #[test]
    fn test_overlapping_homonyms_are_all_emitted() {
        let matcher = CityMatcher::new(&[
            record("1721000", "Palmas", "TO"),
            record("4117602", "Palmas", "PR"),
        ]);
        let matches = matcher.find_matches("A prefeitura de Palmas confirmou o evento.");
        let automaton: Vec<_> = matches.iter().filter(|m| m.method == "automaton").collect();
        assert_eq!(automaton.len(), 2);
        assert_eq!(automaton[0].start, automaton[1].start);
    }
}
