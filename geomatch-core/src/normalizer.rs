//! # Normalização de Texto com Preservação de Offsets
//!
//! Prepara o texto de notícias para o casamento de nomes de municípios.
//! A normalização converte o texto para minúsculas sem acentos, mas cada
//! caractere normalizado guarda o índice (em bytes) do caractere que o
//! originou no texto cru. Isso permite rodar algoritmos de busca sobre a
//! versão normalizada e traduzir os resultados de volta para o texto
//! original sem perda de posição.
//!
//! ## Regras de normalização
//!
//! - Minúsculas e decomposição NFKD com remoção de marcas combinantes
//!   (acentos).
//! - Todas as variantes de hífen viram um espaço simples, para que nomes
//!   hifenizados continuem respeitando fronteiras de palavra.
//! - Hífen suave (U+00AD) e caracteres de largura zero são descartados e
//!   não geram entrada na tabela de offsets.
//!
//! O módulo também concentra utilidades textuais compartilhadas pelos
//! estágios seguintes: localização da sentença que contém um intervalo,
//! detecção de menções a estados brasileiros e limpeza de boilerplate
//! editorial.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Nomes completos dos estados brasileiros e suas siglas.
pub const STATE_NAMES: &[(&str, &str)] = &[
    ("acre", "AC"),
    ("alagoas", "AL"),
    ("amapá", "AP"),
    ("amazonas", "AM"),
    ("bahia", "BA"),
    ("ceará", "CE"),
    ("distrito federal", "DF"),
    ("espírito santo", "ES"),
    ("goiás", "GO"),
    ("maranhão", "MA"),
    ("mato grosso", "MT"),
    ("mato grosso do sul", "MS"),
    ("minas gerais", "MG"),
    ("pará", "PA"),
    ("paraíba", "PB"),
    ("paraná", "PR"),
    ("pernambuco", "PE"),
    ("piauí", "PI"),
    ("rio de janeiro", "RJ"),
    ("rio grande do norte", "RN"),
    ("rio grande do sul", "RS"),
    ("rondônia", "RO"),
    ("roraima", "RR"),
    ("santa catarina", "SC"),
    ("são paulo", "SP"),
    ("sergipe", "SE"),
    ("tocantins", "TO"),
];

/// Variantes de hífen tratadas como separador de palavra.
const HYPHEN_CHARS: &[char] = &['-', '\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}', '\u{2015}'];

/// Caracteres descartados por completo (hífen suave e largura zero).
const DISCARDED_CHARS: &[char] = &['\u{00AD}', '\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'];

/// Prefixos de linha que indicam boilerplate editorial, não conteúdo.
const BOILERPLATE_PREFIXES: &[&str] = &[
    "leia também",
    "leia ainda",
    "crédito:",
    "reportagem:",
    "foto:",
];

static SENTENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?\n]+[.!?]?").expect("regex de sentenças válida"));

static STATE_ABBREV_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = STATE_NAMES
        .iter()
        .map(|(_, uf)| *uf)
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b({alternation})\b")).expect("regex de siglas válida")
});

static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("regex de espaços válida"));

/// Texto normalizado acompanhado do mapa de offsets.
///
/// Para cada caractere `i` da versão normalizada, `offsets[i]` guarda o
/// índice em bytes do caractere de origem no texto original. Caracteres
/// gerados por uma expansão multi-caractere compartilham o mesmo offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    pub text: String,
    pub offsets: Vec<usize>,
}

impl NormalizedText {
    /// Traduz um intervalo `[start, end)` em caracteres normalizados para o
    /// intervalo equivalente em bytes no texto original.
    pub fn original_span(&self, original: &str, start: usize, end: usize) -> (usize, usize) {
        if start >= end || end > self.offsets.len() {
            return (0, 0);
        }
        let orig_start = self.offsets[start];
        let last = self.offsets[end - 1];
        let last_len = original[last..]
            .chars()
            .next()
            .map(char::len_utf8)
            .unwrap_or(0);
        (orig_start, last + last_len)
    }
}

fn normalize_char(ch: char, out: &mut String, offsets: &mut Vec<usize>, index: usize) {
    if HYPHEN_CHARS.contains(&ch) {
        out.push(' ');
        offsets.push(index);
        return;
    }
    if DISCARDED_CHARS.contains(&ch) {
        return;
    }
    for decomposed in std::iter::once(ch).nfkd() {
        if is_combining_mark(decomposed) {
            continue;
        }
        for lowered in decomposed.to_lowercase() {
            out.push(lowered);
            offsets.push(index);
        }
    }
}

/// Normaliza `text` devolvendo a versão para matching e o mapa de offsets.
///
/// Garantia central: `offsets.len()` é igual à quantidade de caracteres do
/// texto normalizado, e cada entrada aponta para o caractere de origem.
pub fn normalize_text_with_offsets(text: &str) -> NormalizedText {
    let mut normalized = String::with_capacity(text.len());
    let mut offsets = Vec::with_capacity(text.len());
    for (index, ch) in text.char_indices() {
        normalize_char(ch, &mut normalized, &mut offsets, index);
    }
    NormalizedText {
        text: normalized,
        offsets,
    }
}

/// Remove boilerplate editorial e colapsa espaços em branco.
pub fn normalize_article_text(text: &str) -> String {
    let mut lines = Vec::new();
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let lowered = line.to_lowercase();
        if BOILERPLATE_PREFIXES
            .iter()
            .any(|prefix| lowered.starts_with(prefix))
        {
            continue;
        }
        lines.push(line);
    }
    let cleaned = lines.join("\n");
    WHITESPACE_REGEX.replace_all(&cleaned, " ").trim().to_string()
}

/// Retorna a sentença que contém o intervalo `[start, end)` em bytes.
///
/// Quando nenhuma sentença contém o intervalo, devolve o texto inteiro
/// aparado, preservando algum contexto para o chamador.
pub fn find_sentence_containing(text: &str, start: usize, _end: usize) -> String {
    for sentence in SENTENCE_REGEX.find_iter(text) {
        if sentence.start() <= start && start < sentence.end() {
            return sentence.as_str().trim().to_string();
        }
    }
    text.trim().to_string()
}

/// Identifica as siglas de estados brasileiros presentes no texto.
///
/// A busca combina nomes completos (sem diferenciar caixa) com siglas
/// isoladas de duas letras. O resultado ordenado torna o consumo
/// determinístico.
pub fn extract_state_mentions(text: &str) -> BTreeSet<String> {
    let mut mentions = BTreeSet::new();
    let lowered = text.to_lowercase();
    for (name, uf) in STATE_NAMES {
        if lowered.contains(name) {
            mentions.insert((*uf).to_string());
        }
    }
    for found in STATE_ABBREV_REGEX.find_iter(text) {
        mentions.insert(found.as_str().to_string());
    }
    mentions
}
