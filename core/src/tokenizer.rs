use crate::index::Occurrences;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{BTreeMap, HashSet};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref SEPARATORS: Regex = Regex::new(r"[^\p{L}\p{N}]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "did","do","does","doing","down","during",
            "each","few","for","from","further",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","very",
            "was","we","were","what","when","where","which","while","who","whom","why","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Markup context a word was found in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenContext {
    pub is_header: bool,
    pub is_emphasized: bool,
}

impl TokenContext {
    pub const PLAIN: Self = Self { is_header: false, is_emphasized: false };
    pub const HEADER: Self = Self { is_header: true, is_emphasized: false };
    pub const EMPHASIZED: Self = Self { is_header: false, is_emphasized: true };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub is_header: bool,
    pub is_emphasized: bool,
}

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Normalize text into stemmed tokens tagged with `context`.
///
/// NFKC, lowercase and trim, then split on runs of non-alphanumeric characters
/// and stem every piece. Pieces that stem to nothing are dropped.
pub fn tokenize(text: &str, context: TokenContext) -> Vec<Token> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    SEPARATORS
        .split(normalized.trim())
        .filter(|word| !word.is_empty())
        .map(|word| STEMMER.stem(word).into_owned())
        .filter(|stem| !stem.is_empty())
        .map(|value| Token { value, is_header: context.is_header, is_emphasized: context.is_emphasized })
        .collect()
}

/// Tokens for a search box query: plain context, duplicates removed, first occurrence kept.
pub fn tokenize_query(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text, TokenContext::PLAIN)
        .into_iter()
        .map(|t| t.value)
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

pub fn remove_stopwords(tokens: Vec<Token>) -> Vec<Token> {
    tokens.into_iter().filter(|t| !is_stopword(&t.value)).collect()
}

/// Fold a token stream into per-token occurrence buckets.
///
/// Header context wins over emphasis, which wins over plain text.
pub fn token_frequency(tokens: &[Token]) -> BTreeMap<String, Occurrences> {
    let mut freq: BTreeMap<String, Occurrences> = BTreeMap::new();
    for token in tokens {
        let entry = freq.entry(token.value.clone()).or_default();
        if token.is_header {
            entry.header_count += 1;
        } else if token.is_emphasized {
            entry.important_count += 1;
        } else {
            entry.text_count += 1;
        }
    }
    freq
}
