use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref PUNCT: Regex = Regex::new(r"[[:punct:]]").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref DEFAULT_STOPWORDS: Arc<HashSet<String>> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        Arc::new(normalize_stopwords(words.iter().copied()))
    };
}

/// Lowercases and strips punctuation, the part of the pipeline that runs before splitting.
fn clean(text: &str) -> String {
    let lowered = text.nfkc().collect::<String>().to_lowercase();
    PUNCT.replace_all(&lowered, "").into_owned()
}

fn normalize_stopwords<'a>(words: impl IntoIterator<Item = &'a str>) -> HashSet<String> {
    words
        .into_iter()
        .map(clean)
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Turns raw text into index terms: NFKC + lowercase, punctuation removal,
/// whitespace split, stopword removal, English stemming.
///
/// Token order and repeats survive every step, so the output of a document
/// can be counted directly into term frequencies.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stopwords: Arc<HashSet<String>>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self { stopwords: DEFAULT_STOPWORDS.clone() }
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `words` instead of the built-in English list. Each word goes through
    /// the same lowercase/punctuation cleanup as the text it filters.
    pub fn with_stopwords<'a>(words: impl IntoIterator<Item = &'a str>) -> Self {
        Self { stopwords: Arc::new(normalize_stopwords(words)) }
    }

    /// Loads a stopword list with one word per line. Blank lines and lines
    /// starting with `#` are skipped.
    pub fn from_stopword_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let words = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));
        let tokenizer = Self::with_stopwords(words);
        tracing::debug!(path = %path.display(), stopwords = tokenizer.stopwords.len(), "loaded stopword list");
        Ok(tokenizer)
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// Hex SHA-1 over the sorted stopword list. Two tokenizers with the same
    /// fingerprint produce the same terms.
    pub fn fingerprint(&self) -> String {
        let mut words: Vec<&str> = self.stopwords.iter().map(String::as_str).collect();
        words.sort_unstable();
        let mut hasher = Sha1::new();
        for word in words {
            hasher.update(word.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn preprocess(&self, text: &str) -> Vec<String> {
        clean(text)
            .split_whitespace()
            .filter(|token| !self.is_stopword(token))
            .map(|token| STEMMER.stem(token).into_owned())
            .collect()
    }

    /// Preprocesses `input` and requires it to reduce to exactly one term.
    pub fn single_term(&self, input: &str) -> Result<String> {
        let mut tokens = self.preprocess(input);
        if tokens.len() != 1 {
            return Err(Error::InvalidTerm { input: input.to_string(), tokens });
        }
        Ok(tokens.remove(0))
    }
}

/// Tokenizes with the built-in stopword list.
pub fn tokenize(text: &str) -> Vec<String> {
    Tokenizer::default().preprocess(text)
}
