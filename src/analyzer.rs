//! Text analysis pipelines for the event index.
//!
//! Three pipelines share lowercase normalization:
//! 1. word: `SimpleTokenizer` split on whitespace and punctuation
//! 2. shingle: word tokens joined into windows of 2 and 3 tokens
//! 3. ngram: character n-grams of length 3 to 5 over the raw text
//!
//! The same analyzers are registered on the index (so indexing and query
//! construction always agree) and are available through [`tokenize`].

use tantivy::{
    Index,
    tokenizer::{
        LowerCaser,
        NgramTokenizer,
        RemoveLongFilter,
        SimpleTokenizer,
        TextAnalyzer,
        Token,
        TokenStream,
        Tokenizer,
    },
};

use crate::error::Result;

/// Tokenizer name for name, description and location text fields.
pub const WORD_TOKENIZER: &str = "event_word";

/// Tokenizer name for the tag field: words plus their shingles.
pub const TAG_TOKENIZER: &str = "event_tag";

/// Tokenizer name for the combined n-gram field.
pub const NGRAM_TOKENIZER: &str = "event_ngram";

const MAX_TOKEN_LENGTH: usize = 40;

const MIN_SHINGLE_SIZE: usize = 2;
const MAX_SHINGLE_SIZE: usize = 3;

const MIN_NGRAM: usize = 3;
const MAX_NGRAM: usize = 5;

/// A token pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Word,
    /// Shingles only, unigrams suppressed.
    Shingle,
    Ngram,
}

impl Pipeline {
    pub fn analyzer(self) -> Result<TextAnalyzer> {
        match self {
            Self::Word => Ok(word_analyzer()),
            Self::Shingle => {
                Ok(TextAnalyzer::builder(ShingleTokenizer::new(false)).build())
            }
            Self::Ngram => ngram_analyzer(),
        }
    }
}

/// Run `text` through a pipeline and collect the token texts.
///
/// Text shorter than the pipeline's minimum window yields no tokens.
pub fn tokenize(pipeline: Pipeline, text: &str) -> Result<Vec<String>> {
    let mut analyzer = pipeline.analyzer()?;
    Ok(collect_tokens(&mut analyzer, text))
}

/// Register every event analyzer on the index.
pub fn register_tokenizers(index: &Index) -> Result<()> {
    let tokenizers = index.tokenizers();
    tokenizers.register(WORD_TOKENIZER, word_analyzer());
    tokenizers.register(
        TAG_TOKENIZER,
        TextAnalyzer::builder(ShingleTokenizer::new(true)).build(),
    );
    tokenizers.register(NGRAM_TOKENIZER, ngram_analyzer()?);
    Ok(())
}

fn word_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LENGTH))
        .filter(LowerCaser)
        .build()
}

fn ngram_analyzer() -> Result<TextAnalyzer> {
    let ngrams = NgramTokenizer::new(MIN_NGRAM, MAX_NGRAM, false)?;
    Ok(TextAnalyzer::builder(ngrams).filter(LowerCaser).build())
}

fn collect_tokens(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    analyzer
        .token_stream(text)
        .process(&mut |token| tokens.push(token.text.clone()));
    tokens
}

/// Emits contiguous windows of word tokens joined by a single space.
///
/// With `output_unigrams` the single word tokens are emitted as well, which
/// is what the tag field indexes so that both single-word and multi-word
/// tag phrases can be matched by a term query.
#[derive(Clone)]
pub struct ShingleTokenizer {
    words: TextAnalyzer,
    output_unigrams: bool,
}

impl ShingleTokenizer {
    pub fn new(output_unigrams: bool) -> Self {
        Self {
            words: word_analyzer(),
            output_unigrams,
        }
    }
}

impl Tokenizer for ShingleTokenizer {
    type TokenStream<'a> = ShingleTokenStream;

    fn token_stream<'a>(
        &'a mut self,
        text: &'a str,
    ) -> Self::TokenStream<'a> {
        let mut words: Vec<Token> = Vec::new();
        self.words
            .token_stream(text)
            .process(&mut |token| words.push(token.clone()));

        let mut tokens = Vec::new();
        for start in 0..words.len() {
            if self.output_unigrams {
                tokens.push(words[start].clone());
            }
            for size in MIN_SHINGLE_SIZE..=MAX_SHINGLE_SIZE {
                let Some(window) = words.get(start..start + size) else {
                    break;
                };
                let text = window
                    .iter()
                    .map(|t| t.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                tokens.push(Token {
                    offset_from: window[0].offset_from,
                    offset_to: window[size - 1].offset_to,
                    position: words[start].position,
                    text,
                    position_length: size,
                });
            }
        }

        ShingleTokenStream { tokens, cursor: 0 }
    }
}

pub struct ShingleTokenStream {
    tokens: Vec<Token>,
    cursor: usize,
}

impl TokenStream for ShingleTokenStream {
    fn advance(&mut self) -> bool {
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.cursor - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.cursor - 1]
    }
}
