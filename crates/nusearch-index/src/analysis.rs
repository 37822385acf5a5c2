//! Analysis pipeline definition.
//!
//! Package identifiers mix delimiters (`Microsoft.Extensions.Logging`) and
//! camel case (`ShebangModule`), while users type partial, lower-cased
//! fragments. Two analyzers attached to the `id` field cover both ends:
//!
//! | Analyzer | Chain | `Foo.BarBaz` → |
//! |----------|-------|----------------|
//! | `nuget-id-analyzer` | pattern `\W+` → word delimiter → lowercase | `foo`, `barbaz`, `bar`, `baz` |
//! | `nuget-id-keyword` | keyword → lowercase | `foo.barbaz` |
//!
//! The definition is plain data sent to the engine at index-creation time.
//! [`AnalysisDefinition::analyzer`] compiles a named analyzer into an
//! [`Analyzer`] that produces the same token stream locally; the in-memory
//! engine relies on it and tests pin the documented tokenizations.

use std::collections::BTreeMap;

use nusearch_core::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Tokenizer splitting identifiers on any non-word character.
pub const ID_TOKENIZER: &str = "nuget-id-tokenizer";

/// Word-delimiter filter for identifier parts.
pub const ID_WORDS_FILTER: &str = "nuget-id-words";

/// Analyzer for the analyzed form of `id`.
pub const ID_ANALYZER: &str = "nuget-id-analyzer";

/// Analyzer for the single-token, lower-cased form of `id`.
pub const ID_KEYWORD_ANALYZER: &str = "nuget-id-keyword";

/// Built-in analyzer used for text fields without an explicit analyzer.
pub const STANDARD_ANALYZER: &str = "standard";

const BUILTIN_TOKENIZERS: &[&str] = &["keyword", "standard", "whitespace"];
const BUILTIN_FILTERS: &[&str] = &["lowercase"];

// ============================================================================
// Definition
// ============================================================================

/// Custom tokenizer definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenizerDefinition {
    /// Split wherever `pattern` matches.
    Pattern {
        /// Separator regex.
        pattern: String,
    },
}

/// Options of a word-delimiter filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordDelimiterOptions {
    /// Split `fooBar` into `foo`, `Bar`.
    pub split_on_case_change: bool,
    /// Split `log4net` into `log`, `4`, `net`.
    pub split_on_numerics: bool,
    /// Emit alphabetic parts.
    pub generate_word_parts: bool,
    /// Emit numeric parts.
    pub generate_number_parts: bool,
    /// Emit the unsplit token ahead of its parts.
    pub preserve_original: bool,
}

/// Custom token filter definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterDefinition {
    /// Sub-word splitting.
    WordDelimiter(WordDelimiterOptions),
}

/// Custom analyzer: one tokenizer followed by filters, by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerDefinition {
    /// Tokenizer name (custom or built-in).
    pub tokenizer: String,
    /// Filter names applied in order (custom or built-in).
    pub filters: Vec<String>,
}

/// Complete analysis section of an index definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDefinition {
    /// Custom tokenizers by name.
    pub tokenizers: BTreeMap<String, TokenizerDefinition>,
    /// Custom filters by name.
    pub filters: BTreeMap<String, FilterDefinition>,
    /// Custom analyzers by name.
    pub analyzers: BTreeMap<String, AnalyzerDefinition>,
}

impl AnalysisDefinition {
    /// The analysis pipeline attached to every package index generation.
    pub fn package_analysis() -> Self {
        let mut analysis = Self::default();

        analysis.tokenizers.insert(
            ID_TOKENIZER.to_string(),
            TokenizerDefinition::Pattern {
                pattern: r"\W+".to_string(),
            },
        );

        analysis.filters.insert(
            ID_WORDS_FILTER.to_string(),
            FilterDefinition::WordDelimiter(WordDelimiterOptions {
                split_on_case_change: true,
                split_on_numerics: true,
                generate_word_parts: true,
                generate_number_parts: false,
                preserve_original: true,
            }),
        );

        analysis.analyzers.insert(
            ID_ANALYZER.to_string(),
            AnalyzerDefinition {
                tokenizer: ID_TOKENIZER.to_string(),
                filters: vec![ID_WORDS_FILTER.to_string(), "lowercase".to_string()],
            },
        );

        analysis.analyzers.insert(
            ID_KEYWORD_ANALYZER.to_string(),
            AnalyzerDefinition {
                tokenizer: "keyword".to_string(),
                filters: vec!["lowercase".to_string()],
            },
        );

        analysis
    }

    /// Check that every reference resolves and every pattern compiles.
    pub fn validate(&self) -> Result<()> {
        for (name, tokenizer) in &self.tokenizers {
            match tokenizer {
                TokenizerDefinition::Pattern { pattern } => {
                    Regex::new(pattern).map_err(|e| {
                        Error::schema(format!("tokenizer '{name}' has invalid pattern: {e}"))
                    })?;
                }
            }
        }

        for (name, analyzer) in &self.analyzers {
            if !self.tokenizers.contains_key(&analyzer.tokenizer)
                && !BUILTIN_TOKENIZERS.contains(&analyzer.tokenizer.as_str())
            {
                return Err(Error::schema(format!(
                    "analyzer '{name}' references unknown tokenizer '{}'",
                    analyzer.tokenizer
                )));
            }
            for filter in &analyzer.filters {
                if !self.filters.contains_key(filter) && !BUILTIN_FILTERS.contains(&filter.as_str())
                {
                    return Err(Error::schema(format!(
                        "analyzer '{name}' references unknown filter '{filter}'"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Whether `name` is a custom or built-in analyzer.
    pub fn has_analyzer(&self, name: &str) -> bool {
        self.analyzers.contains_key(name) || name == STANDARD_ANALYZER || name == "keyword"
    }

    /// Compile a named analyzer.
    pub fn analyzer(&self, name: &str) -> Result<Analyzer> {
        match name {
            STANDARD_ANALYZER if !self.analyzers.contains_key(name) => Ok(Analyzer {
                tokenizer: Tokenizer::Standard,
                filters: vec![TokenFilter::Lowercase],
            }),
            "keyword" if !self.analyzers.contains_key(name) => Ok(Analyzer {
                tokenizer: Tokenizer::Keyword,
                filters: Vec::new(),
            }),
            _ => {
                let definition = self
                    .analyzers
                    .get(name)
                    .ok_or_else(|| Error::schema(format!("unknown analyzer '{name}'")))?;
                self.compile(definition)
            }
        }
    }

    fn compile(&self, definition: &AnalyzerDefinition) -> Result<Analyzer> {
        let tokenizer = match self.tokenizers.get(&definition.tokenizer) {
            Some(TokenizerDefinition::Pattern { pattern }) => Tokenizer::Pattern(
                Regex::new(pattern).map_err(|e| Error::schema(e.to_string()))?,
            ),
            None => match definition.tokenizer.as_str() {
                "keyword" => Tokenizer::Keyword,
                "standard" => Tokenizer::Standard,
                "whitespace" => Tokenizer::Whitespace,
                other => return Err(Error::schema(format!("unknown tokenizer '{other}'"))),
            },
        };

        let filters = definition
            .filters
            .iter()
            .map(|name| match self.filters.get(name) {
                Some(FilterDefinition::WordDelimiter(options)) => {
                    Ok(TokenFilter::WordDelimiter(*options))
                }
                None if name == "lowercase" => Ok(TokenFilter::Lowercase),
                None => Err(Error::schema(format!("unknown filter '{name}'"))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Analyzer { tokenizer, filters })
    }
}

// ============================================================================
// Analyzer
// ============================================================================

#[derive(Debug, Clone)]
enum Tokenizer {
    Keyword,
    Standard,
    Whitespace,
    Pattern(Regex),
}

#[derive(Debug, Clone)]
enum TokenFilter {
    Lowercase,
    WordDelimiter(WordDelimiterOptions),
}

/// A compiled analyzer: text in, tokens out.
#[derive(Debug, Clone)]
pub struct Analyzer {
    tokenizer: Tokenizer,
    filters: Vec<TokenFilter>,
}

impl Analyzer {
    /// Run the tokenizer and every filter over `text`.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        let mut tokens: Vec<String> = match &self.tokenizer {
            Tokenizer::Keyword => {
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![text.to_string()]
                }
            }
            Tokenizer::Standard => text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            Tokenizer::Whitespace => text.split_whitespace().map(str::to_string).collect(),
            Tokenizer::Pattern(regex) => regex
                .split(text)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        };

        for filter in &self.filters {
            tokens = match filter {
                TokenFilter::Lowercase => tokens.into_iter().map(|t| t.to_lowercase()).collect(),
                TokenFilter::WordDelimiter(options) => tokens
                    .iter()
                    .flat_map(|t| word_delimit(t, options))
                    .collect(),
            };
        }

        tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Upper,
    Lower,
    Digit,
    Delimiter,
}

fn classify(c: char) -> CharClass {
    if c.is_uppercase() {
        CharClass::Upper
    } else if c.is_alphabetic() {
        CharClass::Lower
    } else if c.is_numeric() {
        CharClass::Digit
    } else {
        CharClass::Delimiter
    }
}

/// Split one token into sub-words.
///
/// Breaks on delimiters, on lower→upper transitions, before the last capital
/// of an acronym followed by lower case (`XMLParser` → `XML`, `Parser`) and
/// on letter/digit boundaries.
fn word_delimit(token: &str, options: &WordDelimiterOptions) -> Vec<String> {
    let chars: Vec<char> = token.chars().collect();
    let mut parts: Vec<(String, bool)> = Vec::new();
    let mut current = String::new();
    let mut current_numeric = false;

    for (i, &c) in chars.iter().enumerate() {
        let class = classify(c);
        if class == CharClass::Delimiter {
            if !current.is_empty() {
                parts.push((std::mem::take(&mut current), current_numeric));
            }
            continue;
        }

        if let Some(prev) = current.chars().last() {
            let prev_class = classify(prev);
            let next_class = chars.get(i + 1).map(|&n| classify(n));
            let case_break = options.split_on_case_change
                && ((prev_class == CharClass::Lower && class == CharClass::Upper)
                    || (prev_class == CharClass::Upper
                        && class == CharClass::Upper
                        && next_class == Some(CharClass::Lower)));
            let numeric_break = options.split_on_numerics
                && ((prev_class == CharClass::Digit) != (class == CharClass::Digit));

            if case_break || numeric_break {
                parts.push((std::mem::take(&mut current), current_numeric));
            }
        }

        current_numeric = class == CharClass::Digit;
        current.push(c);
    }
    if !current.is_empty() {
        parts.push((current, current_numeric));
    }

    let wanted = |numeric: bool| {
        if numeric {
            options.generate_number_parts
        } else {
            options.generate_word_parts
        }
    };

    if parts.len() == 1 && parts[0].0 == token {
        return if options.preserve_original || wanted(parts[0].1) {
            vec![token.to_string()]
        } else {
            Vec::new()
        };
    }

    let mut out = Vec::with_capacity(parts.len() + 1);
    if options.preserve_original && !token.is_empty() {
        out.push(token.to_string());
    }
    out.extend(
        parts
            .into_iter()
            .filter(|(_, numeric)| wanted(*numeric))
            .map(|(part, _)| part),
    );
    out
}

// ============================================================================
// Tests
// ============================================================================
