//! # Extração da Tag Inicial
//!
//! O texto pode começar com uma tag que escolhe o conjunto de analisadores:
//!
//! ```text
//! <delimitador>TAG]<resto>
//! ```
//!
//! O delimitador configurado é normalizado para terminar em `[` (ex: `""` → `"["`,
//! `"lang:"` → `"lang:["`). Sem o prefixo, ou sem um `]` depois dele, não há tag e o
//! texto inteiro é o resto.
//!
//! ```rust
//! use dynan_core::tag::strip_tag;
//!
//! let split = strip_tag("[std]foo bar", "[");
//! assert_eq!(split.tag, Some("std"));
//! assert_eq!(split.rest, "foo bar");
//!
//! let split = strip_tag("foo [std] bar", "[");
//! assert_eq!(split.tag, None);
//! assert_eq!(split.rest, "foo [std] bar");
//! ```

use std::borrow::Cow;

pub const TAG_OPEN: char = '[';
pub const TAG_CLOSE: char = ']';

/// Garante que o delimitador termina com `[`.
pub fn normalize_delimiter(delimiter: &str) -> Cow<'_, str> {
    if delimiter.ends_with(TAG_OPEN) {
        Cow::Borrowed(delimiter)
    } else {
        Cow::Owned(format!("{delimiter}{TAG_OPEN}"))
    }
}

/// Resultado da separação tag/resto sobre texto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSplit<'a> {
    pub tag: Option<&'a str>,
    pub rest: &'a str,
    /// Offset (em bytes) do início do resto dentro do conteúdo original.
    pub rest_offset: usize,
}

/// Separa a tag inicial do conteúdo.
pub fn strip_tag<'a>(content: &'a str, delimiter: &str) -> TagSplit<'a> {
    let untagged = TagSplit {
        tag: None,
        rest: content,
        rest_offset: 0,
    };
    let delimiter = normalize_delimiter(delimiter);
    let Some(after) = content.strip_prefix(delimiter.as_ref()) else {
        return untagged;
    };
    match after.find(TAG_CLOSE) {
        Some(close) => {
            let rest_offset = delimiter.len() + close + TAG_CLOSE.len_utf8();
            TagSplit {
                tag: Some(&after[..close]),
                rest: &content[rest_offset..],
                rest_offset,
            }
        }
        None => untagged,
    }
}

/// Resultado da separação sobre um array de caracteres.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharTagSplit {
    pub tag: Option<String>,
    /// Índice (em `char`) do início do resto.
    pub rest_offset: usize,
}

/// Mesma regra de [`strip_tag`], sem materializar o conteúdo como `String`.
pub fn strip_tag_chars(content: &[char], delimiter: &str) -> CharTagSplit {
    let untagged = CharTagSplit {
        tag: None,
        rest_offset: 0,
    };
    let delimiter: Vec<char> = normalize_delimiter(delimiter).chars().collect();
    if !content.starts_with(&delimiter) {
        return untagged;
    }
    let after = &content[delimiter.len()..];
    match after.iter().position(|&c| c == TAG_CLOSE) {
        Some(close) => CharTagSplit {
            tag: Some(after[..close].iter().collect()),
            rest_offset: delimiter.len() + close + 1,
        },
        None => untagged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_delimiter() {
        assert_eq!(normalize_delimiter("["), "[");
        assert_eq!(normalize_delimiter(""), "[");
        assert_eq!(normalize_delimiter("lang:"), "lang:[");
    }

    #[test]
    fn test_custom_delimiter() {
        let split = strip_tag("lang:[pt]olá mundo", "lang:");
        assert_eq!(split.tag, Some("pt"));
        assert_eq!(split.rest, "olá mundo");
        assert_eq!(split.rest_offset, 9);
    }

    #[test]
    fn test_missing_close_is_untagged() {
        let split = strip_tag("[std foo bar", "[");
        assert_eq!(split.tag, None);
        assert_eq!(split.rest, "[std foo bar");
    }

    #[test]
    fn test_empty_tag() {
        let split = strip_tag("[]foo", "[");
        assert_eq!(split.tag, Some(""));
        assert_eq!(split.rest, "foo");
    }

    #[test]
    fn test_close_searched_after_delimiter() {
        // O `]` do próprio delimitador não fecha a tag
        let split = strip_tag("]>[en]texto", "]>");
        assert_eq!(split.tag, Some("en"));
        assert_eq!(split.rest, "texto");
    }

    #[test]
    fn test_chars_variant_matches_text_variant() {
        let text = "[ação]coração";
        let chars: Vec<char> = text.chars().collect();
        let split = strip_tag_chars(&chars, "[");
        assert_eq!(split.tag.as_deref(), Some("ação"));
        let rest: String = chars[split.rest_offset..].iter().collect();
        assert_eq!(rest, "coração");
    }

    proptest! {
        #[test]
        fn prop_tag_round_trip(
            prefix in "[a-z:]{0,4}",
            tag in "[^\\]]{0,12}",
            rest in "\\PC{0,40}",
        ) {
            let delimiter = normalize_delimiter(&prefix).into_owned();
            let content = format!("{delimiter}{tag}]{rest}");
            let split = strip_tag(&content, &prefix);
            prop_assert_eq!(split.tag, Some(tag.as_str()));
            prop_assert_eq!(split.rest, rest.as_str());

            let chars: Vec<char> = content.chars().collect();
            let char_split = strip_tag_chars(&chars, &prefix);
            prop_assert_eq!(char_split.tag.as_deref(), Some(tag.as_str()));
        }

        #[test]
        fn prop_untagged_content_is_unchanged(content in "[^\\[]\\PC{0,40}") {
            let split = strip_tag(&content, "[");
            prop_assert_eq!(split.tag, None);
            prop_assert_eq!(split.rest, content.as_str());
        }

        #[test]
        fn prop_missing_close_is_unchanged(body in "[^\\]]{0,30}") {
            let content = format!("[{body}");
            let split = strip_tag(&content, "[");
            prop_assert_eq!(split.tag, None);
            prop_assert_eq!(split.rest, content.as_str());
        }
    }
}
