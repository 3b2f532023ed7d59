// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Comment and whitespace stripping.
//!
//! Lightweight lexer for PHP-style sources. Text outside of `<?php` and `<?=`
//! tags is copied as-is. Inside of code, comments are dropped, and runs of
//! whitespace are collapsed. Quoted strings and heredoc bodies are never
//! touched.
//!
//! Every newline of the input survives, including the newlines that were
//! part of a block comment. Thus, line numbers reported against the stripped
//! source still match the unstripped source.

/// Remove comments, and collapse whitespace while keeping every line break.
pub fn strip_whitespace(source: &str) -> String {
    let mut output = String::with_capacity(source.len());
    let mut rest = source;
    let mut inline = true;

    while !rest.is_empty() {
        if inline {
            match open_tag(rest) {
                Some(end) => {
                    output.push_str(&rest[..end]);
                    rest = &rest[end..];
                    inline = false;
                }
                None => {
                    output.push_str(rest);
                    break;
                }
            }
            continue;
        }

        let consumed = if rest.starts_with("?>") {
            output.push_str("?>");
            inline = true;
            2
        } else if rest.starts_with("//") || (rest.starts_with('#') && !rest.starts_with("#[")) {
            line_comment_len(rest)
        } else if rest.starts_with("/*") {
            let end = rest[2..].find("*/").map_or(rest.len(), |at| at + 4);
            let newlines = rest[..end].matches('\n').count();
            output.push_str("\n".repeat(newlines).as_str());
            end
        } else if rest.starts_with(is_whitespace) {
            let end = rest.find(|c: char| !is_whitespace(c)).unwrap_or(rest.len());
            output.push_str(normalize_whitespace(&rest[..end]).as_str());
            end
        } else if rest.starts_with(['\'', '"', '`']) {
            let end = quoted_len(rest);
            output.push_str(&rest[..end]);
            end
        } else if let Some(end) = heredoc_len(rest) {
            output.push_str(&rest[..end]);
            end
        } else {
            let next = rest.chars().next().map_or(1, char::len_utf8);
            output.push_str(&rest[..next]);
            next
        };

        rest = &rest[consumed..];
    }

    output
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

// Byte offset right after the first open tag, if any.
fn open_tag(text: &str) -> Option<usize> {
    let long = text.find("<?php").map(|at| at + 5);
    let echo = text.find("<?=").map(|at| at + 3);
    match (long, echo) {
        (Some(long), Some(echo)) => Some(long.min(echo)),
        (long, echo) => long.or(echo),
    }
}

// Line comments end at the line break, or at a close tag.
fn line_comment_len(text: &str) -> usize {
    let newline = text.find(['\n', '\r']).unwrap_or(text.len());
    let close = text.find("?>").unwrap_or(text.len());
    newline.min(close)
}

fn normalize_whitespace(whitespace: &str) -> String {
    let mut output = String::with_capacity(whitespace.len());
    let mut chars = whitespace.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' => {
                while chars.next_if(|c| matches!(c, ' ' | '\t')).is_some() {}
                output.push(' ');
            }
            '\r' => {
                let _ = chars.next_if_eq(&'\n');
                output.push('\n');
            }
            other => output.push(other),
        }
    }

    // INVARIANT: No indentation survives a line break.
    output.replace("\n ", "\n")
}

fn quoted_len(text: &str) -> usize {
    let mut chars = text.char_indices();
    let Some((_, quote)) = chars.next() else {
        return 0;
    };

    let mut escaped = false;
    for (at, c) in chars {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return at + c.len_utf8();
        }
    }

    text.len()
}

// Length of heredoc or nowdoc including its closing identifier.
fn heredoc_len(text: &str) -> Option<usize> {
    let after = text.strip_prefix("<<<")?;
    let label = after.trim_start_matches([' ', '\t']);
    let mut at = text.len() - label.len();

    let quote = label.chars().next().filter(|c| matches!(c, '\'' | '"'));
    let label = match quote {
        Some(_) => &label[1..],
        None => label,
    };
    let len = label
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(label.len());
    if len == 0 {
        return None;
    }

    let identifier = &label[..len];
    at += quote.map_or(0, |_| 1) + len;
    if let Some(quote) = quote {
        if !text[at..].starts_with(quote) {
            return None;
        }
        at += 1;
    }

    if text[at..].starts_with("\r\n") {
        at += 2;
    } else if text[at..].starts_with('\n') {
        at += 1;
    } else {
        return None;
    }

    while at < text.len() {
        let line_end = text[at..].find('\n').map_or(text.len(), |end| at + end + 1);
        let line = &text[at..line_end];
        let indent = line.len() - line.trim_start_matches([' ', '\t']).len();
        if let Some(tail) = line[indent..].strip_prefix(identifier) {
            if !tail.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
                return Some(at + indent + identifier.len());
            }
        }
        at = line_end;
    }

    Some(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case(
        "<?php\n/**\n * Doc\n */\nclass A {}\n",
        "<?php\n\n\n\nclass A {}\n";
        "doc comment keeps its lines"
    )]
    #[test_case(
        "<?php\n    $a  =\t\t1; // one\n",
        "<?php\n$a = 1; \n";
        "whitespace is collapsed"
    )]
    #[test_case(
        "<?php $url = 'http://example.com'; # note\n",
        "<?php $url = 'http://example.com'; \n";
        "strings survive"
    )]
    #[test_case(
        "<?php $s = \"a \\\" // b\";\n",
        "<?php $s = \"a \\\" // b\";\n";
        "escaped quotes do not end strings"
    )]
    #[test_case(
        "<?php\n#[Attribute]\nfunction f() {}\n",
        "<?php\n#[Attribute]\nfunction f() {}\n";
        "attributes are code"
    )]
    #[test_case(
        "<?php echo 1; // done ?>\n<p>  hi  </p>\n",
        "<?php echo 1; ?>\n<p>  hi  </p>\n";
        "close tag ends line comment"
    )]
    #[test_case(
        "Copyright (c) 2016   // all rights\n",
        "Copyright (c) 2016   // all rights\n";
        "plain text is untouched"
    )]
    #[test_case(
        "<?php\r\n\t$a = 1;\r\n",
        "<?php\n$a = 1;\n";
        "line breaks are normalized"
    )]
    #[test]
    fn strips(source: &str, expect: &str) {
        pretty_assertions::assert_eq!(strip_whitespace(source), expect);
    }

    #[test]
    fn heredoc_bodies_survive() {
        let source = indoc! {r#"
            <?php
            $html = <<<HTML
                <a href="http://example.com">  # not a comment </a>
                HTML;
            $raw = <<<'RAW'
              /* kept */
            RAW;
        "#};

        assert_eq!(strip_whitespace(source), source);
    }

    #[test]
    fn line_numbers_survive() {
        let source = indoc! {r#"
            <?php

            /*
             * Block.
             */
            namespace App;

            // Line.
            class Deploy
            {
                const VERSION = '@package_version@';
            }
        "#};

        let stripped = strip_whitespace(source);

        assert_eq!(stripped.lines().count(), source.lines().count());
        assert_eq!(stripped.lines().nth(5), Some("namespace App;"));
        assert_eq!(
            stripped.lines().nth(10),
            Some("const VERSION = '@package_version@';")
        );
    }
}
