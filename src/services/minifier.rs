//! CSS and JavaScript minification
//!
//! Both minifiers are single pass scanners: comments are dropped and
//! whitespace runs are collapsed, while string literals (and JavaScript
//! template and regular expression literals) are copied untouched.

use std::iter::Peekable;
use std::str::Chars;

use crate::config::AssetKind;

/// CSS characters that never need a space before them
const CSS_TIGHT_BEFORE: &str = "{};,>)";
/// CSS characters that never need a space after them
const CSS_TIGHT_AFTER: &str = "{};,>(:";

/// JavaScript characters after which a regular expression literal may start
const JS_REGEX_PRECEDERS: &str = "(,=:[!&|?{};+-*%<>~^";
/// JavaScript keywords after which a regular expression literal may start
const JS_REGEX_KEYWORDS: &[&str] = &["return", "typeof", "case", "do", "else", "in", "of", "void", "yield"];
/// A line break after one of these cannot end a statement
const JS_CONTINUES_AFTER: &str = "{;,([=:&|?+-*/<>!~%^";
/// A line break before one of these cannot end a statement
const JS_CONTINUES_BEFORE: &str = "})],.;:?=&|";

/// Minify a source according to its kind
pub fn minify(kind: AssetKind, source: &str) -> String {
    match kind {
        AssetKind::Css => minify_css(source),
        AssetKind::Js => minify_js(source),
    }
}

/// Minify a stylesheet
pub fn minify_css(source: &str) -> String {
    let mut result = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            skip_block_comment(&mut chars);
            pending_space = true;
            continue;
        }

        if c.is_whitespace() {
            pending_space = true;
            continue;
        }

        if pending_space && needs_css_space(&result, c) {
            result.push(' ');
        }
        pending_space = false;

        match c {
            '"' | '\'' => copy_quoted(c, &mut chars, &mut result),
            '}' => {
                if result.ends_with(';') {
                    result.pop();
                }
                result.push(c);
            }
            _ => result.push(c),
        }
    }

    result
}

fn needs_css_space(result: &str, next: char) -> bool {
    match result.chars().last() {
        Some(prev) => !CSS_TIGHT_AFTER.contains(prev) && !CSS_TIGHT_BEFORE.contains(next),
        None => false,
    }
}

/// Minify a script
///
/// Line breaks are kept where they may end a statement, so code relying on
/// automatic semicolon insertion still parses the same way.
pub fn minify_js(source: &str) -> String {
    let mut result = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut gap = Gap::None;

    while let Some(c) = chars.next() {
        if c == '/' {
            match chars.peek() {
                Some('/') => {
                    while let Some(&next) = chars.peek() {
                        if next == '\n' {
                            break;
                        }
                        chars.next();
                    }
                    continue;
                }
                Some('*') => {
                    chars.next();
                    if skip_block_comment(&mut chars) {
                        gap = Gap::Line;
                    } else {
                        gap = gap.max(Gap::Space);
                    }
                    continue;
                }
                _ => {}
            }
        }

        if c.is_whitespace() {
            gap = if c == '\n' { Gap::Line } else { gap.max(Gap::Space) };
            continue;
        }

        write_js_gap(&mut result, gap, c);
        gap = Gap::None;

        match c {
            '"' | '\'' | '`' => copy_quoted(c, &mut chars, &mut result),
            '/' if regex_allowed(&result) => copy_regex(&mut chars, &mut result),
            _ => result.push(c),
        }
    }

    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Gap {
    None,
    Space,
    Line,
}

fn write_js_gap(result: &mut String, gap: Gap, next: char) {
    let Some(prev) = result.chars().last() else {
        return;
    };

    let space_needed =
        (is_identifier_char(prev) && is_identifier_char(next)) || (prev == next && (prev == '+' || prev == '-'));

    match gap {
        Gap::None => {}
        Gap::Space => {
            if space_needed {
                result.push(' ');
            }
        }
        Gap::Line => {
            if JS_CONTINUES_AFTER.contains(prev) || JS_CONTINUES_BEFORE.contains(next) {
                if space_needed {
                    result.push(' ');
                }
            } else {
                result.push('\n');
            }
        }
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '\\' || !c.is_ascii()
}

fn regex_allowed(result: &str) -> bool {
    let Some(prev) = result.chars().last() else {
        return true;
    };
    if JS_REGEX_PRECEDERS.contains(prev) || prev == '\n' {
        return true;
    }

    let word: String = result
        .chars()
        .rev()
        .take_while(|c| is_identifier_char(*c))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    JS_REGEX_KEYWORDS.contains(&word.as_str())
}

/// Skip until the end of a `/* */` comment, returning whether it spanned lines
fn skip_block_comment(chars: &mut Peekable<Chars<'_>>) -> bool {
    let mut multiline = false;
    while let Some(c) = chars.next() {
        if c == '\n' {
            multiline = true;
        } else if c == '*' && chars.peek() == Some(&'/') {
            chars.next();
            break;
        }
    }
    multiline
}

/// Copy a quoted literal, escapes included, up to its closing quote
fn copy_quoted(quote: char, chars: &mut Peekable<Chars<'_>>, result: &mut String) {
    result.push(quote);
    while let Some(c) = chars.next() {
        result.push(c);
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                result.push(escaped);
            }
        } else if c == quote {
            break;
        }
    }
}

/// Copy a regular expression literal; its flags follow as identifier chars
fn copy_regex(chars: &mut Peekable<Chars<'_>>, result: &mut String) {
    result.push('/');
    let mut in_class = false;
    while let Some(c) = chars.next() {
        result.push(c);
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    result.push(escaped);
                }
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => break,
            '\n' => break,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_css_strips_comments_and_whitespace() {
        let css = "/* header */\nbody {\n    color: red;\n    margin: 0 auto;\n}\n\na > b ,\ni { }";
        assert_eq!(minify_css(css), "body{color:red;margin:0 auto}a>b,i{}");
    }

    #[test]
    fn test_css_keeps_significant_spaces() {
        assert_eq!(minify_css("div  :hover { width: calc(1px + 2px) }"), "div :hover{width:calc(1px + 2px)}");
        assert_eq!(
            minify_css("@media screen and (max-width: 600px) { a { b: c } }"),
            "@media screen and (max-width:600px){a{b:c}}"
        );
    }

    #[test]
    fn test_css_strings_are_untouched() {
        assert_eq!(
            minify_css("a::after { content: \"/* not   a comment */\"; }"),
            "a::after{content:\"/* not   a comment */\"}"
        );
        assert_eq!(minify_css("a { content: 'it\\'s  }'; }"), "a{content:'it\\'s  }'}");
    }

    #[test]
    fn test_js_strips_comments() {
        let js = "// leading\nvar a = 1; /* inline */ var b = 2;\n";
        assert_eq!(minify_js(js), "var a=1;var b=2;");
    }

    #[test]
    fn test_js_keeps_statement_breaks() {
        assert_eq!(minify_js("let a = b\nlet c = d\n"), "let a=b\nlet c=d");
        assert_eq!(minify_js("return\nvalue"), "return\nvalue");
        assert_eq!(minify_js("foo(a,\n  b)\n.then(c)"), "foo(a,b).then(c)");
    }

    #[test]
    fn test_js_keeps_operator_spacing() {
        assert_eq!(minify_js("a + +b"), "a+ +b");
        assert_eq!(minify_js("a - -b"), "a- -b");
        assert_eq!(minify_js("typeof x === 'y'"), "typeof x==='y'");
    }

    #[test]
    fn test_js_literals_are_untouched() {
        assert_eq!(minify_js("var s = \"a  // b\";"), "var s=\"a  // b\";");
        assert_eq!(minify_js("var t = `x  ${y}  z`;"), "var t=`x  ${y}  z`;");
        assert_eq!(minify_js("var r = /[/]  +\\//g;"), "var r=/[/]  +\\//g;");
        assert_eq!(minify_js("return /a b/.test(s)"), "return/a b/.test(s)");
    }

    #[test]
    fn test_js_division_is_not_a_regex() {
        assert_eq!(minify_js("var x = a / b / c;"), "var x=a/b/c;");
    }

    #[test]
    fn test_minify_dispatches_on_kind() {
        assert_eq!(minify(AssetKind::Css, "a { b: c; }"), "a{b:c}");
        assert_eq!(minify(AssetKind::Js, "a = 1 ;"), "a=1;");
    }

    proptest! {
        #[test]
        fn prop_css_string_content_preserved(content in "[a-z /*{};:]{0,40}") {
            let css = format!("a {{ content: \"{}\" }}", content);
            let minified = minify_css(&css);
            let expected = format!("\"{}\"", content);
            prop_assert!(minified.contains(&expected));
        }

        #[test]
        fn prop_js_string_content_preserved(content in "[a-z /*{};:]{0,40}") {
            let js = format!("var s = '{}';", content);
            let minified = minify_js(&js);
            let expected = format!("'{}'", content);
            prop_assert!(minified.contains(&expected));
        }

        #[test]
        fn prop_minified_css_never_longer(css in "[a-z{};: \n]{0,80}") {
            prop_assert!(minify_css(&css).len() <= css.len());
        }
    }
}
