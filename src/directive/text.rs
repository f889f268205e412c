//! Script text front-end.
//!
//! One directive per line. Blank lines and lines starting with `#` or `//` are skipped, and a
//! trailing `;` is ignored. Arguments are whitespace separated; single or double quotes group
//! an argument containing spaces. Directives whose last argument is an expression, a format or
//! a regex keep the rest of the line verbatim as that argument.

use crate::error::{DirectiveError, DirectiveResult};

use super::ParsedDirective;

/// How the tail of a line is treated after a number of leading arguments.
#[derive(Clone, Copy)]
enum Tail {
    /// Expression text, kept exactly as written (quotes are string literals).
    Expression(usize),
    /// Free text; one layer of surrounding quotes is removed.
    Text(usize),
}

fn tail_for(name: &str, first_arg: Option<&str>) -> Option<Tail> {
    let tail = match name {
        "set-column" | "setcolumn" | "set-variable" => Tail::Expression(1),
        "filter-row-if-true" | "filter-row-if-false" | "send-to-error" | "fail" => {
            Tail::Expression(0)
        }
        "increment-variable" => Tail::Expression(2),
        "filter-rows-on" => match first_arg? {
            "condition-true" | "condition-false" => Tail::Expression(1),
            "regex-match" | "regex-not-match" => Tail::Text(2),
            _ => return None,
        },
        "fill-null-or-empty" | "find-and-replace" | "format-date" | "format-unix-timestamp"
        | "parse-as-simple-date" | "filter-row-if-matched" | "filter-row-if-not-matched"
        | "split-to-rows" | "split-to-columns" | "extract-regex-groups" => Tail::Text(1),
        "quantize" => Tail::Text(2),
        "columns-replace" => Tail::Text(0),
        _ => return None,
    };
    Some(tail)
}

/// Split a script into parsed directives.
pub fn parse_script(script: &str) -> DirectiveResult<Vec<ParsedDirective>> {
    let mut out = Vec::new();
    for (idx, raw) in script.lines().enumerate() {
        let line = idx + 1;
        let text = raw.trim();
        let text = text.strip_suffix(';').unwrap_or(text).trim_end();
        if text.is_empty() || text.starts_with('#') || text.starts_with("//") {
            continue;
        }
        out.push(parse_line(line, text)?);
    }
    Ok(out)
}

fn parse_line(line: usize, text: &str) -> DirectiveResult<ParsedDirective> {
    let mut cursor = Cursor { line, text, pos: 0 };
    let name = cursor
        .next_token()?
        .ok_or_else(|| DirectiveError::Syntax {
            line,
            message: "empty directive".to_string(),
        })?;

    // The tail rule may depend on the first argument (`filter-rows-on <command> ...`).
    let mut args = Vec::new();
    let checkpoint = cursor.pos;
    let first = cursor.next_token()?;
    let tail = tail_for(&name, first.as_deref());
    cursor.pos = checkpoint;

    match tail {
        None => {
            while let Some(arg) = cursor.next_token()? {
                args.push(arg);
            }
        }
        Some(Tail::Expression(leading)) | Some(Tail::Text(leading)) => {
            for _ in 0..leading {
                match cursor.next_token()? {
                    Some(arg) => args.push(arg),
                    None => break,
                }
            }
            let rest = cursor.rest();
            if !rest.is_empty() {
                let rest = match tail {
                    Some(Tail::Text(_)) => unquote(rest),
                    _ => rest.to_string(),
                };
                args.push(rest);
            }
        }
    }

    Ok(ParsedDirective {
        line,
        name,
        args,
        text: text.to_string(),
    })
}

fn unquote(raw: &str) -> String {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return raw[1..raw.len() - 1].to_string();
        }
    }
    raw.to_string()
}

struct Cursor<'a> {
    line: usize,
    text: &'a str,
    pos: usize,
}

impl Cursor<'_> {
    fn skip_whitespace(&mut self) {
        let rest = &self.text[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn rest(&mut self) -> &str {
        self.skip_whitespace();
        self.text[self.pos..].trim_end()
    }

    fn next_token(&mut self) -> DirectiveResult<Option<String>> {
        self.skip_whitespace();
        let rest = &self.text[self.pos..];
        let mut chars = rest.char_indices().peekable();
        let Some(&(_, first)) = chars.peek() else {
            return Ok(None);
        };

        let mut token = String::new();
        if first == '"' || first == '\'' {
            chars.next();
            let mut escaped = false;
            for (i, c) in chars {
                if escaped {
                    token.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == first {
                    self.pos += i + c.len_utf8();
                    return Ok(Some(token));
                } else {
                    token.push(c);
                }
            }
            return Err(DirectiveError::Syntax {
                line: self.line,
                message: format!("unterminated quote in '{}'", self.text),
            });
        }

        let end = rest
            .char_indices()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        token.push_str(&rest[..end]);
        self.pos += end;
        Ok(Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::parse_script;
    use crate::error::DirectiveError;

    #[test]
    fn skips_comments_blank_lines_and_semicolons() {
        let script = "\n# comment\n// another\nuppercase name;\n\n  drop a,b  \n";
        let parsed = parse_script(script).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].line, 4);
        assert_eq!(parsed[0].name, "uppercase");
        assert_eq!(parsed[0].args, vec!["name"]);
        assert_eq!(parsed[0].text, "uppercase name");
        assert_eq!(parsed[1].line, 6);
        assert_eq!(parsed[1].args, vec!["a,b"]);
    }

    #[test]
    fn quotes_group_arguments() {
        let parsed = parse_script(r#"merge first last full ' '"#).unwrap();
        assert_eq!(parsed[0].args, vec!["first", "last", "full", " "]);
    }

    #[test]
    fn expression_tails_are_kept_verbatim() {
        let parsed = parse_script(
            "set-column greeting \"hi \" + name\nfilter-row-if-true count > 0 && x == 'y'",
        )
        .unwrap();
        assert_eq!(parsed[0].args, vec!["greeting", "\"hi \" + name"]);
        assert_eq!(parsed[1].args, vec!["count > 0 && x == 'y'"]);
    }

    #[test]
    fn text_tails_lose_one_layer_of_quotes() {
        let parsed = parse_script(
            "format-date ts \"%Y-%m-%d %H:%M\"\nfilter-rows-on regex-match name ^a b$\nfilter-rows-on empty-or-null-columns a b",
        )
        .unwrap();
        assert_eq!(parsed[0].args, vec!["ts", "%Y-%m-%d %H:%M"]);
        assert_eq!(parsed[1].args, vec!["regex-match", "name", "^a b$"]);
        assert_eq!(parsed[2].args, vec!["empty-or-null-columns", "a", "b"]);
    }

    #[test]
    fn unterminated_quote_is_a_syntax_error() {
        let err = parse_script("trim \"name").unwrap_err();
        assert!(matches!(err, DirectiveError::Syntax { line: 1, .. }));
    }
}
