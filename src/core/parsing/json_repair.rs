//! Best-effort fix-up of almost-JSON.
//!
//! Language models cut off mid-object when they run out of tokens, leave
//! trailing commas behind and sometimes answer with Python literals. This
//! module rewrites such text into something a lenient JSON5 reader accepts.
//! It only rearranges delimiters and keywords; it never invents keys or values
//! other than `null` for a dangling `"key":`.

/// Repairs `input` and returns the rewritten text.
///
/// * trailing commas before `}`/`]` and at the end of input are dropped
/// * an unterminated string is closed with its opening quote
/// * missing closers are appended in nesting order
/// * stray closers that match nothing are skipped
/// * bare `True`, `False` and `None` become `true`, `false` and `null`
pub fn repair_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    let mut chars = input.trim().chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                in_string = Some(c);
                out.push(c);
            }
            '{' => {
                closers.push('}');
                out.push(c);
            }
            '[' => {
                closers.push(']');
                out.push(c);
            }
            '}' | ']' => {
                if !closers.contains(&c) {
                    continue;
                }
                while let Some(expected) = closers.pop() {
                    close_container(&mut out, expected);
                    if expected == c {
                        break;
                    }
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
            }
            _ => out.push(c),
        }
    }

    if let Some(quote) = in_string {
        if escaped {
            out.pop();
        }
        out.push(quote);
    }

    while let Some(expected) = closers.pop() {
        close_container(&mut out, expected);
    }
    strip_trailing_comma(&mut out);

    out
}

fn close_container(out: &mut String, closer: char) {
    strip_trailing_comma(out);
    if out.trim_end().ends_with(':') {
        out.push_str(" null");
    }
    out.push(closer);
}

fn strip_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
    }
}
