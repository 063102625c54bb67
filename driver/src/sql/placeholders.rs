/// Rewrites `:name` placeholders into `@name`.
///
/// Text inside string literals and quoted identifiers is left untouched, as are `::` sequences.
pub fn rewrite_placeholders(sql: &str) -> String {
    let mut rewritten = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(ch) = chars.next() {
        if let Some(open) = quote {
            rewritten.push(ch);
            if ch == '\\' {
                if let Some(escaped) = chars.next() {
                    rewritten.push(escaped);
                }
            } else if ch == open {
                quote = None;
            }
            continue;
        }

        match ch {
            '\'' | '"' | '`' => {
                quote = Some(ch);
                rewritten.push(ch);
            }
            ':' if chars.peek() == Some(&':') => {
                rewritten.push_str("::");
                chars.next();
            }
            ':' if chars
                .peek()
                .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_') =>
            {
                rewritten.push('@');
            }
            _ => rewritten.push(ch),
        }
    }

    rewritten
}
