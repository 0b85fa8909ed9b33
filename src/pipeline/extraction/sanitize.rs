/// Sanitize extracted text before passing downstream.
/// Strips control characters, normalizes whitespace, preserves medical punctuation.
pub fn sanitize_extracted_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| {
            c.is_alphanumeric()
                || c.is_whitespace()
                || matches!(
                    c,
                    '.' | ','
                        | ';'
                        | ':'
                        | '-'
                        | '/'
                        | '('
                        | ')'
                        | '['
                        | ']'
                        | '+'
                        | '='
                        | '%'
                        | '#'
                        | '@'
                        | '&'
                        | '\''
                        | '"'
                        | '!'
                        | '?'
                        | '<'
                        | '>'
                        | '*'
                        | '_'
                        | '°'
                        | '²'
                        | '³'
                        | 'µ'
                        // EXT-04-G04/G05/G10: French punctuation and symbols
                        | '«'
                        | '»'
                        | '\u{2013}' // En-dash –
                        | '\u{2014}' // Em-dash —
                        | '€'
                        | '\u{2019}' // Right single quotation mark '
                        | '\u{2018}' // Left single quotation mark '
                        | '\u{201C}' // Left double quotation mark "
                        | '\u{201D}' // Right double quotation mark "
                )
        })
        .collect::<String>()
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
