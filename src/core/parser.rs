/// Variable parser — turns one author event token into an `EventRecord`.
///
/// Grammar: `<name>[ <key>=<value>]*[ <default>][ #<flag>]*`.

use crate::schema::record::EventRecord;

/// Parse a single event token.
///
/// Returns `None` for an empty token or one that starts with whitespace;
/// authors use those as blank separators.
pub fn parse(token: &str) -> Option<EventRecord> {
    match token.chars().next() {
        None => return None,
        Some(c) if c.is_whitespace() => return None,
        Some(_) => {}
    }

    let mut parts = token.split_whitespace();
    let mut record = EventRecord::new(parts.next()?);

    for part in parts {
        let (key, value) = match part.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (part, None),
        };

        if key.is_empty() {
            continue;
        }

        if let Some(define) = key.strip_prefix('#') {
            record.defines.push(define.to_string());
            continue;
        }

        match value {
            // Last bare token wins
            None => record.default = Some(part.to_string()),
            Some(value) => {
                record.fields.insert(key.to_string(), value.to_string());
            }
        }
    }

    Some(record)
}

/// The leading word of a token, up to the first space.
pub(crate) fn leading_word(token: &str) -> &str {
    token.split(' ').next().unwrap_or(token)
}
