//! Field-name conversion between the remote table (snake_case) and records (camelCase).

pub fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;

    for ch in name.chars() {
        if ch == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }

    out
}

pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);

    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_both_ways() {
        assert_eq!(snake_to_camel("quantity_done"), "quantityDone");
        assert_eq!(snake_to_camel("is_synced"), "isSynced");
        assert_eq!(snake_to_camel("id"), "id");
        assert_eq!(camel_to_snake("quantityDone"), "quantity_done");
        assert_eq!(camel_to_snake("icsCalendarId"), "ics_calendar_id");
        assert_eq!(camel_to_snake("title"), "title");
    }

    #[test]
    fn leading_underscore_is_dropped() {
        assert_eq!(snake_to_camel("_private_field"), "privateField");
    }
}
