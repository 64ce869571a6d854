//! Field-name sanitizer for user-chosen sort columns (§4.3.1, §9).
//!
//! `to_snake_case_or_panic` deliberately panics, rather than returning a `Result`, on
//! embedded quote/backslash/semicolon/hyphen/space characters. Input is expected to have
//! already passed through a validated enum upstream (a GraphQL/host-layer enum in the
//! original system); reaching this function with attacker-controlled text is a caller bug,
//! not a user error, so it is not worth a `RepoError` variant.

/// Converts `field` to snake_case, panicking if it contains a character that could enable
/// column-name injection when interpolated into a raw SQL fragment.
pub fn to_snake_case_or_panic(field: &str) -> String {
    const FORBIDDEN: [char; 5] = ['\'', '\\', ';', '-', ' '];
    if let Some(c) = field.chars().find(|c| FORBIDDEN.contains(c)) {
        panic!("to_snake_case_or_panic: refusing to convert field containing '{c}': {field:?}");
    }

    let mut out = String::with_capacity(field.len() + 4);
    for (i, c) in field.chars().enumerate() {
        if c.is_uppercase() {
            if i != 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_camel_case() {
        assert_eq!(to_snake_case_or_panic("totalJobs"), "total_jobs");
        assert_eq!(to_snake_case_or_panic("numHWThreads"), "num_h_w_threads");
        assert_eq!(to_snake_case_or_panic("cluster"), "cluster");
    }

    #[test]
    #[should_panic]
    fn panics_on_quote() {
        to_snake_case_or_panic("foo'bar");
    }

    #[test]
    #[should_panic]
    fn panics_on_semicolon() {
        to_snake_case_or_panic("foo;DROP TABLE job");
    }

    #[test]
    #[should_panic]
    fn panics_on_space() {
        to_snake_case_or_panic("foo bar");
    }

    #[test]
    #[should_panic]
    fn panics_on_hyphen() {
        to_snake_case_or_panic("foo-bar");
    }
}
