pub fn separated_by<T, F>(
    out: &mut String,
    values: impl IntoIterator<Item = T>,
    mut f: F,
    separator: &str,
) where
    F: FnMut(&mut String, T),
{
    let mut len = out.len();
    for v in values {
        if out.len() > len {
            out.push_str(separator);
        }
        len = out.len();
        f(out, v);
    }
}

/// Largest cut point not beyond `limit` that keeps the slice on a char
/// boundary, so statements with multibyte text literals truncate cleanly.
pub fn truncate_at(query: &str, limit: usize) -> usize {
    let mut end = ::std::cmp::min(query.len(), limit);
    while !query.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Trims a long SQL statement for log messages.
#[macro_export]
macro_rules! truncate_long {
    ($query:expr) => {
        format_args!(
            "{}{}",
            &$query[..$crate::truncate_at($query, 497)].trim_end(),
            if $query.len() > 497 { "..." } else { "" },
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let statement = format!("SELECT '{}'", "á".repeat(300));
        let rendered = format!("{}", truncate_long!(&statement));
        assert!(rendered.ends_with("..."));
        assert!(rendered.len() <= 500);
        let short = "SELECT 1";
        assert_eq!(format!("{}", truncate_long!(short)), "SELECT 1");
    }

    #[test]
    fn separators_only_between_written_parts() {
        let mut out = String::new();
        separated_by(&mut out, ["a", "", "b"], |out, v| out.push_str(v), ", ");
        assert_eq!(out, "a, b");
    }
}
