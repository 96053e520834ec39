//! Word iteration over borrowed string views.

/// Iterate over the whitespace-separated words of `s` without copying.
pub fn words(s: &str) -> Words<'_> {
    words_sep(s, " \t")
}

/// Iterate over the words of `s` separated by any run of bytes in `seps`.
pub fn words_sep<'a>(s: &'a str, seps: &'a str) -> Words<'a> {
    Words { rest: s, seps }
}

/// A lazy, restartable cursor over the non-empty words of a string.
#[derive(Debug, Clone)]
pub struct Words<'a> {
    rest: &'a str,
    seps: &'a str,
}

impl<'a> Iterator for Words<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let is_sep = |c: char| self.seps.contains(c);
        let start = self.rest.find(|c| !is_sep(c))?;
        let tail = &self.rest[start..];
        let end = tail.find(is_sep).unwrap_or(tail.len());
        self.rest = &tail[end..];
        Some(&tail[..end])
    }
}

/// Slice `s` without leading or trailing bytes from `seps`.
pub fn trim<'a>(s: &'a str, seps: &str) -> &'a str {
    s.trim_matches(|c: char| seps.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_runs_of_separators() {
        let collected: Vec<_> = words("  foo \t bar\tbaz  ").collect();
        assert_eq!(collected, ["foo", "bar", "baz"]);
    }

    #[test]
    fn empty_and_all_separator_inputs_yield_nothing() {
        assert_eq!(words("").count(), 0);
        assert_eq!(words(" \t\t ").count(), 0);
    }

    #[test]
    fn custom_separators() {
        let collected: Vec<_> = words_sep("a:b::c", ":").collect();
        assert_eq!(collected, ["a", "b", "c"]);
    }

    #[test]
    fn iterator_is_restartable() {
        let w = words("one two");
        assert_eq!(w.clone().count(), 2);
        assert_eq!(w.count(), 2);
    }

    #[test]
    fn trim_strips_both_ends_only() {
        assert_eq!(trim("  a b \t", " \t"), "a b");
        assert_eq!(trim("", " \t"), "");
        assert_eq!(trim("\t\t", " \t"), "");
    }
}
