//! PostgREST query string builder.
//!
//! Builds the `column=op.value` pairs PostgREST expects. Values are passed to
//! the HTTP client unencoded; URL encoding happens there.

use std::fmt::Display;

/// Sort direction for [`RestQuery::order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Ordered list of PostgREST query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestQuery {
    params: Vec<(String, String)>,
}

impl RestQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns and embedded resources to return. Whitespace is stripped so
    /// selects can be written across several lines.
    #[must_use]
    pub fn select(mut self, columns: &str) -> Self {
        let compact: String = columns.chars().filter(|c| !c.is_whitespace()).collect();
        self.params.push(("select".to_string(), compact));
        self
    }

    #[must_use]
    pub fn eq(mut self, column: &str, value: impl Display) -> Self {
        self.params.push((column.to_string(), format!("eq.{value}")));
        self
    }

    /// `column LIKE 'prefix%'` with LIKE metacharacters in `prefix` escaped.
    #[must_use]
    pub fn starts_with(mut self, column: &str, prefix: &str) -> Self {
        let mut pattern = String::with_capacity(prefix.len() + 1);
        for ch in prefix.chars() {
            if matches!(ch, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(ch);
        }
        pattern.push('*');
        self.params.push((column.to_string(), format!("like.{pattern}")));
        self
    }

    /// `column IN (values...)`, each value double-quoted.
    #[must_use]
    pub fn in_list(mut self, column: &str, values: &[String]) -> Self {
        let quoted = values
            .iter()
            .map(|value| {
                let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\"")
            })
            .collect::<Vec<_>>()
            .join(",");
        self.params
            .push((column.to_string(), format!("in.({quoted})")));
        self
    }

    /// Append a sort key. Repeated calls add secondary keys.
    #[must_use]
    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        let key = format!("{column}.{}", direction.as_str());
        if let Some((_, existing)) = self.params.iter_mut().find(|(name, _)| name == "order") {
            existing.push(',');
            existing.push_str(&key);
        } else {
            self.params.push(("order".to_string(), key));
        }
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.params.push(("limit".to_string(), limit.to_string()));
        self
    }

    /// Conflict target for upserts.
    #[must_use]
    pub fn on_conflict(mut self, columns: &[&str]) -> Self {
        self.params
            .push(("on_conflict".to_string(), columns.join(",")));
        self
    }

    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Value of the first parameter named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_strips_whitespace() {
        let query = RestQuery::new().select(
            "*,
             artifacts!inner(file_path, project_id)",
        );
        assert_eq!(
            query.get("select"),
            Some("*,artifacts!inner(file_path,project_id)")
        );
    }

    #[test]
    fn order_accumulates_secondary_keys() {
        let query = RestQuery::new()
            .eq("change_id", "c1")
            .order("file_path", Direction::Asc)
            .order("start_line", Direction::Asc);
        assert_eq!(query.get("order"), Some("file_path.asc,start_line.asc"));
        assert_eq!(query.params().len(), 2);
    }

    #[test]
    fn starts_with_escapes_like_metacharacters() {
        let query = RestQuery::new().starts_with("file_path", "specs/001_a%");
        assert_eq!(query.get("file_path"), Some("like.specs/001\\_a\\%*"));
    }

    #[test]
    fn in_list_quotes_values() {
        let query =
            RestQuery::new().in_list("id", &["a,b".to_string(), "say \"hi\"".to_string()]);
        assert_eq!(query.get("id"), Some("in.(\"a,b\",\"say \\\"hi\\\"\")"));
    }

    #[test]
    fn eq_formats_booleans() {
        let query = RestQuery::new().eq("is_resolved", false).limit(1);
        assert_eq!(query.get("is_resolved"), Some("eq.false"));
        assert_eq!(query.get("limit"), Some("1"));
    }
}
