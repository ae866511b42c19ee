//! Statement builders shared by the mappers
//!
//! Identifiers only ever come from the static [`Table`] descriptions; user
//! values always travel as `$n` parameters.

use hackreg_core::{QueryRequest, ReadOptions, Scalar};

/// Static description of a table a mapper reads.
#[derive(Debug)]
pub(crate) struct Table {
    pub name: &'static str,
    pub key: &'static str,
    pub columns: &'static [&'static str],
    /// Columns selected whatever projection is asked for
    pub required: &'static [&'static str],
}

impl Table {
    /// Column list for `fields`; every column when `fields` is empty.
    pub fn projection(&self, fields: &[String]) -> String {
        for field in fields {
            if !self.columns.contains(&field.as_str()) {
                tracing::warn!(table = self.name, field = %field, "ignoring unknown field");
            }
        }

        let selected: Vec<&str> = self
            .columns
            .iter()
            .copied()
            .filter(|column| {
                fields.is_empty()
                    || self.required.contains(column)
                    || fields.iter().any(|f| f == column)
            })
            .collect();
        selected.join(", ")
    }
}

/// `SELECT ... FROM ... [WHERE ...] [ORDER BY ...] [LIMIT ...] [OFFSET ...]`
#[derive(Debug)]
pub(crate) struct Select {
    statement: String,
    parameters: Vec<Scalar>,
    filtered: bool,
}

impl Select {
    pub fn columns(table: &Table, fields: &[String]) -> Self {
        Self::raw(format!(
            "SELECT {} FROM {}",
            table.projection(fields),
            table.name
        ))
    }

    pub fn count(table: &Table) -> Self {
        Self::raw(format!(
            "SELECT COUNT({}) AS count FROM {}",
            table.key, table.name
        ))
    }

    fn raw(statement: String) -> Self {
        Self {
            statement,
            parameters: Vec::new(),
            filtered: false,
        }
    }

    fn placeholder(&mut self, value: impl Into<Scalar>) -> String {
        self.parameters.push(value.into());
        format!("${}", self.parameters.len())
    }

    /// Add `column = value`, joined with AND to earlier filters.
    pub fn filter(mut self, column: &str, value: impl Into<Scalar>) -> Self {
        let placeholder = self.placeholder(value);
        let joiner = if self.filtered { "AND" } else { "WHERE" };
        self.statement = format!("{} {} {} = {}", self.statement, joiner, column, placeholder);
        self.filtered = true;
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.statement = format!("{} ORDER BY {}", self.statement, column);
        self
    }

    /// LIMIT/OFFSET from read options. Zero means unset for both.
    pub fn page(mut self, opts: &ReadOptions) -> Self {
        if let Some(count) = opts.count.filter(|n| *n > 0) {
            let placeholder = self.placeholder(count);
            self.statement = format!("{} LIMIT {}", self.statement, placeholder);
        }
        if let Some(start) = opts.start_at.filter(|n| *n > 0) {
            let placeholder = self.placeholder(start);
            self.statement = format!("{} OFFSET {}", self.statement, placeholder);
        }
        self
    }

    /// Reads always go through the cache.
    pub fn build(self) -> QueryRequest {
        QueryRequest {
            statement: self.statement,
            parameters: self.parameters,
            cacheable: true,
        }
    }
}

/// `INSERT INTO table (a, b) VALUES ($1, $2) [RETURNING ...]`
pub(crate) fn insert(
    table: &Table,
    values: Vec<(&'static str, Scalar)>,
    returning: bool,
) -> QueryRequest {
    let columns: Vec<&str> = values.iter().map(|(column, _)| *column).collect();
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("${}", i)).collect();
    let mut statement = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name,
        columns.join(", "),
        placeholders.join(", ")
    );
    if returning {
        statement = format!("{} RETURNING {}", statement, table.columns.join(", "));
    }
    QueryRequest {
        statement,
        parameters: values.into_iter().map(|(_, value)| value).collect(),
        cacheable: false,
    }
}

/// `UPDATE table SET a = $1, b = $2 WHERE key = $3`
pub(crate) fn update(
    table: &Table,
    values: Vec<(&'static str, Scalar)>,
    key: impl Into<Scalar>,
) -> QueryRequest {
    let assignments: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{} = ${}", column, i + 1))
        .collect();
    let statement = format!(
        "UPDATE {} SET {} WHERE {} = ${}",
        table.name,
        assignments.join(", "),
        table.key,
        values.len() + 1
    );
    let mut parameters: Vec<Scalar> = values.into_iter().map(|(_, value)| value).collect();
    parameters.push(key.into());
    QueryRequest {
        statement,
        parameters,
        cacheable: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEOPLE: Table = Table {
        name: "people",
        key: "uid",
        columns: &["uid", "name", "email"],
        required: &["uid"],
    };

    #[test]
    fn projection_keeps_required_and_known() {
        assert_eq!(PEOPLE.projection(&[]), "uid, name, email");
        assert_eq!(PEOPLE.projection(&["email".into()]), "uid, email");
        assert_eq!(
            PEOPLE.projection(&["email".into(), "password; DROP TABLE people".into()]),
            "uid, email"
        );
    }

    #[test]
    fn select_numbers_parameters_in_order() {
        let opts = ReadOptions::default().count(10).start_at(20);
        let request = Select::columns(&PEOPLE, &[])
            .filter("name", "ada")
            .filter("email", "a@x.io")
            .order_by("uid")
            .page(&opts)
            .build();
        assert_eq!(
            request.statement,
            "SELECT uid, name, email FROM people WHERE name = $1 AND email = $2 ORDER BY uid LIMIT $3 OFFSET $4"
        );
        assert_eq!(
            request.parameters,
            vec![
                Scalar::from("ada"),
                Scalar::from("a@x.io"),
                Scalar::from(10u32),
                Scalar::from(20u32)
            ]
        );
        assert!(request.cacheable);
    }

    #[test]
    fn zero_paging_is_ignored() {
        let opts = ReadOptions::default().count(0).start_at(0);
        let request = Select::count(&PEOPLE).page(&opts).build();
        assert_eq!(request.statement, "SELECT COUNT(uid) AS count FROM people");
        assert!(request.parameters.is_empty());
    }

    #[test]
    fn writes_are_not_cached() {
        let request = insert(
            &PEOPLE,
            vec![("uid", "u1".into()), ("name", "ada".into())],
            true,
        );
        assert_eq!(
            request.statement,
            "INSERT INTO people (uid, name) VALUES ($1, $2) RETURNING uid, name, email"
        );
        assert!(!request.cacheable);

        let request = update(&PEOPLE, vec![("email", "a@x.io".into())], "u1");
        assert_eq!(request.statement, "UPDATE people SET email = $1 WHERE uid = $2");
        assert_eq!(request.parameters, vec![Scalar::from("a@x.io"), Scalar::from("u1")]);
        assert!(!request.cacheable);
    }
}
