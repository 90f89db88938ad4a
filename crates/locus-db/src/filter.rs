//! Filter-to-SQL composition for location listings.
//!
//! Converts a [`LocationFilters`] into a WHERE-clause fragment with
//! parameterized placeholders, so the data query and the count query share
//! one predicate set. Address- and client-based predicates use EXISTS
//! sub-queries instead of joins: the outer row set stays one-row-per-location
//! no matter how many aliases or client links match.

use locus_core::LocationFilters;

use crate::escape_like;

/// Type-safe parameter binding for dynamically composed SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// Integer parameter.
    Int(i64),
    /// Boolean parameter.
    Bool(bool),
    /// String parameter.
    String(String),
}

/// Generates the WHERE clause fragment for a location listing.
///
/// # Example
///
/// ```rust,ignore
/// use locus_db::filter::LocationFilterQueryBuilder;
/// use locus_core::LocationFilters;
///
/// let filters = LocationFilters {
///     query: Some("terminal".into()),
///     ..Default::default()
/// };
/// let (clause, params) = LocationFilterQueryBuilder::new(filters, 0).build();
/// // clause: "(l.official_name ILIKE $1 ESCAPE '\' OR l.code ILIKE $2 ESCAPE '\')"
/// // params: two QueryParam::String("%terminal%")
/// ```
pub struct LocationFilterQueryBuilder {
    filters: LocationFilters,
    param_offset: usize,
}

impl LocationFilterQueryBuilder {
    /// Create a new builder.
    ///
    /// `param_offset` is the number of parameters already bound ahead of the
    /// fragment in the final query.
    pub fn new(filters: LocationFilters, param_offset: usize) -> Self {
        Self {
            filters,
            param_offset,
        }
    }

    /// Build the WHERE clause fragment.
    ///
    /// Returns the SQL fragment (references the `locations` table as `l`)
    /// and the parameters in placeholder order. An empty filter set yields
    /// `("TRUE", [])` so callers can splice the fragment unconditionally.
    pub fn build(&self) -> (String, Vec<QueryParam>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        let mut param_idx = self.param_offset;

        if let Some(query) = non_blank(&self.filters.query) {
            let pattern = format!("%{}%", escape_like(query));
            param_idx += 1;
            let name_idx = param_idx;
            param_idx += 1;
            clauses.push(format!(
                "(l.official_name ILIKE ${} ESCAPE '\\' OR l.code ILIKE ${} ESCAPE '\\')",
                name_idx, param_idx
            ));
            params.push(QueryParam::String(pattern.clone()));
            params.push(QueryParam::String(pattern));
        }

        if let Some(location_type) = self.filters.location_type {
            param_idx += 1;
            clauses.push(format!("l.location_type = ${}", param_idx));
            params.push(QueryParam::String(location_type.as_str().to_string()));
        }

        if let Some(active) = self.filters.active {
            param_idx += 1;
            clauses.push(format!("l.active = ${}", param_idx));
            params.push(QueryParam::Bool(active));
        }

        if let Some(state) = non_blank(&self.filters.state) {
            param_idx += 1;
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM addresses a WHERE a.location_id = l.id AND a.state ILIKE ${} ESCAPE '\\')",
                param_idx
            ));
            params.push(QueryParam::String(format!("%{}%", escape_like(state))));
        }

        if let Some(city) = non_blank(&self.filters.city) {
            param_idx += 1;
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM addresses a WHERE a.location_id = l.id AND a.city ILIKE ${} ESCAPE '\\')",
                param_idx
            ));
            params.push(QueryParam::String(format!("%{}%", escape_like(city))));
        }

        // Client scoping: globally visible locations pass regardless of their
        // links; everything else needs a link row matching every supplied
        // client field on the same row.
        let source = non_blank(&self.filters.client_source);
        let external_id = non_blank(&self.filters.client_external_id);
        if source.is_some() || external_id.is_some() {
            let mut link_conditions = vec!["c.location_id = l.id".to_string()];
            if let Some(source) = source {
                param_idx += 1;
                link_conditions.push(format!("c.source = ${}", param_idx));
                params.push(QueryParam::String(source.to_string()));
            }
            if let Some(external_id) = external_id {
                param_idx += 1;
                link_conditions.push(format!("c.external_id = ${}", param_idx));
                params.push(QueryParam::String(external_id.to_string()));
            }
            clauses.push(format!(
                "(l.is_global = TRUE OR EXISTS (SELECT 1 FROM client_links c WHERE {}))",
                link_conditions.join(" AND ")
            ));
        }

        if clauses.is_empty() {
            ("TRUE".to_string(), Vec::new())
        } else {
            (clauses.join(" AND "), params)
        }
    }
}

/// Bind built parameters onto a query in placeholder order.
pub fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    params: &[QueryParam],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for param in params {
        query = match param {
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.clone()),
        };
    }
    query
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_core::LocationType;

    fn build(filters: LocationFilters) -> (String, Vec<QueryParam>) {
        LocationFilterQueryBuilder::new(filters, 0).build()
    }

    #[test]
    fn test_empty_filters_match_everything() {
        let (clause, params) = build(LocationFilters::default());
        assert_eq!(clause, "TRUE");
        assert!(params.is_empty());
    }

    #[test]
    fn test_free_text_query_matches_name_or_code() {
        let (clause, params) = build(LocationFilters {
            query: Some("terminal".to_string()),
            ..Default::default()
        });
        assert_eq!(
            clause,
            "(l.official_name ILIKE $1 ESCAPE '\\' OR l.code ILIKE $2 ESCAPE '\\')"
        );
        assert_eq!(
            params,
            vec![
                QueryParam::String("%terminal%".to_string()),
                QueryParam::String("%terminal%".to_string()),
            ]
        );
    }

    #[test]
    fn test_free_text_query_escapes_like_wildcards() {
        let (_, params) = build(LocationFilters {
            query: Some("50%_off".to_string()),
            ..Default::default()
        });
        assert_eq!(params[0], QueryParam::String("%50\\%\\_off%".to_string()));
    }

    #[test]
    fn test_type_and_active_filters() {
        let (clause, params) = build(LocationFilters {
            location_type: Some(LocationType::Origin),
            active: Some(true),
            ..Default::default()
        });
        assert_eq!(clause, "l.location_type = $1 AND l.active = $2");
        assert_eq!(
            params,
            vec![
                QueryParam::String("origin".to_string()),
                QueryParam::Bool(true),
            ]
        );
    }

    #[test]
    fn test_state_filter_uses_exists_subquery() {
        let (clause, params) = build(LocationFilters {
            state: Some("Jalisco".to_string()),
            ..Default::default()
        });
        assert!(clause.contains("EXISTS (SELECT 1 FROM addresses a"));
        assert!(clause.contains("a.state ILIKE $1"));
        assert_eq!(params, vec![QueryParam::String("%Jalisco%".to_string())]);
    }

    #[test]
    fn test_client_filter_passes_global_locations() {
        let (clause, params) = build(LocationFilters {
            client_source: Some("erp".to_string()),
            client_external_id: Some("123".to_string()),
            ..Default::default()
        });
        assert_eq!(
            clause,
            "(l.is_global = TRUE OR EXISTS (SELECT 1 FROM client_links c \
             WHERE c.location_id = l.id AND c.source = $1 AND c.external_id = $2))"
        );
        assert_eq!(
            params,
            vec![
                QueryParam::String("erp".to_string()),
                QueryParam::String("123".to_string()),
            ]
        );
    }

    #[test]
    fn test_client_filter_with_source_only() {
        let (clause, params) = build(LocationFilters {
            client_source: Some("erp".to_string()),
            ..Default::default()
        });
        assert!(clause.contains("c.source = $1"));
        assert!(!clause.contains("c.external_id"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_blank_filter_values_are_ignored() {
        let (clause, params) = build(LocationFilters {
            query: Some("   ".to_string()),
            state: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(clause, "TRUE");
        assert!(params.is_empty());
    }

    #[test]
    fn test_param_offset_shifts_placeholders() {
        let filters = LocationFilters {
            active: Some(false),
            ..Default::default()
        };
        let (clause, _) = LocationFilterQueryBuilder::new(filters, 2).build();
        assert_eq!(clause, "l.active = $3");
    }

    #[test]
    fn test_all_filters_compose_conjunctively() {
        let (clause, params) = build(LocationFilters {
            query: Some("norte".to_string()),
            client_source: Some("erp".to_string()),
            client_external_id: Some("9".to_string()),
            state: Some("CDMX".to_string()),
            city: Some("Centro".to_string()),
            location_type: Some(LocationType::Both),
            active: Some(true),
        });
        assert!(clause.matches(" AND ").count() >= 5);
        assert_eq!(params.len(), 8);
        // Placeholders are sequential across every clause.
        for idx in 1..=8 {
            assert!(clause.contains(&format!("${}", idx)), "missing ${}", idx);
        }
    }
}
