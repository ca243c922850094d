mod courses;
mod identities;
mod programs;
mod terms;

pub use courses::*;
pub use identities::*;
pub use programs::*;
pub use terms::*;

/// Sort order for list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Get the SQL ORDER BY direction string.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// Parse the `type` query value. Anything but `asc`/`desc` yields `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// Sortable columns of one resource.
///
/// `columns` maps the public sort key to the SQL column. Only columns listed
/// here ever reach an ORDER BY clause.
#[derive(Debug, Clone, Copy)]
pub struct SortSpec {
    pub columns: &'static [(&'static str, &'static str)],
    pub default_column: &'static str,
    pub default_order: SortOrder,
}

impl SortSpec {
    /// Resolve a requested sort key; unknown keys fall back to the default column.
    pub fn column(&self, requested: Option<&str>) -> &'static str {
        requested
            .and_then(|key| {
                let key = key.trim();
                self.columns
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(key))
                    .map(|(_, column)| *column)
            })
            .unwrap_or(self.default_column)
    }
}

/// Offset pagination and ordering for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListParams {
    /// Zero-based page index
    pub page: u32,
    /// Page length
    pub size: u32,
    /// Resolved SQL column (always from a [`SortSpec`])
    pub sort_column: &'static str,
    pub sort_order: SortOrder,
}

impl ListParams {
    pub fn resolve(
        spec: &SortSpec,
        page: Option<u32>,
        size: Option<u32>,
        sort: Option<&str>,
        order: Option<&str>,
        default_size: u32,
        max_size: u32,
    ) -> Self {
        Self {
            page: page.unwrap_or(0),
            size: size.unwrap_or(default_size).clamp(1, max_size.max(1)),
            sort_column: spec.column(sort),
            sort_order: order
                .and_then(SortOrder::parse)
                .unwrap_or(spec.default_order),
        }
    }

    /// First page in `spec`'s default order.
    pub fn first_page(spec: &SortSpec, size: u32) -> Self {
        Self {
            page: 0,
            size,
            sort_column: spec.default_column,
            sort_order: spec.default_order,
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }

    /// `ORDER BY` body with `id` as a stable tie-breaker.
    pub fn order_by(&self) -> String {
        format!(
            "{} {}, id {}",
            self.sort_column,
            self.sort_order.as_sql(),
            self.sort_order.as_sql()
        )
    }
}

/// Result of a paginated list query.
#[derive(Debug, Clone)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    /// Total matching rows across all pages
    pub total: i64,
    pub page: u32,
    pub size: u32,
}

impl<T> ListResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            size: params.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SORT: SortSpec = SortSpec {
        columns: &[("name", "name"), ("created_at", "created_at")],
        default_column: "created_at",
        default_order: SortOrder::Desc,
    };

    #[test]
    fn unknown_sort_falls_back() {
        assert_eq!(SORT.column(Some("password_hash")), "created_at");
        assert_eq!(SORT.column(Some("name; DROP TABLE x")), "created_at");
        assert_eq!(SORT.column(None), "created_at");
        assert_eq!(SORT.column(Some("NAME")), "name");
    }

    #[test]
    fn resolve_defaults_and_clamps() {
        let params = ListParams::resolve(&SORT, None, Some(10_000), None, Some("sideways"), 20, 100);
        assert_eq!(params.page, 0);
        assert_eq!(params.size, 100);
        assert_eq!(params.sort_order, SortOrder::Desc);

        let params = ListParams::resolve(&SORT, Some(3), Some(0), Some("name"), Some("ASC"), 20, 100);
        assert_eq!(params.size, 1);
        assert_eq!(params.offset(), 3);
        assert_eq!(params.order_by(), "name ASC, id ASC");
    }
}
