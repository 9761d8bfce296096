use crate::error::{Error, Result};
use crate::query::QueryBuilder;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// Turns an ascending comparison into one honoring this order.
    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortOrder::Asc),
            "DESC" => Ok(SortOrder::Desc),
            other => Err(Error::InvalidValue(format!("unknown sort order '{other}'"))),
        }
    }
}

/// A column a listing can be ordered by.
pub trait SortColumn: Copy + fmt::Debug {
    /// Column name, unqualified.
    fn column_name(&self) -> &'static str;

    /// Textual columns need natural ordering, which SQLite cannot do.
    fn is_textual(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumColumn {
    Id,
    CreatedAt,
    Title,
    Description,
    IsPublic,
}

impl SortColumn for AlbumColumn {
    fn column_name(&self) -> &'static str {
        match self {
            AlbumColumn::Id => "id",
            AlbumColumn::CreatedAt => "created_at",
            AlbumColumn::Title => "title",
            AlbumColumn::Description => "description",
            AlbumColumn::IsPublic => "is_public",
        }
    }

    fn is_textual(&self) -> bool {
        matches!(self, AlbumColumn::Title | AlbumColumn::Description)
    }
}

impl FromStr for AlbumColumn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "id" => Ok(AlbumColumn::Id),
            "created_at" => Ok(AlbumColumn::CreatedAt),
            "title" => Ok(AlbumColumn::Title),
            "description" => Ok(AlbumColumn::Description),
            "is_public" => Ok(AlbumColumn::IsPublic),
            other => Err(Error::InvalidValue(format!("unknown album sort column '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoColumn {
    Id,
    CreatedAt,
    TakenAt,
    Title,
    Description,
    IsStarred,
    Type,
}

impl SortColumn for PhotoColumn {
    fn column_name(&self) -> &'static str {
        match self {
            PhotoColumn::Id => "id",
            PhotoColumn::CreatedAt => "created_at",
            PhotoColumn::TakenAt => "taken_at",
            PhotoColumn::Title => "title",
            PhotoColumn::Description => "description",
            PhotoColumn::IsStarred => "is_starred",
            PhotoColumn::Type => "type",
        }
    }

    fn is_textual(&self) -> bool {
        matches!(self, PhotoColumn::Title | PhotoColumn::Description)
    }
}

impl FromStr for PhotoColumn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "id" => Ok(PhotoColumn::Id),
            "created_at" => Ok(PhotoColumn::CreatedAt),
            "taken_at" => Ok(PhotoColumn::TakenAt),
            "title" => Ok(PhotoColumn::Title),
            "description" => Ok(PhotoColumn::Description),
            "is_starred" => Ok(PhotoColumn::IsStarred),
            "type" => Ok(PhotoColumn::Type),
            other => Err(Error::InvalidValue(format!("unknown photo sort column '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortingCriterion<C> {
    pub column: C,
    pub order: SortOrder,
}

pub type AlbumSorting = SortingCriterion<AlbumColumn>;
pub type PhotoSorting = SortingCriterion<PhotoColumn>;

impl<C: SortColumn> SortingCriterion<C> {
    pub fn new(column: C, order: SortOrder) -> Self {
        Self { column, order }
    }

    /// `ORDER BY` terms for `alias`, with the id as final tie-break.
    ///
    /// Textual columns compare case-insensitively here; callers that need
    /// natural order go through [`SortingDecorator`] instead.
    pub fn order_terms(&self, alias: &str) -> String {
        let dir = self.order.as_sql();
        let column = self.column.column_name();
        if column == "id" {
            return format!("{alias}.id {dir}");
        }
        let collate = if self.column.is_textual() { " COLLATE NOCASE" } else { "" };
        format!("{alias}.{column}{collate} {dir}, {alias}.id {dir}")
    }
}

/// Parses a stored `(column, order)` pair, returning `None` when either is
/// unset or not understood.
pub fn parse_sorting<C>(column: Option<&str>, order: Option<&str>) -> Option<SortingCriterion<C>>
where
    C: SortColumn + FromStr<Err = Error>,
{
    let column = column?;
    let order = order?;
    match (column.parse::<C>(), order.parse::<SortOrder>()) {
        (Ok(column), Ok(order)) => Some(SortingCriterion { column, order }),
        (Err(err), _) | (_, Err(err)) => {
            log::warn!("Ignoring stored sorting: {err}");
            None
        }
    }
}

/// A row that can be ordered in memory.
pub trait Sortable<C> {
    fn sort_id(&self) -> i64;

    /// Text of a textual column; `None` sorts like the empty string.
    fn sort_text(&self, column: C) -> Option<&str>;
}

/// Applies a sorting criterion to a query or to an already fetched result set.
///
/// Non-textual columns are delegated to SQLite. Textual columns are sorted
/// after fetching with [`natural_cmp`], since SQLite has no natural collation.
#[derive(Debug, Clone, Copy)]
pub struct SortingDecorator<C> {
    criterion: SortingCriterion<C>,
}

impl<C: SortColumn> SortingDecorator<C> {
    pub fn new(criterion: SortingCriterion<C>) -> Self {
        Self { criterion }
    }

    pub fn criterion(&self) -> SortingCriterion<C> {
        self.criterion
    }

    pub fn needs_natural_sort(&self) -> bool {
        self.criterion.column.is_textual()
    }

    /// Appends `ORDER BY` for engine-side sorting; no-op for natural sorting.
    pub fn decorate(&self, query: &mut QueryBuilder, alias: &str) {
        if !self.needs_natural_sort() {
            query.push(" ORDER BY ").push(&self.criterion.order_terms(alias));
        }
    }

    /// Sorts fetched rows when natural ordering is required.
    pub fn sort<T: Sortable<C>>(&self, items: &mut [T]) {
        if !self.needs_natural_sort() {
            return;
        }
        let column = self.criterion.column;
        let order = self.criterion.order;
        items.sort_by(|a, b| {
            let by_text = natural_cmp(a.sort_text(column).unwrap_or(""), b.sort_text(column).unwrap_or(""));
            order.apply(by_text.then_with(|| a.sort_id().cmp(&b.sort_id())))
        });
    }

    /// Runs `query`, ordering rows either in SQL or in memory.
    pub fn fetch<T, F>(&self, conn: &Connection, mut query: QueryBuilder, alias: &str, map: F) -> Result<Vec<T>>
    where
        T: Sortable<C>,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.decorate(&mut query, alias);
        let mut rows = query.query_map(conn, map)?;
        self.sort(&mut rows);
        Ok(rows)
    }
}

/// Natural, case-insensitive comparison: digit runs compare by numeric value.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let x_run = take_digits(&mut left);
                let y_run = take_digits(&mut right);
                let ordering = cmp_digit_runs(&x_run, &y_run);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                let ordering = x.to_lowercase().cmp(y.to_lowercase());
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left.next();
                right.next();
            }
        }
    }

    // Equal ignoring case and leading zeros; keep the order total.
    a.cmp(b)
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}

fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let a_trimmed = a.trim_start_matches('0');
    let b_trimmed = b.trim_start_matches('0');
    a_trimmed
        .len()
        .cmp(&b_trimmed.len())
        .then_with(|| a_trimmed.cmp(b_trimmed))
        .then_with(|| a.len().cmp(&b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(i64, &'static str);

    impl Sortable<AlbumColumn> for Named {
        fn sort_id(&self) -> i64 {
            self.0
        }

        fn sort_text(&self, _column: AlbumColumn) -> Option<&str> {
            Some(self.1)
        }
    }

    #[test]
    fn natural_order_compares_numbers_by_value() {
        let mut titles = vec!["Album 2", "Album 10", "Album 1"];
        titles.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(titles, vec!["Album 1", "Album 2", "Album 10"]);
    }

    #[test]
    fn natural_order_ignores_case() {
        assert_eq!(natural_cmp("beach", "Beach 2"), Ordering::Less);
        assert_eq!(natural_cmp("apple", "Banana"), Ordering::Less);
        assert_eq!(natural_cmp("img007", "img7"), Ordering::Greater);
    }

    #[test]
    fn decorator_sorts_textual_columns_in_memory() {
        let decorator = SortingDecorator::new(SortingCriterion::new(AlbumColumn::Title, SortOrder::Desc));
        let mut rows = vec![Named(1, "Album 2"), Named(2, "album 10"), Named(3, "Album 1")];
        decorator.sort(&mut rows);
        let ids: Vec<i64> = rows.iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn decorator_leaves_other_columns_to_sql() {
        let decorator = SortingDecorator::new(SortingCriterion::new(AlbumColumn::CreatedAt, SortOrder::Asc));
        let mut query = QueryBuilder::new("SELECT a.id FROM albums a");
        decorator.decorate(&mut query, "a");
        assert_eq!(query.sql(), "SELECT a.id FROM albums a ORDER BY a.created_at ASC, a.id ASC");

        let natural = SortingDecorator::new(SortingCriterion::new(AlbumColumn::Title, SortOrder::Asc));
        let mut query = QueryBuilder::new("SELECT a.id FROM albums a");
        natural.decorate(&mut query, "a");
        assert_eq!(query.sql(), "SELECT a.id FROM albums a");
    }

    #[test]
    fn stored_sorting_parses_or_falls_back() {
        let parsed = parse_sorting::<PhotoColumn>(Some("taken_at"), Some("asc"));
        assert_eq!(parsed, Some(SortingCriterion::new(PhotoColumn::TakenAt, SortOrder::Asc)));
        assert_eq!(parse_sorting::<PhotoColumn>(Some("bogus"), Some("ASC")), None);
        assert_eq!(parse_sorting::<PhotoColumn>(None, Some("ASC")), None);
    }
}
