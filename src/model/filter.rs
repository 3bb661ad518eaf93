//! Generic filter/sort/pagination engine for aggregated collections.
//!
//! Reconciled read-models are assembled in memory from several sources, so
//! there is no query planner to lean on. Every aggregated collection in this
//! crate goes through this one engine instead of reimplementing the
//! filter-then-sort-then-paginate tail per entity type.
//!
//! Execution order is fixed: filter, then stable sort, then paginate. The
//! returned total is always the post-filter, pre-pagination size.

use std::cmp::Ordering;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// Page selection applied after filtering and sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// 1-indexed page of `limit` items.
    Page {
        /// Page number, starting at 1.
        page: usize,
        /// Maximum items per page.
        limit: usize,
    },
    /// Return the full filtered set.
    Skip,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::Page { page: 1, limit: 100 }
    }
}

/// An entity the engine can evaluate.
///
/// `Condition` is the entity's closed set of single-field equality clauses;
/// `SortKey` its sortable fields.
pub trait Filterable {
    /// Single-field equality condition variants for this entity.
    type Condition;
    /// Sortable field variants for this entity.
    type SortKey;

    /// Whether this item satisfies `condition`.
    fn matches(&self, condition: &Self::Condition) -> bool;

    /// Compare two items on `key` (ascending).
    fn compare(&self, other: &Self, key: &Self::SortKey) -> Ordering;
}

/// A filter/sort/pagination descriptor for one entity type.
pub struct Query<T: Filterable> {
    /// Equality conditions, combined with AND in order.
    pub conditions: Vec<T::Condition>,
    /// At most one sort field with direction.
    pub sort: Option<(T::SortKey, SortOrder)>,
    /// Page selection.
    pub pagination: Pagination,
}

impl<T: Filterable> Default for Query<T> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            sort: None,
            pagination: Pagination::default(),
        }
    }
}

impl<T: Filterable> Query<T> {
    /// An empty query with default pagination (page 1, limit 100).
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty query returning the full set.
    pub fn unpaginated() -> Self {
        Self {
            pagination: Pagination::Skip,
            ..Self::default()
        }
    }

    /// Add an equality condition.
    pub fn with_condition(mut self, condition: T::Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Set the sort field and direction.
    pub fn with_sort(mut self, key: T::SortKey, order: SortOrder) -> Self {
        self.sort = Some((key, order));
        self
    }

    /// Set 1-indexed page and limit.
    pub fn with_page(mut self, page: usize, limit: usize) -> Self {
        self.pagination = Pagination::Page { page, limit };
        self
    }

    /// Evaluate the query: filter, stable sort, paginate.
    pub fn apply(&self, items: Vec<T>) -> Page<T> {
        let mut kept: Vec<T> = items
            .into_iter()
            .filter(|item| self.conditions.iter().all(|c| item.matches(c)))
            .collect();

        if let Some((key, order)) = &self.sort {
            // Vec::sort_by is stable: equal keys keep their input order.
            kept.sort_by(|a, b| {
                let ordering = a.compare(b, key);
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        let total = kept.len();
        let items = match self.pagination {
            Pagination::Skip => kept,
            Pagination::Page { page, limit } => {
                let start = page.max(1) - 1;
                kept.into_iter().skip(start * limit).take(limit).collect()
            }
        };

        Page { items, total }
    }
}

/// One page of results plus the filtered-but-unpaginated total.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The selected items.
    pub items: Vec<T>,
    /// Post-filter, pre-pagination count.
    pub total: usize,
}

impl<T> Page<T> {
    /// An empty page.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: &'static str,
        group: u8,
        rank: u32,
    }

    enum ItemCondition {
        Group(u8),
        Name(&'static str),
    }

    enum ItemSort {
        Rank,
    }

    impl Filterable for Item {
        type Condition = ItemCondition;
        type SortKey = ItemSort;

        fn matches(&self, condition: &ItemCondition) -> bool {
            match condition {
                ItemCondition::Group(group) => self.group == *group,
                ItemCondition::Name(name) => self.name == *name,
            }
        }

        fn compare(&self, other: &Self, key: &ItemSort) -> Ordering {
            match key {
                ItemSort::Rank => self.rank.cmp(&other.rank),
            }
        }
    }

    fn items() -> Vec<Item> {
        vec![
            Item { name: "a", group: 1, rank: 3 },
            Item { name: "b", group: 2, rank: 1 },
            Item { name: "c", group: 1, rank: 1 },
            Item { name: "d", group: 1, rank: 2 },
            Item { name: "e", group: 2, rank: 3 },
        ]
    }

    #[test]
    fn conditions_are_anded_in_order() {
        let query = Query::<Item>::unpaginated()
            .with_condition(ItemCondition::Group(1))
            .with_condition(ItemCondition::Name("d"));

        let page = query.apply(items());
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "d");
    }

    #[test]
    fn total_is_post_filter_pre_pagination() {
        let query = Query::<Item>::new()
            .with_condition(ItemCondition::Group(1))
            .with_page(1, 2);

        let page = query.apply(items());
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn skip_pagination_returns_full_filtered_set() {
        let query = Query::<Item>::unpaginated().with_condition(ItemCondition::Group(2));

        let page = query.apply(items());
        assert_eq!(page.items.len(), page.total);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let query = Query::<Item>::unpaginated().with_sort(ItemSort::Rank, SortOrder::Asc);

        let page = query.apply(items());
        let names: Vec<_> = page.items.iter().map(|i| i.name).collect();
        // b and c share rank 1; b precedes c in the input and must stay first.
        assert_eq!(names, ["b", "c", "d", "a", "e"]);
    }

    #[test]
    fn descending_sort_reverses_comparator() {
        let query = Query::<Item>::unpaginated().with_sort(ItemSort::Rank, SortOrder::Desc);

        let page = query.apply(items());
        assert_eq!(page.items.first().map(|i| i.rank), Some(3));
        assert_eq!(page.items.last().map(|i| i.rank), Some(1));
    }

    #[test]
    fn out_of_range_page_is_empty_with_true_total() {
        let query = Query::<Item>::new().with_page(3, 10);

        let page = query.apply(items());
        assert!(page.items.is_empty());
        assert_eq!(page.total, 5);
    }
}
