use serde::{Deserialize, Serialize};

/// 分页结果结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

/// 对已排序的完整结果做内存分页
pub fn paginate<T: Clone>(items: &[T], page: usize, per_page: usize) -> PaginatedResult<T> {
    let total = items.len();
    let per_page = per_page.max(1);
    let total_pages = (total + per_page - 1) / per_page;
    let start = (page.max(1) - 1).saturating_mul(per_page);
    let data = items
        .iter()
        .skip(start)
        .take(per_page)
        .cloned()
        .collect();

    PaginatedResult {
        data,
        total,
        page: page.max(1),
        per_page,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginates_with_correct_totals() {
        let items: Vec<i32> = (1..=45).collect();

        let first = paginate(&items, 1, 20);
        assert_eq!(first.data.len(), 20);
        assert_eq!(first.total, 45);
        assert_eq!(first.total_pages, 3);

        let last = paginate(&items, 3, 20);
        assert_eq!(last.data, vec![41, 42, 43, 44, 45]);

        let beyond = paginate(&items, 9, 20);
        assert!(beyond.data.is_empty());
        assert_eq!(beyond.total, 45);
    }
}
