pub mod middleware;
pub mod pagination;
