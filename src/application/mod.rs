//! Application services and persistence seams.

pub mod error;
pub mod feed;
pub mod follow;
pub mod pagination;
pub mod posts;
pub mod repos;
