//! Repository fetching.

pub mod git;
pub mod reference;

pub use git::{FetchMethod, FetchedRepository, RepositoryFetcher};
pub use reference::{expand_home, RepoRef};
