pub mod embed;
pub mod reverse_search;
pub mod search;
pub mod status;
