pub mod annotation_repo;
