pub mod extension;
pub mod lifecycle;
pub mod path_builder;
pub mod relocation;
pub mod repository;
pub mod uniqueness;
