pub mod enrich;
pub mod index;
