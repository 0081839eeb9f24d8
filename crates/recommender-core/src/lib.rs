pub mod api;
pub mod catalog;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod lexical;
pub mod ranker;
pub mod service;
