//! Static request/response schema inference for PHP (Laravel-style) code.
//!
//! ```no_run
//! use std::sync::Arc;
//! use php_shape::inference::Inference;
//! use php_shape::source::SourceIndex;
//!
//! let index = SourceIndex::new();
//! index.add_file(std::path::Path::new("app/Http/Resources/UserResource.php")).unwrap();
//! let engine = Inference::new(Arc::new(index));
//! let subject = engine.subject("UserResource").unwrap();
//! let schema = engine.infer_output_schema(&subject);
//! println!("{}", php_shape::emit::schema(&schema));
//! ```
pub mod cli;
pub mod config;
pub mod emit;
pub mod error;
pub mod heuristics;
pub mod inference;
pub mod ir;
pub mod path_de;
pub mod source;

pub use config::InferConfig;
pub use error::{InferError, Result};
pub use inference::{Inference, ResolutionContext, Subject};
pub use ir::SchemaNode;
