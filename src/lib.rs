//! A read-only, memory-efficient random-access model for a KDL-ish text
//! format: parse once into a compact side index, then query any part of
//! the tree in O(1) without re-parsing or materializing a DOM.
//!
//! ```
//! use kdl_core::{CommentHandling, Document};
//!
//! let doc = Document::parse(br#"{"name":"abc","tags":["a","b"]}"#, CommentHandling::Disallow)?;
//! let root = doc.root();
//! assert_eq!(root.get_property_count()?, 2);
//! # Ok::<(), kdl_core::Error>(())
//! ```

mod convert;
mod document;
mod element;
mod error;
mod metadata_db;
mod parser;
mod pool;
mod row;
mod tokenizer;
mod unescape;
mod writer;

pub use convert::{FromPayload, Guid};
pub use document::Document;
pub use element::{Element, WriteError};
pub use error::{Error, Result};
pub use row::TokenKind;
pub use tokenizer::CommentHandling;
pub use writer::{VecWriter, Writer};
